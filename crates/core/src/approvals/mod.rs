//! Approval routing: who acts first on a new expense, and who acts next after each decision.
//!
//! Both halves are pure. Callers load the rules, steps, and users from their stores and hand
//! them in; nothing here touches I/O.

pub mod machine;
pub mod resolver;

pub use machine::{ApprovalStateMachine, Decision, DecisionInput, DecisionOutcome, Transition};
pub use resolver::{resolve_initial_approver, select_rule, ApproverAssignment};
