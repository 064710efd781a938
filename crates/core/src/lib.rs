pub mod approvals;
pub mod audit;
pub mod config;
pub mod currency;
pub mod domain;
pub mod errors;
pub mod submission;

pub use approvals::{
    resolve_initial_approver, select_rule, ApprovalStateMachine, ApproverAssignment, Decision,
    DecisionInput, DecisionOutcome, Transition,
};
pub use currency::{
    normalize_amount, ConversionSettings, CurrencyCode, FallbackPolicy, NormalizedAmount,
    RateLookupError, RateProvider, StaticRateProvider,
};
pub use domain::approval::{
    ApprovalRule, ApprovalRuleId, ApprovalStep, ApprovalStepId, NewApprovalRule,
};
pub use domain::company::{Company, CompanyId, NewCompany};
pub use domain::expense::{ApprovalState, Expense, ExpenseId, ExpenseStatus, NewExpense};
pub use domain::user::{NewUser, Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use submission::{ExpenseSubmission, ValidatedSubmission};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
