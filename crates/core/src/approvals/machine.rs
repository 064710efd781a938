use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalRule, ApprovalRuleId};
use crate::domain::expense::{ApprovalState, Expense, ExpenseStatus};
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "rejected" | "reject" => Ok(Self::Rejected),
            other => Err(DomainError::Validation(format!(
                "unsupported decision `{other}` (expected approved|rejected)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub acting_approver_id: UserId,
    pub decision: Decision,
    pub comments: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Rejected { rejected_by_id: UserId },
    Advanced { from_step: u32, to_step: u32, next_approver_id: UserId },
    Approved { approved_by_id: UserId, final_step: Option<u32> },
}

impl Transition {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "approval.rejected",
            Self::Advanced { .. } => "approval.advanced",
            Self::Approved { .. } => "approval.approved",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    /// The expense after the decision, carrying the version it must be written with.
    pub expense: Expense,
    pub transition: Transition,
}

/// Pending --reject--> Rejected
/// Pending --approve, no next step--> Approved
/// Pending --approve, next step--> Pending (next approver, same rule)
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    /// Checks that `actor` holds the approver slot and the expense is still pending.
    ///
    /// Terminal expenses have released the slot, so every further attempt on them reports
    /// `AlreadyProcessed` whoever the actor is.
    pub fn check_preconditions(expense: &Expense, actor: UserId) -> Result<(), DomainError> {
        match expense.approval_state()? {
            ApprovalState::Pending { current_approver_id, .. } if current_approver_id == actor => {
                Ok(())
            }
            ApprovalState::Pending { .. } => Err(DomainError::forbidden(
                actor,
                format!("not the current approver of expense {}", expense.id),
            )),
            ApprovalState::Approved { .. } | ApprovalState::Rejected => {
                Err(DomainError::AlreadyProcessed {
                    expense_id: expense.id,
                    status: expense.status,
                })
            }
        }
    }

    /// The rule whose steps `apply` needs, if any. Rejections never consult the rule.
    pub fn rule_required(expense: &Expense, decision: Decision) -> Option<ApprovalRuleId> {
        match decision {
            Decision::Approved => expense.approval_rule_id,
            Decision::Rejected => None,
        }
    }

    pub fn apply(
        expense: &Expense,
        rule: Option<&ApprovalRule>,
        input: DecisionInput,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, DomainError> {
        let actor = input.acting_approver_id;
        Self::check_preconditions(expense, actor)?;

        let mut next = expense.clone();
        next.approver_comments = input.comments;
        next.version = expense.version + 1;
        next.updated_at = now;

        let transition = match input.decision {
            Decision::Rejected => {
                next.status = ExpenseStatus::Rejected;
                next.current_approver_id = None;
                Transition::Rejected { rejected_by_id: actor }
            }
            Decision::Approved => match expense.approval_rule_id {
                None => finalize(&mut next, actor, None),
                Some(rule_id) => {
                    let rule = rule.filter(|rule| rule.id == rule_id).ok_or_else(|| {
                        DomainError::InvalidState(format!(
                            "approval rule {rule_id} attached to expense {} is unavailable",
                            expense.id
                        ))
                    })?;
                    let current = rule.step_for_approver(actor).ok_or_else(|| {
                        DomainError::InvalidState(format!(
                            "approver {actor} holds expense {} but has no step in rule {rule_id}",
                            expense.id
                        ))
                    })?;

                    match rule.next_step(current) {
                        Some(following) => {
                            next.current_approver_id = Some(following.approver_id);
                            Transition::Advanced {
                                from_step: current.step,
                                to_step: following.step,
                                next_approver_id: following.approver_id,
                            }
                        }
                        None => finalize(&mut next, actor, Some(current.step)),
                    }
                }
            },
        };

        Ok(DecisionOutcome { expense: next, transition })
    }
}

fn finalize(expense: &mut Expense, actor: UserId, final_step: Option<u32>) -> Transition {
    expense.status = ExpenseStatus::Approved;
    expense.current_approver_id = None;
    expense.approved_by_id = Some(actor);
    Transition::Approved { approved_by_id: actor, final_step }
}
