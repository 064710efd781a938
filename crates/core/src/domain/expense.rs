use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::CurrencyCode;
use crate::domain::approval::ApprovalRuleId;
use crate::domain::company::CompanyId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExpenseId(pub i64);

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::InvalidState(format!("unknown expense status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub company_id: CompanyId,
    pub submitted_by_id: UserId,
    pub amount: Decimal,
    /// Currency as submitted.
    pub currency: CurrencyCode,
    /// Always in the owning company's default currency.
    pub amount_in_company_currency: Decimal,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub receipt_ref: Option<String>,
    pub status: ExpenseStatus,
    pub current_approver_id: Option<UserId>,
    pub approved_by_id: Option<UserId>,
    pub approver_comments: Option<String>,
    pub approval_rule_id: Option<ApprovalRuleId>,
    /// Bumped on every persisted decision; used for compare-and-set writes.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tagged view of the approval columns of an [`Expense`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalState {
    Pending { current_approver_id: UserId, approval_rule_id: Option<ApprovalRuleId> },
    Approved { approved_by_id: UserId },
    Rejected,
}

impl Expense {
    /// Reads the approval columns as a state, failing when they contradict each other.
    pub fn approval_state(&self) -> Result<ApprovalState, DomainError> {
        match (self.status, self.current_approver_id, self.approved_by_id) {
            (ExpenseStatus::Pending, Some(current_approver_id), None) => {
                Ok(ApprovalState::Pending {
                    current_approver_id,
                    approval_rule_id: self.approval_rule_id,
                })
            }
            (ExpenseStatus::Approved, None, Some(approved_by_id)) => {
                Ok(ApprovalState::Approved { approved_by_id })
            }
            (ExpenseStatus::Rejected, None, None) => Ok(ApprovalState::Rejected),
            (status, current, approved_by) => Err(DomainError::InvalidState(format!(
                "expense {} has status `{status}` with current approver {current:?} \
                 and approved_by {approved_by:?}",
                self.id
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A fully resolved expense ready to be persisted in its initial `Pending` state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub company_id: CompanyId,
    pub submitted_by_id: UserId,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub amount_in_company_currency: Decimal,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub receipt_ref: Option<String>,
    pub current_approver_id: UserId,
    pub approval_rule_id: Option<ApprovalRuleId>,
}

impl NewExpense {
    pub fn into_expense(self, id: ExpenseId, now: DateTime<Utc>) -> Expense {
        Expense {
            id,
            company_id: self.company_id,
            submitted_by_id: self.submitted_by_id,
            amount: self.amount,
            currency: self.currency,
            amount_in_company_currency: self.amount_in_company_currency,
            category: self.category,
            description: self.description,
            expense_date: self.expense_date,
            receipt_ref: self.receipt_ref,
            status: ExpenseStatus::Pending,
            current_approver_id: Some(self.current_approver_id),
            approved_by_id: None,
            approver_comments: None,
            approval_rule_id: self.approval_rule_id,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{ApprovalState, ExpenseId, ExpenseStatus, NewExpense};
    use crate::currency::CurrencyCode;
    use crate::domain::company::CompanyId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn new_expense() -> NewExpense {
        NewExpense {
            company_id: CompanyId(1),
            submitted_by_id: UserId(3),
            amount: Decimal::new(4_200, 2),
            currency: CurrencyCode::parse("usd").expect("currency"),
            amount_in_company_currency: Decimal::new(4_200, 2),
            category: "Meals".to_string(),
            description: "Client lunch".to_string(),
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
            receipt_ref: None,
            current_approver_id: UserId(2),
            approval_rule_id: None,
        }
    }

    #[test]
    fn new_expense_starts_pending_with_approver_slot_held() {
        let expense = new_expense().into_expense(ExpenseId(9), Utc::now());

        assert_eq!(expense.status, ExpenseStatus::Pending);
        assert_eq!(expense.version, 1);
        assert_eq!(
            expense.approval_state().expect("consistent"),
            ApprovalState::Pending { current_approver_id: UserId(2), approval_rule_id: None }
        );
    }

    #[test]
    fn pending_without_approver_is_reported_as_invalid_state() {
        let mut expense = new_expense().into_expense(ExpenseId(9), Utc::now());
        expense.current_approver_id = None;

        let error = expense.approval_state().expect_err("inconsistent columns");
        assert!(matches!(error, DomainError::InvalidState(_)));
    }

    #[test]
    fn terminal_state_must_release_approver_slot() {
        let mut expense = new_expense().into_expense(ExpenseId(9), Utc::now());
        expense.status = ExpenseStatus::Rejected;

        assert!(expense.approval_state().is_err());

        expense.current_approver_id = None;
        assert_eq!(expense.approval_state().expect("rejected"), ApprovalState::Rejected);
    }
}
