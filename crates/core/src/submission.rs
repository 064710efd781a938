use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::ApproverAssignment;
use crate::currency::{CurrencyCode, NormalizedAmount};
use crate::domain::company::Company;
use crate::domain::expense::NewExpense;
use crate::domain::user::{User, UserId};
use crate::errors::DomainError;

/// Raw submission as received from a caller; every field may be missing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSubmission {
    pub submitter_id: UserId,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub expense_date: Option<NaiveDate>,
    pub receipt_ref: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub submitter_id: UserId,
    pub amount: Decimal,
    /// `None` means "use the company currency".
    pub currency: Option<CurrencyCode>,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub receipt_ref: Option<String>,
}

impl ExpenseSubmission {
    pub fn validate(self) -> Result<ValidatedSubmission, DomainError> {
        let amount = self
            .amount
            .ok_or_else(|| DomainError::Validation("amount is required".to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(DomainError::Validation("amount must be greater than zero".to_string()));
        }

        let category = required_text("category", self.category)?;
        let description = required_text("description", self.description)?;
        let expense_date = self
            .expense_date
            .ok_or_else(|| DomainError::Validation("expense_date is required".to_string()))?;

        let currency = match self.currency.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(CurrencyCode::parse(raw)?),
        };

        let receipt_ref = self
            .receipt_ref
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(ValidatedSubmission {
            submitter_id: self.submitter_id,
            amount,
            currency,
            category,
            description,
            expense_date,
            receipt_ref,
        })
    }
}

impl ValidatedSubmission {
    pub fn currency_or(&self, company: &Company) -> CurrencyCode {
        self.currency.clone().unwrap_or_else(|| company.default_currency.clone())
    }

    /// Assembles the initial `Pending` record from the resolved pieces.
    pub fn into_new_expense(
        self,
        submitter: &User,
        currency: CurrencyCode,
        normalized: &NormalizedAmount,
        assignment: ApproverAssignment,
    ) -> NewExpense {
        NewExpense {
            company_id: submitter.company_id,
            submitted_by_id: submitter.id,
            amount: self.amount,
            currency,
            amount_in_company_currency: normalized.amount,
            category: self.category,
            description: self.description,
            expense_date: self.expense_date,
            receipt_ref: self.receipt_ref,
            current_approver_id: assignment.approver_id,
            approval_rule_id: assignment.rule_id,
        }
    }
}

fn required_text(field: &str, value: Option<String>) -> Result<String, DomainError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DomainError::Validation(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::ExpenseSubmission;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn submission() -> ExpenseSubmission {
        ExpenseSubmission {
            submitter_id: UserId(3),
            amount: Some(Decimal::new(12_550, 2)),
            currency: Some("eur".to_string()),
            category: Some("Travel".to_string()),
            description: Some("Train to Lyon".to_string()),
            expense_date: NaiveDate::from_ymd_opt(2026, 5, 2),
            receipt_ref: Some("  ".to_string()),
        }
    }

    fn validation_message(submission: ExpenseSubmission) -> String {
        match submission.validate() {
            Err(DomainError::Validation(message)) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_complete_submission() {
        let validated = submission().validate().expect("valid");

        assert_eq!(validated.amount, Decimal::new(12_550, 2));
        assert_eq!(validated.currency.as_ref().map(|code| code.as_str()), Some("EUR"));
        assert_eq!(validated.receipt_ref, None);
    }

    #[test]
    fn rejects_zero_and_negative_amounts() {
        let mut zero = submission();
        zero.amount = Some(Decimal::ZERO);
        assert!(validation_message(zero).contains("greater than zero"));

        let mut negative = submission();
        negative.amount = Some(Decimal::new(-1, 0));
        assert!(validation_message(negative).contains("greater than zero"));
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut no_category = submission();
        no_category.category = None;
        assert_eq!(validation_message(no_category), "category is required");

        let mut blank_description = submission();
        blank_description.description = Some("   ".to_string());
        assert_eq!(validation_message(blank_description), "description is required");

        let mut no_date = submission();
        no_date.expense_date = None;
        assert_eq!(validation_message(no_date), "expense_date is required");

        let mut no_amount = submission();
        no_amount.amount = None;
        assert_eq!(validation_message(no_amount), "amount is required");
    }

    #[test]
    fn blank_currency_means_company_default() {
        let mut blank = submission();
        blank.currency = Some(String::new());
        assert!(blank.validate().expect("valid").currency.is_none());
    }

    #[test]
    fn malformed_currency_is_rejected() {
        let mut bad = submission();
        bad.currency = Some("euro".to_string());
        assert!(validation_message(bad).contains("3-letter"));
    }
}
