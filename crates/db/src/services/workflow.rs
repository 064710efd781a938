use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use expensa_core::approvals::{
    resolve_initial_approver, ApprovalStateMachine, ApproverAssignment, Decision, DecisionInput,
};
use expensa_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use expensa_core::currency::{normalize_amount, ConversionSettings, RateProvider};
use expensa_core::domain::company::CompanyId;
use expensa_core::domain::expense::{Expense, ExpenseId};
use expensa_core::domain::user::UserId;
use expensa_core::errors::{ApplicationError, DomainError};
use expensa_core::submission::ExpenseSubmission;

use super::Stores;

/// Submission and decision entry points over the stores.
#[derive(Clone)]
pub struct ExpenseWorkflow {
    stores: Stores,
    rates: Arc<dyn RateProvider>,
    audit: Arc<dyn AuditSink>,
    conversion: ConversionSettings,
}

impl ExpenseWorkflow {
    pub fn new(
        stores: Stores,
        rates: Arc<dyn RateProvider>,
        audit: Arc<dyn AuditSink>,
        conversion: ConversionSettings,
    ) -> Self {
        Self { stores, rates, audit, conversion }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Who must act first on an expense of `amount` (company currency) raised by `submitter_id`.
    pub async fn resolve_initial_approver(
        &self,
        company_id: CompanyId,
        amount: Decimal,
        submitter_id: UserId,
    ) -> Result<ApproverAssignment, ApplicationError> {
        let submitter = self.stores.require_user(submitter_id).await?;
        if submitter.company_id != company_id {
            return Err(DomainError::Validation(format!(
                "user {submitter_id} does not belong to company {company_id}"
            ))
            .into());
        }

        let rules = self.stores.rules.list_by_company(company_id).await?;
        Ok(resolve_initial_approver(&rules, company_id, amount, &submitter)?)
    }

    pub async fn submit(
        &self,
        submission: ExpenseSubmission,
        correlation_id: &str,
    ) -> Result<Expense, ApplicationError> {
        let validated = submission.validate()?;
        let submitter = self.stores.require_user(validated.submitter_id).await?;
        let company = self
            .stores
            .companies
            .find_by_id(submitter.company_id)
            .await?
            .ok_or_else(|| DomainError::not_found("company", submitter.company_id))?;

        let currency = validated.currency_or(&company);
        let normalized = match normalize_amount(
            self.rates.as_ref(),
            validated.amount,
            &currency,
            &company.default_currency,
            self.conversion,
        )
        .await
        {
            Ok(normalized) => normalized,
            Err(rejection) => {
                warn!(
                    event_name = "expense.submit.rate_rejected",
                    correlation_id = %correlation_id,
                    submitter_id = %submitter.id,
                    error = %rejection,
                    "submission rejected: currency conversion failed"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        correlation_id,
                        "expense.submit_rejected",
                        AuditCategory::Submission,
                        actor_label(submitter.id),
                        AuditOutcome::Failed,
                    )
                    .with_metadata("reason", rejection.to_string()),
                );
                return Err(rejection.into());
            }
        };

        if let Some(reason) = &normalized.degraded_reason {
            warn!(
                event_name = "expense.submit.rate_degraded",
                correlation_id = %correlation_id,
                from = %currency,
                to = %company.default_currency,
                error = %reason,
                "rate lookup failed; carrying the submitted amount unconverted"
            );
        }

        let rules = self.stores.rules.list_by_company(company.id).await?;
        let assignment =
            resolve_initial_approver(&rules, company.id, normalized.amount, &submitter)?;

        let new_expense = validated.into_new_expense(&submitter, currency, &normalized, assignment);
        let expense = self.stores.expenses.create(new_expense).await?;

        info!(
            event_name = "expense.submitted",
            correlation_id = %correlation_id,
            expense_id = %expense.id,
            submitter_id = %submitter.id,
            approver_id = %assignment.approver_id,
            rule_id = ?assignment.rule_id.map(|id| id.0),
            "expense submitted"
        );

        let mut event = AuditEvent::new(
            Some(expense.id),
            correlation_id,
            "expense.submitted",
            AuditCategory::Submission,
            actor_label(submitter.id),
            AuditOutcome::Success,
        )
        .with_metadata("approver_id", assignment.approver_id.to_string())
        .with_metadata(
            "amount_in_company_currency",
            expense.amount_in_company_currency.to_string(),
        );
        if let Some(rule_id) = assignment.rule_id {
            event = event.with_metadata("approval_rule_id", rule_id.to_string());
        }
        if normalized.degraded_reason.is_some() {
            event = event.with_metadata("conversion", "degraded");
        }
        self.audit.emit(event);

        Ok(expense)
    }

    /// Applies `decision` by `actor` to the expense, writing it with a version check.
    ///
    /// Nothing is written unless the whole transition succeeds. A concurrent writer that
    /// moved the expense first makes this call report `AlreadyProcessed`.
    pub async fn process_decision(
        &self,
        expense_id: ExpenseId,
        actor: UserId,
        decision: Decision,
        comments: Option<String>,
        correlation_id: &str,
    ) -> Result<Expense, ApplicationError> {
        let expense = self
            .stores
            .expenses
            .find_by_id(expense_id)
            .await?
            .ok_or_else(|| DomainError::not_found("expense", expense_id))?;

        let acting = self.stores.require_user(actor).await?;
        if !acting.role.can_approve() {
            let refused = DomainError::forbidden(
                actor,
                format!("role `{}` cannot decide on expenses", acting.role),
            );
            return Err(self.refuse(&expense, actor, decision, refused, correlation_id));
        }

        if let Err(refused) = ApprovalStateMachine::check_preconditions(&expense, actor) {
            return Err(self.refuse(&expense, actor, decision, refused, correlation_id));
        }

        let rule = match ApprovalStateMachine::rule_required(&expense, decision) {
            Some(rule_id) => self.stores.rules.find_by_id(rule_id).await?,
            None => None,
        };

        let input = DecisionInput { acting_approver_id: actor, decision, comments };
        let outcome = match ApprovalStateMachine::apply(&expense, rule.as_ref(), input, Utc::now())
        {
            Ok(outcome) => outcome,
            Err(refused) => {
                return Err(self.refuse(&expense, actor, decision, refused, correlation_id));
            }
        };

        let written =
            self.stores.expenses.update_if_version(&outcome.expense, expense.version).await?;
        if !written {
            let status = match self.stores.expenses.find_by_id(expense_id).await? {
                Some(current) => current.status,
                None => expense.status,
            };
            let lost = DomainError::AlreadyProcessed { expense_id, status };
            return Err(self.refuse(&expense, actor, decision, lost, correlation_id));
        }

        info!(
            event_name = outcome.transition.event_type(),
            correlation_id = %correlation_id,
            expense_id = %expense_id,
            actor_id = %actor,
            status = %outcome.expense.status,
            next_approver_id = ?outcome.expense.current_approver_id.map(|id| id.0),
            "approval decision recorded"
        );

        let mut event = AuditEvent::new(
            Some(expense_id),
            correlation_id,
            outcome.transition.event_type(),
            AuditCategory::Approval,
            actor_label(actor),
            AuditOutcome::Success,
        )
        .with_metadata("decision", decision.as_str())
        .with_metadata("status", outcome.expense.status.as_str());
        if let Some(next) = outcome.expense.current_approver_id {
            event = event.with_metadata("next_approver_id", next.to_string());
        }
        self.audit.emit(event);

        Ok(outcome.expense)
    }

    pub async fn list_my_expenses(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Expense>, ApplicationError> {
        let user = self.stores.require_user(user_id).await?;
        Ok(self.stores.expenses.list_by_submitter(user.id).await?)
    }

    pub async fn list_pending_approvals(
        &self,
        approver_id: UserId,
    ) -> Result<Vec<Expense>, ApplicationError> {
        let approver = self.stores.require_user(approver_id).await?;
        if !approver.role.can_approve() {
            return Err(DomainError::forbidden(
                approver.id,
                format!("role `{}` cannot review expenses", approver.role),
            )
            .into());
        }
        Ok(self.stores.expenses.list_pending_for_approver(approver.id).await?)
    }

    fn refuse(
        &self,
        expense: &Expense,
        actor: UserId,
        decision: Decision,
        refused: DomainError,
        correlation_id: &str,
    ) -> ApplicationError {
        match &refused {
            DomainError::InvalidState(detail) => error!(
                event_name = "approval.invalid_state",
                correlation_id = %correlation_id,
                expense_id = %expense.id,
                actor_id = %actor,
                detail = %detail,
                "approval state is inconsistent; decision refused"
            ),
            other => info!(
                event_name = "approval.refused",
                correlation_id = %correlation_id,
                expense_id = %expense.id,
                actor_id = %actor,
                reason = %other,
                "approval decision refused"
            ),
        }

        self.audit.emit(
            AuditEvent::new(
                Some(expense.id),
                correlation_id,
                "approval.refused",
                AuditCategory::Approval,
                actor_label(actor),
                AuditOutcome::Rejected,
            )
            .with_metadata("decision", decision.as_str())
            .with_metadata("reason", refused.to_string()),
        );

        refused.into()
    }
}

fn actor_label(user_id: UserId) -> String {
    format!("user:{user_id}")
}
