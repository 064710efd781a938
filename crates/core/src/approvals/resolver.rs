use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalRule, ApprovalRuleId};
use crate::domain::company::CompanyId;
use crate::domain::user::{User, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAssignment {
    pub approver_id: UserId,
    /// `None` when the submitter's manager was used instead of a rule.
    pub rule_id: Option<ApprovalRuleId>,
}

/// Picks the rule with the highest `min_amount` at or below `amount`.
///
/// Rules sharing that threshold are ordered by id and the lowest id wins.
pub fn select_rule(
    rules: &[ApprovalRule],
    company_id: CompanyId,
    amount: Decimal,
) -> Option<&ApprovalRule> {
    rules.iter().filter(|rule| rule.applies_to(company_id, amount)).min_by(|left, right| {
        right.min_amount.cmp(&left.min_amount).then_with(|| left.id.cmp(&right.id))
    })
}

/// Computes the initial approver slot for a newly submitted expense.
///
/// A matched rule contributes its step-1 approver. Without a match, or when the matched rule
/// has no step 1, the submitter's immediate manager is used and no rule is attached.
pub fn resolve_initial_approver(
    rules: &[ApprovalRule],
    company_id: CompanyId,
    amount: Decimal,
    submitter: &User,
) -> Result<ApproverAssignment, DomainError> {
    if let Some(step) = select_rule(rules, company_id, amount).and_then(ApprovalRule::first_step) {
        return Ok(ApproverAssignment {
            approver_id: step.approver_id,
            rule_id: Some(step.approval_rule_id),
        });
    }

    submitter
        .manager_id
        .map(|approver_id| ApproverAssignment { approver_id, rule_id: None })
        .ok_or(DomainError::NoApproverFound { submitter_id: submitter.id })
}
