use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApprovalRuleId(pub i64);

impl fmt::Display for ApprovalRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApprovalStepId(pub i64);

/// One approver position in a rule. `step` is 1-based and unique within its rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: ApprovalStepId,
    pub approval_rule_id: ApprovalRuleId,
    pub approver_id: UserId,
    pub step: u32,
}

/// Applies to expenses whose company-currency amount is at or above `min_amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: ApprovalRuleId,
    pub company_id: CompanyId,
    pub name: String,
    pub min_amount: Decimal,
    pub steps: Vec<ApprovalStep>,
}

impl ApprovalRule {
    pub fn applies_to(&self, company_id: CompanyId, amount: Decimal) -> bool {
        self.company_id == company_id && self.min_amount <= amount
    }

    pub fn step_number(&self, step: u32) -> Option<&ApprovalStep> {
        self.steps.iter().find(|candidate| candidate.step == step)
    }

    pub fn first_step(&self) -> Option<&ApprovalStep> {
        self.step_number(1)
    }

    pub fn step_for_approver(&self, approver_id: UserId) -> Option<&ApprovalStep> {
        self.steps.iter().find(|candidate| candidate.approver_id == approver_id)
    }

    /// The step that follows `current`, if the sequence continues.
    pub fn next_step(&self, current: &ApprovalStep) -> Option<&ApprovalStep> {
        current.step.checked_add(1).and_then(|next| self.step_number(next))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalRule {
    pub company_id: CompanyId,
    pub name: String,
    pub min_amount: Decimal,
    /// Approvers in sequence order; position 0 becomes step 1.
    pub approver_ids: Vec<UserId>,
}
