use async_trait::async_trait;
use thiserror::Error;

use expensa_core::domain::approval::{ApprovalRule, ApprovalRuleId, NewApprovalRule};
use expensa_core::domain::company::{Company, CompanyId, NewCompany};
use expensa_core::domain::expense::{Expense, ExpenseId, NewExpense};
use expensa_core::domain::user::{NewUser, User, UserId};
use expensa_core::errors::ApplicationError;

pub mod approval_rule;
pub mod company;
pub mod expense;
pub mod memory;
pub mod user;

pub use approval_rule::SqlApprovalRuleRepository;
pub use company::SqlCompanyRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{
    InMemoryApprovalRuleRepository, InMemoryCompanyRepository, InMemoryExpenseRepository,
    InMemoryUserRepository,
};
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn find_by_id(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn create(&self, company: NewCompany) -> Result<Company, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<User>, RepositoryError>;
    async fn list_direct_reports(&self, manager_id: UserId) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRuleRepository: Send + Sync {
    /// Loads the rule together with its steps, ordered by step number.
    async fn find_by_id(&self, id: ApprovalRuleId)
        -> Result<Option<ApprovalRule>, RepositoryError>;
    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError>;
    /// Inserts the rule and its steps atomically.
    async fn create(&self, rule: NewApprovalRule) -> Result<ApprovalRule, RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn create(&self, expense: NewExpense) -> Result<Expense, RepositoryError>;
    async fn find_by_id(&self, id: ExpenseId) -> Result<Option<Expense>, RepositoryError>;
    /// Writes `expense` only if the stored row still carries `expected_version`.
    ///
    /// Returns `false` when another writer got there first; nothing is written in that case.
    async fn update_if_version(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<bool, RepositoryError>;
    /// Newest first.
    async fn list_by_submitter(&self, submitter_id: UserId)
        -> Result<Vec<Expense>, RepositoryError>;
    /// Pending expenses held by `approver_id`, oldest first.
    async fn list_pending_for_approver(
        &self,
        approver_id: UserId,
    ) -> Result<Vec<Expense>, RepositoryError>;
    async fn list_by_company(&self, company_id: CompanyId)
        -> Result<Vec<Expense>, RepositoryError>;
}

pub(crate) fn decode_error(error: impl ToString) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(
    raw: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|error| decode_error(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn parse_decimal(raw: &str) -> Result<rust_decimal::Decimal, RepositoryError> {
    raw.parse::<rust_decimal::Decimal>()
        .map_err(|error| decode_error(format!("invalid decimal `{raw}`: {error}")))
}
