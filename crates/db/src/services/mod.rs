//! Use cases composed over the repositories: submission and decisions, administration,
//! and dashboard figures. Each service owns `Arc` handles and is cheap to clone.

use std::sync::Arc;

use expensa_core::domain::user::{User, UserId};
use expensa_core::errors::{ApplicationError, DomainError};

use crate::repositories::{
    ApprovalRuleRepository, CompanyRepository, ExpenseRepository, InMemoryApprovalRuleRepository,
    InMemoryCompanyRepository, InMemoryExpenseRepository, InMemoryUserRepository,
    SqlApprovalRuleRepository, SqlCompanyRepository, SqlExpenseRepository, SqlUserRepository,
    UserRepository,
};
use crate::DbPool;

pub mod admin;
pub mod dashboard;
pub mod workflow;

pub use admin::{AdminService, ApprovalRuleDraft, CompanyRegistration, UserDraft};
pub use dashboard::{DashboardReport, DashboardService, DashboardStats};
pub use workflow::ExpenseWorkflow;

#[derive(Clone)]
pub struct Stores {
    pub companies: Arc<dyn CompanyRepository>,
    pub users: Arc<dyn UserRepository>,
    pub rules: Arc<dyn ApprovalRuleRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
}

impl Stores {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            companies: Arc::new(SqlCompanyRepository::new(pool.clone())),
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            rules: Arc::new(SqlApprovalRuleRepository::new(pool.clone())),
            expenses: Arc::new(SqlExpenseRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            companies: Arc::new(InMemoryCompanyRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            rules: Arc::new(InMemoryApprovalRuleRepository::default()),
            expenses: Arc::new(InMemoryExpenseRepository::default()),
        }
    }

    pub(crate) async fn require_user(&self, id: UserId) -> Result<User, ApplicationError> {
        self.users.find_by_id(id).await?.ok_or_else(|| DomainError::not_found("user", id).into())
    }
}
