use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use expensa_core::domain::approval::{
    ApprovalRule, ApprovalRuleId, ApprovalStep, ApprovalStepId, NewApprovalRule,
};
use expensa_core::domain::company::{Company, CompanyId, NewCompany};
use expensa_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
use expensa_core::domain::user::{NewUser, User, UserId};

use super::{
    ApprovalRuleRepository, CompanyRepository, ExpenseRepository, RepositoryError,
    UserRepository,
};

#[derive(Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<BTreeMap<CompanyId, Company>>,
}

#[async_trait::async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn find_by_id(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id).cloned())
    }

    async fn create(&self, company: NewCompany) -> Result<Company, RepositoryError> {
        let mut companies = self.companies.write().await;
        let id = CompanyId(next_id(companies.keys().map(|id| id.0)));
        let created =
            Company { id, name: company.name, default_currency: company.default_currency };
        companies.insert(id, created.clone());
        Ok(created)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<BTreeMap<UserId, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email.eq_ignore_ascii_case(email.trim())).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.email.eq_ignore_ascii_case(&user.email)) {
            return Err(RepositoryError::Constraint(format!(
                "email `{}` is already registered",
                user.email
            )));
        }

        let id = UserId(next_id(users.keys().map(|id| id.0)));
        let created = User {
            id,
            company_id: user.company_id,
            name: user.name,
            email: user.email,
            role: user.role,
            manager_id: user.manager_id,
        };
        users.insert(id, created.clone());
        Ok(created)
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|user| user.company_id == company_id).cloned().collect())
    }

    async fn list_direct_reports(&self, manager_id: UserId) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|user| user.manager_id == Some(manager_id)).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryApprovalRuleRepository {
    rules: RwLock<BTreeMap<ApprovalRuleId, ApprovalRule>>,
}

impl InMemoryApprovalRuleRepository {
    /// Stores `rule` as given, steps included. Lets tests stage inconsistent data.
    pub async fn insert(&self, rule: ApprovalRule) {
        self.rules.write().await.insert(rule.id, rule);
    }
}

#[async_trait::async_trait]
impl ApprovalRuleRepository for InMemoryApprovalRuleRepository {
    async fn find_by_id(
        &self,
        id: ApprovalRuleId,
    ) -> Result<Option<ApprovalRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id).cloned())
    }

    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.values().filter(|rule| rule.company_id == company_id).cloned().collect())
    }

    async fn create(&self, rule: NewApprovalRule) -> Result<ApprovalRule, RepositoryError> {
        let mut rules = self.rules.write().await;
        let id = ApprovalRuleId(next_id(rules.keys().map(|id| id.0)));
        let first_step_id = rules.values().map(|rule| rule.steps.len() as i64).sum::<i64>() + 1;

        let steps = rule
            .approver_ids
            .iter()
            .enumerate()
            .map(|(position, approver_id)| ApprovalStep {
                id: ApprovalStepId(first_step_id + position as i64),
                approval_rule_id: id,
                approver_id: *approver_id,
                step: position as u32 + 1,
            })
            .collect();

        let created = ApprovalRule {
            id,
            company_id: rule.company_id,
            name: rule.name,
            min_amount: rule.min_amount,
            steps,
        };
        rules.insert(id, created.clone());
        Ok(created)
    }
}

#[derive(Default)]
pub struct InMemoryExpenseRepository {
    expenses: RwLock<BTreeMap<ExpenseId, Expense>>,
}

#[async_trait::async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn create(&self, expense: NewExpense) -> Result<Expense, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        let id = ExpenseId(next_id(expenses.keys().map(|id| id.0)));
        let created = expense.into_expense(id, Utc::now());
        expenses.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(&id).cloned())
    }

    async fn update_if_version(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let mut expenses = self.expenses.write().await;
        match expenses.get_mut(&expense.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = expense.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_submitter(
        &self,
        submitter_id: UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .rev()
            .filter(|expense| expense.submitted_by_id == submitter_id)
            .cloned()
            .collect())
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses
            .values()
            .filter(|expense| {
                expense.status == ExpenseStatus::Pending
                    && expense.current_approver_id == Some(approver_id)
            })
            .cloned()
            .collect())
    }

    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.values().filter(|expense| expense.company_id == company_id).cloned().collect())
    }
}

fn next_id(existing: impl Iterator<Item = i64>) -> i64 {
    existing.max().unwrap_or(0) + 1
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use expensa_core::currency::CurrencyCode;
    use expensa_core::domain::approval::NewApprovalRule;
    use expensa_core::domain::company::CompanyId;
    use expensa_core::domain::expense::NewExpense;
    use expensa_core::domain::user::{NewUser, Role, UserId};

    use crate::repositories::{
        ApprovalRuleRepository, ExpenseRepository, InMemoryApprovalRuleRepository,
        InMemoryExpenseRepository, InMemoryUserRepository, RepositoryError, UserRepository,
    };

    #[tokio::test]
    async fn in_memory_user_repo_enforces_unique_email() {
        let repo = InMemoryUserRepository::default();
        let user = NewUser {
            company_id: CompanyId(1),
            name: "Eli".to_string(),
            email: "eli@acme.test".to_string(),
            role: Role::Employee,
            manager_id: None,
        };

        let created = repo.create(user.clone()).await.expect("create");
        assert_eq!(repo.find_by_id(created.id).await.expect("find"), Some(created));

        let duplicate = repo.create(NewUser { email: "ELI@acme.test".to_string(), ..user }).await;
        assert!(matches!(duplicate, Err(RepositoryError::Constraint(_))));
    }

    #[tokio::test]
    async fn in_memory_rule_repo_numbers_steps_from_one() {
        let repo = InMemoryApprovalRuleRepository::default();
        let rule = repo
            .create(NewApprovalRule {
                company_id: CompanyId(1),
                name: "Two-step".to_string(),
                min_amount: Decimal::new(500, 0),
                approver_ids: vec![UserId(7), UserId(8)],
            })
            .await
            .expect("create");

        let found = repo.find_by_id(rule.id).await.expect("find").expect("exists");
        assert_eq!(found.first_step().map(|step| step.approver_id), Some(UserId(7)));
        assert_eq!(found.step_number(2).map(|step| step.approver_id), Some(UserId(8)));
    }

    #[tokio::test]
    async fn in_memory_expense_repo_compare_and_set() {
        let repo = InMemoryExpenseRepository::default();
        let created = repo
            .create(NewExpense {
                company_id: CompanyId(1),
                submitted_by_id: UserId(2),
                amount: Decimal::new(12, 0),
                currency: CurrencyCode::parse("USD").expect("currency"),
                amount_in_company_currency: Decimal::new(12, 0),
                category: "Meals".to_string(),
                description: "Lunch".to_string(),
                expense_date: NaiveDate::from_ymd_opt(2026, 1, 2).expect("date"),
                receipt_ref: None,
                current_approver_id: UserId(3),
                approval_rule_id: None,
            })
            .await
            .expect("create");

        let mut next = created.clone();
        next.version += 1;
        assert!(repo.update_if_version(&next, created.version).await.expect("first"));
        assert!(!repo.update_if_version(&next, created.version).await.expect("stale"));
    }
}
