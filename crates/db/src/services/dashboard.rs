use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use expensa_core::currency::CurrencyCode;
use expensa_core::domain::expense::{Expense, ExpenseStatus};
use expensa_core::domain::user::{Role, UserId};
use expensa_core::errors::{ApplicationError, DomainError};

use super::Stores;

const TRAILING_WINDOW_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum DashboardStats {
    Admin { total_users: usize, total_pending: usize, company_total_30d: Decimal },
    Manager { approved_today: usize, team_total_30d: Decimal },
    Employee { total: usize, pending: usize, approved: usize, rejected: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardReport {
    pub default_currency: CurrencyCode,
    #[serde(flatten)]
    pub stats: DashboardStats,
}

#[derive(Clone)]
pub struct DashboardService {
    stores: Stores,
}

impl DashboardService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Figures for the `view` dashboard as seen by `user_id` at `now`.
    ///
    /// Users get their own role's view; admins may ask for any view.
    pub async fn stats(
        &self,
        user_id: UserId,
        view: Role,
        now: DateTime<Utc>,
    ) -> Result<DashboardReport, ApplicationError> {
        let user = self.stores.require_user(user_id).await?;
        if user.role != view && user.role != Role::Admin {
            return Err(DomainError::forbidden(
                user.id,
                format!("role `{}` cannot open the {view} dashboard", user.role),
            )
            .into());
        }

        let company = self
            .stores
            .companies
            .find_by_id(user.company_id)
            .await?
            .ok_or_else(|| DomainError::not_found("company", user.company_id))?;
        let window_start = (now - Duration::days(TRAILING_WINDOW_DAYS)).date_naive();

        let stats = match view {
            Role::Admin => {
                let users = self.stores.users.list_by_company(company.id).await?;
                let expenses = self.stores.expenses.list_by_company(company.id).await?;
                DashboardStats::Admin {
                    total_users: users.len(),
                    total_pending: count_status(&expenses, ExpenseStatus::Pending),
                    company_total_30d: expenses
                        .iter()
                        .filter(|expense| expense.expense_date >= window_start)
                        .map(|expense| expense.amount_in_company_currency)
                        .sum(),
                }
            }
            Role::Manager => {
                let reports = self.stores.users.list_direct_reports(user.id).await?;
                let expenses = self.stores.expenses.list_by_company(company.id).await?;
                let today = now.date_naive();
                DashboardStats::Manager {
                    approved_today: expenses
                        .iter()
                        .filter(|expense| {
                            expense.status == ExpenseStatus::Approved
                                && expense.approved_by_id == Some(user.id)
                                && expense.updated_at.date_naive() == today
                        })
                        .count(),
                    team_total_30d: expenses
                        .iter()
                        .filter(|expense| {
                            expense.expense_date >= window_start
                                && reports.iter().any(|report| report.id == expense.submitted_by_id)
                        })
                        .map(|expense| expense.amount_in_company_currency)
                        .sum(),
                }
            }
            Role::Employee => {
                let expenses = self.stores.expenses.list_by_submitter(user.id).await?;
                DashboardStats::Employee {
                    total: expenses.len(),
                    pending: count_status(&expenses, ExpenseStatus::Pending),
                    approved: count_status(&expenses, ExpenseStatus::Approved),
                    rejected: count_status(&expenses, ExpenseStatus::Rejected),
                }
            }
        };

        Ok(DashboardReport { default_currency: company.default_currency, stats })
    }
}

fn count_status(expenses: &[Expense], status: ExpenseStatus) -> usize {
    expenses.iter().filter(|expense| expense.status == status).count()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use expensa_core::approvals::Decision;
    use expensa_core::audit::InMemoryAuditSink;
    use expensa_core::currency::{ConversionSettings, StaticRateProvider};
    use expensa_core::domain::user::{Role, User};
    use expensa_core::errors::{ApplicationError, DomainError};
    use expensa_core::submission::ExpenseSubmission;

    use super::{DashboardService, DashboardStats};
    use crate::services::{
        AdminService, CompanyRegistration, ExpenseWorkflow, Stores, UserDraft,
    };

    struct Fixture {
        dashboard: DashboardService,
        workflow: ExpenseWorkflow,
        owner: User,
        manager: User,
        employee: User,
        outsider: User,
    }

    async fn fixture() -> Fixture {
        let stores = Stores::in_memory();
        let admin = AdminService::new(stores.clone());
        let (_, owner) = admin
            .register_company(CompanyRegistration {
                company_name: "Acme".to_string(),
                default_currency: "USD".to_string(),
                admin_name: "Ada".to_string(),
                admin_email: "ada@acme.test".to_string(),
            })
            .await
            .expect("register");
        let user = |name: &str, role: Role, manager_id| UserDraft {
            name: name.to_string(),
            email: format!("{}@acme.test", name.to_ascii_lowercase()),
            role,
            manager_id,
        };
        let manager =
            admin.create_user(owner.id, user("Mia", Role::Manager, None)).await.expect("mia");
        let employee = admin
            .create_user(owner.id, user("Eli", Role::Employee, Some(manager.id)))
            .await
            .expect("eli");
        let outsider = admin
            .create_user(owner.id, user("Oz", Role::Employee, Some(owner.id)))
            .await
            .expect("oz");

        let workflow = ExpenseWorkflow::new(
            stores.clone(),
            Arc::new(StaticRateProvider::default()),
            Arc::new(InMemoryAuditSink::default()),
            ConversionSettings::default(),
        );

        Fixture {
            dashboard: DashboardService::new(stores),
            workflow,
            owner,
            manager,
            employee,
            outsider,
        }
    }

    fn submission(user: &User, amount: i64, expense_date: NaiveDate) -> ExpenseSubmission {
        ExpenseSubmission {
            submitter_id: user.id,
            amount: Some(Decimal::new(amount, 0)),
            currency: None,
            category: Some("Meals".to_string()),
            description: Some("Team lunch".to_string()),
            expense_date: Some(expense_date),
            receipt_ref: None,
        }
    }

    #[tokio::test]
    async fn each_role_sees_its_own_figures() {
        let fixture = fixture().await;
        let now = Utc::now();
        let recent = now.date_naive();
        let stale = (now - Duration::days(45)).date_naive();

        let approved = fixture
            .workflow
            .submit(submission(&fixture.employee, 100, recent), "req-1")
            .await
            .expect("submit");
        fixture
            .workflow
            .submit(submission(&fixture.employee, 40, stale), "req-2")
            .await
            .expect("submit stale");
        let rejected = fixture
            .workflow
            .submit(submission(&fixture.employee, 7, recent), "req-3")
            .await
            .expect("submit");
        fixture
            .workflow
            .submit(submission(&fixture.outsider, 500, recent), "req-4")
            .await
            .expect("outsider submits");

        fixture
            .workflow
            .process_decision(approved.id, fixture.manager.id, Decision::Approved, None, "req-5")
            .await
            .expect("approve");
        fixture
            .workflow
            .process_decision(rejected.id, fixture.manager.id, Decision::Rejected, None, "req-6")
            .await
            .expect("reject");

        let employee = fixture
            .dashboard
            .stats(fixture.employee.id, Role::Employee, now)
            .await
            .expect("employee view");
        assert_eq!(employee.default_currency.as_str(), "USD");
        assert_eq!(
            employee.stats,
            DashboardStats::Employee { total: 3, pending: 1, approved: 1, rejected: 1 }
        );

        let manager = fixture
            .dashboard
            .stats(fixture.manager.id, Role::Manager, now)
            .await
            .expect("manager view");
        assert_eq!(
            manager.stats,
            DashboardStats::Manager { approved_today: 1, team_total_30d: Decimal::new(107, 0) }
        );

        let admin =
            fixture.dashboard.stats(fixture.owner.id, Role::Admin, now).await.expect("admin view");
        assert_eq!(
            admin.stats,
            DashboardStats::Admin {
                total_users: 4,
                total_pending: 2,
                company_total_30d: Decimal::new(607, 0),
            }
        );
    }

    #[tokio::test]
    async fn non_admins_cannot_open_other_views() {
        let fixture = fixture().await;

        let error = fixture
            .dashboard
            .stats(fixture.employee.id, Role::Admin, Utc::now())
            .await
            .expect_err("employee asking for admin view");
        assert!(matches!(error, ApplicationError::Domain(DomainError::Forbidden { .. })));

        let report = fixture
            .dashboard
            .stats(fixture.owner.id, Role::Employee, Utc::now())
            .await
            .expect("admins may open any view");
        assert_eq!(
            report.stats,
            DashboardStats::Employee { total: 0, pending: 0, approved: 0, rejected: 0 }
        );
    }
}
