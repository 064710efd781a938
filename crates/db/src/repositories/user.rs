use chrono::Utc;
use sqlx::Row;

use expensa_core::domain::company::CompanyId;
use expensa_core::domain::user::{NewUser, Role, User, UserId};

use super::{decode_error, RepositoryError, UserRepository};
use crate::DbPool;

const USER_COLUMNS: &str = "id, company_id, name, email, role, manager_id";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let company_id: i64 = row.try_get("company_id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let email: String = row.try_get("email").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let manager_id: Option<i64> = row.try_get("manager_id").map_err(decode_error)?;

    Ok(User {
        id: UserId(id),
        company_id: CompanyId(company_id),
        name,
        email,
        role: role.parse::<Role>().map_err(decode_error)?,
        manager_id: manager_id.map(UserId),
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM app_user WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE lower(email) = lower(?)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO app_user (company_id, name, email, role, manager_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.company_id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.manager_id.map(|id| id.0))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: UserId(result.last_insert_rowid()),
            company_id: user.company_id,
            name: user.name,
            email: user.email,
            role: user.role,
            manager_id: user.manager_id,
        })
    }

    async fn list_by_company(&self, company_id: CompanyId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE company_id = ? ORDER BY id ASC"
        ))
        .bind(company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn list_direct_reports(&self, manager_id: UserId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE manager_id = ? ORDER BY id ASC"
        ))
        .bind(manager_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }
}

#[cfg(test)]
mod tests {
    use expensa_core::currency::CurrencyCode;
    use expensa_core::domain::company::{CompanyId, NewCompany};
    use expensa_core::domain::user::{NewUser, Role, UserId};

    use super::SqlUserRepository;
    use crate::repositories::{CompanyRepository, SqlCompanyRepository, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> (sqlx::SqlitePool, CompanyId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let company = SqlCompanyRepository::new(pool.clone())
            .create(NewCompany {
                name: "Acme".to_string(),
                default_currency: CurrencyCode::parse("USD").expect("currency"),
            })
            .await
            .expect("company");
        (pool, company.id)
    }

    fn new_user(
        company_id: CompanyId,
        email: &str,
        role: Role,
        manager_id: Option<UserId>,
    ) -> NewUser {
        NewUser {
            company_id,
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            role,
            manager_id,
        }
    }

    #[tokio::test]
    async fn create_and_find_by_id_and_email() {
        let (pool, company_id) = setup().await;
        let repo = SqlUserRepository::new(pool);

        let manager = repo
            .create(new_user(company_id, "mia@acme.test", Role::Manager, None))
            .await
            .expect("manager");
        let employee = repo
            .create(new_user(company_id, "eli@acme.test", Role::Employee, Some(manager.id)))
            .await
            .expect("employee");

        let found = repo.find_by_id(employee.id).await.expect("find").expect("exists");
        assert_eq!(found.manager_id, Some(manager.id));
        assert_eq!(found.role, Role::Employee);

        let by_email = repo.find_by_email("MIA@acme.test").await.expect("find by email");
        assert_eq!(by_email.map(|user| user.id), Some(manager.id));
    }

    #[tokio::test]
    async fn duplicate_email_is_refused_by_the_store() {
        let (pool, company_id) = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.create(new_user(company_id, "dup@acme.test", Role::Employee, None))
            .await
            .expect("first");
        let second = repo.create(new_user(company_id, "dup@acme.test", Role::Employee, None)).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn direct_reports_are_not_transitive() {
        let (pool, company_id) = setup().await;
        let repo = SqlUserRepository::new(pool);

        let boss = repo
            .create(new_user(company_id, "boss@acme.test", Role::Admin, None))
            .await
            .expect("boss");
        let lead = repo
            .create(new_user(company_id, "lead@acme.test", Role::Manager, Some(boss.id)))
            .await
            .expect("lead");
        repo.create(new_user(company_id, "ic@acme.test", Role::Employee, Some(lead.id)))
            .await
            .expect("ic");

        let reports = repo.list_direct_reports(boss.id).await.expect("reports");
        assert_eq!(reports.iter().map(|user| user.id).collect::<Vec<_>>(), vec![lead.id]);
        assert_eq!(repo.list_by_company(company_id).await.expect("list").len(), 3);
    }
}
