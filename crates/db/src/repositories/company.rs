use chrono::Utc;
use sqlx::Row;

use expensa_core::currency::CurrencyCode;
use expensa_core::domain::company::{Company, CompanyId, NewCompany};

use super::{decode_error, CompanyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCompanyRepository {
    pool: DbPool,
}

impl SqlCompanyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_company(row: &sqlx::sqlite::SqliteRow) -> Result<Company, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let currency: String = row.try_get("default_currency").map_err(decode_error)?;

    Ok(Company {
        id: CompanyId(id),
        name,
        default_currency: CurrencyCode::parse(&currency).map_err(decode_error)?,
    })
}

#[async_trait::async_trait]
impl CompanyRepository for SqlCompanyRepository {
    async fn find_by_id(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, default_currency FROM company WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_company).transpose()
    }

    async fn create(&self, company: NewCompany) -> Result<Company, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO company (name, default_currency, created_at) VALUES (?, ?, ?)",
        )
        .bind(&company.name)
        .bind(company.default_currency.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Company {
            id: CompanyId(result.last_insert_rowid()),
            name: company.name,
            default_currency: company.default_currency,
        })
    }
}
