use chrono::NaiveDate;
use sqlx::Row;

use expensa_core::currency::CurrencyCode;
use expensa_core::domain::approval::ApprovalRuleId;
use expensa_core::domain::company::CompanyId;
use expensa_core::domain::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
use expensa_core::domain::user::UserId;

use super::{
    decode_error, parse_decimal, parse_timestamp, ExpenseRepository, RepositoryError,
};
use crate::DbPool;

const EXPENSE_COLUMNS: &str = "id, company_id, submitted_by_id, amount, currency,
    amount_in_company_currency, category, description, expense_date, receipt_ref, status,
    current_approver_id, approved_by_id, approver_comments, approval_rule_id, version,
    created_at, updated_at";

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let company_id: i64 = row.try_get("company_id").map_err(decode_error)?;
    let submitted_by_id: i64 = row.try_get("submitted_by_id").map_err(decode_error)?;
    let amount: String = row.try_get("amount").map_err(decode_error)?;
    let currency: String = row.try_get("currency").map_err(decode_error)?;
    let amount_in_company_currency: String =
        row.try_get("amount_in_company_currency").map_err(decode_error)?;
    let category: String = row.try_get("category").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let expense_date: String = row.try_get("expense_date").map_err(decode_error)?;
    let receipt_ref: Option<String> = row.try_get("receipt_ref").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let current_approver_id: Option<i64> =
        row.try_get("current_approver_id").map_err(decode_error)?;
    let approved_by_id: Option<i64> = row.try_get("approved_by_id").map_err(decode_error)?;
    let approver_comments: Option<String> =
        row.try_get("approver_comments").map_err(decode_error)?;
    let approval_rule_id: Option<i64> = row.try_get("approval_rule_id").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    Ok(Expense {
        id: ExpenseId(id),
        company_id: CompanyId(company_id),
        submitted_by_id: UserId(submitted_by_id),
        amount: parse_decimal(&amount)?,
        currency: CurrencyCode::parse(&currency).map_err(decode_error)?,
        amount_in_company_currency: parse_decimal(&amount_in_company_currency)?,
        category,
        description,
        expense_date: NaiveDate::parse_from_str(&expense_date, "%Y-%m-%d").map_err(|error| {
            decode_error(format!("invalid expense_date `{expense_date}`: {error}"))
        })?,
        receipt_ref,
        status: status.parse::<ExpenseStatus>().map_err(decode_error)?,
        current_approver_id: current_approver_id.map(UserId),
        approved_by_id: approved_by_id.map(UserId),
        approver_comments,
        approval_rule_id: approval_rule_id.map(ApprovalRuleId),
        version,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn create(&self, expense: NewExpense) -> Result<Expense, RepositoryError> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            "INSERT INTO expense (company_id, submitted_by_id, amount, currency,
                                  amount_in_company_currency, category, description,
                                  expense_date, receipt_ref, status, current_approver_id,
                                  approved_by_id, approver_comments, approval_rule_id, version,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, NULL, NULL, ?, 1, ?, ?)",
        )
        .bind(expense.company_id.0)
        .bind(expense.submitted_by_id.0)
        .bind(expense.amount.to_string())
        .bind(expense.currency.as_str())
        .bind(expense.amount_in_company_currency.to_string())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.expense_date.format("%Y-%m-%d").to_string())
        .bind(&expense.receipt_ref)
        .bind(expense.current_approver_id.0)
        .bind(expense.approval_rule_id.map(|id| id.0))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(expense.into_expense(ExpenseId(result.last_insert_rowid()), now))
    }

    async fn find_by_id(&self, id: ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EXPENSE_COLUMNS} FROM expense WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_expense).transpose()
    }

    async fn update_if_version(
        &self,
        expense: &Expense,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE expense
             SET status = ?,
                 current_approver_id = ?,
                 approved_by_id = ?,
                 approver_comments = ?,
                 version = ?,
                 updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(expense.status.as_str())
        .bind(expense.current_approver_id.map(|id| id.0))
        .bind(expense.approved_by_id.map(|id| id.0))
        .bind(&expense.approver_comments)
        .bind(expense.version)
        .bind(expense.updated_at.to_rfc3339())
        .bind(expense.id.0)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_submitter(
        &self,
        submitter_id: UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE submitted_by_id = ?
             ORDER BY id DESC"
        ))
        .bind(submitter_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: UserId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense
             WHERE current_approver_id = ? AND status = 'pending'
             ORDER BY id ASC"
        ))
        .bind(approver_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }

    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expense WHERE company_id = ? ORDER BY id ASC"
        ))
        .bind(company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_expense).collect()
    }
}
