use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::Row;

use expensa_core::domain::approval::{
    ApprovalRule, ApprovalRuleId, ApprovalStep, ApprovalStepId, NewApprovalRule,
};
use expensa_core::domain::company::CompanyId;
use expensa_core::domain::user::UserId;

use super::{decode_error, parse_decimal, ApprovalRuleRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalRuleRepository {
    pool: DbPool,
}

impl SqlApprovalRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_steps(
        &self,
        rule_ids: &[ApprovalRuleId],
    ) -> Result<BTreeMap<ApprovalRuleId, Vec<ApprovalStep>>, RepositoryError> {
        let mut steps: BTreeMap<ApprovalRuleId, Vec<ApprovalStep>> = BTreeMap::new();
        if rule_ids.is_empty() {
            return Ok(steps);
        }

        let placeholders = vec!["?"; rule_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, approval_rule_id, approver_id, step
             FROM approval_step
             WHERE approval_rule_id IN ({placeholders})
             ORDER BY approval_rule_id ASC, step ASC"
        );
        let mut query = sqlx::query(&sql);
        for rule_id in rule_ids {
            query = query.bind(rule_id.0);
        }

        for row in query.fetch_all(&self.pool).await? {
            let step = row_to_step(&row)?;
            steps.entry(step.approval_rule_id).or_default().push(step);
        }

        Ok(steps)
    }
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let rule_id: i64 = row.try_get("approval_rule_id").map_err(decode_error)?;
    let approver_id: i64 = row.try_get("approver_id").map_err(decode_error)?;
    let step: i64 = row.try_get("step").map_err(decode_error)?;

    Ok(ApprovalStep {
        id: ApprovalStepId(id),
        approval_rule_id: ApprovalRuleId(rule_id),
        approver_id: UserId(approver_id),
        step: u32::try_from(step)
            .map_err(|_| decode_error(format!("step number {step} is out of range")))?,
    })
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalRule, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_error)?;
    let company_id: i64 = row.try_get("company_id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let min_amount: String = row.try_get("min_amount").map_err(decode_error)?;

    Ok(ApprovalRule {
        id: ApprovalRuleId(id),
        company_id: CompanyId(company_id),
        name,
        min_amount: parse_decimal(&min_amount)?,
        steps: Vec::new(),
    })
}

#[async_trait::async_trait]
impl ApprovalRuleRepository for SqlApprovalRuleRepository {
    async fn find_by_id(
        &self,
        id: ApprovalRuleId,
    ) -> Result<Option<ApprovalRule>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, min_amount FROM approval_rule WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut rule = row_to_rule(&row)?;
        rule.steps = self.load_steps(&[rule.id]).await?.remove(&rule.id).unwrap_or_default();
        Ok(Some(rule))
    }

    async fn list_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Vec<ApprovalRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, company_id, name, min_amount
             FROM approval_rule
             WHERE company_id = ?
             ORDER BY id ASC",
        )
        .bind(company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut rules = rows.iter().map(row_to_rule).collect::<Result<Vec<_>, _>>()?;
        let ids = rules.iter().map(|rule| rule.id).collect::<Vec<_>>();
        let mut steps = self.load_steps(&ids).await?;
        for rule in &mut rules {
            rule.steps = steps.remove(&rule.id).unwrap_or_default();
        }

        Ok(rules)
    }

    async fn create(&self, rule: NewApprovalRule) -> Result<ApprovalRule, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let rule_id = sqlx::query(
            "INSERT INTO approval_rule (company_id, name, min_amount, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(rule.company_id.0)
        .bind(&rule.name)
        .bind(rule.min_amount.normalize().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut steps = Vec::with_capacity(rule.approver_ids.len());
        for (position, approver_id) in rule.approver_ids.iter().enumerate() {
            let step = u32::try_from(position + 1)
                .map_err(|_| decode_error("approval rule has too many steps"))?;
            let step_id = sqlx::query(
                "INSERT INTO approval_step (approval_rule_id, approver_id, step) VALUES (?, ?, ?)",
            )
            .bind(rule_id)
            .bind(approver_id.0)
            .bind(i64::from(step))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            steps.push(ApprovalStep {
                id: ApprovalStepId(step_id),
                approval_rule_id: ApprovalRuleId(rule_id),
                approver_id: *approver_id,
                step,
            });
        }

        tx.commit().await?;

        Ok(ApprovalRule {
            id: ApprovalRuleId(rule_id),
            company_id: rule.company_id,
            name: rule.name,
            min_amount: rule.min_amount,
            steps,
        })
    }
}
