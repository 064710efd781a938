use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Rows the demo dataset guarantees, checked by [`DemoDataset::verify`].
const SEED_COMPANY_IDS: &[i64] = &[1];
const SEED_USER_IDS: &[i64] = &[1, 2, 3, 4];
const SEED_RULES: &[SeedRuleContract] = &[
    SeedRuleContract { rule_id: 1, name: "Default", min_amount: "0", approver_ids: &[2] },
    SeedRuleContract {
        rule_id: 2,
        name: "Large expenses",
        min_amount: "1000",
        approver_ids: &[2, 1],
    },
];

struct SeedRuleContract {
    rule_id: i64,
    name: &'static str,
    min_amount: &'static str,
    approver_ids: &'static [i64],
}

/// Deterministic demo tenant for local runs and smoke checks.
///
/// Loading is idempotent: rows that already exist are left untouched.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub const COMPANY_ID: i64 = 1;
    pub const ADMIN_ID: i64 = 1;
    pub const MANAGER_ID: i64 = 2;
    pub const EMPLOYEE_ID: i64 = 3;

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            companies: SEED_COMPANY_IDS.len(),
            users: SEED_USER_IDS.len(),
            rules: SEED_RULES.iter().map(|rule| rule.name).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let companies: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM company WHERE id IN {}",
            sql_array_from_ids(SEED_COMPANY_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("companies", companies == SEED_COMPANY_IDS.len() as i64));

        let users: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM app_user WHERE id IN {}",
            sql_array_from_ids(SEED_USER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("users", users == SEED_USER_IDS.len() as i64));

        for rule in SEED_RULES {
            let rule_present: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM approval_rule
                               WHERE id = ?1 AND name = ?2 AND min_amount = ?3)",
            )
            .bind(rule.rule_id)
            .bind(rule.name)
            .bind(rule.min_amount)
            .fetch_one(pool)
            .await?;

            let approvers: Vec<i64> = sqlx::query_scalar(
                "SELECT approver_id FROM approval_step
                 WHERE approval_rule_id = ?1 ORDER BY step ASC",
            )
            .bind(rule.rule_id)
            .fetch_all(pool)
            .await?;

            checks.push((rule.name, rule_present && approvers == rule.approver_ids));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

fn sql_array_from_ids(ids: &[i64]) -> String {
    let joined = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub companies: usize,
    pub users: usize,
    pub rules: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(DemoDataset::SQL.contains("INSERT OR IGNORE INTO approval_step"));
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let before = DemoDataset::verify(&pool).await.expect("verify empty database");
        assert!(!before.all_present);

        let first = DemoDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = DemoDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.rules, vec!["Default", "Large expenses"]);

        DemoDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            DemoDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert_eq!(first_verification.checks, second_verification.checks);
    }
}
