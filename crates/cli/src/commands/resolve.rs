use std::str::FromStr;
use std::sync::Arc;

use expensa_core::audit::InMemoryAuditSink;
use expensa_core::currency::StaticRateProvider;
use expensa_core::domain::company::CompanyId;
use expensa_core::domain::user::UserId;
use expensa_core::errors::ApplicationError;
use expensa_db::{connect_with_config, migrations, ExpenseWorkflow, Stores};
use rust_decimal::Decimal;

use crate::commands::{prepare, CommandResult};

/// Reports the first approver for a hypothetical expense. Nothing is written.
pub fn run(company: i64, submitter: i64, amount: &str) -> CommandResult {
    let amount = match Decimal::from_str(amount.trim()) {
        Ok(amount) if amount >= Decimal::ZERO => amount,
        _ => {
            return CommandResult::failure(
                "resolve",
                "validation",
                format!("amount `{amount}` must be a non-negative decimal"),
                6,
            );
        }
    };

    let (config, runtime) = match prepare("resolve") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let workflow = ExpenseWorkflow::new(
            Stores::sql(pool.clone()),
            Arc::new(StaticRateProvider::default()),
            Arc::new(InMemoryAuditSink::default()),
            config.currency.conversion_settings(),
        );
        let resolved = workflow
            .resolve_initial_approver(CompanyId(company), amount, UserId(submitter))
            .await
            .map_err(classify);

        pool.close().await;
        resolved
    });

    match result {
        Ok(assignment) => {
            let via = match assignment.rule_id {
                Some(rule_id) => format!("rule {rule_id} step 1"),
                None => "submitter's manager".to_string(),
            };
            CommandResult::success(
                "resolve",
                format!("approver {} via {via}", assignment.approver_id),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("resolve", error_class, message, exit_code)
        }
    }
}

fn classify(error: ApplicationError) -> (&'static str, String, u8) {
    match error {
        ApplicationError::Domain(domain) => ("domain", domain.to_string(), 6),
        other @ ApplicationError::Persistence(_) => ("db_query", other.to_string(), 4),
        other => ("internal", other.to_string(), 3),
    }
}
