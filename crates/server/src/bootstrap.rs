use std::sync::Arc;

use expensa_core::config::AppConfig;
use expensa_db::{
    connect_with_config, migrations, AdminService, DashboardService, DbPool, ExpenseWorkflow,
    Stores,
};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::audit_log::TracingAuditSink;
use crate::rates::HttpRateProvider;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("rate client setup failed: {0}")]
    RateClient(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let rates =
        HttpRateProvider::from_config(&config.currency).map_err(BootstrapError::RateClient)?;
    let stores = Stores::sql(db_pool.clone());
    let api = ApiState {
        workflow: ExpenseWorkflow::new(
            stores.clone(),
            Arc::new(rates),
            Arc::new(TracingAuditSink),
            config.currency.conversion_settings(),
        ),
        admin: AdminService::new(stores.clone()),
        dashboard: DashboardService::new(stores),
    };
    info!(
        event_name = "system.bootstrap.services_ready",
        correlation_id = "bootstrap",
        rate_api = %config.currency.rate_api_base_url,
        fallback = ?config.currency.fallback,
        "expense services wired"
    );

    Ok(Application { config, db_pool, api })
}
