pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod services;

pub use connection::{connect, connect_with_config, connect_with_settings, ping, DbPool};
pub use fixtures::{DemoDataset, SeedResult, VerificationResult};
pub use services::{
    AdminService, DashboardReport, DashboardService, DashboardStats, ExpenseWorkflow, Stores,
};
