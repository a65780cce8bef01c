pub mod balances;
pub mod collective;
pub mod database;
pub mod epos_client;
pub mod ledger;
pub mod metrics;
pub mod withdrawals;

pub use database::Database;
pub use epos_client::EposClient;
pub use metrics::{get_metrics, init_metrics};
