//! Wallet ledger service for the pesantren: santri wallets, an append-only
//! transaction ledger, ePOS settlement pool, withdrawal workflows, and
//! collective billing.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
