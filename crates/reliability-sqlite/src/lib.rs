//! SQLite backend for the reliability history, plus a ledger of runs.

mod open;
mod models;
mod insert;
mod query;
mod schema;
mod store;

pub use open::SqliteStore;
pub use models::*;
