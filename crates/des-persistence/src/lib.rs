//! des-persistence
//!
//! C4 Persistence Adapter + C8 Event Tracker: `rusqlite`-backed
//! implementations of `des_core::store::{EntityStore, EventLog}` against a
//! single-file SQLite database (`spec.md` §4.4/§4.8), plus the dynamic DDL
//! generation, schema bootstrap, and error mapping the rest of this crate
//! builds on.
//!
//! Modules:
//! - `schema`: config -> `CREATE TABLE` DDL, plus the three fixed
//!   engine-output tables and the dynamically-reflected bridge table.
//! - `migrations`: idempotent schema bootstrap run by both `open` functions.
//! - `config`: one-time `.env` loading.
//! - `error`: `rusqlite::Error` -> `PersistenceError` -> `CoreError::Store`.
//! - `value_conv`: `Value` <-> `rusqlite` storage-class conversion.
//! - `entity_store`: `SqliteEntityStore`.
//! - `event_log`: `SqliteEventLog`.

pub mod config;
pub mod entity_store;
pub mod error;
pub mod event_log;
pub mod migrations;
pub mod schema;
mod value_conv;

pub use config::init_dotenv;
pub use entity_store::SqliteEntityStore;
pub use error::PersistenceError;
pub use event_log::SqliteEventLog;
