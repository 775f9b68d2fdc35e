#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paysync shared infrastructure
//!
//! Database pool construction and schema migrations used by the API server.

pub mod db;

pub use db::{create_pool, run_migrations, DbError};
