//! Database layer
//!
//! Supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The database driver is selected based on configuration. Repositories reach
//! the concrete pool through [`DatabasePool::backend`] and keep one query path
//! per dialect.
//!
//! ```ignore
//! use scholarfeed::config::DatabaseConfig;
//! use scholarfeed::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    begin_write_sqlite, create_pool, create_test_pool, is_unique_violation, Backend, DatabasePool,
    DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
