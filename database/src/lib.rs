pub mod db_connection_pool;
pub mod migrations;
pub mod tables;

pub use db_connection_pool::DbConnection;
pub use db_connection_pool::DbConnectionPoolV2;
pub use db_connection_pool::ping_database;

/// Any error returned by diesel while talking to the database
#[derive(Debug, thiserror::Error, PartialEq)]
#[error(transparent)]
pub struct DatabaseError(#[from] pub diesel::result::Error);
