mod auth_driver;

pub use auth_driver::PgAuthDriver;
