//! Schema migrations, embedded in the binary and published into deployments
//!
//! A deployment runs the migrations of its `database/migrations` directory, laid out
//! the diesel way (`YYYY-MM-DD-NNNNNN_<name>/{up,down}.sql`), the embedded ones
//! being what the installer publishes there.

use std::ops::DerefMut as _;
use std::path::Path;

use diesel::QueryableByName;
use diesel::migration::MigrationSource;
use diesel::pg::Pg;
use diesel::sql_types::Bool;
use diesel::sql_types::Text;
use diesel_async::AsyncMigrationHarness;
use diesel_async::AsyncPgConnection;
use diesel_async::RunQueryDsl as _;
use diesel_async::pooled_connection::deadpool::Object;
use diesel_migrations::EmbeddedMigrations;
use diesel_migrations::FileBasedMigrations;
use diesel_migrations::MigrationHarness as _;
use diesel_migrations::embed_migrations;

use crate::DbConnection;
use crate::DbConnectionPoolV2;
use crate::db_connection_pool::DatabasePoolError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type HarnessResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
type Harness = AsyncMigrationHarness<Object<AsyncPgConnection>>;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Pool(#[from] DatabasePoolError),
    #[error("invalid migrations directory: {0}")]
    Source(#[from] diesel_migrations::MigrationError),
    #[error("migration failed: {0}")]
    Harness(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("migration task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The migrations published in a deployment directory
pub fn published_migrations(dir: &Path) -> Result<FileBasedMigrations, MigrationError> {
    Ok(FileBasedMigrations::from_path(dir)?)
}

/// The harness blocks on the async connection, it can't run on a runtime worker
async fn with_harness<T, F>(pool: &DbConnectionPoolV2, operation: F) -> Result<T, MigrationError>
where
    T: Send + 'static,
    F: FnOnce(&mut Harness) -> HarnessResult<T> + Send + 'static,
{
    let connection = pool.get_raw().await?;
    tokio::task::spawn_blocking(move || {
        let mut harness = AsyncMigrationHarness::new(connection);
        operation(&mut harness)
    })
    .await?
    .map_err(MigrationError::Harness)
}

/// Applies every pending migration of the source, returns the versions applied
#[tracing::instrument(skip_all, err)]
pub async fn run_pending_migrations<S>(
    pool: &DbConnectionPoolV2,
    source: S,
) -> Result<Vec<String>, MigrationError>
where
    S: MigrationSource<Pg> + Send + 'static,
{
    with_harness(pool, move |harness| {
        Ok(harness
            .run_pending_migrations(source)?
            .into_iter()
            .map(|version| version.to_string())
            .collect())
    })
    .await
}

/// Reverts every applied migration of the source, returns the versions reverted
#[tracing::instrument(skip_all, err)]
pub async fn revert_all_migrations<S>(
    pool: &DbConnectionPoolV2,
    source: S,
) -> Result<Vec<String>, MigrationError>
where
    S: MigrationSource<Pg> + Send + 'static,
{
    with_harness(pool, move |harness| {
        Ok(harness
            .revert_all_migrations(source)?
            .into_iter()
            .map(|version| version.to_string())
            .collect())
    })
    .await
}

pub async fn pending_migrations<S>(
    pool: &DbConnectionPoolV2,
    source: S,
) -> Result<Vec<String>, MigrationError>
where
    S: MigrationSource<Pg> + Send + 'static,
{
    with_harness(pool, move |harness| {
        Ok(harness
            .pending_migrations(source)?
            .iter()
            .map(|migration| migration.name().to_string())
            .collect())
    })
    .await
}

#[derive(QueryableByName)]
struct TableLookup {
    #[diesel(sql_type = Bool)]
    found: bool,
}

/// Whether a table of that name is visible in the search path
pub async fn table_exists(conn: &mut DbConnection, table: &str) -> Result<bool, diesel::result::Error> {
    let lookup = diesel::sql_query("SELECT to_regclass($1) IS NOT NULL AS found")
        .bind::<Text, _>(table)
        .get_result::<TableLookup>(conn.write().await.deref_mut())
        .await?;
    Ok(lookup.found)
}

/// A migration as written into a deployment's `database/migrations` directory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishedMigration {
    /// `YYYY-MM-DD-NNNNNN_<name>`
    pub dir_name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

impl PublishedMigration {
    /// The directory name without its date and sequence prefix
    pub fn suffix(&self) -> &'static str {
        self.dir_name.get(18..).unwrap_or(self.dir_name)
    }
}

macro_rules! published {
    ($dir:literal) => {
        PublishedMigration {
            dir_name: $dir,
            up: include_str!(concat!("../migrations/", $dir, "/up.sql")),
            down: include_str!(concat!("../migrations/", $dir, "/down.sql")),
        }
    };
}

pub const PUBLISHED_MIGRATIONS: &[PublishedMigration] = &[
    published!("2024-12-08-000001_create_users"),
    published!("2024-12-08-000002_create_teams"),
    published!("2024-12-08-000003_create_team_user"),
    published!("2024-12-08-000004_create_posts"),
    published!("2024-12-08-000005_create_tag_tables"),
    published!("2024-12-08-000006_create_media"),
    published!("2024-12-08-000007_create_api_tokens"),
];
