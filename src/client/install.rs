//! Scaffolding of a deployment directory
//!
//! ```text
//! {app_dir}/.env
//! {app_dir}/config/cms-core.yaml
//! {app_dir}/database/migrations/YYYY-MM-DD-NNNNNN_<name>/{up,down}.sql
//! ```
//!
//! The published migrations are the ones the deployment is migrated with. Every
//! step is idempotent so that the installer can be run again on an existing
//! deployment.

use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::NaiveDate;
use chrono::Utc;
use clap::Args;
use colored::Colorize as _;
use database::DbConnectionPoolV2;
use database::migrations;
use database::migrations::PUBLISHED_MIGRATIONS;
use regex::Regex;
use tracing::debug;
use tracing::info;

use super::AppConfig;
use super::CmsConfig;
use super::PostgresConfig;
use super::create_admin::CreateAdminArgs;
use super::create_admin::create_admin_user;

const TAGS_MIGRATION: &str = "create_tag_tables";
const TAGS_TABLE: &str = "tags";

/// Migrations other packages may have published too, only the first one of each is kept
const DUPLICATE_MIGRATIONS: &[(&str, &[&str])] = &[
    ("two_factor", &["two_factor", "two-factor"]),
    ("teams", &["create_teams", "teams_table"]),
    ("team_user", &["create_team_user", "team_user_table"]),
    (
        "team_invitations",
        &["create_team_invitations", "team_invitations_table"],
    ),
];

/// Keys added to `.env` when missing, with their default value
const ENV_MARKERS: &[(&str, &str)] = &[("APP_TEAMS", "false"), ("APP_TOKEN", "")];

static MIGRATION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})-(\d{6})_").expect("migration prefix is a valid regex")
});

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Revert every migration before migrating
    #[arg(long)]
    pub fresh: bool,
    /// Create the default admin user
    #[arg(long)]
    pub seed: bool,
    /// Overwrite the published config and migrations
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Publication {
    Written,
    Kept,
}

/// Writes the default config file, an existing one is only replaced with `force`
pub fn publish_config(path: &Path, force: bool) -> anyhow::Result<Publication> {
    if path.exists() && !force {
        return Ok(Publication::Kept);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create '{}'", parent.display()))?;
    }
    std::fs::write(path, CmsConfig::default().to_yaml()?)
        .with_context(|| format!("cannot write '{}'", path.display()))?;
    Ok(Publication::Written)
}

/// Names of the migration directories, sorted
fn migration_dirs(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("cannot list '{}'", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Writes the bundled migrations, returns the names of the directories written
///
/// A migration is recognized by its name without prefix, so a renamed one is
/// not published again. With `force` its scripts are overwritten in place.
pub fn publish_migrations(dir: &Path, force: bool) -> anyhow::Result<Vec<String>> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create '{}'", dir.display()))?;
    let existing = migration_dirs(dir)?;
    let mut written = Vec::new();
    for migration in PUBLISHED_MIGRATIONS {
        let published = existing
            .iter()
            .find(|name| name.ends_with(migration.suffix()));
        let dir_name = match published {
            Some(_) if !force => continue,
            Some(name) => name.as_str(),
            None => migration.dir_name,
        };
        let path = dir.join(dir_name);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("cannot create '{}'", path.display()))?;
        for (script, sql) in [("up.sql", migration.up), ("down.sql", migration.down)] {
            std::fs::write(path.join(script), sql)
                .with_context(|| format!("cannot write '{}/{script}'", path.display()))?;
        }
        written.push(dir_name.to_owned());
    }
    Ok(written)
}

/// Prefix following every prefixed migration dated today or later
///
/// The sequence restarts at 1 for today unless a migration is already dated
/// today or later, in which case it follows the latest one.
pub fn next_migration_prefix<'a>(
    names: impl IntoIterator<Item = &'a str>,
    today: NaiveDate,
) -> String {
    let mut last_date = today.format("%Y-%m-%d").to_string();
    let mut max_sequence = 0;
    for name in names {
        let Some(captures) = MIGRATION_PREFIX.captures(name) else {
            continue;
        };
        let date = &captures[1];
        let Ok(sequence) = captures[2].parse::<u32>() else {
            continue;
        };
        if date == last_date {
            max_sequence = max_sequence.max(sequence);
        } else if date > last_date.as_str() {
            last_date = date.to_owned();
            max_sequence = sequence;
        }
    }
    format!("{last_date}-{:06}", max_sequence + 1)
}

/// Moves the tags migration after every other migration
///
/// Returns the new directory name, `None` if there is no tags migration, if it is
/// already the last one or if the target name is taken.
pub fn rename_tags_migration(dir: &Path, today: NaiveDate) -> anyhow::Result<Option<String>> {
    let names = migration_dirs(dir)?;
    let Some(tags) = names.iter().find(|name| name.contains(TAGS_MIGRATION)) else {
        return Ok(None);
    };
    let last = names
        .iter()
        .filter(|name| MIGRATION_PREFIX.is_match(name))
        .next_back();
    if last == Some(tags) {
        return Ok(None);
    }

    let prefix = next_migration_prefix(names.iter().map(String::as_str), today);
    let new_name = format!("{prefix}_{TAGS_MIGRATION}");
    let target = dir.join(&new_name);
    if target.exists() {
        return Ok(None);
    }
    std::fs::rename(dir.join(tags), &target)
        .with_context(|| format!("cannot rename '{tags}' to '{new_name}'"))?;
    Ok(Some(new_name))
}

/// Deletes every tags migration but the first one, returns the names removed
pub fn remove_extra_tags_migrations(dir: &Path) -> anyhow::Result<Vec<String>> {
    let extra = migration_dirs(dir)?
        .into_iter()
        .filter(|name| name.contains(TAGS_MIGRATION))
        .skip(1)
        .collect::<Vec<_>>();
    for name in &extra {
        std::fs::remove_dir_all(dir.join(name))
            .with_context(|| format!("cannot remove '{name}'"))?;
    }
    Ok(extra)
}

/// What was done to the published tags migration
#[derive(Debug, PartialEq)]
pub enum TagsMigration {
    /// The tags table exists: its migration must keep its version, only the
    /// extra copies are removed
    Kept { removed: Vec<String> },
    Renamed(String),
    Untouched,
}

/// Runs the tags migration last, unless the database already has the tags table
pub fn arrange_tags_migration(
    dir: &Path,
    tags_table_exists: bool,
    today: NaiveDate,
) -> anyhow::Result<TagsMigration> {
    if tags_table_exists {
        let removed = remove_extra_tags_migrations(dir)?;
        return Ok(TagsMigration::Kept { removed });
    }
    Ok(rename_tags_migration(dir, today)?
        .map_or(TagsMigration::Untouched, TagsMigration::Renamed))
}

/// Whether the tags table exists, an unreachable database counts as a missing table
async fn tags_table_exists(db_pool: &DbConnectionPoolV2) -> bool {
    let lookup = async {
        let conn = &mut db_pool.get().await?;
        Ok::<_, anyhow::Error>(migrations::table_exists(conn, TAGS_TABLE).await?)
    };
    match lookup.await {
        Ok(exists) => exists,
        Err(err) => {
            debug!(error = %err, "cannot look for the tags table, assuming it is missing");
            false
        }
    }
}

/// Deletes all but the first migration, by name, of each duplicated kind
///
/// Returns the kind and name of each migration removed.
pub fn remove_duplicate_migrations(dir: &Path) -> anyhow::Result<Vec<(&'static str, String)>> {
    let mut removed = Vec::new();
    for (kind, patterns) in DUPLICATE_MIGRATIONS {
        let duplicates = migration_dirs(dir)?
            .into_iter()
            .filter(|name| patterns.iter().any(|pattern| name.contains(pattern)))
            .skip(1)
            .collect::<Vec<_>>();
        for name in duplicates {
            std::fs::remove_dir_all(dir.join(&name))
                .with_context(|| format!("cannot remove '{name}'"))?;
            removed.push((*kind, name));
        }
    }
    Ok(removed)
}

fn defines(content: &str, key: &str) -> bool {
    content.lines().any(|line| {
        line.trim_start()
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    })
}

/// Appends the missing markers to the `.env` file, creating it if needed
///
/// Returns the keys added.
pub fn patch_env(path: &Path) -> anyhow::Result<Vec<&'static str>> {
    let mut content = if path.exists() {
        std::fs::read_to_string(path).with_context(|| format!("cannot read '{}'", path.display()))?
    } else {
        String::new()
    };
    let missing = ENV_MARKERS
        .iter()
        .filter(|(key, _)| !defines(&content, key))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(vec![]);
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for (key, value) in &missing {
        content.push_str(&format!("{key}={value}\n"));
    }
    std::fs::write(path, content).with_context(|| format!("cannot write '{}'", path.display()))?;
    Ok(missing.into_iter().map(|(key, _)| *key).collect())
}

/// Applies the migrations published in `dir`, reverting them all first when `fresh`
pub async fn migrate(
    db_pool: &DbConnectionPoolV2,
    dir: &Path,
    fresh: bool,
) -> anyhow::Result<Vec<String>> {
    let source = migrations::published_migrations(dir)?;
    if fresh {
        let reverted = migrations::revert_all_migrations(db_pool, source.clone()).await?;
        info!(count = reverted.len(), "migrations reverted");
    }
    Ok(migrations::run_pending_migrations(db_pool, source).await?)
}

/// Publishes the config and the migrations of a deployment
pub(super) fn publish_files(app_config: &AppConfig, force: bool) -> anyhow::Result<()> {
    let config_path = app_config.config_path();
    match publish_config(&config_path, force)? {
        Publication::Written => println!("✅ Config published to {}", config_path.display()),
        Publication::Kept => println!(
            "Config {} kept, use --force to overwrite it",
            config_path.display()
        ),
    }

    let dir = app_config.migrations_dir();
    let written = publish_migrations(&dir, force)?;
    println!(
        "✅ {} migration(s) published to {}",
        written.len(),
        dir.display()
    );
    Ok(())
}

/// Orders the tags migration and drops the duplicated migrations
pub(super) async fn arrange_migrations(
    app_config: &AppConfig,
    db_pool: &DbConnectionPoolV2,
) -> anyhow::Result<()> {
    let dir = app_config.migrations_dir();
    let today = Utc::now().date_naive();
    match arrange_tags_migration(&dir, tags_table_exists(db_pool).await, today)? {
        TagsMigration::Kept { removed } => {
            for name in removed {
                println!("✅ Removed duplicate tags migration: {name}");
            }
        }
        TagsMigration::Renamed(name) => println!("✅ Tags migration renamed to {}", name.bold()),
        TagsMigration::Untouched => (),
    }
    for (kind, name) in remove_duplicate_migrations(&dir)? {
        println!("✅ Removed duplicate {kind} migration: {name}");
    }
    Ok(())
}

pub async fn install(
    InstallArgs { fresh, seed, force }: InstallArgs,
    app_config: AppConfig,
    postgres_config: PostgresConfig,
) -> anyhow::Result<()> {
    println!("{}", "Installing cms-core...".bold());
    println!();

    let db_pool: Arc<DbConnectionPoolV2> = postgres_config.into_pool().await?;
    publish_files(&app_config, force)?;
    arrange_migrations(&app_config, &db_pool).await?;
    let env_path = app_config.env_path();
    for key in patch_env(&env_path)? {
        println!("✅ {key} added to {}", env_path.display());
    }
    println!();

    let mut warnings = Vec::new();
    if fresh {
        println!("{}", "Running fresh migrations...".yellow());
    } else {
        println!("Running migrations...");
    }
    match migrate(&db_pool, &app_config.migrations_dir(), fresh).await {
        Ok(applied) => println!("✅ {} migration(s) applied", applied.len()),
        Err(err) => warnings.push(format!("migrations failed: {err:#}")),
    }

    if seed {
        println!("Creating admin user...");
        let seeded = async {
            let conn = &mut db_pool.get().await?;
            Ok::<_, anyhow::Error>(create_admin_user(conn, CreateAdminArgs::default()).await?)
        };
        match seeded.await {
            Ok(Some((user, team))) => println!(
                "✅ Admin {} created with the team {}",
                user.email.bold(),
                team.name.bold()
            ),
            Ok(None) => println!("{}", "Admin user already exists, skipping".yellow()),
            Err(err) => warnings.push(format!("admin creation failed: {err:#}")),
        }
    }

    println!();
    if warnings.is_empty() {
        println!("{}", "cms-core installed successfully!".green().bold());
    } else {
        println!("{}", "cms-core installed with warnings:".yellow().bold());
        for warning in &warnings {
            println!("  ⚠️  {}", warning.yellow());
        }
    }
    println!();
    println!("Next steps:");
    println!("  1. Set APP_TEAMS=true in .env if you need multi-tenant mode (default: false)");
    println!("  2. Generate a token for the API: cms_core api-token");
    println!("  3. Start the server: cms_core runserver");
    if seed {
        println!();
        println!("Admin credentials: {} / Simplicity!", super::app_config::ADMIN_EMAIL);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use diesel::migration::MigrationSource;
    use diesel::pg::Pg;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            let path = dir.join(name);
            std::fs::create_dir(&path).unwrap();
            std::fs::write(path.join("up.sql"), "-- migration").unwrap();
        }
    }

    #[rstest]
    #[case::empty(&[], "2026-10-17-000001")]
    #[case::older_only(&["2024-12-08-000007_create_api_tokens"], "2026-10-17-000001")]
    #[case::same_day(
        &["2026-10-17-000003_a", "2026-10-17-000012_b", "2024-01-01-000099_c"],
        "2026-10-17-000013"
    )]
    #[case::later_day(
        &["2026-10-17-000003_a", "2027-01-02-000004_b"],
        "2027-01-02-000005"
    )]
    #[case::unprefixed(&["create_posts", "2024_12_08_000001_create_users_table.sql"], "2026-10-17-000001")]
    fn next_prefix(#[case] names: &[&str], #[case] expected: &str) {
        assert_eq!(
            next_migration_prefix(names.iter().copied(), day(2026, 10, 17)),
            expected
        );
    }

    #[test]
    fn published_tags_migration_is_moved_last_once() {
        let dir = tempfile::tempdir().unwrap();
        let written = publish_migrations(dir.path(), false).unwrap();
        assert_eq!(written.len(), PUBLISHED_MIGRATIONS.len());

        let renamed = rename_tags_migration(dir.path(), day(2026, 10, 17)).unwrap();
        assert_eq!(renamed.as_deref(), Some("2026-10-17-000001_create_tag_tables"));
        assert!(
            !dir.path()
                .join("2024-12-08-000005_create_tag_tables")
                .exists()
        );

        // already last
        assert_eq!(rename_tags_migration(dir.path(), day(2026, 10, 18)).unwrap(), None);
        // the renamed migration is not published again
        assert!(publish_migrations(dir.path(), false).unwrap().is_empty());
        let forced = publish_migrations(dir.path(), true).unwrap();
        assert!(forced.contains(&"2026-10-17-000001_create_tag_tables".to_owned()));
        assert_eq!(
            migration_dirs(dir.path()).unwrap().len(),
            PUBLISHED_MIGRATIONS.len()
        );
    }

    #[test]
    fn migrations_run_from_the_published_directory() {
        let dir = tempfile::tempdir().unwrap();
        publish_migrations(dir.path(), false).unwrap();
        arrange_tags_migration(dir.path(), false, day(2026, 10, 17)).unwrap();

        let source = migrations::published_migrations(dir.path()).unwrap();
        let mut versions: Vec<_> = MigrationSource::<Pg>::migrations(&source)
            .unwrap()
            .iter()
            .map(|migration| migration.name().version().to_string())
            .collect();
        versions.sort();
        assert_eq!(versions.len(), PUBLISHED_MIGRATIONS.len());
        assert_eq!(versions.last().map(String::as_str), Some("20261017000001"));
        assert!(!versions.contains(&"20241208000005".to_owned()));
    }

    #[test]
    fn no_tags_migration_nothing_to_rename() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["2024-12-08-000001_create_users"]);
        assert_eq!(rename_tags_migration(dir.path(), day(2026, 10, 17)).unwrap(), None);
        assert_eq!(
            arrange_tags_migration(dir.path(), false, day(2026, 10, 17)).unwrap(),
            TagsMigration::Untouched
        );
    }

    #[test]
    fn existing_tags_table_keeps_the_first_tags_migration() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "2024-12-08-000004_create_posts",
                "2024-12-08-000005_create_tag_tables",
                "2024-12-08-000006_create_media",
                "2026-01-05-000001_create_tag_tables",
            ],
        );

        let arranged = arrange_tags_migration(dir.path(), true, day(2026, 10, 17)).unwrap();
        assert_eq!(
            arranged,
            TagsMigration::Kept {
                removed: vec!["2026-01-05-000001_create_tag_tables".to_owned()]
            }
        );
        // applied migrations keep their version
        assert_eq!(
            migration_dirs(dir.path()).unwrap(),
            vec![
                "2024-12-08-000004_create_posts",
                "2024-12-08-000005_create_tag_tables",
                "2024-12-08-000006_create_media",
            ]
        );
    }

    #[test]
    fn duplicate_migrations_keep_the_first_by_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "2014-10-12-200000_add_two_factor_columns_to_users_table",
                "2024-12-08-000002_create_teams",
                "2025-01-01-000001_create_teams_table",
                "2025-01-01-000002_create_team_user_table",
                "2024-12-08-000003_create_team_user",
                "2025-01-01-000003_create_team_invitations_table",
                "2025-03-01-000001_add-two-factor",
            ],
        );

        let removed = remove_duplicate_migrations(dir.path()).unwrap();
        assert_eq!(
            removed,
            vec![
                ("two_factor", "2025-03-01-000001_add-two-factor".to_owned()),
                ("teams", "2025-01-01-000001_create_teams_table".to_owned()),
                ("team_user", "2025-01-01-000002_create_team_user_table".to_owned()),
            ]
        );
        assert_eq!(
            migration_dirs(dir.path()).unwrap(),
            vec![
                "2014-10-12-200000_add_two_factor_columns_to_users_table",
                "2024-12-08-000002_create_teams",
                "2024-12-08-000003_create_team_user",
                "2025-01-01-000003_create_team_invitations_table",
            ]
        );
        assert!(remove_duplicate_migrations(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn config_is_kept_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("cms-core.yaml");
        assert_eq!(publish_config(&path, false).unwrap(), Publication::Written);
        assert_eq!(CmsConfig::load(&path).unwrap(), Some(CmsConfig::default()));

        std::fs::write(&path, "teams_enabled: true\n").unwrap();
        assert_eq!(publish_config(&path, false).unwrap(), Publication::Kept);
        assert!(CmsConfig::load(&path).unwrap().unwrap().teams_enabled);

        assert_eq!(publish_config(&path, true).unwrap(), Publication::Written);
        assert!(!CmsConfig::load(&path).unwrap().unwrap().teams_enabled);
    }

    #[test]
    fn env_markers_are_added_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "APP_NAME=cms\nAPP_TEAMS = true").unwrap();

        assert_eq!(patch_env(&path).unwrap(), vec!["APP_TOKEN"]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "APP_NAME=cms\nAPP_TEAMS = true\nAPP_TOKEN=\n"
        );
        assert!(patch_env(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_env_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        assert_eq!(patch_env(&path).unwrap(), vec!["APP_TEAMS", "APP_TOKEN"]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "APP_TEAMS=false\nAPP_TOKEN=\n"
        );
    }

    #[test]
    fn prefixed_keys_are_not_confused() {
        assert!(!defines("APP_TOKEN_USER=hola@humano.app", "APP_TOKEN"));
        assert!(defines("  APP_TOKEN=abc", "APP_TOKEN"));
    }
}
