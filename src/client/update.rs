use clap::Args;
use colored::Colorize as _;

use super::AppConfig;
use super::PostgresConfig;
use super::install::arrange_migrations;
use super::install::migrate;
use super::install::publish_files;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Also apply the pending migrations
    #[arg(long)]
    migrations: bool,
    /// Overwrite the published config and migrations
    #[arg(long)]
    force: bool,
}

/// Republishes the files of a deployment, `.env` is left untouched
pub async fn update(
    UpdateArgs { migrations, force }: UpdateArgs,
    app_config: AppConfig,
    postgres_config: PostgresConfig,
) -> anyhow::Result<()> {
    println!("{}", "Updating cms-core...".bold());
    let db_pool = postgres_config.into_pool().await?;
    publish_files(&app_config, force)?;
    arrange_migrations(&app_config, &db_pool).await?;

    if migrations {
        let applied = migrate(&db_pool, &app_config.migrations_dir(), false).await?;
        println!("✅ {} migration(s) applied", applied.len());
    } else {
        println!("Run `cms_core update --migrations` to apply new migrations (if any).");
    }
    Ok(())
}
