pub mod api_token;
mod app_config;
pub mod create_admin;
pub mod diagnose;
pub mod diagnose_policies;
pub mod healthcheck;
pub mod install;
mod postgres_config;
pub mod runserver;
mod telemetry_config;
pub mod update;

use api_token::ApiTokenArgs;
pub use app_config::AppConfig;
pub use app_config::CmsConfig;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use create_admin::CreateAdminArgs;
use diagnose::DiagnoseArgs;
use install::InstallArgs;
pub use postgres_config::PostgresConfig;
use runserver::RunserverArgs;
pub use telemetry_config::TelemetryConfig;
pub use telemetry_config::TelemetryKind;
use update::UpdateArgs;

use crate::views::OpenApiRoot;

#[derive(Parser, Debug)]
#[command(author, version)]
pub struct Client {
    #[command(flatten)]
    pub postgres_config: PostgresConfig,
    #[command(flatten)]
    pub telemetry_config: TelemetryConfig,
    #[command(flatten)]
    pub app_config: AppConfig,
    #[arg(long, env, value_enum, default_value_t = Color::Auto)]
    pub color: Color,
    /// Version reported by `GET /version`, always provide in production
    #[clap(long, env = "CMS_GIT_DESCRIBE")]
    pub app_version: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Default, Clone)]
pub enum Color {
    Never,
    Always,
    #[default]
    Auto,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Runserver(RunserverArgs),
    #[command(about, long_about = "Checks that the database is reachable")]
    Healthcheck,
    #[command(about, long_about = "Prints the OpenApi of the service")]
    Openapi,
    #[command(
        about,
        long_about = "Publishes the config and the migrations of a deployment, then migrates the database"
    )]
    Install(InstallArgs),
    #[command(about, long_about = "Republishes the config, optionally migrates the database")]
    Update(UpdateArgs),
    #[command(about, long_about = "Creates an admin user along with its personal team")]
    CreateAdmin(CreateAdminArgs),
    #[command(about, long_about = "Issues a read only API token for a user")]
    ApiToken(ApiTokenArgs),
    #[command(about, long_about = "Reports the configuration and the team of a user")]
    Diagnose(DiagnoseArgs),
    #[command(about, long_about = "Prints what a user may do on posts and users")]
    DiagnosePolicies(DiagnoseArgs),
}

/// Prints the OpenApi to stdout
pub fn print_openapi() -> anyhow::Result<()> {
    let openapi = OpenApiRoot::build_openapi();
    print!("{}", serde_yaml::to_string(&openapi)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Client::command().debug_assert();
    }

    #[test]
    fn install_flags_are_parsed() {
        let client = Client::try_parse_from([
            "cms_core",
            "install",
            "--fresh",
            "--seed",
            "--app-dir",
            "/srv/cms",
        ])
        .expect("valid command line");
        assert_eq!(client.app_config.app_dir.to_str(), Some("/srv/cms"));
        let Commands::Install(args) = client.command else {
            panic!("expected the install command");
        };
        assert!(args.fresh);
        assert!(args.seed);
        assert!(!args.force);
    }
}
