use chrono::Duration;
use clap::Args;

use crate::views;

use super::AppConfig;
use super::CmsConfig;
use super::PostgresConfig;

#[derive(Args, Debug)]
#[command(about, long_about = "Launch the server")]
pub struct RunserverArgs {
    #[arg(long, env = "CMS_PORT", default_value_t = 8090)]
    port: u16,
    #[arg(long, env = "CMS_ADDRESS", default_value_t = String::from("0.0.0.0"))]
    address: String,
    /// Origin allowed to call the API from a browser, any origin when unset
    #[arg(long, env = "CMS_ALLOWED_ORIGIN")]
    allowed_origin: Option<String>,
    /// The timeout to use when performing the healthcheck, in milliseconds
    #[clap(long, env = "CMS_HEALTH_CHECK_TIMEOUT_MS", default_value_t = 1000)]
    health_check_timeout_ms: u64,
    /// Authenticate requests as the user named by the `x-remote-user-identity` header.
    /// Only enable behind a gateway which sets or strips that header on every request.
    #[arg(long, env = "CMS_TRUST_GATEWAY_IDENTITY", default_value_t = false)]
    trust_gateway_identity: bool,
}

/// Create and run the server
pub async fn runserver(
    RunserverArgs {
        port,
        address,
        allowed_origin,
        health_check_timeout_ms,
        trust_gateway_identity,
    }: RunserverArgs,
    postgres: PostgresConfig,
    app_config: AppConfig,
    app_version: Option<String>,
) -> anyhow::Result<()> {
    let file = CmsConfig::load(&app_config.config_path())?;
    if file.is_none() {
        tracing::warn!(
            path = %app_config.config_path().display(),
            "config file not found, run the install command to publish it"
        );
    }
    let config = views::ServerConfig {
        port,
        address,
        health_check_timeout: Duration::milliseconds(health_check_timeout_ms as i64),
        postgres_config: postgres.into(),
        app_version,
        teams_enabled: app_config.teams_enabled(file.as_ref()),
        app_token: app_config.app_token(),
        app_token_user: app_config.app_token_user.clone(),
        trust_gateway_identity,
        media: app_config.media(),
        allowed_origin,
    };

    if trust_gateway_identity {
        tracing::warn!("the gateway identity header is trusted, the server must not be reachable directly");
    }
    let server = views::Server::new(config).await?;
    Ok(server.start().await?)
}
