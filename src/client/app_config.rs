use std::path::Path;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use educe::Educe;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::media::MediaConfig;

/// Location of the config file, relative to the deployment directory
pub const CONFIG_FILE: &str = "config/cms-core.yaml";

/// Email of the default administrator, also the default `APP_TOKEN_USER`
pub const ADMIN_EMAIL: &str = "hola@humano.app";

/// Content of `config/cms-core.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Educe)]
#[educe(Default)]
#[serde(default)]
pub struct CmsConfig {
    /// Shows the team switcher and the per role statistics, `APP_TEAMS` takes precedence
    pub teams_enabled: bool,
    #[educe(Default = "/admin".into())]
    pub admin_path: String,
    /// Display label of the user resource
    #[educe(Default = "User".into())]
    pub user_model: String,
    /// Display label of the team resource
    #[educe(Default = "Team".into())]
    pub team_model: String,
}

impl CmsConfig {
    /// Reads the config file, `None` when it was never published
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("'{}' is not a valid config file", path.display()))?;
        Ok(Some(config))
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// Directory of the deployment, holding `config/`, `database/migrations/` and `.env`
    #[arg(long, env = "CMS_APP_DIR", default_value = ".", global = true)]
    pub app_dir: PathBuf,
    /// Enables the team switcher, overrides the config file
    #[arg(long, env = "APP_TEAMS")]
    pub app_teams: Option<bool>,
    /// Shared secret accepted as a bearer token on every endpoint
    #[arg(long, env = "APP_TOKEN", hide_env_values = true)]
    pub app_token: Option<String>,
    /// User the shared secret authenticates as when no API token matches it
    #[arg(long, env = "APP_TOKEN_USER", default_value = ADMIN_EMAIL)]
    pub app_token_user: String,
    #[arg(long, env = "CMS_MEDIA_ROOT", default_value = "./storage/media")]
    pub media_root: PathBuf,
    /// Public URL of the media root
    #[arg(long, env = "CMS_MEDIA_URL", default_value = "http://localhost:8090/media/")]
    pub media_url: Url,
}

impl AppConfig {
    pub fn config_path(&self) -> PathBuf {
        self.app_dir.join(CONFIG_FILE)
    }

    pub fn env_path(&self) -> PathBuf {
        self.app_dir.join(".env")
    }

    pub fn migrations_dir(&self) -> PathBuf {
        self.app_dir.join("database").join("migrations")
    }

    /// `APP_TEAMS` when set, the config file otherwise, disabled by default
    pub fn teams_enabled(&self, file: Option<&CmsConfig>) -> bool {
        self.app_teams
            .or(file.map(|config| config.teams_enabled))
            .unwrap_or(false)
    }

    /// The shared secret, an empty `APP_TOKEN=` line disables it
    pub fn app_token(&self) -> Option<String> {
        self.app_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToOwned::to_owned)
    }

    pub fn media(&self) -> MediaConfig {
        MediaConfig {
            root: self.media_root.clone(),
            base_url: self.media_url.clone(),
        }
    }
}
