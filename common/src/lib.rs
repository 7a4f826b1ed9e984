pub mod tracing;

use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

pub fn setup_tracing_for_test() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .compact()
        .try_init()
        .ok();
}

/// Version of the running service, as reported by `GET /version`
#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct Version {
    #[schema(required)] // Options are by default not required, but this one is
    pub git_describe: Option<String>,
    pub package_version: String,
}

impl Version {
    pub fn new(git_describe: Option<String>) -> Self {
        Self {
            git_describe,
            package_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}
