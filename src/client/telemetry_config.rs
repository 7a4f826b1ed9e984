use clap::Args;
use clap::ValueEnum;
use educe::Educe;
use url::Url;

#[derive(Args, Debug, Educe, Clone)]
#[educe(Default)]
pub struct TelemetryConfig {
    #[educe(Default = TelemetryKind::None)]
    #[clap(long, env, default_value_t)]
    pub telemetry_kind: TelemetryKind,
    #[educe(Default = common::tracing::TRACER_NAME.into())]
    #[clap(long, env, default_value = common::tracing::TRACER_NAME)]
    pub service_name: String,
    #[educe(Default = Url::parse("http://localhost:4317").expect("default endpoint is a valid url"))]
    #[arg(long, env, default_value = "http://localhost:4317")]
    pub telemetry_endpoint: Url,
}

impl TelemetryConfig {
    /// OpenTelemetry settings, if spans should be exported at all
    pub fn telemetry(self) -> Option<common::tracing::Telemetry> {
        match self.telemetry_kind {
            TelemetryKind::None => None,
            TelemetryKind::Opentelemetry => Some(self.into()),
        }
    }
}

impl From<TelemetryConfig> for common::tracing::Telemetry {
    fn from(telemetry_config: TelemetryConfig) -> Self {
        Self {
            service_name: telemetry_config.service_name,
            endpoint: telemetry_config.telemetry_endpoint,
        }
    }
}

#[derive(Default, ValueEnum, Debug, Clone, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TelemetryKind {
    #[default]
    None,
    Opentelemetry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_only_exported_with_opentelemetry() {
        assert!(TelemetryConfig::default().telemetry().is_none());

        let config = TelemetryConfig {
            telemetry_kind: TelemetryKind::Opentelemetry,
            ..Default::default()
        };
        let telemetry = config.telemetry().expect("telemetry is enabled");
        assert_eq!(telemetry.service_name, "cms-core");
        assert_eq!(telemetry.endpoint.as_str(), "http://localhost:4317/");
    }
}
