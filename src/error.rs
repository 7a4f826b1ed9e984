use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;
use std::result::Result as StdResult;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use colored::Colorize;
use database::DatabaseError;
use database::db_connection_pool::DatabasePoolBuildError;
use database::db_connection_pool::DatabasePoolError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

pub type Result<T, E = InternalError> = StdResult<T, E>;

/// Trait for all errors that can be returned by the service
pub trait CmsError: Error + Send + Sync {
    fn get_status(&self) -> StatusCode;

    fn get_type(&self) -> &str;

    fn context(&self) -> HashMap<String, Value> {
        Default::default()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "StatusCode")]
pub(crate) struct StatusCodeRemoteDef(#[serde(getter = "StatusCode::as_u16")] u16);

impl From<StatusCodeRemoteDef> for StatusCode {
    fn from(def: StatusCodeRemoteDef) -> Self {
        StatusCode::from_u16(def.0).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub(crate) fn default_status_code() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// The JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct InternalError {
    #[serde(with = "StatusCodeRemoteDef", default = "default_status_code")]
    #[schema(value_type = u16, minimum = 100, maximum = 599)]
    pub status: StatusCode,
    #[serde(rename = "type")]
    pub error_type: String,
    pub context: HashMap<String, Value>,
    pub message: String,
}

impl InternalError {
    pub fn with_context<S: AsRef<str>, V: Into<Value>>(mut self, key: S, value: V) -> Self {
        self.context.insert(key.as_ref().into(), value.into());
        self
    }
}

impl Error for InternalError {}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl<T: CmsError> From<T> for InternalError {
    fn from(err: T) -> Self {
        InternalError {
            status: err.get_status(),
            error_type: err.get_type().to_owned(),
            context: err.context(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for InternalError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                "[{}] {}: {}",
                self.error_type.bold(),
                self.message,
                Backtrace::capture() // won't log unless RUST_BACKTRACE=1
            );
        } else {
            tracing::debug!(error_type = %self.error_type, status = %self.status, "{}", self.message);
        }
        (self.status, Json(self)).into_response()
    }
}

inventory::submit! {
    ErrorDefinition::new("cms:DatabaseAccessError", "DatabaseAccessError", "DatabaseAccessError", 500u16, r#"{}"#)
}

impl CmsError for DatabasePoolBuildError {
    fn get_status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn get_type(&self) -> &str {
        "cms:DatabaseAccessError"
    }
}

impl CmsError for DatabasePoolError {
    fn get_status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn get_type(&self) -> &str {
        "cms:DatabaseAccessError"
    }
}

impl CmsError for DatabaseError {
    fn get_status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn get_type(&self) -> &str {
        "cms:DatabaseAccessError"
    }
}

impl CmsError for serde_json::Error {
    fn get_status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn get_type(&self) -> &str {
        "cms:SerdeJsonError"
    }
}

inventory::submit! {
    ErrorDefinition::new("cms:model:UniqueViolation", "UniqueViolation", "ModelError", 409u16, r#"{"constraint":"String","column":"String","value":"String"}"#)
}

inventory::submit! {
    ErrorDefinition::new("cms:model:ModelError", "ModelError", "ModelError", 500u16, r#"{}"#)
}

/// Uniqueness violations the handlers did not anticipate surface as conflicts
impl CmsError for cms_models::Error {
    fn get_status(&self) -> StatusCode {
        match self {
            cms_models::Error::UniqueViolation { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn get_type(&self) -> &str {
        match self {
            cms_models::Error::UniqueViolation { .. } => "cms:model:UniqueViolation",
            _ => "cms:model:ModelError",
        }
    }

    fn context(&self) -> HashMap<String, Value> {
        match self {
            cms_models::Error::UniqueViolation {
                constraint,
                column,
                value,
            } => HashMap::from([
                ("constraint".to_owned(), json!(constraint)),
                ("column".to_owned(), json!(column)),
                ("value".to_owned(), json!(value)),
            ]),
            _ => Default::default(),
        }
    }
}

impl From<authz::Unauthorized> for InternalError {
    fn from(authz::Unauthorized { reason }: authz::Unauthorized) -> Self {
        tracing::info!(reason, "Unauthorized operation");
        InternalError::from(crate::views::AuthorizationError::Forbidden).with_context("reason", reason)
    }
}

// error definition: used by the CmsError derive to register every error type
// and share them with the OpenAPI generator
#[derive(Debug)]
pub struct ErrorDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub namespace: &'static str,
    pub status: u16,
    context_serialized: &'static str,
}

impl ErrorDefinition {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        namespace: &'static str,
        status: u16,
        context_serialized: &'static str,
    ) -> Self {
        ErrorDefinition {
            id,
            name,
            namespace,
            status,
            context_serialized,
        }
    }

    /// Field names and type names of the error context
    pub fn get_context(&self) -> HashMap<String, String> {
        serde_json::from_str(self.context_serialized).unwrap_or_else(|err| {
            error!(id = self.id, %err, "invalid error context definition");
            HashMap::new()
        })
    }

    pub fn get_schema_name(&self) -> String {
        format!("Cms{}{}", self.namespace, self.name)
    }
}

inventory::collect!(ErrorDefinition);

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn unique_violations_are_conflicts() {
        let error = InternalError::from(cms_models::Error::UniqueViolation {
            constraint: "users_email_key".to_owned(),
            column: "email".to_owned(),
            value: "ada@example.com".to_owned(),
        });
        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.error_type, "cms:model:UniqueViolation");
        assert_eq!(error.context["column"], json!("email"));
    }

    #[test]
    fn denied_policies_are_forbidden() {
        let error = InternalError::from(authz::Unauthorized {
            reason: "only team admins can manage users",
        });
        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(error.context["reason"], json!("only team admins can manage users"));
    }

    #[test]
    fn every_error_definition_has_a_valid_context() {
        for definition in inventory::iter::<ErrorDefinition> {
            assert!(
                serde_json::from_str::<HashMap<String, String>>(definition.context_serialized)
                    .is_ok(),
                "invalid context for {}",
                definition.id
            );
            assert!(definition.id.starts_with("cms:"), "{}", definition.id);
        }
    }

    #[test]
    fn error_bodies_round_trip() {
        let error = InternalError {
            status: StatusCode::NOT_FOUND,
            error_type: "cms:posts:NotFound".to_owned(),
            context: HashMap::from([("post_id".to_owned(), json!(3))]),
            message: "Post '3' could not be found".to_owned(),
        };
        let body = serde_json::to_value(&error).unwrap();
        assert_eq!(body["status"], json!(404));
        assert_eq!(body["type"], json!("cms:posts:NotFound"));
        let parsed: InternalError = serde_json::from_value(body).unwrap();
        assert_eq!(parsed, error);
    }
}
