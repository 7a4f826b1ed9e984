//! Validation of query parameters and request bodies
//!
//! Payloads are first deserialized into a loosely typed form (mostly
//! optional strings), then checked field by field so that every violation is
//! reported at once, as a 422 response listing the messages of each field.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use axum::Json;
use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum::extract::Query;
use axum::extract::Request;
use axum::http::request::Parts;
use cms_derive::CmsError;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use utoipa::ToSchema;

use crate::error::InternalError;

/// Messages of the invalid fields, by field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "validation", default_status = 422)]
pub enum ValidationError {
    #[error("The given data was invalid")]
    Invalid { fields: FieldErrors },
    #[error("Malformed request: {message}")]
    Malformed { message: String },
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_owned()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(value)` if no field is invalid
    pub fn check<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError::Invalid { fields: self })
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> ValidationError {
        let mut errors = Self::default();
        errors.push(field, message);
        ValidationError::Invalid { fields: errors }
    }

    pub fn required<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value.map(str::trim) {
            Some(value) if !value.is_empty() => Some(value),
            _ => {
                self.push(field, format!("The {field} field is required."));
                None
            }
        }
    }

    pub fn max_length(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(value) = value
            && value.chars().count() > max
        {
            self.push(
                field,
                format!("The {field} field must not be greater than {max} characters."),
            );
        }
    }

    pub fn length_between(&mut self, field: &str, value: Option<&str>, min: usize, max: usize) {
        if let Some(value) = value {
            let length = value.chars().count();
            if length < min || length > max {
                self.push(
                    field,
                    format!("The {field} field must be between {min} and {max} characters."),
                );
            }
        }
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) {
        if let Some(value) = value
            && !EMAIL.is_match(value)
        {
            self.push(field, format!("The {field} field must be a valid email address."));
        }
    }

    /// Parses one of the allowed values of an enum-like field
    pub fn one_of<T: std::str::FromStr>(
        &mut self,
        field: &str,
        value: Option<&str>,
        allowed: &[&str],
    ) -> Option<T> {
        let value = value?;
        match value.parse() {
            Ok(parsed) if allowed.contains(&value) => Some(parsed),
            _ => {
                self.push(
                    field,
                    format!("The {field} field must be one of {}.", allowed.join(", ")),
                );
                None
            }
        }
    }

    /// Parses an integer within an inclusive range
    pub fn integer_between(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: u64,
        max: u64,
    ) -> Option<u64> {
        let value = value?;
        match value.trim().parse::<u64>() {
            Ok(parsed) if (min..=max).contains(&parsed) => Some(parsed),
            Ok(_) if max == u64::MAX => {
                self.push(field, format!("The {field} field must be at least {min}."));
                None
            }
            Ok(_) => {
                self.push(
                    field,
                    format!("The {field} field must be between {min} and {max}."),
                );
                None
            }
            Err(_) => {
                self.push(field, format!("The {field} field must be an integer."));
                None
            }
        }
    }

    pub fn boolean(&mut self, field: &str, value: Option<&str>) -> Option<bool> {
        match value?.trim() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => {
                self.push(field, format!("The {field} field must be true or false."));
                None
            }
        }
    }

    /// Parses a comma separated list of ids
    pub fn ids(&mut self, field: &str, value: Option<&str>) -> Vec<i64> {
        let Some(value) = value else {
            return Vec::new();
        };
        let ids: Result<Vec<i64>, _> = value
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::parse)
            .collect();
        ids.unwrap_or_else(|_| {
            self.push(field, format!("The {field} field must be a list of ids."));
            Vec::new()
        })
    }
}

/// A submitted value, empty strings being treated as absent
pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// A payload checked field by field once deserialized from its raw form
pub trait Validate: Sized {
    type Raw: DeserializeOwned + Send;

    fn validate(raw: Self::Raw) -> Result<Self, ValidationError>;
}

/// Extracts and validates the query parameters
pub struct ValidQuery<T>(pub T);

/// Extracts and validates a JSON body
pub struct ValidJson<T>(pub T);

impl<S: Send + Sync, T: Validate> FromRequestParts<S> for ValidQuery<T> {
    type Rejection = InternalError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(raw) = Query::<T::Raw>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ValidationError::Malformed {
                message: rejection.body_text(),
            })?;
        Ok(ValidQuery(T::validate(raw)?))
    }
}

impl<S: Send + Sync, T: Validate> FromRequest<S> for ValidJson<T> {
    type Rejection = InternalError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(raw) = Json::<T::Raw>::from_request(req, state)
            .await
            .map_err(|rejection| ValidationError::Malformed {
                message: rejection.body_text(),
            })?;
        Ok(ValidJson(T::validate(raw)?))
    }
}
