pub mod api_token;
pub mod media;
pub mod pagination;
pub mod password;
pub mod post;
pub mod slug;
pub mod stats;
pub mod tag;
pub mod team;
pub mod team_scope;
pub mod user;

pub use api_token::ApiToken;
pub use media::Media;
pub use media::MediaCollection;
pub use pagination::Page;
pub use post::Post;
pub use post::PostStatus;
pub use tag::Tag;
pub use team::Membership;
pub use team::Team;
pub use team_scope::TeamScope;
pub use user::User;

use std::sync::LazyLock;

use database::DatabaseError;

use diesel::result::DatabaseErrorInformation;
use diesel::result::DatabaseErrorKind;
use regex::Regex;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error(
        "unique constraint violation \"{constraint}\" on column \"{column}\" with value \"{value}\""
    )]
    UniqueViolation {
        constraint: String,
        column: String,
        value: String,
    },
    #[error("check constraint violation of \"{constraint}\"")]
    CheckViolation { constraint: String },
    #[error("foreign key constraint violation of \"{constraint}\"")]
    ForeignKeyViolation { constraint: String },
    #[error(transparent)]
    DatabaseError(#[from] DatabaseError),
}

impl Error {
    /// Whether the error is the violation of the given unique constraint
    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, Error::UniqueViolation { constraint, .. } if constraint == name)
    }
}

static UNIQUE_VIOLATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Key \(([^)]+)\)=\(([^)]*)\) already exists\."#)
        .expect("unique violation pattern is a valid regex")
});

/// Reads the offending column and value out of PostgreSQL's error details
///
/// Details look like `Key (slug)=(hello-world) already exists.`
fn parse_unique_violation_details(details: &str) -> Option<(String, String)> {
    UNIQUE_VIOLATION
        .captures(details)
        .and_then(|captures| Some((captures.get(1)?, captures.get(2)?)))
        .map(|(column, value)| (column.as_str().to_owned(), value.as_str().to_owned()))
}

fn try_parse_unique_violation(e: &(dyn DatabaseErrorInformation + Send + Sync)) -> Option<Error> {
    let (column, value) = parse_unique_violation_details(e.details()?)?;
    Some(Error::UniqueViolation {
        constraint: e.constraint_name()?.to_owned(),
        column,
        value,
    })
}

fn constraint_of(e: &(dyn DatabaseErrorInformation + Send + Sync)) -> Option<String> {
    e.constraint_name().map(ToOwned::to_owned)
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::Error::DatabaseError as Db;

        let parsed = match &e {
            Db(DatabaseErrorKind::UniqueViolation, inner) => {
                Some(try_parse_unique_violation(inner.as_ref()))
            }
            Db(DatabaseErrorKind::CheckViolation, inner) => Some(
                constraint_of(inner.as_ref()).map(|constraint| Error::CheckViolation { constraint }),
            ),
            Db(DatabaseErrorKind::ForeignKeyViolation, inner) => Some(
                constraint_of(inner.as_ref())
                    .map(|constraint| Error::ForeignKeyViolation { constraint }),
            ),
            _ => None,
        };
        match parsed {
            Some(Some(error)) => error,
            Some(None) => {
                // the generic error is still accurate, only the details are lost
                tracing::error!(error = %e, "failed to parse PostgreSQL error details");
                Self::DatabaseError(e.into())
            }
            None => Self::DatabaseError(e.into()),
        }
    }
}
