//! Personal access tokens for the JSON API
//!
//! Only the sha256 digest of a token is stored. The plain text token is handed
//! out once, as `<id>|<secret>`.

use std::ops::DerefMut;

use authz::Ability;
use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::api_tokens;
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::Rng as _;
use rand::distr::Alphanumeric;
use sha2::Digest as _;
use sha2::Sha256;
use strum::IntoEnumIterator as _;
use subtle::ConstantTimeEq as _;

use crate::Error;
use crate::password::to_hex;

const SECRET_LENGTH: usize = 40;

/// Every ability, granted to tokens issued without an explicit list
pub const ALL_ABILITIES: &str = "*";

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = api_tokens)]
#[diesel(check_for_backend(Pg))]
pub struct ApiToken {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Hex encoded sha256 digest of the secret
    pub token: String,
    pub abilities: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn hash_token(secret: &str) -> String {
    to_hex(&Sha256::digest(secret.as_bytes()))
}

/// Splits a bearer into its optional token id and its secret
pub fn parse_bearer(bearer: &str) -> (Option<i64>, &str) {
    match bearer.split_once('|') {
        Some((id, secret)) => match id.parse() {
            Ok(id) => (Some(id), secret),
            Err(_) => (None, bearer),
        },
        None => (None, bearer),
    }
}

fn generate_secret() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

impl ApiToken {
    /// Issues a token for the user, returns it along with its plain text form
    #[tracing::instrument(skip(conn), err)]
    pub async fn issue(
        conn: &mut DbConnection,
        user_id: i64,
        name: &str,
        abilities: &[String],
    ) -> Result<(ApiToken, String), Error> {
        let secret = generate_secret();
        let abilities = if abilities.is_empty() {
            vec![ALL_ABILITIES.to_owned()]
        } else {
            abilities.to_vec()
        };
        let now = Utc::now();
        let token = dsl::insert_into(api_tokens::table)
            .values((
                api_tokens::user_id.eq(user_id),
                api_tokens::name.eq(name),
                api_tokens::token.eq(hash_token(&secret)),
                api_tokens::abilities.eq(abilities),
                api_tokens::created_at.eq(now),
                api_tokens::updated_at.eq(now),
            ))
            .returning(ApiToken::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        let plain = format!("{}|{secret}", token.id);
        Ok((token, plain))
    }

    /// Finds the token matching a bearer, either `<id>|<secret>` or a bare secret
    #[tracing::instrument(skip_all, err)]
    pub async fn find_by_bearer(
        conn: &mut DbConnection,
        bearer: &str,
    ) -> Result<Option<ApiToken>, Error> {
        let (id, secret) = parse_bearer(bearer);
        let digest = hash_token(secret);
        let token = match id {
            Some(id) => api_tokens::table
                .find(id)
                .select(ApiToken::as_select())
                .first(conn.write().await.deref_mut())
                .await
                .optional()?
                .filter(|token: &ApiToken| token.matches_digest(&digest)),
            None => api_tokens::table
                .filter(api_tokens::token.eq(&digest))
                .select(ApiToken::as_select())
                .first(conn.write().await.deref_mut())
                .await
                .optional()?,
        };
        Ok(token)
    }

    pub async fn touch_last_used(conn: &mut DbConnection, token_id: i64) -> Result<(), Error> {
        dsl::update(api_tokens::table.find(token_id))
            .set(api_tokens::last_used_at.eq(Utc::now()))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(())
    }

    fn matches_digest(&self, digest: &str) -> bool {
        self.token.as_bytes().ct_eq(digest.as_bytes()).into()
    }

    pub fn can(&self, ability: Ability) -> bool {
        let ability: &str = ability.as_ref();
        self.abilities
            .iter()
            .any(|granted| granted == ALL_ABILITIES || granted == ability)
    }

    pub fn granted_abilities(&self) -> impl Iterator<Item = Ability> + '_ {
        Ability::iter().filter(|ability| self.can(*ability))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn token(abilities: &[&str]) -> ApiToken {
        ApiToken {
            id: 7,
            user_id: 1,
            name: "cli".to_owned(),
            token: hash_token("secret"),
            abilities: abilities.iter().map(|a| a.to_string()).collect(),
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[rstest]
    #[case::with_id("7|abc", (Some(7), "abc"))]
    #[case::bare("abc", (None, "abc"))]
    #[case::invalid_id("x|abc", (None, "x|abc"))]
    fn bearers(#[case] bearer: &str, #[case] expected: (Option<i64>, &str)) {
        assert_eq!(parse_bearer(bearer), expected);
    }

    #[test]
    fn digest_is_hex_sha256() {
        let digest = hash_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn secrets_are_alphanumeric() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_LENGTH);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn abilities() {
        assert!(token(&["*"]).can(Ability::Delete));
        let read_only = token(&["read"]);
        assert!(read_only.can(Ability::Read));
        assert!(!read_only.can(Ability::Update));
        assert!(read_only.matches_digest(&hash_token("secret")));
        assert!(!read_only.matches_digest(&hash_token("other")));
    }

    #[rstest]
    #[case::wildcard(&["*"], &[Ability::Create, Ability::Read, Ability::Update, Ability::Delete])]
    #[case::read_only(&["read"], &[Ability::Read])]
    #[case::unknown_ignored(&["read", "publish"], &[Ability::Read])]
    fn granted_abilities(#[case] stored: &[&str], #[case] expected: &[Ability]) {
        let granted: Vec<_> = token(stored).granted_abilities().collect();
        assert_eq!(granted, expected);
    }
}
