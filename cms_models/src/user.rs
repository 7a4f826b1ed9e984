use std::collections::HashMap;
use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::users;
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::Level;

use crate::Error;
use crate::Page;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    /// Salted hash, see [crate::password]
    pub password: String,
    pub phone: Option<String>,
    pub data: Option<serde_json::Value>,
    pub current_team_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub password: String,
    pub phone: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = users)]
pub struct UserChangeset {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<Option<String>>,
    pub data: Option<Option<serde_json::Value>>,
    pub current_team_id: Option<Option<i64>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Public identity of a post author
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(Pg))]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl User {
    #[tracing::instrument(skip(conn), ret(level = Level::DEBUG), err)]
    pub async fn retrieve(conn: &mut DbConnection, user_id: i64) -> Result<Option<User>, Error> {
        let user = users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(user)
    }

    #[tracing::instrument(skip(conn), err)]
    pub async fn retrieve_by_email(
        conn: &mut DbConnection,
        email: &str,
    ) -> Result<Option<User>, Error> {
        let user = users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(user)
    }

    pub async fn email_taken(
        conn: &mut DbConnection,
        email: &str,
        except_user_id: Option<i64>,
    ) -> Result<bool, Error> {
        let mut query = users::table
            .filter(users::email.eq(email))
            .select(users::id)
            .into_boxed();
        if let Some(user_id) = except_user_id {
            query = query.filter(users::id.ne(user_id));
        }
        let taken = dsl::select(dsl::exists(query))
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(taken)
    }

    /// Users whose name or email contains `search`, sorted by name
    #[tracing::instrument(skip(conn), err)]
    pub async fn list(
        conn: &mut DbConnection,
        search: Option<&str>,
        page: Page,
    ) -> Result<(Vec<User>, u64), Error> {
        let filtered = || {
            let mut query = users::table.into_boxed();
            if let Some(search) = search {
                let pattern = crate::post::contains(search);
                query = query.filter(
                    users::name
                        .ilike(pattern.clone())
                        .or(users::email.ilike(pattern)),
                );
            }
            query
        };
        let count: i64 = filtered()
            .count()
            .get_result(conn.write().await.deref_mut())
            .await?;
        let users = filtered()
            .order((users::name, users::id))
            .limit(page.limit())
            .offset(page.offset())
            .select(User::as_select())
            .load(conn.write().await.deref_mut())
            .await?;
        Ok((users, count.max(0) as u64))
    }

    #[tracing::instrument(skip_all, fields(email = %new_user.email), err)]
    pub async fn create(conn: &mut DbConnection, new_user: NewUser) -> Result<User, Error> {
        let user = dsl::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(user)
    }

    #[tracing::instrument(skip(conn, changeset), err)]
    pub async fn update(
        conn: &mut DbConnection,
        user_id: i64,
        mut changeset: UserChangeset,
    ) -> Result<User, Error> {
        changeset.updated_at = Some(Utc::now());
        let user = dsl::update(users::table.find(user_id))
            .set(&changeset)
            .returning(User::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(user)
    }

    pub async fn set_current_team(
        conn: &mut DbConnection,
        user_id: i64,
        team_id: Option<i64>,
    ) -> Result<(), Error> {
        dsl::update(users::table.find(user_id))
            .set((
                users::current_team_id.eq(team_id),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(conn), err)]
    pub async fn delete(conn: &mut DbConnection, user_id: i64) -> Result<bool, Error> {
        let deleted = dsl::delete(users::table.find(user_id))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(deleted > 0)
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// First word of the name, used to name personal teams
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

impl Author {
    pub async fn retrieve_batch(
        conn: &mut DbConnection,
        user_ids: &[i64],
    ) -> Result<HashMap<i64, Author>, Error> {
        let authors: Vec<Author> = users::table
            .filter(users::id.eq_any(user_ids))
            .select(Author::as_select())
            .load(conn.write().await.deref_mut())
            .await?;
        Ok(authors
            .into_iter()
            .map(|author| (author.id, author))
            .collect())
    }
}

/// Stored form of the free form user attributes: an empty map is stored as NULL
pub fn data_column(data: serde_json::Map<String, serde_json::Value>) -> Option<serde_json::Value> {
    (!data.is_empty()).then_some(serde_json::Value::Object(data))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_data_is_stored_as_null() {
        assert_eq!(data_column(serde_json::Map::new()), None);
        let mut data = serde_json::Map::new();
        data.insert("company".to_owned(), json!("Humano"));
        assert_eq!(data_column(data), Some(json!({ "company": "Humano" })));
    }

    #[test]
    fn first_name() {
        let user = User {
            id: 1,
            name: "Ada Lovelace".to_owned(),
            email: "ada@example.com".to_owned(),
            email_verified_at: None,
            password: String::new(),
            phone: None,
            data: None,
            current_team_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(user.first_name(), "Ada");
        assert!(!user.is_verified());
    }
}
