use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::post_tag;
use database::tables::posts;
use database::tables::tags;
use database::tables::users;
use diesel::deserialize::FromSql;
use diesel::deserialize::FromSqlRow;
use diesel::dsl;
use diesel::expression::AsExpression;
use diesel::pg::Pg;
use diesel::pg::PgValue;
use diesel::prelude::*;
use diesel::serialize::Output;
use diesel::serialize::ToSql;
use diesel::sql_types::Text;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use serde::Serialize;
use strum::AsRefStr;
use strum::Display;
use strum::EnumIter;
use strum::EnumString;
use tracing::Level;
use utoipa::ToSchema;

use crate::Error;
use crate::Page;
use crate::TeamScope;
use crate::tag::CATEGORIES;

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ToSql<Text, Pg> for PostStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> diesel::serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_ref(), &mut out.reborrow())
    }
}

impl FromSql<Text, Pg> for PostStatus {
    fn from_sql(value: PgValue<'_>) -> diesel::deserialize::Result<Self> {
        let status = <String as FromSql<Text, Pg>>::from_sql(value)?;
        Ok(status.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(Pg))]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub team_id: Option<i64>,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub user_id: i64,
    pub team_id: Option<i64>,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
}

/// Columns to change, `None` leaves the column untouched
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = posts)]
pub struct PostChangeset {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<Option<String>>,
    pub content: Option<Option<String>>,
    pub status: Option<PostStatus>,
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostSearch {
    /// Title, excerpt or content contains the text
    Content(String),
    /// Title or author name contains the text
    TitleOrAuthor(String),
}

/// Criteria of a post listing, combined with AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilters {
    pub status: Option<PostStatus>,
    /// Whether `published_at` is set
    pub published: Option<bool>,
    /// Name of a tag of type `categories`
    pub category: Option<String>,
    /// Name of a tag of any type
    pub tag: Option<String>,
    /// Posts with any of these tags
    pub tag_ids: Vec<i64>,
    /// Posts with any of these categories
    pub category_ids: Vec<i64>,
    pub search: Option<PostSearch>,
    /// Soft deleted posts instead of the live ones
    pub trashed: bool,
}

/// `ILIKE` pattern matching `text` anywhere, its wildcards taken literally
pub(crate) fn contains(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl PostFilters {
    pub(crate) fn apply<'a>(&'a self, scope: TeamScope) -> posts::BoxedQuery<'a, Pg> {
        let mut query = scope.filter_posts(posts::table.into_boxed());
        query = if self.trashed {
            query.filter(posts::deleted_at.is_not_null())
        } else {
            query.filter(posts::deleted_at.is_null())
        };
        if let Some(status) = self.status {
            query = query.filter(posts::status.eq(status));
        }
        match self.published {
            Some(true) => query = query.filter(posts::published_at.is_not_null()),
            Some(false) => query = query.filter(posts::published_at.is_null()),
            None => (),
        }
        if let Some(category) = &self.category {
            query = query.filter(
                posts::id.eq_any(
                    post_tag::table
                        .inner_join(tags::table)
                        .filter(tags::name.eq(category))
                        .filter(tags::tag_type.eq(CATEGORIES))
                        .select(post_tag::post_id),
                ),
            );
        }
        if let Some(tag) = &self.tag {
            query = query.filter(
                posts::id.eq_any(
                    post_tag::table
                        .inner_join(tags::table)
                        .filter(tags::name.eq(tag))
                        .select(post_tag::post_id),
                ),
            );
        }
        for ids in [&self.tag_ids, &self.category_ids] {
            if !ids.is_empty() {
                query = query.filter(
                    posts::id.eq_any(
                        post_tag::table
                            .filter(post_tag::tag_id.eq_any(ids))
                            .select(post_tag::post_id),
                    ),
                );
            }
        }
        match &self.search {
            Some(PostSearch::Content(text)) => {
                let pattern = contains(text);
                query = query.filter(
                    posts::title
                        .ilike(pattern.clone())
                        .or(posts::excerpt.ilike(pattern.clone()))
                        .or(posts::content.ilike(pattern)),
                );
            }
            Some(PostSearch::TitleOrAuthor(text)) => {
                let pattern = contains(text);
                query = query.filter(
                    posts::title.ilike(pattern.clone()).or(posts::user_id.eq_any(
                        users::table
                            .filter(users::name.ilike(pattern))
                            .select(users::id),
                    )),
                );
            }
            None => (),
        }
        query
    }
}

impl Post {
    /// Creates a post, its team is stamped from `scope` unless given
    #[tracing::instrument(skip_all, fields(slug = %new_post.slug), err)]
    pub async fn create(
        conn: &mut DbConnection,
        scope: TeamScope,
        mut new_post: NewPost,
    ) -> Result<Post, Error> {
        new_post.team_id = scope.stamp(new_post.team_id);
        let post = dsl::insert_into(posts::table)
            .values(&new_post)
            .returning(Post::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(post)
    }

    /// Retrieves a post of the scope, soft deleted ones only if `with_trashed`
    #[tracing::instrument(skip(conn), ret(level = Level::DEBUG), err)]
    pub async fn retrieve(
        conn: &mut DbConnection,
        scope: TeamScope,
        post_id: i64,
        with_trashed: bool,
    ) -> Result<Option<Post>, Error> {
        let mut query = scope
            .filter_posts(posts::table.into_boxed())
            .filter(posts::id.eq(post_id));
        if !with_trashed {
            query = query.filter(posts::deleted_at.is_null());
        }
        let post = query
            .select(Post::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(post)
    }

    #[tracing::instrument(skip(conn), ret(level = Level::DEBUG), err)]
    pub async fn retrieve_by_slug(
        conn: &mut DbConnection,
        scope: TeamScope,
        slug: &str,
    ) -> Result<Option<Post>, Error> {
        let post = scope
            .filter_posts(posts::table.into_boxed())
            .filter(posts::slug.eq(slug))
            .filter(posts::deleted_at.is_null())
            .select(Post::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(post)
    }

    /// Lists the posts matching the filters, most recently published first
    ///
    /// Returns the page of posts and the total count of matching posts.
    #[tracing::instrument(skip(conn), err)]
    pub async fn list(
        conn: &mut DbConnection,
        scope: TeamScope,
        filters: &PostFilters,
        page: Page,
    ) -> Result<(Vec<Post>, u64), Error> {
        let count: i64 = filters
            .apply(scope)
            .count()
            .get_result(conn.write().await.deref_mut())
            .await?;
        let posts = filters
            .apply(scope)
            .order((posts::published_at.desc().nulls_last(), posts::id.desc()))
            .limit(page.limit())
            .offset(page.offset())
            .select(Post::as_select())
            .load(conn.write().await.deref_mut())
            .await?;
        Ok((posts, count.max(0) as u64))
    }

    /// Whether any post (in any team, trashed or not) uses the slug
    pub async fn slug_taken(
        conn: &mut DbConnection,
        slug: &str,
        except_post_id: Option<i64>,
    ) -> Result<bool, Error> {
        let mut query = posts::table
            .filter(posts::slug.eq(slug))
            .select(posts::id)
            .into_boxed();
        if let Some(post_id) = except_post_id {
            query = query.filter(posts::id.ne(post_id));
        }
        let taken = dsl::select(dsl::exists(query))
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(taken)
    }

    #[tracing::instrument(skip(conn, changeset), err)]
    pub async fn update(
        conn: &mut DbConnection,
        post_id: i64,
        mut changeset: PostChangeset,
    ) -> Result<Post, Error> {
        changeset.updated_at = Some(Utc::now());
        let post = dsl::update(posts::table.find(post_id))
            .set(&changeset)
            .returning(Post::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(post)
    }

    /// Moves the post to the trash
    #[tracing::instrument(skip(conn), err)]
    pub async fn soft_delete(conn: &mut DbConnection, post_id: i64) -> Result<bool, Error> {
        let changed = dsl::update(posts::table.find(post_id))
            .filter(posts::deleted_at.is_null())
            .set(posts::deleted_at.eq(Some(Utc::now())))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(changed > 0)
    }

    #[tracing::instrument(skip(conn), err)]
    pub async fn restore(conn: &mut DbConnection, post_id: i64) -> Result<bool, Error> {
        let changed = dsl::update(posts::table.find(post_id))
            .filter(posts::deleted_at.is_not_null())
            .set(posts::deleted_at.eq(None::<DateTime<Utc>>))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(changed > 0)
    }

    /// Deletes the row, media and tag links are removed by cascade
    #[tracing::instrument(skip(conn), err)]
    pub async fn force_delete(conn: &mut DbConnection, post_id: i64) -> Result<bool, Error> {
        let deleted = dsl::delete(posts::table.find(post_id))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(deleted > 0)
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}
