use std::collections::HashMap;
use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::post_tag;
use database::tables::tags;
use diesel::dsl;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::upsert::on_constraint;
use diesel_async::RunQueryDsl;
use itertools::Itertools as _;

use crate::Error;
use crate::slug::slugify;

/// Type of the tags used as post categories
pub const CATEGORIES: &str = "categories";
/// Type of the free form post tags
pub const TAGS: &str = "tags";

const NAME_TYPE_CONSTRAINT: &str = "tags_name_type_key";

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = tags)]
#[diesel(check_for_backend(Pg))]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub tag_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    pub fn is_category(&self) -> bool {
        self.tag_type.as_deref() == Some(CATEGORIES)
    }

    /// Returns the tag with that name and type, creating it if needed
    ///
    /// Concurrent creations of the same tag resolve to the same row.
    #[tracing::instrument(skip(conn), err)]
    pub async fn find_or_create(
        conn: &mut DbConnection,
        name: &str,
        tag_type: Option<&str>,
    ) -> Result<Tag, Error> {
        let created = dsl::insert_into(tags::table)
            .values((
                tags::name.eq(name),
                tags::slug.eq(slugify(name)),
                tags::tag_type.eq(tag_type),
            ))
            .on_conflict(on_constraint(NAME_TYPE_CONSTRAINT))
            .do_nothing()
            .execute(conn.write().await.deref_mut())
            .await?;
        if created > 0 {
            tracing::debug!("tag created");
        }
        let tag = tags::table
            .filter(tags::name.eq(name))
            .filter(tags::tag_type.is_not_distinct_from(tag_type))
            .select(Tag::as_select())
            .first(conn.write().await.deref_mut())
            .await?;
        Ok(tag)
    }

    pub async fn find_or_create_many(
        conn: &mut DbConnection,
        names: &[String],
        tag_type: Option<&str>,
    ) -> Result<Vec<Tag>, Error> {
        let names: Vec<String> = names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .unique()
            .map(ToOwned::to_owned)
            .collect();
        let mut tags = Vec::with_capacity(names.len());
        for name in &names {
            tags.push(Self::find_or_create(conn, name, tag_type).await?);
        }
        Ok(tags)
    }

    /// Replaces the tags of a given type attached to the post
    #[tracing::instrument(skip(conn), err)]
    pub async fn sync_post_tags(
        conn: &mut DbConnection,
        post_id: i64,
        tag_type: Option<&str>,
        tag_ids: &[i64],
    ) -> Result<(), Error> {
        let same_type = tags::table
            .filter(tags::tag_type.is_not_distinct_from(tag_type))
            .select(tags::id);
        dsl::delete(
            post_tag::table
                .filter(post_tag::post_id.eq(post_id))
                .filter(post_tag::tag_id.eq_any(same_type)),
        )
        .execute(conn.write().await.deref_mut())
        .await?;
        let links = tag_ids
            .iter()
            .map(|tag_id| (post_tag::post_id.eq(post_id), post_tag::tag_id.eq(*tag_id)))
            .collect::<Vec<_>>();
        if !links.is_empty() {
            dsl::insert_into(post_tag::table)
                .values(&links)
                .on_conflict_do_nothing()
                .execute(conn.write().await.deref_mut())
                .await?;
        }
        Ok(())
    }

    /// Tags of each post, sorted by name
    pub async fn for_posts(
        conn: &mut DbConnection,
        post_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Tag>>, Error> {
        let rows: Vec<(i64, Tag)> = post_tag::table
            .inner_join(tags::table)
            .filter(post_tag::post_id.eq_any(post_ids))
            .order((post_tag::post_id, tags::name))
            .select((post_tag::post_id, Tag::as_select()))
            .load(conn.write().await.deref_mut())
            .await?;
        Ok(rows.into_iter().into_group_map())
    }

    pub async fn list(conn: &mut DbConnection, tag_type: Option<&str>) -> Result<Vec<Tag>, Error> {
        let tags = tags::table
            .filter(tags::tag_type.is_not_distinct_from(tag_type))
            .order(tags::name)
            .select(Tag::as_select())
            .load(conn.write().await.deref_mut())
            .await?;
        Ok(tags)
    }
}

/// Splits tags into categories and the other tags
pub fn partition_categories(tags: Vec<Tag>) -> (Vec<Tag>, Vec<Tag>) {
    tags.into_iter().partition(Tag::is_category)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tag(id: i64, name: &str, tag_type: Option<&str>) -> Tag {
        Tag {
            id,
            name: name.to_owned(),
            slug: slugify(name),
            tag_type: tag_type.map(ToOwned::to_owned),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn categories_are_split_from_tags() {
        let (categories, others) = partition_categories(vec![
            tag(1, "Rust", Some(CATEGORIES)),
            tag(2, "async", Some(TAGS)),
            tag(3, "legacy", None),
            tag(4, "News", Some(CATEGORIES)),
        ]);
        let names = |tags: &[Tag]| tags.iter().map(|t| t.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&categories), ["Rust", "News"]);
        assert_eq!(names(&others), ["async", "legacy"]);
    }
}
