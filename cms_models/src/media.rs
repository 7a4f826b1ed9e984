use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::media;
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
use strum::EnumString;
use utoipa::ToSchema;

use crate::Error;

/// Named group of files attached to a post
#[derive(
    Debug,
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
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MediaCollection {
    /// At most one image per post
    Featured,
    Gallery,
}

impl MediaCollection {
    pub fn is_single_file(&self) -> bool {
        matches!(self, MediaCollection::Featured)
    }
}

impl ToSql<Text, Pg> for MediaCollection {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> diesel::serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_ref(), &mut out.reborrow())
    }
}

impl FromSql<Text, Pg> for MediaCollection {
    fn from_sql(value: PgValue<'_>) -> diesel::deserialize::Result<Self> {
        let collection = <String as FromSql<Text, Pg>>::from_sql(value)?;
        Ok(collection.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = media)]
#[diesel(check_for_backend(Pg))]
pub struct Media {
    pub id: i64,
    pub post_id: i64,
    pub collection: MediaCollection,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = media)]
pub struct NewMedia {
    pub post_id: i64,
    pub collection: MediaCollection,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
}

impl Media {
    /// Extension of the stored file, used to name its conversions
    pub fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, extension)| extension)
            .unwrap_or("jpg")
    }

    #[tracing::instrument(skip_all, fields(post_id = new_media.post_id, collection = %new_media.collection), err)]
    pub async fn create(conn: &mut DbConnection, new_media: NewMedia) -> Result<Media, Error> {
        let media = dsl::insert_into(media::table)
            .values(&new_media)
            .returning(Media::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await?;
        Ok(media)
    }

    pub async fn retrieve(
        conn: &mut DbConnection,
        post_id: i64,
        media_id: i64,
    ) -> Result<Option<Media>, Error> {
        let media = media::table
            .filter(media::id.eq(media_id))
            .filter(media::post_id.eq(post_id))
            .select(Media::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()?;
        Ok(media)
    }

    /// Media of the posts, oldest first
    pub async fn for_posts(conn: &mut DbConnection, post_ids: &[i64]) -> Result<Vec<Media>, Error> {
        let media = media::table
            .filter(media::post_id.eq_any(post_ids))
            .order(media::id)
            .select(Media::as_select())
            .load(conn.write().await.deref_mut())
            .await?;
        Ok(media)
    }

    /// Removes every file of a collection, returns the removed rows so their files can be deleted
    #[tracing::instrument(skip(conn), err)]
    pub async fn clear_collection(
        conn: &mut DbConnection,
        post_id: i64,
        collection: MediaCollection,
    ) -> Result<Vec<Media>, Error> {
        let removed = dsl::delete(
            media::table
                .filter(media::post_id.eq(post_id))
                .filter(media::collection.eq(collection)),
        )
        .returning(Media::as_returning())
        .get_results(conn.write().await.deref_mut())
        .await?;
        Ok(removed)
    }

    #[tracing::instrument(skip(conn), err)]
    pub async fn delete(conn: &mut DbConnection, media_id: i64) -> Result<bool, Error> {
        let deleted = dsl::delete(media::table.find(media_id))
            .execute(conn.write().await.deref_mut())
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections() {
        assert_eq!("gallery".parse::<MediaCollection>().unwrap(), MediaCollection::Gallery);
        assert!("avatar".parse::<MediaCollection>().is_err());
        assert!(MediaCollection::Featured.is_single_file());
        assert!(!MediaCollection::Gallery.is_single_file());
    }

    #[test]
    fn extension_of_the_stored_file() {
        let media = Media {
            id: 1,
            post_id: 1,
            collection: MediaCollection::Gallery,
            file_name: "holiday.photo.png".to_owned(),
            mime_type: "image/png".to_owned(),
            size: 42,
            created_at: Utc::now(),
        };
        assert_eq!(media.extension(), "png");
    }
}
