//! JSON representation of the posts, shared by the public API and the admin panel

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use cms_derive::CmsError;
use cms_models::Media;
use cms_models::MediaCollection;
use cms_models::Post;
use cms_models::PostStatus;
use cms_models::Tag;
use cms_models::tag::partition_categories;
use cms_models::user::Author;
use database::DbConnection;
use itertools::Itertools as _;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::media::MediaConfig;
use crate::media::MediaUrls;
use crate::views::pagination::PaginationStats;

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "post")]
pub(in crate::views) enum PostError {
    #[error("Post '{post_key}' could not be found")]
    #[cms_error(status = 404)]
    NotFound { post_key: String },
    #[error("Media '{media_id}' of post '{post_id}' could not be found")]
    #[cms_error(status = 404)]
    MediaNotFound { post_id: i64, media_id: i64 },
}

impl PostError {
    pub(in crate::views) fn not_found(post_key: impl ToString) -> Self {
        Self::NotFound {
            post_key: post_key.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct AuthorResource {
    id: i64,
    name: String,
    email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct TagResource {
    id: i64,
    name: String,
    slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct PostResource {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub status: PostStatus,
    #[schema(required)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the post is in the trash
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[schema(required)]
    pub author: Option<AuthorResource>,
    #[schema(required)]
    pub featured_image: Option<MediaUrls>,
    pub gallery: Vec<MediaUrls>,
    /// Tags of type `categories`
    pub categories: Vec<TagResource>,
    /// Every other tag
    pub tags: Vec<TagResource>,
}

/// A page of posts
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct PostPage {
    pub results: Vec<PostResource>,
    #[serde(flatten)]
    pub stats: PaginationStats,
}

impl From<Author> for AuthorResource {
    fn from(Author { id, name, email }: Author) -> Self {
        Self { id, name, email }
    }
}

impl From<Tag> for TagResource {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            slug: tag.slug,
        }
    }
}

/// Everything attached to a set of posts, loaded in one query per relation
#[derive(Debug, Default)]
pub(in crate::views) struct PostRelations {
    authors: HashMap<i64, Author>,
    tags: HashMap<i64, Vec<Tag>>,
    media: HashMap<i64, Vec<Media>>,
}

impl PostRelations {
    pub(in crate::views) async fn load(
        conn: &mut DbConnection,
        posts: &[Post],
    ) -> Result<Self, cms_models::Error> {
        let post_ids = posts.iter().map(|post| post.id).collect_vec();
        let author_ids = posts.iter().map(|post| post.user_id).unique().collect_vec();
        Ok(Self {
            authors: Author::retrieve_batch(conn, &author_ids).await?,
            tags: Tag::for_posts(conn, &post_ids).await?,
            media: Media::for_posts(conn, &post_ids)
                .await?
                .into_iter()
                .into_group_map_by(|media| media.post_id),
        })
    }

    /// Builds the resource of a post, consuming its relations
    pub(in crate::views) fn resource(&mut self, post: Post, media_config: &MediaConfig) -> PostResource {
        let (categories, tags) = partition_categories(self.tags.remove(&post.id).unwrap_or_default());
        let (featured, gallery): (Vec<_>, Vec<_>) = self
            .media
            .remove(&post.id)
            .unwrap_or_default()
            .into_iter()
            .partition(|media| media.collection == MediaCollection::Featured);
        PostResource {
            author: self.authors.get(&post.user_id).cloned().map(AuthorResource::from),
            // the featured collection holds a single file, the latest wins otherwise
            featured_image: featured.last().map(|media| media_config.urls(media)),
            gallery: gallery.iter().map(|media| media_config.urls(media)).collect(),
            categories: categories.into_iter().map(TagResource::from).collect(),
            tags: tags.into_iter().map(TagResource::from).collect(),
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: post.excerpt,
            content: post.content,
            status: post.status,
            published_at: post.published_at,
            created_at: post.created_at,
            updated_at: post.updated_at,
            deleted_at: post.deleted_at,
        }
    }

    /// Loads the relations of the posts and builds their resources, keeping the order
    pub(in crate::views) async fn resources(
        conn: &mut DbConnection,
        posts: Vec<Post>,
        media_config: &MediaConfig,
    ) -> Result<Vec<PostResource>, cms_models::Error> {
        let mut relations = Self::load(conn, &posts).await?;
        Ok(posts
            .into_iter()
            .map(|post| relations.resource(post, media_config))
            .collect())
    }
}
