use authz::Action;
use axum::Extension;
use axum::Json;
use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::State;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use chrono::DateTime;
use chrono::Utc;
use cms_derive::CmsError;
use cms_models::Media;
use cms_models::MediaCollection;
use cms_models::Page;
use cms_models::Post;
use cms_models::PostStatus;
use cms_models::Tag;
use cms_models::TeamScope;
use cms_models::media::NewMedia;
use cms_models::post::NewPost;
use cms_models::post::PostChangeset;
use cms_models::post::PostFilters;
use cms_models::post::PostSearch;
use cms_models::slug::is_alpha_dash;
use cms_models::slug::slugify;
use cms_models::tag::CATEGORIES;
use cms_models::tag::TAGS;
use database::DbConnection;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use itertools::Itertools as _;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use super::authorize_post;
use crate::error::InternalError;
use crate::error::Result;
use crate::media::MediaUrls;
use crate::media::decode_upload;
use crate::views::AppState;
use crate::views::AuthenticationExt;
use crate::views::api::posts::STATUSES;
use crate::views::pagination::PaginationQueryParams;
use crate::views::pagination::PaginationStats;
use crate::views::resources::PostError;
use crate::views::resources::PostPage;
use crate::views::resources::PostRelations;
use crate::views::resources::PostResource;
use crate::views::validation::FieldErrors;
use crate::views::validation::Validate;
use crate::views::validation::ValidJson;
use crate::views::validation::ValidQuery;
use crate::views::validation::ValidationError;
use crate::views::validation::present;

const SLUG_CONSTRAINT: &str = "posts_slug_key";
const MAX_TITLE_LENGTH: usize = 255;
const MAX_EXCERPT_LENGTH: usize = 500;
const MAX_TAG_LENGTH: usize = 255;

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "admin_post", default_status = 400)]
pub(in crate::views) enum AdminPostError {
    #[error("Unknown media collection '{collection}', expected 'featured' or 'gallery'")]
    #[cms_error(status = 404)]
    UnknownCollection { collection: String },
    #[error("Invalid media upload: {0}")]
    InvalidUpload(#[from] UploadError),
}

#[derive(Debug, Error)]
pub(in crate::views) enum UploadError {
    #[error("Invalid multipart content")]
    Multipart(#[from] MultipartError),
    #[error("Unrecognized multipart field '{field_name}'")]
    UnrecognizedField { field_name: String },
    #[error("Missing multipart field 'file'")]
    MissingFile,
    #[error("Invalid bytes in multipart field 'file': {source}")]
    InvalidContent { source: MultipartError },
}

fn slug_taken() -> InternalError {
    FieldErrors::single("slug", "The slug has already been taken.").into()
}

/// A concurrent insertion may still hit the unique constraint after the check
fn slug_conflict(error: cms_models::Error) -> InternalError {
    if error.is_unique_violation_of(SLUG_CONSTRAINT) {
        slug_taken()
    } else {
        error.into()
    }
}

async fn find_post(
    conn: &mut DbConnection,
    scope: TeamScope,
    post_id: i64,
    with_trashed: bool,
) -> Result<Post> {
    Post::retrieve(conn, scope, post_id, with_trashed)
        .await?
        .ok_or_else(|| PostError::not_found(post_id).into())
}

/// Replaces the tags of a type attached to the post, creating the missing ones
async fn sync_terms(
    conn: &mut DbConnection,
    post_id: i64,
    tag_type: &str,
    names: &[String],
) -> Result<(), cms_models::Error> {
    let tag_ids = Tag::find_or_create_many(conn, names, Some(tag_type))
        .await?
        .into_iter()
        .map(|tag| tag.id)
        .collect_vec();
    Tag::sync_post_tags(conn, post_id, Some(tag_type), &tag_ids).await
}

/// Filters of the admin post listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(in crate::views) struct AdminPostListParams {
    #[param(value_type = Option<PostStatus>)]
    status: Option<String>,
    /// Whether the post has a publication date
    #[param(value_type = Option<bool>)]
    published: Option<String>,
    /// Comma separated ids of tags
    tags: Option<String>,
    /// Comma separated ids of categories
    categories: Option<String>,
    /// Text contained in the title or the author's name
    search: Option<String>,
    /// Only the posts in the trash
    #[param(value_type = Option<bool>)]
    trashed: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(in crate::views) struct RawAdminPostListQuery {
    #[serde(flatten)]
    params: AdminPostListParams,
    #[serde(flatten)]
    pagination: PaginationQueryParams,
}

#[derive(Debug, PartialEq)]
pub(in crate::views) struct AdminPostListRequest {
    filters: PostFilters,
    page: Page,
}

impl Validate for AdminPostListRequest {
    type Raw = RawAdminPostListQuery;

    fn validate(
        RawAdminPostListQuery { params, pagination }: RawAdminPostListQuery,
    ) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let search = present(&params.search);
        errors.max_length("search", search, MAX_TITLE_LENGTH);
        let filters = PostFilters {
            status: errors.one_of("status", present(&params.status), STATUSES),
            published: errors.boolean("published", present(&params.published)),
            tag_ids: errors.ids("tags", present(&params.tags)),
            category_ids: errors.ids("categories", present(&params.categories)),
            search: search.map(|text| PostSearch::TitleOrAuthor(text.to_owned())),
            trashed: errors
                .boolean("trashed", present(&params.trashed))
                .unwrap_or(false),
            ..Default::default()
        };
        let page = pagination.validate(&mut errors);
        errors.check(AdminPostListRequest { filters, page })
    }
}

/// Fields of a post as submitted by the editor
///
/// Categories and tags are given by name and created when missing.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub(in crate::views) struct PostForm {
    #[schema(max_length = 255)]
    title: Option<String>,
    /// Generated from the title when absent
    #[schema(max_length = 255, pattern = "^[A-Za-z0-9_-]+$")]
    slug: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, max_length = 500)]
    excerpt: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    content: Option<Option<String>>,
    #[schema(value_type = Option<PostStatus>)]
    status: Option<String>,
    /// Defaults to now on creation
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    published_at: Option<Option<DateTime<Utc>>>,
    /// Names of the categories of the post
    categories: Option<Vec<String>>,
    /// Names of the tags of the post
    tags: Option<Vec<String>>,
}

/// Checks the optional fields shared by creations and updates
fn check_common(form: &PostForm, errors: &mut FieldErrors) -> Option<PostStatus> {
    errors.max_length("title", present(&form.title), MAX_TITLE_LENGTH);
    if let Some(slug) = present(&form.slug) {
        if !is_alpha_dash(slug) {
            errors.push(
                "slug",
                "The slug field must only contain letters, numbers, dashes, and underscores.",
            );
        }
        errors.max_length("slug", Some(slug), MAX_TITLE_LENGTH);
    }
    if let Some(Some(excerpt)) = &form.excerpt {
        errors.max_length("excerpt", Some(excerpt), MAX_EXCERPT_LENGTH);
    }
    for (field, names) in [("categories", &form.categories), ("tags", &form.tags)] {
        for (index, name) in names.iter().flatten().enumerate() {
            errors.max_length(&format!("{field}.{index}"), Some(name.trim()), MAX_TAG_LENGTH);
        }
    }
    errors.one_of("status", present(&form.status), STATUSES)
}

#[derive(Debug, PartialEq)]
pub(in crate::views) struct NewPostForm {
    title: String,
    slug: String,
    excerpt: Option<String>,
    content: Option<String>,
    status: PostStatus,
    published_at: Option<DateTime<Utc>>,
    categories: Vec<String>,
    tags: Vec<String>,
}

impl Validate for NewPostForm {
    type Raw = PostForm;

    fn validate(form: PostForm) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let status = check_common(&form, &mut errors);
        let title = errors.required("title", form.title.as_deref()).map(ToOwned::to_owned);
        let slug = match (present(&form.slug), &title) {
            (Some(slug), _) => slug.to_owned(),
            (None, Some(title)) => slugify(title),
            (None, None) => String::new(),
        };
        if title.is_some() && slug.is_empty() {
            errors.push("slug", "The slug field is required.");
        }
        errors.check(())?;
        Ok(NewPostForm {
            title: title.unwrap_or_default(),
            slug,
            excerpt: form.excerpt.flatten(),
            content: form.content.flatten(),
            status: status.unwrap_or_default(),
            published_at: form.published_at.unwrap_or_else(|| Some(Utc::now())),
            categories: form.categories.unwrap_or_default(),
            tags: form.tags.unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
pub(in crate::views) struct PostPatch {
    changeset: PostChangeset,
    categories: Option<Vec<String>>,
    tags: Option<Vec<String>>,
}

impl Validate for PostPatch {
    type Raw = PostForm;

    fn validate(form: PostForm) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let status = check_common(&form, &mut errors);
        if form.title.is_some() {
            errors.required("title", form.title.as_deref());
        }
        if form.slug.is_some() {
            errors.required("slug", form.slug.as_deref());
        }
        errors.check(PostPatch {
            changeset: PostChangeset {
                title: present(&form.title).map(ToOwned::to_owned),
                slug: present(&form.slug).map(ToOwned::to_owned),
                excerpt: form.excerpt,
                content: form.content,
                status,
                published_at: form.published_at,
                updated_at: None,
            },
            categories: form.categories,
            tags: form.tags,
        })
    }
}

/// An image attached to a post
#[derive(Debug, Serialize, ToSchema)]
pub(in crate::views) struct MediaResource {
    id: i64,
    collection: MediaCollection,
    file_name: String,
    mime_type: String,
    size: i64,
    #[serde(flatten)]
    urls: MediaUrls,
}

#[derive(ToSchema)]
#[allow(unused)] // Schema only
struct MediaUploadForm {
    /// A jpeg, png or webp image
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

struct MultipartFile {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn read_upload(mut form: Multipart) -> Result<MultipartFile, UploadError> {
    let mut file = None;
    while let Some(field) = form.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_owned();
        if field_name != "file" {
            return Err(UploadError::UnrecognizedField { field_name });
        }
        let file_name = field.file_name().unwrap_or("upload").to_owned();
        let content_type = field.content_type().map(ToOwned::to_owned);
        let data = field
            .bytes()
            .await
            .map_err(|source| UploadError::InvalidContent { source })?
            .to_vec();
        file = Some(MultipartFile {
            file_name,
            content_type,
            data,
        });
    }
    file.ok_or(UploadError::MissingFile)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub(in crate::views) struct PostIdParam {
    post_id: i64,
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["admin", "posts"],
    params(AdminPostListParams, PaginationQueryParams),
    responses(
        (status = 200, body = PostPage, description = "Posts of the caller's team"),
        (status = 422, body = InternalError, description = "Invalid query parameters"),
    )
)]
pub(in crate::views) async fn list(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    ValidQuery(AdminPostListRequest { filters, page }): ValidQuery<AdminPostListRequest>,
) -> Result<Json<PostPage>> {
    let authorizer = auth.authorizer()?;
    authorize_post(&authorizer, Action::ViewAny, authorizer.user_id())?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let (posts, count) = Post::list(conn, scope, &filters, page).await?;
    Ok(Json(PostPage {
        results: PostRelations::resources(conn, posts, &config.media).await?,
        stats: PaginationStats::new(count, page),
    }))
}

#[cms_derive::route]
#[utoipa::path(
    post, path = "",
    tags = ["admin", "posts"],
    request_body = PostForm,
    responses(
        (status = 201, body = PostResource, description = "The created post, in the caller's team"),
        (status = 422, body = InternalError, description = "Invalid post"),
    )
)]
pub(in crate::views) async fn create(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    ValidJson(form): ValidJson<NewPostForm>,
) -> Result<(StatusCode, Json<PostResource>)> {
    let authorizer = auth.authorizer()?;
    authorize_post(&authorizer, Action::Create, authorizer.user_id())?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let user_id = authorizer.user_id();
    let conn = &mut db_pool.get().await?;
    if Post::slug_taken(conn, &form.slug, None).await? {
        return Err(slug_taken());
    }

    let post = conn
        .transaction(|mut conn| {
            async move {
                let NewPostForm {
                    title,
                    slug,
                    excerpt,
                    content,
                    status,
                    published_at,
                    categories,
                    tags,
                } = form;
                let new_post = NewPost {
                    user_id,
                    team_id: None,
                    title,
                    slug,
                    excerpt,
                    content,
                    status,
                    published_at,
                };
                let post = Post::create(&mut conn, scope, new_post)
                    .await
                    .map_err(slug_conflict)?;
                sync_terms(&mut conn, post.id, CATEGORIES, &categories).await?;
                sync_terms(&mut conn, post.id, TAGS, &tags).await?;
                Ok::<_, InternalError>(post)
            }
            .scope_boxed()
        })
        .await?;
    tracing::info!(post_id = post.id, team_id = ?post.team_id, "post created");

    let mut relations = PostRelations::load(conn, std::slice::from_ref(&post)).await?;
    Ok((
        StatusCode::CREATED,
        Json(relations.resource(post, &config.media)),
    ))
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["admin", "posts"],
    params(PostIdParam),
    responses(
        (status = 200, body = PostResource, description = "The post, trashed or not"),
        (status = 404, body = InternalError, description = "No such post in the caller's team"),
    )
)]
pub(in crate::views) async fn show(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(PostIdParam { post_id }): Path<PostIdParam>,
) -> Result<Json<PostResource>> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, true).await?;
    authorize_post(&authorizer, Action::View, post.user_id)?;
    let mut relations = PostRelations::load(conn, std::slice::from_ref(&post)).await?;
    Ok(Json(relations.resource(post, &config.media)))
}

#[cms_derive::route]
#[utoipa::path(
    patch, path = "",
    tags = ["admin", "posts"],
    params(PostIdParam),
    request_body = PostForm,
    responses(
        (status = 200, body = PostResource, description = "The updated post"),
        (status = 403, body = InternalError, description = "Only the author or a team admin can update the post"),
        (status = 404, body = InternalError, description = "No such post in the caller's team"),
        (status = 422, body = InternalError, description = "Invalid changes"),
    )
)]
pub(in crate::views) async fn update(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(PostIdParam { post_id }): Path<PostIdParam>,
    ValidJson(patch): ValidJson<PostPatch>,
) -> Result<Json<PostResource>> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, false).await?;
    authorize_post(&authorizer, Action::Update, post.user_id)?;
    if let Some(slug) = &patch.changeset.slug
        && Post::slug_taken(conn, slug, Some(post.id)).await?
    {
        return Err(slug_taken());
    }

    let post = conn
        .transaction(|mut conn| {
            async move {
                let PostPatch {
                    changeset,
                    categories,
                    tags,
                } = patch;
                let post = Post::update(&mut conn, post.id, changeset)
                    .await
                    .map_err(slug_conflict)?;
                if let Some(categories) = categories {
                    sync_terms(&mut conn, post.id, CATEGORIES, &categories).await?;
                }
                if let Some(tags) = tags {
                    sync_terms(&mut conn, post.id, TAGS, &tags).await?;
                }
                Ok::<_, InternalError>(post)
            }
            .scope_boxed()
        })
        .await?;

    let mut relations = PostRelations::load(conn, std::slice::from_ref(&post)).await?;
    Ok(Json(relations.resource(post, &config.media)))
}

#[cms_derive::route]
#[utoipa::path(
    delete, path = "",
    tags = ["admin", "posts"],
    params(PostIdParam),
    responses(
        (status = 204, description = "The post was moved to the trash"),
        (status = 403, body = InternalError, description = "Only the author or a team admin can delete the post"),
        (status = 404, body = InternalError, description = "No such post in the caller's team"),
    )
)]
pub(in crate::views) async fn delete(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(PostIdParam { post_id }): Path<PostIdParam>,
) -> Result<StatusCode> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, false).await?;
    authorize_post(&authorizer, Action::Delete, post.user_id)?;
    Post::soft_delete(conn, post.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cms_derive::route]
#[utoipa::path(
    post, path = "",
    tags = ["admin", "posts"],
    params(PostIdParam),
    responses(
        (status = 200, body = PostResource, description = "The restored post"),
        (status = 403, body = InternalError, description = "Only the author or a team admin can restore the post"),
        (status = 404, body = InternalError, description = "No such post in the caller's team"),
    )
)]
pub(in crate::views) async fn restore(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(PostIdParam { post_id }): Path<PostIdParam>,
) -> Result<Json<PostResource>> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, true).await?;
    authorize_post(&authorizer, Action::Restore, post.user_id)?;
    if !Post::restore(conn, post.id).await? {
        tracing::debug!(post_id, "post was not in the trash");
    }
    let post = find_post(conn, scope, post_id, false).await?;
    let mut relations = PostRelations::load(conn, std::slice::from_ref(&post)).await?;
    Ok(Json(relations.resource(post, &config.media)))
}

#[cms_derive::route]
#[utoipa::path(
    delete, path = "",
    tags = ["admin", "posts"],
    params(PostIdParam),
    responses(
        (status = 204, description = "The post and its media were deleted"),
        (status = 403, body = InternalError, description = "Only the author or a team admin can delete the post"),
        (status = 404, body = InternalError, description = "No such post in the caller's team"),
    )
)]
pub(in crate::views) async fn force_delete(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(PostIdParam { post_id }): Path<PostIdParam>,
) -> Result<StatusCode> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, true).await?;
    authorize_post(&authorizer, Action::ForceDelete, post.user_id)?;
    let media = Media::for_posts(conn, &[post.id]).await?;
    Post::force_delete(conn, post.id).await?;
    for media in media {
        config.media.remove(media.id).await?;
    }
    tracing::info!(post_id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cms_derive::route]
#[utoipa::path(
    post, path = "",
    tags = ["admin", "posts", "media"],
    params(
        ("post_id" = i64, Path, description = "Id of the post"),
        ("media" = MediaCollection, Path, description = "Collection the image is added to"),
    ),
    request_body(content = MediaUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, body = MediaResource, description = "The stored image, the featured image is replaced"),
        (status = 404, body = InternalError, description = "No such post or collection"),
        (status = 422, body = InternalError, description = "The file is not a jpeg, png or webp image"),
    )
)]
pub(in crate::views) async fn upload_media(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path((post_id, collection)): Path<(i64, String)>,
    form: Multipart,
) -> Result<(StatusCode, Json<MediaResource>)> {
    let collection: MediaCollection = collection
        .parse()
        .map_err(|_| AdminPostError::UnknownCollection { collection })?;
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, false).await?;
    authorize_post(&authorizer, Action::Update, post.user_id)?;

    let MultipartFile {
        file_name,
        content_type,
        data,
    } = read_upload(form).await.map_err(AdminPostError::from)?;
    let upload = decode_upload(&file_name, content_type.as_deref(), data)?;

    if collection.is_single_file() {
        for replaced in Media::clear_collection(conn, post.id, collection).await? {
            config.media.remove(replaced.id).await?;
        }
    }
    let media = Media::create(
        conn,
        NewMedia {
            post_id: post.id,
            collection,
            file_name: upload.file_name.clone(),
            mime_type: upload.mime_type().to_owned(),
            size: i64::try_from(upload.data.len()).unwrap_or(i64::MAX),
        },
    )
    .await?;
    if let Err(error) = config.media.store(media.id, &upload).await {
        Media::delete(conn, media.id).await?;
        return Err(error.into());
    }

    Ok((
        StatusCode::CREATED,
        Json(MediaResource {
            urls: config.media.urls(&media),
            id: media.id,
            collection: media.collection,
            file_name: media.file_name,
            mime_type: media.mime_type,
            size: media.size,
        }),
    ))
}

#[cms_derive::route]
#[utoipa::path(
    delete, path = "",
    tags = ["admin", "posts", "media"],
    params(
        ("post_id" = i64, Path, description = "Id of the post"),
        ("media" = i64, Path, description = "Id of the media"),
    ),
    responses(
        (status = 204, description = "The image and its conversions were deleted"),
        (status = 404, body = InternalError, description = "No such post or media"),
    )
)]
pub(in crate::views) async fn delete_media(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path((post_id, media_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = find_post(conn, scope, post_id, false).await?;
    authorize_post(&authorizer, Action::Update, post.user_id)?;
    let media = Media::retrieve(conn, post.id, media_id)
        .await?
        .ok_or(PostError::MediaNotFound { post_id, media_id })?;
    Media::delete(conn, media.id).await?;
    config.media.remove(media.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
