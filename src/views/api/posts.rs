use authz::Action;
use axum::Extension;
use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use cms_models::Post;
use cms_models::PostStatus;
use cms_models::Page;
use cms_models::TeamScope;
use cms_models::post::PostFilters;
use cms_models::post::PostSearch;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::InternalError;
use crate::error::Result;
use crate::views::AppState;
use crate::views::AuthenticationExt;
use crate::views::pagination::PaginationQueryParams;
use crate::views::pagination::PaginationStats;
use crate::views::resources::PostError;
use crate::views::resources::PostPage;
use crate::views::resources::PostRelations;
use crate::views::resources::PostResource;
use crate::views::validation::FieldErrors;
use crate::views::validation::Validate;
use crate::views::validation::ValidQuery;
use crate::views::validation::ValidationError;
use crate::views::validation::present;

pub(in crate::views) const STATUSES: &[&str] = &["draft", "published", "archived"];
const MAX_FILTER_LENGTH: usize = 255;

/// Filters of the post listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(in crate::views) struct PostListParams {
    /// Only the posts with this status
    #[param(value_type = Option<PostStatus>, default = "published")]
    status: Option<String>,
    /// Only the posts in the category with this name
    #[param(max_length = 255)]
    category: Option<String>,
    /// Only the posts with a tag of this name
    #[param(max_length = 255)]
    tag: Option<String>,
    /// Text contained in the title, the excerpt or the content
    #[param(max_length = 255)]
    search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(in crate::views) struct RawPostListQuery {
    #[serde(flatten)]
    params: PostListParams,
    #[serde(flatten)]
    pagination: PaginationQueryParams,
}

#[derive(Debug, PartialEq)]
pub(in crate::views) struct PostListRequest {
    filters: PostFilters,
    page: Page,
}

impl Validate for PostListRequest {
    type Raw = RawPostListQuery;

    fn validate(
        RawPostListQuery { params, pagination }: RawPostListQuery,
    ) -> Result<Self, ValidationError> {
        let mut errors = FieldErrors::default();
        let status = errors
            .one_of("status", present(&params.status), STATUSES)
            .unwrap_or(PostStatus::Published);
        let category = present(&params.category);
        let tag = present(&params.tag);
        let search = present(&params.search);
        errors.max_length("category", category, MAX_FILTER_LENGTH);
        errors.max_length("tag", tag, MAX_FILTER_LENGTH);
        errors.max_length("search", search, MAX_FILTER_LENGTH);
        let page = pagination.validate(&mut errors);
        errors.check(PostListRequest {
            filters: PostFilters {
                status: Some(status),
                category: category.map(ToOwned::to_owned),
                tag: tag.map(ToOwned::to_owned),
                search: search.map(|text| PostSearch::Content(text.to_owned())),
                ..Default::default()
            },
            page,
        })
    }
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["api"],
    params(PostListParams, PaginationQueryParams),
    responses(
        (status = 200, body = PostPage, description = "Posts of the caller's team, most recently published first"),
        (status = 422, body = InternalError, description = "Invalid query parameters"),
    )
)]
pub(in crate::views) async fn list(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    ValidQuery(PostListRequest { filters, page }): ValidQuery<PostListRequest>,
) -> Result<Json<PostPage>> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let (posts, count) = Post::list(conn, scope, &filters, page).await?;
    let results = PostRelations::resources(conn, posts, &config.media).await?;
    Ok(Json(PostPage {
        results,
        stats: PaginationStats::new(count, page),
    }))
}

/// Published posts are visible to anyone, the others only to the callers allowed to list every post
fn visible(post: Option<Post>, can_view_any: bool) -> Option<Post> {
    post.filter(|post| post.is_published() || can_view_any)
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    tags = ["api"],
    params(("slug" = String, Path, description = "Slug of the post")),
    responses(
        (status = 200, body = PostResource, description = "The post"),
        (status = 404, body = InternalError, description = "No visible post has this slug in the caller's team"),
    )
)]
pub(in crate::views) async fn show(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
    Extension(auth): AuthenticationExt,
    Path(slug): Path<String>,
) -> Result<Json<PostResource>> {
    let authorizer = auth.authorizer()?;
    let scope = TeamScope::for_caller(authorizer.current_team_id());
    let conn = &mut db_pool.get().await?;
    let post = Post::retrieve_by_slug(conn, scope, &slug).await?;
    let can_view_any = match &post {
        Some(post) if !post.is_published() => !authorizer
            .authorize_post(Action::ViewAny, post.user_id)
            .denied(),
        _ => true,
    };
    let post = visible(post, can_view_any).ok_or_else(|| PostError::not_found(&slug))?;
    let mut relations = PostRelations::load(conn, std::slice::from_ref(&post)).await?;
    Ok(Json(relations.resource(post, &config.media)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    // deserialized the way the Query extractor does
    fn raw(query: &str) -> RawPostListQuery {
        let uri: axum::http::Uri = format!("/api/posts?{query}").parse().unwrap();
        axum::extract::Query::<RawPostListQuery>::try_from_uri(&uri)
            .unwrap()
            .0
    }

    fn post(status: PostStatus) -> Post {
        Post {
            id: 1,
            user_id: 1,
            team_id: Some(1),
            title: "Draft".to_owned(),
            slug: "draft".to_owned(),
            excerpt: None,
            content: None,
            status,
            published_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn listing_defaults_to_published_posts() {
        let request = PostListRequest::validate(raw("")).unwrap();
        assert_eq!(
            request,
            PostListRequest {
                filters: PostFilters {
                    status: Some(PostStatus::Published),
                    ..Default::default()
                },
                page: Page::new(1, 15),
            }
        );
    }

    #[test]
    fn listing_filters() {
        let request =
            PostListRequest::validate(raw("status=draft&category=News&tag=rust&search=async&page=2&per_page=5"))
                .unwrap();
        assert_eq!(request.filters.status, Some(PostStatus::Draft));
        assert_eq!(request.filters.category.as_deref(), Some("News"));
        assert_eq!(request.filters.tag.as_deref(), Some("rust"));
        assert_eq!(
            request.filters.search,
            Some(PostSearch::Content("async".to_owned()))
        );
        assert_eq!(request.page, Page::new(2, 5));
    }

    #[rstest]
    #[case::unknown_status("status=deleted", "status")]
    #[case::long_category(&format!("category={}", "a".repeat(256)), "category")]
    #[case::long_search(&format!("search={}", "a".repeat(256)), "search")]
    #[case::per_page_too_large("per_page=101", "per_page")]
    #[case::page_zero("page=0", "page")]
    fn invalid_listing_parameters(#[case] query: &str, #[case] field: &str) {
        let Err(ValidationError::Invalid { fields }) = PostListRequest::validate(raw(query)) else {
            panic!("{query} should be rejected");
        };
        assert!(fields.get(field).is_some(), "{field} not reported: {fields:?}");
    }

    #[test]
    fn drafts_are_hidden_without_view_any() {
        assert_eq!(visible(Some(post(PostStatus::Draft)), false), None);
        let draft = visible(Some(post(PostStatus::Draft)), true).expect("view any shows drafts");
        assert_eq!(draft.slug, "draft");
        assert!(visible(Some(post(PostStatus::Published)), false).is_some());
        assert!(visible(Some(post(PostStatus::Archived)), false).is_none());
        assert_eq!(visible(None, true), None);
    }

    mod with_database {
        use authz::Role;
        use axum::http::StatusCode;
        use pretty_assertions::assert_eq;
        use serde_json::Value;
        use serde_json::json;

        use crate::views::test_app::TestApp;
        use crate::views::test_app::TestAppBuilder;
        use crate::views::test_app::TestUser;
        use crate::views::test_app::unique;

        async fn create_post(app: &TestApp, user: &TestUser, mut body: Value) -> Value {
            body["title"] = json!(unique("Post"));
            let request = user.authenticate(app.post("/admin/posts")).json(&body);
            app.fetch(request)
                .await
                .assert_status(StatusCode::CREATED)
                .json_into()
        }

        async fn list(app: &TestApp, user: &TestUser, query: &[(&str, &str)]) -> Vec<String> {
            let mut request = user.authenticate(app.get("/api/posts"));
            for (key, value) in query {
                request = request.add_query_param(key, value);
            }
            let page: Value = app.fetch(request).await.assert_status(StatusCode::OK).json_into();
            page["results"]
                .as_array()
                .expect("results are a list")
                .iter()
                .map(|post| post["slug"].as_str().unwrap_or_default().to_owned())
                .collect()
        }

        fn slug(post: &Value) -> String {
            post["slug"].as_str().unwrap_or_default().to_owned()
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn category_filter_finds_the_created_post() {
            let Some(app) = TestAppBuilder::new().with_database().await else {
                return;
            };
            let admin = app.create_team_admin().await;
            let filed = create_post(
                &app,
                &admin,
                json!({"status": "published", "categories": ["Foo"]}),
            )
            .await;
            create_post(&app, &admin, json!({"status": "published", "tags": ["Foo"]})).await;
            assert_eq!(filed["categories"][0]["name"], "Foo");

            assert_eq!(list(&app, &admin, &[("category", "Foo")]).await, vec![slug(&filed)]);
            assert!(list(&app, &admin, &[("category", "Bar")]).await.is_empty());
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn tag_filter_matches_tags_of_any_type() {
            let Some(app) = TestAppBuilder::new().with_database().await else {
                return;
            };
            let admin = app.create_team_admin().await;
            let rust = create_post(&app, &admin, json!({"status": "published", "tags": ["X"]})).await;
            let category = create_post(
                &app,
                &admin,
                json!({"status": "published", "categories": ["X"]}),
            )
            .await;
            create_post(&app, &admin, json!({"status": "published", "tags": ["Y"]})).await;

            let mut found = list(&app, &admin, &[("tag", "X")]).await;
            found.sort();
            let mut expected = vec![slug(&rust), slug(&category)];
            expected.sort();
            assert_eq!(found, expected);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn only_published_posts_are_listed_by_default() {
            let Some(app) = TestAppBuilder::new().with_database().await else {
                return;
            };
            let admin = app.create_team_admin().await;
            let undated = create_post(
                &app,
                &admin,
                json!({"status": "published", "published_at": null}),
            )
            .await;
            let older = create_post(
                &app,
                &admin,
                json!({"status": "published", "published_at": "2020-01-01T00:00:00Z"}),
            )
            .await;
            let recent = create_post(&app, &admin, json!({"status": "published"})).await;
            let draft = create_post(&app, &admin, json!({"status": "draft"})).await;

            // most recent first, the posts without publication date last
            assert_eq!(
                list(&app, &admin, &[]).await,
                vec![slug(&recent), slug(&older), slug(&undated)]
            );
            assert_eq!(list(&app, &admin, &[("status", "draft")]).await, vec![slug(&draft)]);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn drafts_are_shown_to_callers_allowed_to_list_posts() {
            let Some(app) = TestAppBuilder::new().with_database().await else {
                return;
            };
            let admin = app.create_team_admin().await;
            let reader = app
                .add_team_member(admin.team_id, Role::Member, &["read"])
                .await;
            let writer = app
                .add_team_member(admin.team_id, Role::Member, &["create"])
                .await;
            let draft = create_post(&app, &admin, json!({"status": "draft"})).await;
            let published = create_post(&app, &admin, json!({"status": "published"})).await;
            let draft_path = format!("/api/posts/{}", slug(&draft));

            let shown: Value = app
                .fetch(reader.authenticate(app.get(&draft_path)))
                .await
                .assert_status(StatusCode::OK)
                .json_into();
            assert_eq!(shown["status"], "draft");
            app.fetch(writer.authenticate(app.get(&draft_path)))
                .await
                .assert_status(StatusCode::NOT_FOUND);
            app.fetch(writer.authenticate(app.get(&format!("/api/posts/{}", slug(&published)))))
                .await
                .assert_status(StatusCode::OK);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
        async fn search_ignores_case_and_takes_wildcards_literally() {
            let Some(app) = TestAppBuilder::new().with_database().await else {
                return;
            };
            let admin = app.create_team_admin().await;
            let greeting = create_post(
                &app,
                &admin,
                json!({"status": "published", "content": "Hello World, 100% sure"}),
            )
            .await;
            create_post(
                &app,
                &admin,
                json!({"status": "published", "content": "1000 reasons"}),
            )
            .await;

            assert_eq!(
                list(&app, &admin, &[("search", "hello world")]).await,
                vec![slug(&greeting)]
            );
            assert_eq!(list(&app, &admin, &[("search", "100%")]).await, vec![slug(&greeting)]);
            assert!(list(&app, &admin, &[("search", "1_0")]).await.is_empty());
        }
    }
}
