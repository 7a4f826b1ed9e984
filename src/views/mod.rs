mod admin;
mod api;
mod openapi;
pub mod pagination;
mod resources;
mod router;
pub mod validation;

#[cfg(test)]
mod test_app;

use std::sync::Arc;

use ::authz::Ability;
use ::authz::Authorizer;
use ::authz::StorageDriver;
use axum::Router;
use axum::ServiceExt;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRef;
use axum::extract::Json;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::headers::Authorization as AuthorizationHeader;
use axum_extra::headers::HeaderMapExt as _;
use axum_extra::headers::authorization::Bearer;
use axum_tracing_opentelemetry::middleware::OtelAxumLayer;
use chrono::Duration;
use cms_derive::CmsError;
use cms_models::ApiToken;
use common::Version;
use database::DbConnectionPoolV2;
use database::db_connection_pool::DatabasePoolError;
use database::db_connection_pool::ping_database;
use strum::IntoEnumIterator as _;
use subtle::ConstantTimeEq as _;
use thiserror::Error;
use tokio::time::timeout;
use tower::Layer as _;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePath;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::Instrument as _;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

pub use openapi::OpenApiRoot;

use crate::error::Result;
use crate::media::MediaConfig;
use crate::models::PgAuthDriver;

/// Header set by the authenticating gateway, holds the email of the session user.
/// Ignored unless [ServerConfig::trust_gateway_identity] is set.
const IDENTITY_HEADER: &str = "x-remote-user-identity";

/// Paths served to unauthenticated callers
const PUBLIC_PATHS: &[&str] = &["/health", "/version"];

fn service_router() -> router::DocumentedRouter {
    use router::delete;
    use router::get;
    use router::patch;
    use router::post;
    use router::put;

    // Ordering: toplevel sections, then for each sub router its routes first
    // and its nested routers second, paths sorted by number of segments.
    router::DocumentedRouter::root(|path| {
        path
            .route("/health", get!(health))
            .route("/version", get!(version))

            // public API
            .nest("/api", |path| {
                path.route("/user", get!(api::user::show))
                    .nest("/posts", |path| {
                        path.route("/", get!(api::posts::list))
                            .route("/{slug}", get!(api::posts::show))
                    })
            })

            // admin panel
            .nest("/admin", |path| {
                path.route("/dashboard", get!(admin::dashboard::widgets))
                    .nest("/posts", |path| {
                        path.route("/", get!(admin::posts::list))
                            .route("/", post!(admin::posts::create))
                            .route("/{post_id}", get!(admin::posts::show))
                            .route("/{post_id}", patch!(admin::posts::update))
                            .route("/{post_id}", delete!(admin::posts::delete))
                            .route("/{post_id}/force", delete!(admin::posts::force_delete))
                            .route("/{post_id}/restore", post!(admin::posts::restore))
                            .route("/{post_id}/media/{media}", post!(admin::posts::upload_media))
                            .route("/{post_id}/media/{media}", delete!(admin::posts::delete_media))
                    })
                    .nest("/users", |path| {
                        path.route("/", get!(admin::users::list))
                            .route("/", post!(admin::users::create))
                            .route("/{user_id}", get!(admin::users::show))
                            .route("/{user_id}", patch!(admin::users::update))
                            .route("/{user_id}", delete!(admin::users::delete))
                    })
                    .nest("/teams", |path| {
                        path.route("/", get!(admin::teams::list))
                            .route("/current", put!(admin::teams::switch))
                    })
            })
    })
}

/// Represents the bundle of information about the issuer of a request
/// that can be extracted from recognized headers.
#[derive(Debug, Clone)]
pub enum Authentication {
    /// The issuer of the request did not provide any valid credential
    Unauthenticated,
    /// The issuer of the request is a session user or the owner of an API token
    Authenticated(Authorizer),
}

impl Authentication {
    /// Returns the underlying authorizer if the request is authenticated, otherwise
    /// returns an error.
    fn authorizer(self) -> Result<Authorizer, AuthorizationError> {
        match self {
            Authentication::Authenticated(authorizer) => Ok(authorizer),
            Authentication::Unauthenticated => Err(AuthorizationError::Unauthorized),
        }
    }
}

pub type AuthenticationExt = axum::extract::Extension<Authentication>;

fn is_shared_secret(config: &ServerConfig, token: &str) -> bool {
    config
        .app_token
        .as_deref()
        .is_some_and(|secret| bool::from(secret.as_bytes().ct_eq(token.as_bytes())))
}

/// Resolves a bearer token to its owner and the abilities it grants
///
/// The shared secret grants every ability to its fallback user. The connection is
/// released before returning, the authorizer needs its own.
async fn bearer_owner(
    config: &ServerConfig,
    db_pool: &DbConnectionPoolV2,
    token: &str,
) -> Result<Option<(i64, Vec<Ability>)>, AuthorizationError> {
    let mut conn = db_pool.get().await?;
    if let Some(api_token) = ApiToken::find_by_bearer(&mut conn, token).await? {
        ApiToken::touch_last_used(&mut conn, api_token.id).await?;
        let abilities = api_token.granted_abilities().collect();
        return Ok(Some((api_token.user_id, abilities)));
    }
    if !is_shared_secret(config, token) {
        debug!("bearer token matches no API token");
        return Ok(None);
    }
    match cms_models::User::retrieve_by_email(&mut conn, &config.app_token_user).await? {
        Some(user) => Ok(Some((user.id, Ability::iter().collect()))),
        None => {
            warn!(
                email = %config.app_token_user,
                "APP_TOKEN is valid but its fallback user does not exist"
            );
            Ok(None)
        }
    }
}

/// Authenticates a request by, in order:
///
/// 1. the session user designated by the gateway header, when the gateway is trusted,
/// 2. a personal API token, restricted to its abilities,
/// 3. the shared `APP_TOKEN` secret, as the configured fallback user.
async fn authenticate(
    config: &ServerConfig,
    headers: &HeaderMap,
    regulator: &Regulator,
    db_pool: &DbConnectionPoolV2,
) -> Result<Authentication, AuthorizationError> {
    let identity = headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok());
    match identity {
        Some(identity) if config.trust_gateway_identity => {
            match Authorizer::try_initialize(identity.to_owned(), regulator).await {
                Ok(authorizer) => return Ok(Authentication::Authenticated(authorizer)),
                Err(AuthorizerError::UnknownUser { identity }) => {
                    debug!(identity, "unknown session user, falling back to bearer tokens");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Some(_) => debug!("gateway identity header ignored, the gateway is not trusted"),
        None => (),
    }

    let Some(AuthorizationHeader(bearer)) = headers.typed_get::<AuthorizationHeader<Bearer>>()
    else {
        return Ok(Authentication::Unauthenticated);
    };
    let Some((user_id, abilities)) = bearer_owner(config, db_pool, bearer.token()).await? else {
        return Ok(Authentication::Unauthenticated);
    };
    let authorizer = Authorizer::try_initialize_by_id(user_id, regulator)
        .await?
        .restricted_to(abilities);
    Ok(Authentication::Authenticated(authorizer))
}

async fn authentication_middleware(
    State(AppState {
        regulator,
        config,
        db_pool,
    }): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let authentication = authenticate(&config, req.headers(), &regulator, &db_pool).await?;
    if matches!(authentication, Authentication::Unauthenticated)
        && !PUBLIC_PATHS.contains(&req.uri().path())
    {
        return Err(AuthorizationError::Unauthorized.into());
    }
    req.extensions_mut().insert(authentication);
    Ok(next.run(req).await)
}

pub type AuthorizerError = ::authz::Error<<PgAuthDriver as StorageDriver>::Error>;

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "authz")]
pub enum AuthorizationError {
    #[error("Unauthenticated: a session or a valid API token is required")]
    #[cms_error(status = 401)]
    Unauthorized,
    #[error("Forbidden: insufficient privileges")]
    #[cms_error(status = 403)]
    Forbidden,
    #[error(transparent)]
    #[cms_error(status = 500)]
    AuthError(#[from] AuthorizerError),
    #[error(transparent)]
    #[cms_error(status = 500)]
    DbError(#[from] DatabasePoolError),
    #[error(transparent)]
    #[cms_error(status = 500)]
    Model(#[from] cms_models::Error),
}

#[derive(Debug, Error, CmsError)]
#[cms_error(base_id = "app_health")]
pub enum AppHealthError {
    #[error("Timeout error")]
    Timeout,
    #[error(transparent)]
    Database(#[from] database::db_connection_pool::PingError),
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    responses(
        (status = 200, description = "Check if the service is running correctly", body = String)
    )
)]
async fn health(
    State(AppState {
        db_pool, config, ..
    }): State<AppState>,
) -> Result<&'static str> {
    timeout(
        config.health_check_timeout.to_std().unwrap_or_default(),
        check_health(db_pool),
    )
    .await
    .map_err(|_| AppHealthError::Timeout)??;
    Ok("ok")
}

pub async fn check_health(db_pool: Arc<DbConnectionPoolV2>) -> Result<()> {
    let mut db_connection = db_pool.get().await?;
    ping_database(&mut db_connection)
        .await
        .map_err(AppHealthError::Database)?;
    Ok(())
}

#[cms_derive::route]
#[utoipa::path(
    get, path = "",
    responses(
        (status = 200, description = "Return the service version", body = Version),
    ),
)]
pub(in crate::views) async fn version(
    State(AppState { config, .. }): State<AppState>,
) -> Json<Version> {
    Json(Version::new(config.app_version.clone()))
}

#[derive(Clone)]
pub struct PostgresConfig {
    pub database_url: Url,
    pub pool_size: usize,
}

pub struct ServerConfig {
    pub port: u16,
    pub address: String,
    pub health_check_timeout: Duration,
    pub postgres_config: PostgresConfig,
    pub app_version: Option<String>,
    /// Enables the team switcher and the per role statistics
    pub teams_enabled: bool,
    /// Shared secret accepted as a bearer token
    pub app_token: Option<String>,
    /// Email of the user the shared secret authenticates as, when no API token matches it
    pub app_token_user: String,
    /// Accept the session user designated by the gateway identity header.
    /// Only safe when every request goes through a gateway that sets it.
    pub trust_gateway_identity: bool,
    pub media: MediaConfig,
    pub allowed_origin: Option<String>,
}

pub struct Server {
    app_state: AppState,
    router: NormalizePath<Router>,
}

pub type Regulator = ::authz::Regulator<PgAuthDriver>;

/// The state of the whole service, available to all handlers
///
/// If only the database is needed, use `State<Arc<DbConnectionPoolV2>>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db_pool: Arc<DbConnectionPoolV2>,
    pub regulator: Regulator,
}

impl FromRef<AppState> for Arc<DbConnectionPoolV2> {
    fn from_ref(input: &AppState) -> Self {
        input.db_pool.clone()
    }
}

impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(input: &AppState) -> Self {
        input.config.clone()
    }
}

impl AppState {
    #[tracing::instrument(skip_all, level = "info", err, name = "AppState initialization")]
    async fn init(config: ServerConfig) -> anyhow::Result<Self> {
        #[tracing::instrument(skip_all, level = "info", err, name = "PostgreSQL connection")]
        async fn connect_db(
            PostgresConfig {
                database_url,
                pool_size,
            }: PostgresConfig,
        ) -> anyhow::Result<Arc<DbConnectionPoolV2>> {
            let pool = DbConnectionPoolV2::try_initialize(database_url, pool_size).await?;
            Ok(Arc::new(pool))
        }
        let db_pool = connect_db(config.postgres_config.clone()).await?;

        tokio::fs::create_dir_all(&config.media.root).await?;
        info!(root = %config.media.root.display(), url = %config.media.base_url, "media storage ready");

        Ok(Self {
            regulator: Regulator::new(PgAuthDriver::new(db_pool.clone())),
            db_pool,
            config: Arc::new(config),
        })
    }
}

fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    Ok(match allowed_origin {
        Some(origin) => cors.allow_origin(origin.parse::<axum::http::header::HeaderValue>()?),
        None => cors.allow_origin(Any),
    })
}

/// Builds the whole service: documented routes behind the authentication
/// middleware, and the media files served as is
fn app(app_state: AppState) -> anyhow::Result<NormalizePath<Router>> {
    let router =
        tracing::debug_span!("router initialization").in_scope(|| service_router().router);

    // Uploads are bounded by the body limit layer, not axum's default extractor limit
    let request_payload_limit = RequestBodyLimitLayer::new(20 * 1024 * 1024); // 20MiB

    let media_path = app_state.config.media.base_url.path().trim_end_matches('/').to_owned();
    let media_files = ServeDir::new(&app_state.config.media.root);

    let router: Router<()> = axum::Router::<AppState>::new()
        .merge(router)
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            authentication_middleware,
        ))
        .nest_service(
            if media_path.is_empty() {
                "/media"
            } else {
                media_path.as_str()
            },
            media_files,
        )
        .layer(OtelAxumLayer::default())
        .layer(DefaultBodyLimit::disable())
        .layer(request_payload_limit)
        .layer(cors_layer(app_state.config.allowed_origin.as_deref())?)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);
    Ok(NormalizePathLayer::trim_trailing_slash().layer(router))
}

impl Server {
    #[tracing::instrument(skip_all, err, level = "info", name = "server initialization")]
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        info!("Building server...");
        let app_state = AppState::init(config).in_current_span().await?;
        let router = app(app_state.clone())?;
        Ok(Self { app_state, router })
    }

    pub async fn start(self) -> std::io::Result<()> {
        let Self { app_state, router } = self;
        let ServerConfig {
            address,
            port,
            teams_enabled,
            app_token,
            ..
        } = app_state.config.as_ref();

        if app_token.is_none() {
            warn!("APP_TOKEN is not set, only sessions and personal API tokens are accepted");
        }
        info!(teams_enabled, "Running server on {address}:{port}...");
        let service = ServiceExt::<axum::extract::Request>::into_make_service(router);
        let listener = tokio::net::TcpListener::bind((address.as_str(), *port)).await?;
        axum::serve(listener, service).await
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderName;
    use axum::http::HeaderValue;
    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    use super::test_app::TestAppBuilder;
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn version() {
        let app = TestAppBuilder::default_app();
        let request = app.get("/version");
        let response: Value = app.fetch(request).await.assert_status(StatusCode::OK).json_into();
        assert!(response.get("git_describe").is_some());
        assert_eq!(response["package_version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn anonymous_api_requests_are_rejected_before_the_handler() {
        let app = TestAppBuilder::default_app();
        for path in ["/api/posts", "/api/posts/hello-world", "/api/user", "/admin/posts"] {
            let response: Value = app
                .fetch(app.get(path))
                .await
                .assert_status(StatusCode::UNAUTHORIZED)
                .json_into();
            assert_eq!(response["type"], "cms:authz:Unauthorized");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn non_bearer_authorization_is_unauthenticated() {
        let app = TestAppBuilder::default_app();
        let request = app.get("/api/posts").add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Basic YWxpY2U6c2VjcmV0"),
        );
        app.fetch(request).await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn media_files_are_served_without_authentication() {
        let media_root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(media_root.path().join("7")).unwrap();
        std::fs::write(media_root.path().join("7/cover.png"), b"png bytes").unwrap();
        let app = TestAppBuilder::new()
            .media_root(media_root.path().to_owned())
            .build();
        assert_eq!(app.config().media.root, media_root.path());

        let response = app
            .fetch(app.get("/media/7/cover.png"))
            .await
            .assert_status(StatusCode::OK);
        assert_eq!(response.content_type(), "image/png");
        assert_eq!(response.bytes(), b"png bytes");
        app.fetch(app.get("/media/7/missing.png"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn gateway_identity_is_ignored_unless_trusted() {
        let app = TestAppBuilder::default_app();
        assert!(!app.config().trust_gateway_identity);
        let request = app.get("/api/user").add_header(
            HeaderName::from_static(IDENTITY_HEADER),
            HeaderValue::from_static("hola@humano.app"),
        );
        app.fetch(request).await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn trusted_gateway_identity_authenticates() {
        let Some(app) = TestAppBuilder::new()
            .trust_gateway_identity()
            .with_database()
            .await
        else {
            return;
        };
        let admin = app.create_team_admin().await;
        let request = app.get("/api/user").add_header(
            HeaderName::from_static(IDENTITY_HEADER),
            HeaderValue::from_str(&admin.email).unwrap(),
        );
        let user: Value = app.fetch(request).await.assert_status(StatusCode::OK).json_into();
        assert_eq!(user["id"], admin.id);
        assert_eq!(user["current_team_id"], admin.team_id);
    }

    /// The test pool holds two connections, each request must never need more than one at once
    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn concurrent_requests_do_not_exhaust_the_pool() {
        let Some(app) = TestAppBuilder::new().with_database().await else {
            return;
        };
        let admin = app.create_team_admin().await;
        let request = || admin.authenticate(app.get("/admin/posts"));
        let responses = tokio::time::timeout(std::time::Duration::from_secs(30), async {
            tokio::join!(
                app.fetch(request()),
                app.fetch(request()),
                app.fetch(request()),
                app.fetch(request()),
            )
        })
        .await
        .expect("requests should not wait on each other's connections");
        for response in [responses.0, responses.1, responses.2, responses.3] {
            response.assert_status(StatusCode::OK);
        }
    }

    #[test]
    fn shared_secret_comparison() {
        let config = test_app::server_config(Some("42|s3cr3t".to_owned()));
        assert!(is_shared_secret(&config, "42|s3cr3t"));
        assert!(!is_shared_secret(&config, "42|s3cr3"));
        assert!(!is_shared_secret(&config, ""));
        let without_secret = test_app::server_config(None);
        assert!(!is_shared_secret(&without_secret, ""));
    }

    #[test]
    fn cors_origin_must_be_a_header_value() {
        assert!(cors_layer(Some("https://cms.example.com")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
        assert!(cors_layer(None).is_ok());
    }
}
