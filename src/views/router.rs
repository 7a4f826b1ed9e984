//! An axum router that keeps the OpenAPI documentation of its routes
//!
//! Handlers annotated with `#[cms_derive::route]` register a lookup function in
//! [OPENAPI_ROUTES]. When a route is added to a [DocumentedRouter], its handler
//! documentation is found by type name, which guarantees that every served
//! route is documented, with the HTTP method it is served with.

use utoipa::openapi::HttpMethod;
use utoipa::openapi::RefOr;
use utoipa::openapi::path::Operation;
use utoipa::openapi::schema::Schema;

pub(super) struct RouteDocumentation {
    pub(super) http_methods: Vec<HttpMethod>,
    pub(super) operation: Operation,
    pub(super) tags: Vec<&'static str>,
    pub(super) schemas: Vec<(String, RefOr<Schema>)>,
}

// fn(handler_type_name) -> documentation of that handler, if it's the one
//
// std::any::type_name_of_val isn't const, so the registry can't be keyed by
// type name: routes are matched by a linear scan of the registry.
pub(in crate::views) type OpenApiRouteSliceItem = fn(&str) -> Option<fn() -> RouteDocumentation>;

#[linkme::distributed_slice]
pub(in crate::views) static OPENAPI_ROUTES: [OpenApiRouteSliceItem];

/// A served route and its documentation
pub(super) struct DocumentedRoute {
    /// Full path of the route, from the root of the router
    pub(super) path: String,
    pub(super) documentation: fn() -> RouteDocumentation,
}

impl DocumentedRoute {
    pub(super) fn path_item(&self) -> (utoipa::openapi::PathItem, Vec<(String, RefOr<Schema>)>) {
        let RouteDocumentation {
            http_methods,
            mut operation,
            tags,
            schemas,
        } = (self.documentation)();
        // utoipa 5 keeps the tags apart from the operation
        if !tags.is_empty() {
            operation.tags = Some(tags.iter().map(|tag| tag.to_string()).collect());
        }
        (
            utoipa::openapi::PathItem::from_http_methods(http_methods, operation),
            schemas,
        )
    }
}

#[derive(Default)]
pub(super) struct DocumentedRouter {
    pub(super) router: axum::Router<super::AppState>,
    pub(super) routes: Vec<DocumentedRoute>,
}

fn join_paths(prefix: &str, path: &str) -> String {
    let joined = format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/'));
    match joined.trim_end_matches('/') {
        "" => "/".to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

impl DocumentedRouter {
    pub(super) fn root(f: impl FnOnce(Self) -> Self) -> Self {
        f(Self::default())
    }

    #[track_caller] // panic at the line of the faulty route
    pub(super) fn route(
        mut self,
        path: &'static str,
        (type_name, method_router, expected_method): (
            &str,
            axum::routing::MethodRouter<super::AppState>,
            HttpMethod,
        ),
    ) -> Self {
        let Some(documentation) = OPENAPI_ROUTES.iter().find_map(|matcher| matcher(type_name))
        else {
            panic!("no openapi documentation found for route {path} served by {type_name}");
        };
        let RouteDocumentation { http_methods, .. } = documentation();
        if !http_methods.contains(&expected_method) {
            // HttpMethod is only Debug with utoipa's "debug" feature
            let served = serde_json::to_string(&expected_method).unwrap_or_default();
            let documented = serde_json::to_string(&http_methods).unwrap_or_default();
            panic!("route \"{path}\" is served with {served} but documented with {documented}");
        }
        self.routes.push(DocumentedRoute {
            path: join_paths("", path),
            documentation,
        });
        Self {
            router: self.router.route(path, method_router),
            routes: self.routes,
        }
    }

    pub(super) fn nest(mut self, prefix: &'static str, f: impl FnOnce(Self) -> Self) -> Self {
        let Self { router, routes } = f(Self::default());
        self.routes
            .extend(routes.into_iter().map(|route| DocumentedRoute {
                path: join_paths(prefix, &route.path),
                ..route
            }));
        Self {
            router: self.router.nest(prefix, router),
            routes: self.routes,
        }
    }
}

macro_rules! handler_route {
    ($method:ident, $documented:ident, $f:path) => {
        (
            std::any::type_name_of_val(&$f),
            axum::routing::$method($f),
            utoipa::openapi::HttpMethod::$documented,
        )
    };
}

macro_rules! get {
    ($f:path) => {
        $crate::views::router::handler_route!(get, Get, $f)
    };
}

macro_rules! post {
    ($f:path) => {
        $crate::views::router::handler_route!(post, Post, $f)
    };
}

macro_rules! put {
    ($f:path) => {
        $crate::views::router::handler_route!(put, Put, $f)
    };
}

macro_rules! patch {
    ($f:path) => {
        $crate::views::router::handler_route!(patch, Patch, $f)
    };
}

macro_rules! delete {
    ($f:path) => {
        $crate::views::router::handler_route!(delete, Delete, $f)
    };
}

pub(super) use delete;
pub(super) use get;
pub(super) use handler_route;
pub(super) use patch;
pub(super) use post;
pub(super) use put;
