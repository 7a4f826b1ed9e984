use std::collections::BTreeMap;

use itertools::Itertools as _;
use tracing::debug;
use utoipa::OpenApi;
use utoipa::openapi::Components;
use utoipa::openapi::Discriminator;
use utoipa::openapi::ObjectBuilder;
use utoipa::openapi::OneOf;
use utoipa::openapi::PathItem;
use utoipa::openapi::Ref;
use utoipa::openapi::RefOr;
use utoipa::openapi::Schema;
use utoipa::openapi::schema::SchemaType;
use utoipa::openapi::schema::Type;

use crate::error::ErrorDefinition;
use crate::error::InternalError;
use crate::views::service_router;

/// Name of the schema every error of the service is an instance of
const ERROR_SCHEMA: &str = "CmsError";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CMS Core",
        description = "Public API and admin endpoints of the CMS",
        license(name = "LGPL", url = "https://www.gnu.org/licenses/lgpl-3.0.html"),
    ),
    components(schemas(InternalError))
)]
pub struct OpenApiRoot;

fn typed(schema_type: Type) -> ObjectBuilder {
    ObjectBuilder::new().schema_type(SchemaType::Type(schema_type))
}

/// Maps the type names recorded by the error derive to JSON types
fn context_type(type_name: &str) -> Type {
    match type_name {
        "bool" => Type::Boolean,
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            Type::Integer
        }
        "f32" | "f64" => Type::Number,
        "Vec" => Type::Array,
        "char" | "String" | "str" => Type::String,
        _ => Type::Object,
    }
}

fn error_schema(error_def: &ErrorDefinition) -> RefOr<Schema> {
    let context = error_def.get_context();
    // sorted so that the generated document is stable
    let context = context
        .iter()
        .sorted_by_key(|(name, _)| name.as_str())
        .fold(typed(Type::Object), |object, (name, type_name)| {
            object
                .property(name, typed(context_type(type_name)))
                .required(name)
        });
    typed(Type::Object)
        .property("type", typed(Type::String).enum_values(Some([error_def.id])))
        .property("status", typed(Type::Integer).enum_values(Some([error_def.status])))
        .property("message", typed(Type::String))
        .property("context", context)
        .required("type")
        .required("status")
        .required("message")
        .into()
}

impl OpenApiRoot {
    /// Registers every error definition and the `CmsError` union of them all
    fn insert_errors(components: &mut Components) {
        let mut union = OneOf::new();
        union.description = Some("Every error returned by the service".to_owned());
        union.discriminator = Some(Discriminator::new("type"));
        // inventory gives no ordering guarantee
        let definitions = inventory::iter::<ErrorDefinition>
            .into_iter()
            .sorted_by_key(|def| (def.namespace, def.id));
        for error_def in definitions {
            let name = error_def.get_schema_name();
            union
                .items
                .push(Ref::new(format!("#/components/schemas/{name}")).into());
            components.schemas.insert(name, error_schema(error_def));
        }
        components
            .schemas
            .insert(ERROR_SCHEMA.to_owned(), RefOr::T(Schema::OneOf(union)));
    }

    fn collect_paths() -> (BTreeMap<String, PathItem>, Vec<(String, RefOr<Schema>)>) {
        let mut paths = BTreeMap::<String, PathItem>::new();
        let mut schemas = Vec::new();
        for route in service_router().routes {
            debug!(path = route.path, "documenting route");
            let (path_item, route_schemas) = route.path_item();
            schemas.extend(route_schemas);
            match paths.remove(&route.path) {
                Some(mut existing) => {
                    existing.merge_operations(path_item);
                    paths.insert(route.path, existing);
                }
                None => {
                    paths.insert(route.path, path_item);
                }
            }
        }
        (paths, schemas)
    }

    pub fn build_openapi() -> utoipa::openapi::OpenApi {
        let mut openapi = OpenApiRoot::openapi();
        let (paths, schemas) = Self::collect_paths();
        for (path, mut path_item) in paths {
            // handler names are an implementation detail of the server
            for operation in [
                &mut path_item.get,
                &mut path_item.put,
                &mut path_item.post,
                &mut path_item.delete,
                &mut path_item.patch,
            ]
            .into_iter()
            .flatten()
            {
                operation.operation_id = None;
            }
            openapi.paths.paths.insert(path, path_item);
        }
        let components = openapi.components.get_or_insert_with(Default::default);
        for (name, schema) in schemas {
            components.schemas.entry(name).or_insert(schema);
        }
        Self::insert_errors(components);
        openapi
    }
}
