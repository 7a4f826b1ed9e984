mod error;
mod route;

use proc_macro::TokenStream;
use syn::DeriveInput;
use syn::ItemFn;
use syn::parse_macro_input;

/// Implements `crate::error::CmsError` for an error enum
///
/// Every variant is registered as an error definition (via `inventory`) so that
/// the OpenAPI generator can list it.
///
/// # Attributes
///
/// - `#[cms_error(base_id = "posts")]` on the enum (mandatory): the error types are
///   `cms:<base_id>:<Variant>`
/// - `#[cms_error(default_status = 400)]` on the enum: status of the variants that
///   don't specify one (defaults to 500)
/// - `#[cms_error(status = 404)]` on a variant
///
/// Named fields of a variant end up in the `context` of the serialized error, they
/// must therefore implement `serde::Serialize`.
#[proc_macro_derive(CmsError, attributes(cms_error))]
pub fn cms_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    error::expand(&input)
        .unwrap_or_else(darling::Error::write_errors)
        .into()
}

/// Registers the OpenAPI documentation of a handler annotated with `#[utoipa::path]`
///
/// The `DocumentedRouter` of the service looks the handlers up in the registry this
/// attribute populates.
#[proc_macro_attribute]
pub fn route(attr: TokenStream, input: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return darling::Error::custom("#[route] does not take any argument")
            .write_errors()
            .into();
    }
    let input = parse_macro_input!(input as ItemFn);
    route::expand(&input)
        .unwrap_or_else(darling::Error::write_errors)
        .into()
}
