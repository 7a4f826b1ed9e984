use std::hash::DefaultHasher;
use std::hash::Hash as _;
use std::hash::Hasher as _;

use proc_macro2::TokenStream;
use quote::format_ident;
use quote::quote;
use syn::ItemFn;

/// Handlers of different modules share names (`list`, `show`, `create`...), the
/// registry statics get a suffix computed from the whole handler item.
fn registry_static_name(input: &ItemFn) -> syn::Ident {
    let mut hasher = DefaultHasher::new();
    quote!(#input).to_string().hash(&mut hasher);
    let handler = &input.sig.ident;
    format_ident!(
        "_{}_ROUTE_DOC_{:X}",
        handler.to_string().to_uppercase(),
        hasher.finish(),
        span = handler.span()
    )
}

pub(super) fn expand(input: &ItemFn) -> darling::Result<TokenStream> {
    if input.sig.asyncness.is_none() {
        return Err(darling::Error::custom("#[route] handlers must be async").with_span(&input.sig));
    }
    let handler = &input.sig.ident;
    let static_name = registry_static_name(input);
    let utoipa_path = format_ident!("__path_{}", handler);
    Ok(quote! {
        #[doc(hidden)]
        #[linkme::distributed_slice(crate::views::router::OPENAPI_ROUTES)]
        static #static_name: crate::views::router::OpenApiRouteSliceItem = |type_name: &str| {
            if type_name != std::any::type_name_of_val(&#handler) {
                return None;
            }
            Some(|| {
                // utoipa only exposes tags and referenced schemas through its `__dev` module
                let mut schemas = Vec::new();
                <#utoipa_path as utoipa::__dev::SchemaReferences>::schemas(&mut schemas);
                crate::views::router::RouteDocumentation {
                    http_methods: <#utoipa_path as utoipa::Path>::methods(),
                    operation: <#utoipa_path as utoipa::Path>::operation(),
                    tags: <#utoipa_path as utoipa::__dev::Tags>::tags(),
                    schemas,
                }
            })
        };

        #input
    })
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    #[test]
    fn same_handler_name_in_different_modules_gives_distinct_statics() {
        let list_posts: ItemFn = parse_quote! {
            async fn list(State(pool): State<Pool>) -> Json<Vec<Post>> { todo!() }
        };
        let list_users: ItemFn = parse_quote! {
            async fn list(State(pool): State<Pool>) -> Json<Vec<User>> { todo!() }
        };
        let posts_static = registry_static_name(&list_posts);
        assert!(posts_static.to_string().starts_with("_LIST_ROUTE_DOC_"));
        assert_ne!(posts_static, registry_static_name(&list_users));
    }

    #[test]
    fn sync_handlers_are_rejected() {
        let handler: ItemFn = parse_quote! {
            fn health() -> &'static str { "ok" }
        };
        assert!(expand(&handler).is_err());
    }
}
