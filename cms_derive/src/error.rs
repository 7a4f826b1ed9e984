use darling::FromDeriveInput;
use darling::FromField;
use darling::FromVariant;
use darling::ast;
use darling::util::Ignored;
use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;
use syn::Ident;
use syn::LitStr;

const DEFAULT_STATUS: u16 = 500;

#[derive(FromDeriveInput)]
#[darling(attributes(cms_error), supports(enum_any))]
struct CmsErrorArgs {
    ident: Ident,
    generics: syn::Generics,
    data: ast::Data<VariantArgs, Ignored>,
    base_id: String,
    #[darling(default)]
    default_status: Option<u16>,
}

#[derive(FromVariant)]
#[darling(attributes(cms_error))]
struct VariantArgs {
    ident: Ident,
    fields: ast::Fields<FieldArgs>,
    #[darling(default)]
    status: Option<u16>,
}

#[derive(FromField)]
struct FieldArgs {
    ident: Option<Ident>,
    ty: syn::Type,
}

/// What the derive knows about a variant once the attributes are resolved
struct ErrorVariant {
    ident: Ident,
    status: u16,
    error_type: String,
    context_fields: Vec<Ident>,
    context_schema: String,
}

fn check_status(status: u16, variant: &Ident) -> darling::Result<u16> {
    if (100..=599).contains(&status) {
        Ok(status)
    } else {
        Err(darling::Error::custom(format!("invalid HTTP status code {status}")).with_span(variant))
    }
}

/// Name of the type displayed in the error definition context (last path segment)
fn short_type_name(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_default(),
        syn::Type::Reference(reference) => short_type_name(&reference.elem),
        _ => quote!(#ty).to_string(),
    }
}

fn resolve_variants(args: &CmsErrorArgs) -> darling::Result<Vec<ErrorVariant>> {
    let default_status = args.default_status.unwrap_or(DEFAULT_STATUS);
    let variants = args
        .data
        .as_ref()
        .take_enum()
        .ok_or_else(|| darling::Error::unsupported_shape("struct").with_span(&args.ident))?;
    let mut errors = darling::Error::accumulator();
    let mut resolved = Vec::with_capacity(variants.len());
    for variant in variants {
        let Some(status) = errors.handle(check_status(
            variant.status.unwrap_or(default_status),
            &variant.ident,
        )) else {
            continue;
        };
        let named: Vec<_> = variant
            .fields
            .iter()
            .filter_map(|field| field.ident.as_ref().map(|ident| (ident, &field.ty)))
            .collect();
        let context_schema = serde_json::Value::Object(
            named
                .iter()
                .map(|(ident, ty)| (ident.to_string(), short_type_name(ty).into()))
                .collect(),
        )
        .to_string();
        resolved.push(ErrorVariant {
            ident: variant.ident.clone(),
            status,
            error_type: format!("cms:{}:{}", args.base_id, variant.ident),
            context_fields: named.into_iter().map(|(ident, _)| ident.clone()).collect(),
            context_schema,
        });
    }
    errors.finish_with(resolved)
}

pub(super) fn expand(input: &DeriveInput) -> darling::Result<TokenStream> {
    let args = CmsErrorArgs::from_derive_input(input)?;
    let variants = resolve_variants(&args)?;
    let name = &args.ident;
    let namespace = name.to_string();
    let (impl_generics, ty_generics, where_clause) = args.generics.split_for_impl();

    let status_arms = variants.iter().map(|ErrorVariant { ident, status, .. }| {
        quote! {
            Self::#ident { .. } => axum::http::StatusCode::from_u16(#status)
                .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
        }
    });
    let type_arms = variants.iter().map(|ErrorVariant { ident, error_type, .. }| {
        quote! { Self::#ident { .. } => #error_type }
    });
    let context_arms = variants.iter().map(|variant| {
        let ident = &variant.ident;
        let fields = &variant.context_fields;
        if fields.is_empty() {
            return quote! { Self::#ident { .. } => std::collections::HashMap::new() };
        }
        let keys = fields.iter().map(|field| LitStr::new(&field.to_string(), field.span()));
        quote! {
            Self::#ident { #(#fields,)* .. } => {
                let mut context = std::collections::HashMap::new();
                #(context.insert(#keys.to_owned(), serde_json::json!(#fields));)*
                context
            }
        }
    });
    let definitions = variants.iter().map(|variant| {
        let id = &variant.error_type;
        let variant_name = variant.ident.to_string();
        let status = variant.status;
        let context_schema = &variant.context_schema;
        quote! {
            inventory::submit! {
                crate::error::ErrorDefinition::new(#id, #variant_name, #namespace, #status, #context_schema)
            }
        }
    });

    Ok(quote! {
        #(#definitions)*

        impl #impl_generics crate::error::CmsError for #name #ty_generics #where_clause {
            fn get_status(&self) -> axum::http::StatusCode {
                match self {
                    #(#status_arms,)*
                }
            }

            fn get_type(&self) -> &str {
                match self {
                    #(#type_arms,)*
                }
            }

            fn context(&self) -> std::collections::HashMap<String, serde_json::Value> {
                match self {
                    #(#context_arms,)*
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use syn::parse_quote;

    use super::*;

    fn resolve(input: DeriveInput) -> Vec<ErrorVariant> {
        let args = CmsErrorArgs::from_derive_input(&input).expect("valid attributes");
        resolve_variants(&args).expect("valid variants")
    }

    #[test]
    fn variants_get_their_type_and_status() {
        let variants = resolve(parse_quote! {
            #[cms_error(base_id = "posts")]
            enum PostError {
                #[cms_error(status = 404)]
                NotFound { post_slug: String },
                Database(cms_models::Error),
            }
        });
        let summary: Vec<_> = variants
            .iter()
            .map(|v| (v.error_type.as_str(), v.status, v.context_schema.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("cms:posts:NotFound", 404, r#"{"post_slug":"String"}"#),
                ("cms:posts:Database", 500, "{}"),
            ]
        );
    }

    #[test]
    fn default_status_applies_to_unannotated_variants() {
        let variants = resolve(parse_quote! {
            #[cms_error(base_id = "users", default_status = 422)]
            enum UserError {
                InvalidRole { role: String },
                #[cms_error(status = 404)]
                NotFound { user_id: i64 },
            }
        });
        assert_eq!(variants[0].status, 422);
        assert_eq!(variants[1].status, 404);
        assert_eq!(variants[1].context_fields[0].to_string(), "user_id");
    }

    #[test]
    fn invalid_status_is_rejected() {
        let input: DeriveInput = parse_quote! {
            #[cms_error(base_id = "teams")]
            enum TeamError {
                #[cms_error(status = 42)]
                Broken,
            }
        };
        let args = CmsErrorArgs::from_derive_input(&input).expect("valid attributes");
        assert!(resolve_variants(&args).is_err());
    }

    #[test]
    fn structs_are_not_supported() {
        let input: DeriveInput = parse_quote! {
            #[cms_error(base_id = "nope")]
            struct NotAnEnum;
        };
        assert!(CmsErrorArgs::from_derive_input(&input).is_err());
    }
}
