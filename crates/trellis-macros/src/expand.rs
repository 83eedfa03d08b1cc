//! Code generation for `#[derive(Validate)]`.

use proc_macro2::{Literal, TokenStream};
use quote::{quote, ToTokens};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Index, Member};

use crate::parse::{field_rules, rename_all, serde_attr, FieldRules, Rule};

pub fn derive_validate(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Validate can only be derived for structs",
        ));
    };

    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let convention = serde_attr(&input.attrs, "rename_all");

    let mut blocks = Vec::new();
    for (i, field) in data.fields.iter().enumerate() {
        let rules = field_rules(&field.attrs)?;
        if rules.is_empty() {
            if rules.skip_if_null {
                return Err(syn::Error::new_spanned(
                    field,
                    "`skip_if_null` needs at least one other rule",
                ));
            }
            continue;
        }
        // Failure paths use the wire name, as serde sees it.
        let (member, label) = match &field.ident {
            Some(ident) => {
                let rust_name = ident.unraw().to_string();
                let label = serde_attr(&field.attrs, "rename").unwrap_or_else(|| {
                    convention
                        .as_deref()
                        .map_or_else(|| rust_name.clone(), |c| rename_all(c, &rust_name))
                });
                (Member::Named(ident.clone()), label)
            }
            None => (Member::Unnamed(Index::from(i)), i.to_string()),
        };
        blocks.push(field_block(&member, &label, &rules));
    }

    if matches!(data.fields, Fields::Unit) || blocks.is_empty() {
        return Ok(quote! {
            impl #impl_generics ::trellis_core::validate::Validate for #name #ty_generics #where_clause {
                const NAME: &'static str = #name_str;

                fn validate_fields(
                    &self,
                    _: &str,
                    _: ::trellis_core::validate::ValidationMode,
                    _: &mut ::trellis_core::validate::ValidationErrors,
                ) {
                }
            }
        });
    }

    Ok(quote! {
        impl #impl_generics ::trellis_core::validate::Validate for #name #ty_generics #where_clause {
            const NAME: &'static str = #name_str;

            fn validate_fields(
                &self,
                __path: &str,
                __mode: ::trellis_core::validate::ValidationMode,
                __errors: &mut ::trellis_core::validate::ValidationErrors,
            ) {
                #(#blocks)*
            }
        }
    })
}

fn field_block(member: &Member, label: &str, rules: &FieldRules) -> TokenStream {
    let checks = rules.rules.iter().map(rule_check);

    let body = quote! {
        let __field = ::trellis_core::validate::rules::join(__path, #label);
        #(#checks)*
    };

    let guarded = if rules.skip_if_null {
        quote! {
            if !(__mode.is_update() && ::trellis_core::validate::rules::is_null(__value)) {
                #body
            }
        }
    } else {
        body
    };

    quote! {
        {
            let __value = &self.#member;
            #guarded
        }
    }
}

fn rule_check(rule: &Rule) -> TokenStream {
    let tag = rule.tag();
    let predicate = match rule {
        Rule::Required => quote!(::trellis_core::validate::rules::required(__value)),
        Rule::Gt(n) => bounded("gt", *n),
        Rule::Gte(n) => bounded("gte", *n),
        Rule::Lt(n) => bounded("lt", *n),
        Rule::Lte(n) => bounded("lte", *n),
        Rule::Min(n) => bounded("min", *n),
        Rule::Max(n) => bounded("max", *n),
        Rule::Email => quote!(::trellis_core::validate::rules::email(__value)),
        Rule::OneOf(options) => {
            quote!(::trellis_core::validate::rules::oneof(__value, &[#(#options),*]))
        }
        Rule::Dive => {
            return quote! {
                ::trellis_core::validate::Validate::validate_fields(__value, &__field, __mode, __errors);
            };
        }
    };

    quote! {
        if !#predicate {
            __errors.push(::trellis_core::validate::FieldError::new(
                __field.clone(),
                #tag,
                ::trellis_core::validate::rules::field_value(__value),
            ));
        }
    }
}

fn bounded(rule: &str, bound: f64) -> TokenStream {
    let func = syn::Ident::new(rule, proc_macro2::Span::call_site());
    let magnitude = Literal::f64_suffixed(bound.abs()).into_token_stream();
    let bound = if bound.is_sign_negative() {
        quote!(-#magnitude)
    } else {
        magnitude
    };
    quote!(::trellis_core::validate::rules::#func(__value, #bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_rejects_enums() {
        let input: DeriveInput = parse_quote! {
            enum Color { Red }
        };
        let err = derive_validate(&input).unwrap_err();
        assert!(err.to_string().contains("structs"));
    }

    #[test]
    fn test_generates_rule_calls() {
        let input: DeriveInput = parse_quote! {
            struct NewUser {
                #[validate(required, gt = 1)]
                name: String,
                plain: u8,
            }
        };
        let tokens = derive_validate(&input).unwrap().to_string();
        assert!(tokens.contains("required"));
        assert!(tokens.contains("1f64"));
        assert!(tokens.contains("\"NewUser\""));
        assert!(!tokens.contains("plain"));
    }

    #[test]
    fn test_paths_follow_serde_names() {
        let input: DeriveInput = parse_quote! {
            #[serde(rename_all = "camelCase")]
            struct NewUser {
                #[validate(required)]
                user_name: String,
                #[serde(rename = "mail")]
                #[validate(email)]
                email_address: String,
            }
        };
        let tokens = derive_validate(&input).unwrap().to_string();
        assert!(tokens.contains("\"userName\""));
        assert!(tokens.contains("\"mail\""));
        assert!(!tokens.contains("\"user_name\""));
        assert!(!tokens.contains("\"email_address\""));
    }

    #[test]
    fn test_skip_if_null_alone_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Patch {
                #[validate(skip_if_null)]
                name: Option<String>,
            }
        };
        assert!(derive_validate(&input).is_err());
    }
}
