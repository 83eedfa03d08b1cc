//! Parsing of `#[validate(...)]` field attributes.

use syn::{
    punctuated::Punctuated, spanned::Spanned, Attribute, Expr, ExprLit, ExprUnary, Lit, Meta,
    Token, UnOp,
};

/// A single rule on a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// `required`
    Required,
    /// `gt = N`
    Gt(f64),
    /// `gte = N`
    Gte(f64),
    /// `lt = N`
    Lt(f64),
    /// `lte = N`
    Lte(f64),
    /// `min = N`
    Min(f64),
    /// `max = N`
    Max(f64),
    /// `email`
    Email,
    /// `oneof = "a b c"`
    OneOf(Vec<String>),
    /// `dive`
    Dive,
}

impl Rule {
    /// Tag reported in failure records.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Gt(_) => "gt",
            Self::Gte(_) => "gte",
            Self::Lt(_) => "lt",
            Self::Lte(_) => "lte",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::Email => "email",
            Self::OneOf(_) => "oneof",
            Self::Dive => "dive",
        }
    }
}

/// All rules declared on one field.
#[derive(Debug, Default)]
pub struct FieldRules {
    /// Rules in declaration order.
    pub rules: Vec<Rule>,
    /// `skip_if_null`
    pub skip_if_null: bool,
}

impl FieldRules {
    /// Whether the field needs any generated code.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Collects the rules from every `#[validate(...)]` attribute on a field.
pub fn field_rules(attrs: &[Attribute]) -> syn::Result<FieldRules> {
    let mut out = FieldRules::default();

    for attr in attrs.iter().filter(|a| a.path().is_ident("validate")) {
        let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
        for meta in metas {
            match meta {
                Meta::Path(path) => {
                    let ident = path
                        .get_ident()
                        .ok_or_else(|| syn::Error::new(path.span(), "expected identifier"))?
                        .to_string();
                    match ident.as_str() {
                        "required" => out.rules.push(Rule::Required),
                        "email" => out.rules.push(Rule::Email),
                        "dive" => out.rules.push(Rule::Dive),
                        "skip_if_null" => out.skip_if_null = true,
                        other => {
                            return Err(syn::Error::new(
                                path.span(),
                                format!("unknown validation rule `{other}`"),
                            ))
                        }
                    }
                }
                Meta::NameValue(nv) => {
                    let ident = nv
                        .path
                        .get_ident()
                        .ok_or_else(|| syn::Error::new(nv.path.span(), "expected identifier"))?
                        .to_string();
                    let rule = match ident.as_str() {
                        "gt" => Rule::Gt(number(&nv.value)?),
                        "gte" => Rule::Gte(number(&nv.value)?),
                        "lt" => Rule::Lt(number(&nv.value)?),
                        "lte" => Rule::Lte(number(&nv.value)?),
                        "min" => Rule::Min(number(&nv.value)?),
                        "max" => Rule::Max(number(&nv.value)?),
                        "oneof" => Rule::OneOf(
                            string(&nv.value)?
                                .split_whitespace()
                                .map(str::to_string)
                                .collect(),
                        ),
                        other => {
                            return Err(syn::Error::new(
                                nv.path.span(),
                                format!("unknown validation rule `{other}`"),
                            ))
                        }
                    };
                    out.rules.push(rule);
                }
                Meta::List(list) => {
                    return Err(syn::Error::new(
                        list.span(),
                        "expected `rule` or `rule = value`",
                    ))
                }
            }
        }
    }

    Ok(out)
}

/// Value of `key` in the `#[serde(...)]` attributes, if set.
///
/// For `rename(serialize = "..", deserialize = "..")` the deserialize name
/// wins, since that is the name clients send.
pub fn serde_attr(attrs: &[Attribute], key: &str) -> Option<String> {
    attrs
        .iter()
        .filter(|a| a.path().is_ident("serde"))
        .find_map(|attr| {
            let metas = attr
                .parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                .ok()?;
            metas.into_iter().find_map(|meta| match meta {
                Meta::NameValue(nv) if nv.path.is_ident(key) => string(&nv.value).ok(),
                Meta::List(list) if list.path.is_ident(key) => list
                    .parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                    .ok()?
                    .into_iter()
                    .find_map(|inner| match inner {
                        Meta::NameValue(nv) if nv.path.is_ident("deserialize") => {
                            string(&nv.value).ok()
                        }
                        _ => None,
                    }),
                _ => None,
            })
        })
}

/// Applies a serde `rename_all` convention to a snake_case field name.
pub fn rename_all(convention: &str, field: &str) -> String {
    let capitalize = |word: &str| {
        let mut chars = word.chars();
        chars.next().map_or_else(String::new, |first| {
            first.to_uppercase().chain(chars).collect()
        })
    };
    match convention {
        "lowercase" => field.to_lowercase(),
        "UPPERCASE" => field.to_uppercase(),
        "PascalCase" => field.split('_').map(capitalize).collect(),
        "camelCase" => {
            let pascal: String = field.split('_').map(capitalize).collect();
            let mut chars = pascal.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_lowercase().chain(chars).collect()
            })
        }
        "SCREAMING_SNAKE_CASE" => field.to_uppercase(),
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.replace('_', "-").to_uppercase(),
        _ => field.to_string(),
    }
}

fn number(expr: &Expr) -> syn::Result<f64> {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => match lit {
            Lit::Int(i) => i.base10_parse::<f64>(),
            Lit::Float(f) => f.base10_parse::<f64>(),
            Lit::Str(s) => s
                .value()
                .trim()
                .parse::<f64>()
                .map_err(|_| syn::Error::new(s.span(), "expected a number")),
            other => Err(syn::Error::new(other.span(), "expected a number")),
        },
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => number(expr).map(|n| -n),
        other => Err(syn::Error::new(other.span(), "expected a number")),
    }
}

fn string(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        other => Err(syn::Error::new(other.span(), "expected string literal")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parse_rules() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[validate(required, gt = 0, max = "10")]),
            parse_quote!(#[validate(oneof = "a b", skip_if_null)]),
        ];
        let parsed = field_rules(&attrs).unwrap();
        assert_eq!(
            parsed.rules,
            vec![
                Rule::Required,
                Rule::Gt(0.0),
                Rule::Max(10.0),
                Rule::OneOf(vec!["a".into(), "b".into()])
            ]
        );
        assert!(parsed.skip_if_null);
    }

    #[test]
    fn test_negative_bound() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[validate(gte = -5)])];
        assert_eq!(field_rules(&attrs).unwrap().rules, vec![Rule::Gte(-5.0)]);
    }

    #[test]
    fn test_unknown_rule() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[validate(shiny)])];
        let err = field_rules(&attrs).unwrap_err();
        assert!(err.to_string().contains("shiny"));
    }

    #[test]
    fn test_serde_rename() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[serde(default)]),
            parse_quote!(#[serde(skip_serializing_if = "Option::is_none", rename = "userName")]),
        ];
        assert_eq!(serde_attr(&attrs, "rename").as_deref(), Some("userName"));

        let split: Vec<Attribute> =
            vec![parse_quote!(#[serde(rename(serialize = "out", deserialize = "in"))])];
        assert_eq!(serde_attr(&split, "rename").as_deref(), Some("in"));

        let plain: Vec<Attribute> = vec![parse_quote!(#[validate(required)])];
        assert_eq!(serde_attr(&plain, "rename"), None);
    }

    #[test]
    fn test_rename_all_conventions() {
        assert_eq!(rename_all("camelCase", "user_name"), "userName");
        assert_eq!(rename_all("PascalCase", "user_name"), "UserName");
        assert_eq!(rename_all("kebab-case", "user_name"), "user-name");
        assert_eq!(rename_all("SCREAMING_SNAKE_CASE", "user_name"), "USER_NAME");
        assert_eq!(rename_all("snake_case", "user_name"), "user_name");
    }

    #[test]
    fn test_ignores_other_attributes() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[serde(default)])];
        assert!(field_rules(&attrs).unwrap().is_empty());
    }
}
