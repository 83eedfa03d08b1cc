//! Procedural macros for Trellis.
//!
//! `#[derive(Validate)]` generates a `trellis_core::validate::Validate`
//! implementation from `#[validate(...)]` field attributes, so decoding a
//! request value and checking its rules are both resolved at compile time.
//!
//! # Rules
//!
//! | Rule | Meaning |
//! |---|---|
//! | `required` | present, non-empty, non-zero, not null |
//! | `gt = N`, `gte = N`, `lt = N`, `lte = N` | numeric comparison; digit strings coerce |
//! | `min = N`, `max = N` | length for strings and collections, value for numbers |
//! | `email` | `local@domain.tld` |
//! | `oneof = "a b c"` | value is one of the space-separated options |
//! | `dive` | validate the nested value (structs, `Vec`, `Option`, `Nullable`) |
//! | `skip_if_null` | in update mode, skip the field's rules when it is null |
//!
//! Fields carrying rules must implement `serde::Serialize` so failures can
//! report the offending value. Failure paths use the serde name of each
//! field: `#[serde(rename = "..")]` first, then the container's
//! `#[serde(rename_all = "..")]`, then the Rust field name.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde::{Deserialize, Serialize};
//! use trellis_macros::Validate;
//!
//! #[derive(Deserialize, Serialize, Validate)]
//! struct NewUser {
//!     #[validate(required, max = 64)]
//!     name: String,
//!     #[validate(gt = 0)]
//!     age: u32,
//! }
//! ```

mod expand;
mod parse;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derives `trellis_core::validate::Validate`.
///
/// See the crate documentation for the supported rules.
#[proc_macro_derive(Validate, attributes(validate))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand::derive_validate(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
