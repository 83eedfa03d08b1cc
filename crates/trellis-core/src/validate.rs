//! Declarative validation.
//!
//! Types implement [`Validate`], usually through `#[derive(Validate)]` from
//! `trellis-macros`, which walks each field's `#[validate(...)]` rules and
//! records a [`FieldError`] per failing rule. The [`rules`] module holds the
//! rule predicates the generated code calls.
//!
//! [`Nullable`] distinguishes "explicitly null or absent" from a present
//! value: `required` fails on a null wrapper, and `skip_if_null` skips a
//! field's rules entirely when validating in [`ValidationMode::Update`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Which operation the value is validated for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Full validation (POST, PUT, imports).
    #[default]
    Create,
    /// Partial update (PATCH); `skip_if_null` fields that are null are skipped.
    Update,
}

impl ValidationMode {
    /// Returns `true` for [`ValidationMode::Update`].
    #[must_use]
    pub const fn is_update(self) -> bool {
        matches!(self, Self::Update)
    }
}

/// One failing rule on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted path from the root type, e.g. `NewUser.address.city`.
    pub field: String,
    /// Rule tag that fired, e.g. `required`.
    pub tag: String,
    /// The offending value.
    pub value: Value,
}

impl FieldError {
    /// Creates a failure record.
    #[must_use]
    pub fn new(field: impl Into<String>, tag: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            tag: tag.into(),
            value,
        }
    }
}

/// Ordered list of failures, serialized as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates failures in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// JSON array of `{field, tag, value}`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} failed on '{}'", err.field, err.tag)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A value that can be validated.
///
/// # Example
///
/// ```
/// use trellis_core::validate::{rules, FieldError, Validate, ValidationErrors, ValidationMode};
///
/// struct Name(String);
///
/// impl Validate for Name {
///     const NAME: &'static str = "Name";
///
///     fn validate_fields(&self, path: &str, _: ValidationMode, errors: &mut ValidationErrors) {
///         if !rules::required(&self.0) {
///             let value = rules::field_value(&self.0);
///             errors.push(FieldError::new(rules::join(path, "0"), "required", value));
///         }
///     }
/// }
///
/// assert!(Name(String::new()).validate().is_err());
/// assert!(Name("ada".into()).validate().is_ok());
/// ```
pub trait Validate {
    /// Root segment of failure paths.
    const NAME: &'static str;

    /// Appends failures under `path`.
    fn validate_fields(&self, path: &str, mode: ValidationMode, errors: &mut ValidationErrors);

    /// Validates in [`ValidationMode::Create`].
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_in(ValidationMode::Create)
    }

    /// Validates in the given mode.
    fn validate_in(&self, mode: ValidationMode) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.validate_fields(Self::NAME, mode, &mut errors);
        errors.into_result()
    }
}

impl<T: Validate> Validate for Vec<T> {
    const NAME: &'static str = T::NAME;

    fn validate_fields(&self, path: &str, mode: ValidationMode, errors: &mut ValidationErrors) {
        for (i, item) in self.iter().enumerate() {
            item.validate_fields(&format!("{path}[{i}]"), mode, errors);
        }
    }
}

impl<T: Validate> Validate for Option<T> {
    const NAME: &'static str = T::NAME;

    fn validate_fields(&self, path: &str, mode: ValidationMode, errors: &mut ValidationErrors) {
        if let Some(inner) = self {
            inner.validate_fields(path, mode, errors);
        }
    }
}

impl<T: Validate> Validate for Nullable<T> {
    const NAME: &'static str = T::NAME;

    fn validate_fields(&self, path: &str, mode: ValidationMode, errors: &mut ValidationErrors) {
        if let Some(inner) = self.value() {
            inner.validate_fields(path, mode, errors);
        }
    }
}

impl<T: Validate> Validate for Box<T> {
    const NAME: &'static str = T::NAME;

    fn validate_fields(&self, path: &str, mode: ValidationMode, errors: &mut ValidationErrors) {
        (**self).validate_fields(path, mode, errors);
    }
}

macro_rules! impl_unchecked {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Validate for $ty {
                const NAME: &'static str = $name;

                fn validate_fields(&self, _: &str, _: ValidationMode, _: &mut ValidationErrors) {}
            }
        )*
    };
}

impl_unchecked! {
    Value => "Value",
    String => "String",
    HashMap<String, String> => "Map",
    BTreeMap<String, String> => "Map",
}

/// A nullable value: absent or `null` decodes to an invalid wrapper.
///
/// Declare the field with `#[serde(default)]` so that a missing key also
/// decodes to null.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nullable<T>(Option<T>);

impl<T> Nullable<T> {
    /// A valid wrapper around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self(Some(value))
    }

    /// An invalid (null) wrapper.
    #[must_use]
    pub const fn null() -> Self {
        Self(None)
    }

    /// Whether a value is present.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// The wrapped value, if valid.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        self.0.as_ref()
    }

    /// Unwraps into an `Option`.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(value: Option<T>) -> Self {
        Self(value)
    }
}

impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self)
    }
}

/// Rule predicates used by `#[derive(Validate)]`.
///
/// Comparison rules (`gt`, `min`, `email`, ...) pass on null values; only
/// `required` rejects them.
pub mod rules {
    use serde::Serialize;
    use serde_json::Value;

    use super::Nullable;

    /// How the rule predicates see a field value.
    pub trait Inspect {
        /// Non-zero, non-empty, non-null.
        fn is_present(&self) -> bool;

        /// Explicitly null or absent.
        fn is_null(&self) -> bool {
            false
        }

        /// Numeric view; strings of digits coerce.
        fn as_number(&self) -> Option<f64> {
            None
        }

        /// Length for strings and collections.
        fn length(&self) -> Option<usize> {
            None
        }

        /// Text view.
        fn as_text(&self) -> Option<&str> {
            None
        }
    }

    impl Inspect for str {
        fn is_present(&self) -> bool {
            !self.is_empty()
        }

        fn as_number(&self) -> Option<f64> {
            self.trim().parse().ok()
        }

        fn length(&self) -> Option<usize> {
            Some(self.chars().count())
        }

        fn as_text(&self) -> Option<&str> {
            Some(self)
        }
    }

    impl Inspect for String {
        fn is_present(&self) -> bool {
            self.as_str().is_present()
        }

        fn as_number(&self) -> Option<f64> {
            self.as_str().as_number()
        }

        fn length(&self) -> Option<usize> {
            self.as_str().length()
        }

        fn as_text(&self) -> Option<&str> {
            Some(self.as_str())
        }
    }

    macro_rules! impl_numeric {
        ($($ty:ty),*) => {
            $(
                impl Inspect for $ty {
                    fn is_present(&self) -> bool {
                        *self != (0 as $ty)
                    }

                    #[allow(clippy::cast_lossless, clippy::cast_precision_loss)]
                    fn as_number(&self) -> Option<f64> {
                        Some(*self as f64)
                    }
                }
            )*
        };
    }

    impl_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

    impl Inspect for bool {
        fn is_present(&self) -> bool {
            true
        }
    }

    impl<T> Inspect for Vec<T> {
        fn is_present(&self) -> bool {
            !self.is_empty()
        }

        fn length(&self) -> Option<usize> {
            Some(self.len())
        }
    }

    impl<T: Inspect> Inspect for Option<T> {
        fn is_present(&self) -> bool {
            self.is_some()
        }

        fn is_null(&self) -> bool {
            self.is_none()
        }

        fn as_number(&self) -> Option<f64> {
            self.as_ref().and_then(Inspect::as_number)
        }

        fn length(&self) -> Option<usize> {
            self.as_ref().and_then(Inspect::length)
        }

        fn as_text(&self) -> Option<&str> {
            self.as_ref().and_then(Inspect::as_text)
        }
    }

    impl<T: Inspect> Inspect for Nullable<T> {
        fn is_present(&self) -> bool {
            self.is_valid()
        }

        fn is_null(&self) -> bool {
            !self.is_valid()
        }

        fn as_number(&self) -> Option<f64> {
            self.value().and_then(Inspect::as_number)
        }

        fn length(&self) -> Option<usize> {
            self.value().and_then(Inspect::length)
        }

        fn as_text(&self) -> Option<&str> {
            self.value().and_then(Inspect::as_text)
        }
    }

    impl Inspect for Value {
        fn is_present(&self) -> bool {
            match self {
                Value::Null => false,
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                _ => true,
            }
        }

        fn is_null(&self) -> bool {
            self.is_null()
        }

        fn as_number(&self) -> Option<f64> {
            match self {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.as_number(),
                _ => None,
            }
        }

        fn length(&self) -> Option<usize> {
            match self {
                Value::String(s) => Some(s.chars().count()),
                Value::Array(a) => Some(a.len()),
                Value::Object(o) => Some(o.len()),
                _ => None,
            }
        }

        fn as_text(&self) -> Option<&str> {
            self.as_str()
        }
    }

    fn compare<T: Inspect + ?Sized>(value: &T, test: impl FnOnce(f64) -> bool) -> bool {
        if value.is_null() {
            return true;
        }
        value.as_number().is_some_and(test)
    }

    fn measure<T: Inspect + ?Sized>(value: &T, test: impl FnOnce(f64) -> bool) -> bool {
        if value.is_null() {
            return true;
        }
        #[allow(clippy::cast_precision_loss)]
        match value.length() {
            Some(len) => test(len as f64),
            None => value.as_number().is_some_and(test),
        }
    }

    /// `required`: present and non-zero.
    pub fn required<T: Inspect + ?Sized>(value: &T) -> bool {
        value.is_present()
    }

    /// Whether the value is null (drives `skip_if_null`).
    pub fn is_null<T: Inspect + ?Sized>(value: &T) -> bool {
        value.is_null()
    }

    /// `gt=N`.
    pub fn gt<T: Inspect + ?Sized>(value: &T, bound: f64) -> bool {
        compare(value, |v| v > bound)
    }

    /// `gte=N`.
    pub fn gte<T: Inspect + ?Sized>(value: &T, bound: f64) -> bool {
        compare(value, |v| v >= bound)
    }

    /// `lt=N`.
    pub fn lt<T: Inspect + ?Sized>(value: &T, bound: f64) -> bool {
        compare(value, |v| v < bound)
    }

    /// `lte=N`.
    pub fn lte<T: Inspect + ?Sized>(value: &T, bound: f64) -> bool {
        compare(value, |v| v <= bound)
    }

    /// `min=N`: length for strings and collections, value for numbers.
    pub fn min<T: Inspect + ?Sized>(value: &T, bound: f64) -> bool {
        measure(value, |v| v >= bound)
    }

    /// `max=N`: length for strings and collections, value for numbers.
    pub fn max<T: Inspect + ?Sized>(value: &T, bound: f64) -> bool {
        measure(value, |v| v <= bound)
    }

    /// `email`: `local@domain.tld`; empty text passes.
    pub fn email<T: Inspect + ?Sized>(value: &T) -> bool {
        if value.is_null() {
            return true;
        }
        let Some(text) = value.as_text() else {
            return false;
        };
        if text.is_empty() {
            return true;
        }
        let Some((local, domain)) = text.split_once('@') else {
            return false;
        };
        !local.is_empty()
            && !domain.contains('@')
            && !text.contains(char::is_whitespace)
            && domain
                .split_once('.')
                .is_some_and(|(host, tld)| {
                    !host.is_empty() && !tld.is_empty() && !tld.ends_with('.')
                })
    }

    /// `oneof="a b c"`.
    pub fn oneof<T: Inspect + ?Sized>(value: &T, options: &[&str]) -> bool {
        if value.is_null() {
            return true;
        }
        if let Some(text) = value.as_text() {
            return options.contains(&text);
        }
        value
            .as_number()
            .is_some_and(|n| options.iter().any(|o| o.parse::<f64>().ok() == Some(n)))
    }

    /// JSON rendering of a field value for failure records.
    pub fn field_value<T: Serialize + ?Sized>(value: &T) -> Value {
        serde_json::to_value(value).unwrap_or(Value::Null)
    }

    /// Joins a parent path and a field name.
    pub fn join(path: &str, field: &str) -> String {
        if path.is_empty() {
            field.to_string()
        } else {
            format!("{path}.{field}")
        }
    }
}
