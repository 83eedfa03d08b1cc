//! Success payloads and service metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ApiError;

/// What a handler returns.
pub type HandlerResult = Result<ApiResponse, ApiError>;

/// A successful handler result, written as `{"message", "data", "error": null}`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use trellis_core::ApiResponse;
///
/// let resp = ApiResponse::ok("created").with_data(json!({"id": 7}));
/// assert_eq!(resp.message, "created");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Human-readable message.
    pub message: String,
    /// Response payload.
    pub data: Value,
}

impl ApiResponse {
    /// A response with a message and `null` data.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Serializes `data` into the payload.
    pub fn json<T: Serialize>(message: impl Into<String>, data: &T) -> Result<Self, ApiError> {
        Ok(Self::ok(message).with_data(serde_json::to_value(data)?))
    }
}

/// A page of results for list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u64,
    /// Requested page size.
    pub per_page: u64,
    /// Total number of items across all pages.
    pub total: u64,
}

impl<T> Paginated<T> {
    /// Creates a page.
    #[must_use]
    pub fn new(items: Vec<T>, page: u64, per_page: u64, total: u64) -> Self {
        Self {
            items,
            page,
            per_page,
            total,
        }
    }

    /// Number of pages needed for `total` items.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            0
        } else {
            self.total.div_ceil(self.per_page)
        }
    }
}

/// Deployment tags embedded in logs and notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Application name (`APP_NAME`).
    pub app_name: String,
    /// Environment tag (`APPS_ENV`).
    pub env: String,
    /// Instance tag (`CONTAINER_NAME`).
    pub container: String,
    /// Application version (`APP_VERSION`).
    pub version: String,
}

impl ServiceInfo {
    /// Short `[env] app` prefix for notification titles.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.env.is_empty(), self.app_name.is_empty()) {
            (true, true) => String::new(),
            (true, false) => self.app_name.clone(),
            (false, true) => format!("[{}]", self.env),
            (false, false) => format!("[{}] {}", self.env, self.app_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_payload() {
        #[derive(Serialize)]
        struct Out {
            x: i32,
        }
        let resp = ApiResponse::json("ok", &Out { x: 1 }).unwrap();
        assert_eq!(resp.data, json!({"x": 1}));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(Paginated::new(vec![1, 2], 1, 2, 5).total_pages(), 3);
        assert_eq!(Paginated::<i32>::new(vec![], 1, 0, 5).total_pages(), 0);
    }

    #[test]
    fn test_service_label() {
        let info = ServiceInfo {
            app_name: "billing".into(),
            env: "prod".into(),
            ..ServiceInfo::default()
        };
        assert_eq!(info.label(), "[prod] billing");
        assert_eq!(ServiceInfo::default().label(), "");
    }
}
