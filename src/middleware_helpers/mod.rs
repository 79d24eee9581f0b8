pub mod bearer_auth;
pub mod error_body;
pub mod request_id;
pub mod retry;

pub use bearer_auth::require_anon_key;
pub use error_body::json_error_body;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
pub use retry::{with_retry, CatalogRetryPolicy, RetryConfig, RetryPolicy};
