pub mod admin;
pub mod response;
pub mod session;

pub use admin::{require_admin, require_admin_or_demo, AdminSession};
pub use response::{redact_backend_errors, ApiResponse, ApiResult, JsonBody};
pub use session::{resolve_session, Caller, Identity};
