mod error;
mod handlers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};

/// Response for a line that never became a `Request`.
pub fn bad_json(id: &str, message: &str) -> serde_json::Value {
    error::err(id, "bad_json", message, None)
}
