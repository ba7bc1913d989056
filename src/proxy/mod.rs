//! HTTP surface of the service.
//!
//! Accepts prompt requests from front-end clients, forwards them to the
//! upstream provider, and exposes status and log inspection endpoints.

mod handlers;
pub mod logs;
mod server;
pub mod stream;
pub mod types;

pub use handlers::{SERVICE_NAME, VERSION};
pub use server::{cors_layer, create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use stream::{relay, DONE_FRAME};
pub use types::{AskRequest, AskResponse, ServiceStatus, StatusResponse};
