pub mod auth;
pub mod classify;
pub mod core;
pub mod error;
pub mod event;
pub mod handler;
pub mod invoker;
pub mod registry;
pub mod upstream_client;

pub use auth::extract_credential;
pub use classify::{Route, classify_request};
pub use crate::core::{Core, CoreState, into_axum_response};
pub use error::ProxyError;
pub use event::{EventError, InboundRequest, ServerlessEvent, ServerlessResponse};
pub use handler::REQUEST_ID_HEADER;
pub use invoker::{ChatInvocation, ChatReply, GeminiInvoker, InvokeMode};
pub use upstream_client::{UpstreamClientConfig, WreqUpstreamClient};
