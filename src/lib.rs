// Job board API client - library root

pub mod clients;
pub mod config;
pub mod error;
pub mod http_client;
pub mod session;

pub use clients::{ApiClients, Domain};
pub use error::ApiError;
pub use http_client::{ApiClient, ApiResponse, ClientConfig, RequestBody, RequestDescriptor};
pub use session::{SessionEvent, SessionEvents, SessionState, SessionSubscription};
