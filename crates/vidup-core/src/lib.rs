pub mod config;
pub mod logging;

pub mod auth;
pub mod chunk;
pub mod controller;
pub mod error;
pub mod events;
pub mod quota;
pub mod retry;
pub mod session;
pub mod source;
pub mod transmitter;
pub mod transport;

pub use auth::{AuthProvider, OAuthRefresher, StaticToken};
pub use controller::{UploadController, UploadControllerBuilder};
pub use error::UploadError;
pub use events::{EventBus, UploadEvent};
pub use quota::{QuotaLimits, QuotaSource, QuotaUsage};
pub use retry::{RetryPolicy, RetryVerdict};
pub use session::{UploadMetadata, UploadResult, UploadState};
pub use source::UploadFile;
pub use transport::HttpTransport;
