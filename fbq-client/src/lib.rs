//! fbq-client library
//!
//! Client for the feedback analytics backend: a streamed query session
//! controller, the feedback browser with client-derived facets, and the CSV
//! upload client.

pub mod controller;
pub mod error;
pub mod feedback;
pub mod frame;
pub mod http;
pub mod models;
pub mod normalizer;
pub mod render;
pub mod stream;
pub mod transcript;
pub mod upload;

pub use controller::{FrameOutcome, SessionController};
pub use error::{ClientError, ClientResult};
pub use feedback::{
    derive_facets, FacetOptions, FeedbackBrowser, FeedbackClient, FeedbackFilters,
    FeedbackQueryState, FeedbackRow,
};
pub use frame::{parse_frame, Frame};
pub use models::{DisplayResponse, Session, SessionState};
pub use normalizer::normalize;
pub use stream::{HttpStreamConnector, OneShotAnswer, SessionEvent, StreamConnector, StreamEvent};
pub use transcript::Transcript;
pub use upload::UploadClient;

/// Build identification captured by build.rs
pub mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const GIT_HASH: &str = env!("GIT_HASH");
    pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
    pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");
}
