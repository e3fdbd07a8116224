//! Client-side data model

pub mod display;
pub mod session;

pub use display::{DisplayResponse, ImageData, ResponseKind, ResponseMetadata, TableRow};
pub use session::{Session, SessionState, StateTransition};
