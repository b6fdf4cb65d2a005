//! Business logic services.

#![allow(missing_docs)]

pub mod dispatcher;
pub mod forward;
pub mod progression;
pub mod user_lock;

pub use dispatcher::{UploadDispatcher, UploadEvent};
pub use forward::{ForwardService, ForwardSink, NoOpForwardSink};
pub use progression::{ForwardRequest, GlobalStats, ProgressionEngine, UserStatus};
pub use user_lock::UserLocks;
