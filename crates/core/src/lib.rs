//! Core business logic for reelcap.
//!
//! The [`ProgressionEngine`] advances each user's season, episode and quality
//! cycle as uploads arrive and renders their captions. The
//! [`UploadDispatcher`] feeds it inbound uploads and hands the results to a
//! [`ForwardSink`].

pub mod caption;
pub mod quality;
pub mod services;

pub use services::*;
