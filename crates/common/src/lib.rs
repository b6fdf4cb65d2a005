//! Common types and storage contract for reelcap.
//!
//! This crate provides the foundations shared by every reelcap crate:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error type via [`AppError`] and [`AppResult`]
//! - **Identifiers**: [`UserId`] and [`ChannelId`]
//! - **Progression model**: [`UserProgression`] and [`UploadRecord`]
//! - **State storage**: The [`StateStore`] contract, the per-user JSON file
//!   backend [`FileStore`] and the in-memory [`MemoryStore`]
//!
//! # Example
//!
//! ```no_run
//! use reelcap_common::{AppResult, FileStore, StateStore, UserId};
//!
//! async fn example() -> AppResult<()> {
//!     let store = FileStore::new("./data");
//!     let progression = store.read(UserId::new(42)).await?;
//!     println!("season {} episode {}", progression.season, progression.episode);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod progression;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::{ChannelId, UserId};
pub use progression::{
    DEFAULT_CAPTION, UploadCounts, UploadRecord, UserProgression, now, start_of_today,
};
pub use storage::FileStore;
pub use store::{MemoryStore, SharedStateStore, StateStore};
