//! Quality cycle.
//!
//! Uploads walk through a user's selected qualities in order. Completing a
//! full pass over the set advances the episode.

use reelcap_common::{AppError, AppResult};

/// Outcome of assigning a quality to one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityStep {
    /// Quality assigned to the upload.
    pub quality: String,
    /// `video_count` after the upload, before any episode reset.
    pub next_video_count: u32,
    /// Whether this upload completed a full pass over the set.
    pub did_wrap_all: bool,
    /// 1-based position of the upload within the pass.
    pub position: u32,
    /// Number of qualities in the pass.
    pub cycle_length: u32,
}

/// Assign the quality for the upload following `video_count` earlier ones.
///
/// The set's current length is used for the modulo, so shrinking the set
/// mid-cycle may restart the pass early.
pub fn next(selected: &[String], video_count: u32) -> AppResult<QualityStep> {
    if selected.is_empty() {
        return Err(AppError::NoQualitySelected);
    }

    let len = selected.len();
    let index = video_count as usize % len;
    let next_video_count = video_count.saturating_add(1);

    Ok(QualityStep {
        quality: selected[index].clone(),
        next_video_count,
        did_wrap_all: next_video_count as usize % len == 0,
        position: index as u32 + 1,
        cycle_length: len as u32,
    })
}
