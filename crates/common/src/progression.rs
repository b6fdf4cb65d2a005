//! Per-user progression state and upload history records.

use chrono::{DateTime, NaiveTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ChannelId, UserId};

/// Caption template applied to users who never set their own.
pub const DEFAULT_CAPTION: &str =
    "• 𝗦𝗘𝗔𝗦𝗢𝗡 {season} || Episode {episode} ({quality})\n{total_episode_text}";

/// Current time truncated to microseconds.
///
/// PostgreSQL stores timestamps with microsecond precision, so every
/// timestamp the engine produces is truncated to survive a round trip.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Mutable upload state of a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgression {
    /// Owner of this record.
    pub user_id: UserId,
    /// Current season.
    pub season: u32,
    /// Current episode within the season.
    pub episode: u32,
    /// Total episodes of the season, `0` when unset.
    pub total_episode: u32,
    /// Uploads applied toward the current episode since the last increment.
    pub video_count: u32,
    /// Qualities to cycle through, in cycle order.
    pub selected_qualities: Vec<String>,
    /// Caption template with placeholders.
    pub caption_template: String,
    /// Where uploads are forwarded to.
    pub target_channel_id: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProgression {
    /// The record a user starts with on first interaction.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let created_at = now();
        Self {
            user_id,
            season: 1,
            episode: 1,
            total_episode: 0,
            video_count: 0,
            selected_qualities: Vec::new(),
            caption_template: DEFAULT_CAPTION.to_string(),
            target_channel_id: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Index of the quality the next upload will receive.
    ///
    /// Always derived from `video_count` and the current quality set, so it
    /// can never drift from either. `None` when no quality is selected.
    #[must_use]
    pub fn quality_cursor(&self) -> Option<usize> {
        match self.selected_qualities.len() {
            0 => None,
            len => Some(self.video_count as usize % len),
        }
    }

    /// Quality the next upload will receive.
    #[must_use]
    pub fn next_quality(&self) -> Option<&str> {
        self.quality_cursor()
            .map(|cursor| self.selected_qualities[cursor].as_str())
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// One forwarded upload. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub user_id: UserId,
    pub season: u32,
    pub episode: u32,
    pub total_episode: u32,
    /// Quality assigned to this upload.
    pub quality: String,
    /// Opaque handle of the uploaded media.
    pub file_ref: String,
    pub rendered_caption: String,
    pub target_channel_id: ChannelId,
    pub uploaded_at: DateTime<Utc>,
}

/// Aggregate upload counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCounts {
    /// Uploads since 00:00 UTC today.
    pub daily: u64,
    /// Uploads ever recorded.
    pub total: u64,
}

/// Start of the current UTC day, the lower bound for daily counters.
#[must_use]
pub fn start_of_today() -> DateTime<Utc> {
    Utc::now()
        .date_naive()
        .and_time(NaiveTime::default())
        .and_utc()
}
