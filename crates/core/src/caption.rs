//! Caption template rendering.

use std::sync::LazyLock;

use regex::{Captures, Regex};

#[allow(clippy::expect_used)]
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("placeholder pattern is valid"));

/// Values substituted into a caption template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionValues<'a> {
    pub season: u32,
    pub episode: u32,
    /// `0` when unset.
    pub total_episode: u32,
    pub quality: &'a str,
}

/// Render `template`, replacing the recognized placeholders.
///
/// Recognized: `{season}`, `{episode}`, `{totalEpisode}` (also spelled
/// `{total_episode}`), `{quality}` and `{total_episode_text}`. Numbers are
/// zero-padded to two digits, except inside `{total_episode_text}`. Anything
/// else is kept as written.
#[must_use]
pub fn render(template: &str, values: &CaptionValues<'_>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "season" => format!("{:02}", values.season),
            "episode" => format!("{:02}", values.episode),
            "totalEpisode" | "total_episode" => format!("{:02}", values.total_episode),
            "quality" => values.quality.to_string(),
            "total_episode_text" if values.total_episode > 0 => {
                format!("Total Episodes: {}", values.total_episode)
            }
            "total_episode_text" => String::new(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}
