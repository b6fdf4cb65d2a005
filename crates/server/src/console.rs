//! Line-delimited JSON console transport.
//!
//! Each input line is one command object tagged by `"command"`. Each output
//! line is one reply object tagged by `"type"`. Uploads are queued to the
//! dispatcher; their forward requests and denials are written by
//! [`ConsoleSink`] as they complete.

use std::sync::Arc;

use async_trait::async_trait;
use reelcap_common::{AppError, AppResult, ChannelId, UserId, UserProgression};
use reelcap_core::{
    ForwardRequest, ForwardSink, GlobalStats, ProgressionEngine, UploadEvent, UserStatus,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};

/// Console command.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Upload {
        user_id: UserId,
        file_ref: String,
    },
    SetCaption {
        user_id: UserId,
        template: String,
    },
    SetSeason {
        user_id: UserId,
        season: u32,
    },
    SetEpisode {
        user_id: UserId,
        episode: u32,
    },
    SetTotalEpisode {
        user_id: UserId,
        total_episode: u32,
    },
    SetQualities {
        user_id: UserId,
        qualities: Vec<String>,
    },
    SetTargetChannel {
        user_id: UserId,
        channel_id: ChannelId,
    },
    ClearTargetChannel {
        user_id: UserId,
    },
    ResetEpisode {
        user_id: UserId,
    },
    Status {
        user_id: UserId,
    },
    Stats,
}

/// Console reply.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Reply {
    Queued {
        user_id: UserId,
        file_ref: String,
    },
    Progression(UserProgression),
    Status(UserStatus),
    Stats(GlobalStats),
    Forward(ForwardRequest),
    Rejected {
        user_id: UserId,
        file_ref: String,
        code: &'static str,
        message: String,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl Reply {
    fn error(error: &AppError) -> Self {
        Self::Error {
            code: error.error_code(),
            message: error.to_string(),
        }
    }
}

/// Shared writer for reply lines.
pub struct ConsoleOutput<W> {
    writer: Arc<Mutex<W>>,
}

impl<W> Clone for ConsoleOutput<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleOutput<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write `value` as one JSON line.
    async fn emit<T: Serialize + Sync>(&self, value: &T) -> AppResult<()> {
        let mut line = serde_json::to_vec(value)
            .map_err(|e| AppError::Internal(format!("Failed to encode reply: {e}")))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write reply: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write reply: {e}")))
    }
}

/// Forward sink printing forward requests and denials as reply lines.
pub struct ConsoleSink<W> {
    output: ConsoleOutput<W>,
}

impl<W> ConsoleSink<W> {
    /// Create a sink writing to `output`.
    pub const fn new(output: ConsoleOutput<W>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> ForwardSink for ConsoleSink<W> {
    async fn forward(&self, request: &ForwardRequest) -> AppResult<()> {
        self.output.emit(&Reply::Forward(request.clone())).await
    }

    async fn reject(&self, event: &UploadEvent, error: &AppError) -> AppResult<()> {
        self.output
            .emit(&Reply::Rejected {
                user_id: event.user_id,
                file_ref: event.file_ref.clone(),
                code: error.error_code(),
                message: error.to_string(),
            })
            .await
    }
}

async fn execute(
    engine: &ProgressionEngine,
    uploads: &mpsc::Sender<UploadEvent>,
    command: Command,
) -> Reply {
    let result = match command {
        Command::Upload { user_id, file_ref } => {
            let event = UploadEvent {
                user_id,
                file_ref: file_ref.clone(),
            };
            return match uploads.send(event).await {
                Ok(()) => Reply::Queued { user_id, file_ref },
                Err(_) => Reply::error(&AppError::Internal("Upload queue closed".to_string())),
            };
        }
        Command::SetCaption { user_id, template } => engine
            .set_caption(user_id, template)
            .await
            .map(Reply::Progression),
        Command::SetSeason { user_id, season } => engine
            .set_season(user_id, season)
            .await
            .map(Reply::Progression),
        Command::SetEpisode { user_id, episode } => engine
            .set_episode(user_id, episode)
            .await
            .map(Reply::Progression),
        Command::SetTotalEpisode {
            user_id,
            total_episode,
        } => engine
            .set_total_episode(user_id, total_episode)
            .await
            .map(Reply::Progression),
        Command::SetQualities { user_id, qualities } => engine
            .set_qualities(user_id, qualities)
            .await
            .map(Reply::Progression),
        Command::SetTargetChannel {
            user_id,
            channel_id,
        } => engine
            .set_target_channel(user_id, channel_id)
            .await
            .map(Reply::Progression),
        Command::ClearTargetChannel { user_id } => engine
            .clear_target_channel(user_id)
            .await
            .map(Reply::Progression),
        Command::ResetEpisode { user_id } => engine
            .reset_episode(user_id)
            .await
            .map(Reply::Progression),
        Command::Status { user_id } => engine.status(user_id).await.map(Reply::Status),
        Command::Stats => engine.global_stats().await.map(Reply::Stats),
    };

    result.unwrap_or_else(|e| Reply::error(&e))
}

/// Serve commands from `input` until it is exhausted.
pub async fn run<R, W>(
    input: R,
    engine: &ProgressionEngine,
    uploads: mpsc::Sender<UploadEvent>,
    output: &ConsoleOutput<W>,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = input.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read command: {e}")))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Command>(line) {
            Ok(command) => {
                tracing::debug!(?command, "Console command");
                execute(engine, &uploads, command).await
            }
            Err(e) => Reply::error(&AppError::Validation(format!("Malformed command: {e}"))),
        };
        output.emit(&reply).await?;
    }

    Ok(())
}
