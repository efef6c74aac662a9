//! Chat-bot push sink.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use chime_engine::{ReminderEvent, ReminderSink, SinkError};

use crate::chunk::{split_semantic_messages, split_text_chunks};

/// Default number of retries after the initial send attempt.
const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default base backoff between retries.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Default maximum characters per physical message.
const DEFAULT_CHUNK_SIZE: usize = 1500;

/// Cap on the backoff exponent, so large retry counts cannot overflow the
/// shift or the duration multiply.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Provider call for sending one physical text message.
///
/// Payload shapes are the provider's business; the sink only needs a
/// fallible text send.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SinkError>;
}

/// Pushes reminders to a chat provider.
///
/// Oversized text is split on blank-line boundaries first, then into
/// size-capped chunks, and sent in order. Each physical send is retried
/// with exponential backoff; the sink errors only after exhausting retries,
/// which leaves the occurrence eligible for the next poll.
pub struct PushSink<T: PushTransport> {
    transport: T,
    chat_id: String,
    retry_count: u32,
    retry_backoff: Duration,
    chunk_size: usize,
}

impl<T: PushTransport> PushSink<T> {
    pub fn new(transport: T, chat_id: impl Into<String>) -> Self {
        Self {
            transport,
            chat_id: chat_id.into(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Retries after the initial attempt.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Base backoff; attempt `n` waits `base * 2^n`.
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Maximum characters per physical message. Clamped to at least one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn send_with_retry(&self, text: &str) -> Result<(), SinkError> {
        let attempts = self.retry_count + 1;
        let mut last_error = None;
        for attempt in 0..attempts {
            match self.transport.send_text(&self.chat_id, text).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    if attempt + 1 < attempts {
                        // 500ms, 1s, 2s, ... capped
                        let backoff = self
                            .retry_backoff
                            .saturating_mul(1u32 << attempt.min(MAX_BACKOFF_SHIFT));
                        warn!(
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            %error,
                            "push send failed, retrying"
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(error);
                }
            }
        }
        Err(SinkError::RetriesExhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl<T: PushTransport> ReminderSink for PushSink<T> {
    async fn emit(&self, event: &ReminderEvent) -> Result<(), SinkError> {
        let messages = split_semantic_messages(&event.content);
        let message_count = messages.len();
        for (message_index, message) in messages.iter().enumerate() {
            let chunks = split_text_chunks(message, self.chunk_size);
            let chunk_count = chunks.len();
            for (chunk_index, chunk) in chunks.iter().enumerate() {
                self.send_with_retry(chunk).await?;
                debug!(
                    key = %event.reminder_key,
                    message = message_index + 1,
                    message_count,
                    chunk = chunk_index + 1,
                    chunk_count,
                    "push chunk sent"
                );
            }
        }
        Ok(())
    }
}
