//! Local echo sink.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use chime_engine::{ReminderEvent, ReminderSink, SinkError};

/// Writes reminders to an output stream under a mutual-exclusion guard.
///
/// The guard makes it safe to emit from the polling task while another
/// thread is writing interactive prompts to the same stream; the prompt is
/// redrawn after each reminder so the user can keep typing.
pub struct EchoSink {
    writer: Mutex<Box<dyn Write + Send>>,
    prompt: String,
}

impl EchoSink {
    pub fn new(writer: Box<dyn Write + Send>, prompt: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            prompt: prompt.into(),
        }
    }

    /// Echo to stdout with the default interactive prompt.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()), "you> ")
    }
}

#[async_trait]
impl ReminderSink for EchoSink {
    async fn emit(&self, event: &ReminderEvent) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write!(writer, "\nreminder> {}\n{}", event.content, self.prompt)?;
        writer.flush()?;
        Ok(())
    }
}
