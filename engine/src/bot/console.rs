//! Console delivery, used by `ava ask` and `ava chat`.

use super::{ReplySink, ReplyTarget};
use crate::handlers::OutputFormat;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::json;
use std::io::Write;
use std::sync::Mutex;

/// Writes every reply to stdout (or any writer), one segment at a time.
pub struct ConsoleReplySink {
    format: OutputFormat,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReplySink {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::with_writer(format, Box::new(std::io::stdout()))
    }

    pub fn with_writer(format: OutputFormat, out: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl ReplySink for ConsoleReplySink {
    async fn send(&self, target: &ReplyTarget, text: &str) -> Result<(), EngineError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| EngineError::Io(std::io::Error::other("console writer poisoned")))?;

        match self.format {
            OutputFormat::Text => writeln!(out, "{}", text)?,
            OutputFormat::Json => {
                let line = json!({
                    "channel": target.channel,
                    "reply_to": target.message_id,
                    "text": text,
                });
                writeln!(out, "{}", line)?;
            }
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::ChannelId;
    use std::sync::Arc;

    /// Writer that keeps everything in a shared buffer.
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_text_output() {
        let buffer = Buffer::default();
        let sink = ConsoleReplySink::with_writer(OutputFormat::Text, Box::new(buffer.clone()));
        let target = ReplyTarget::channel(ChannelId::new("c"));

        sink.send(&target, "first").await.unwrap();
        sink.send(&target, "second").await.unwrap();

        assert_eq!(buffer.contents(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_json_lines_output() {
        let buffer = Buffer::default();
        let sink = ConsoleReplySink::with_writer(OutputFormat::Json, Box::new(buffer.clone()));

        sink.send(&ReplyTarget::message(ChannelId::new("c"), "m"), "hi")
            .await
            .unwrap();

        let line: serde_json::Value = serde_json::from_str(buffer.contents().trim()).unwrap();
        assert_eq!(line, json!({ "channel": "c", "reply_to": "m", "text": "hi" }));
    }
}
