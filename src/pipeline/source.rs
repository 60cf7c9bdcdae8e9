//! Message source abstraction for dispatch notifications.
//!
//! Provides a unified trait for reading inbound messages from different
//! sources: JSON lines on stdin, a replay file, or a pre-loaded list.

use crate::types::InboundMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Events produced by a message source.
pub enum MessageEvent {
    /// A well-formed message was read.
    Message(InboundMessage),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where dispatch messages come from.
///
/// Implementations handle format parsing and pacing internally.
/// The processing loop calls [`next_message`] in a select! with cancellation.
#[async_trait]
pub trait MessageSource: Send + 'static {
    /// Read the next message from the source.
    ///
    /// Returns `MessageEvent::Eof` when no more data is available.
    async fn next_message(&mut self) -> Result<MessageEvent>;

    /// Human-readable name for logging (e.g. "stdin", "replay").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Replay Source (pre-loaded messages)
// ============================================================================

/// Replays pre-loaded messages with optional inter-message delay.
pub struct ReplaySource {
    messages: std::vec::IntoIter<InboundMessage>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(messages: Vec<InboundMessage>, delay_ms: u64) -> Self {
        Self {
            messages: messages.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl MessageSource for ReplaySource {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        // No delay before the first message
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.messages.next() {
            Some(m) => {
                self.yielded_first = true;
                Ok(MessageEvent::Message(m))
            }
            None => Ok(MessageEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// Lines Source (JSON messages, one per line)
// ============================================================================

/// Reads JSON-encoded messages, one per line, from any buffered reader.
///
/// `posttroll`-style relays can be piped straight in:
/// `message-relay | polar-l1-runner`
pub struct LinesSource<R> {
    reader: R,
    name: String,
    line_buffer: String,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_buffer: String::with_capacity(2048),
        }
    }
}

impl LinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl LinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> MessageSource for LinesSource<R> {
    async fn next_message(&mut self) -> Result<MessageEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(MessageEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match InboundMessage::from_json(line) {
                Ok(message) => return Ok(MessageEvent::Message(message)),
                Err(e) => {
                    tracing::warn!(source = %self.name, "Failed to parse message: {}", e);
                    // Skip malformed lines and keep reading
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"{"subject": "/PDS/0/norrköping/dev/polar/direct_readout", "type": "file", "data": {"uri": "ssh://safe/pds/P0420064AAAAAAAAAAAAAA14239075753001.PDS", "platform_name": "EOS-Terra", "sensor": "modis"}}"#;

    async fn drain<S: MessageSource>(source: &mut S) -> Vec<InboundMessage> {
        let mut out = Vec::new();
        while let MessageEvent::Message(m) = source.next_message().await.unwrap() {
            out.push(m);
        }
        out
    }

    #[tokio::test]
    async fn test_lines_source_skips_malformed_and_blank_lines() {
        let input = format!("{LINE}\n\nnot json\n# comment\n{LINE}\n");
        let mut source = LinesSource::new(BufReader::new(std::io::Cursor::new(input.into_bytes())), "memory");
        let messages = drain(&mut source).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, "file");
        assert_eq!(source.source_name(), "memory");
    }

    #[tokio::test]
    async fn test_lines_source_from_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), format!("{LINE}\n")).unwrap();
        let mut source = LinesSource::open(tmp.path()).await.unwrap();
        assert_eq!(drain(&mut source).await.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_source_ends_with_eof() {
        let message = InboundMessage::from_json(LINE).unwrap();
        let mut source = ReplaySource::new(vec![message.clone(), message], 0);
        assert_eq!(drain(&mut source).await.len(), 2);
        assert!(matches!(source.next_message().await.unwrap(), MessageEvent::Eof));
    }
}
