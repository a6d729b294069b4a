//! Message pool - candidate bodies loaded once at startup

use std::path::Path;
use rand::Rng;
use tracing::{info, warn};

use crate::error::EngineError;

/// Body sent when no messages were loaded
pub const FALLBACK_MESSAGE: &str = "test";

/// Immutable set of message bodies; one is picked at random per send.
#[derive(Debug, Clone, Default)]
pub struct MessagePool {
    messages: Vec<String>,
}

impl MessagePool {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    /// Split raw text into blocks separated by blank (whitespace-only) lines.
    /// Lines are right-trimmed, blocks are trimmed, empty blocks dropped.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.replace('\r', "");
        let mut messages = Vec::new();
        let mut block: Vec<&str> = Vec::new();

        for line in raw.split('\n') {
            if line.trim().is_empty() {
                Self::flush(&mut block, &mut messages);
            } else {
                block.push(line.trim_end());
            }
        }
        Self::flush(&mut block, &mut messages);

        Self { messages }
    }

    fn flush(block: &mut Vec<&str>, messages: &mut Vec<String>) {
        if block.is_empty() {
            return;
        }
        let joined = block.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            messages.push(trimmed.to_string());
        }
        block.clear();
    }

    /// Load from a file. A missing file gives an empty pool.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let pool = Self::parse(&raw);
                info!(path = %path.display(), count = pool.len(), "Loaded message pool");
                Ok(pool)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    path = %path.display(),
                    fallback = FALLBACK_MESSAGE,
                    "Message file not found, using fallback body"
                );
                Ok(Self::default())
            }
            Err(e) => Err(EngineError::MessageSource(e)),
        }
    }

    /// Uniformly random body, or the fallback literal when empty.
    pub fn pick(&self) -> &str {
        if self.messages.is_empty() {
            return FALLBACK_MESSAGE;
        }
        let idx = rand::rng().random_range(0..self.messages.len());
        &self.messages[idx]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}
