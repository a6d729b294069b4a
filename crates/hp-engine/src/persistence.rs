//! Persistence sink - writes the registry's address set to durable storage
//!
//! The file is output only; on restart the registry is rebuilt from live
//! discovery, never from this list.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::engine_metrics;
use crate::error::EngineError;
use crate::registry::EndpointRegistry;

/// Destination for the endpoint address list
#[async_trait]
pub trait AddressSink: Send + Sync {
    /// Overwrite the destination with one address per line.
    async fn save(&self, addresses: &[String]) -> Result<(), EngineError>;
}

/// File-backed sink. Each save writes its own temp file next to the
/// destination and renames it into place.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn render(addresses: &[String]) -> String {
    let mut contents = addresses.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    contents
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl AddressSink for FileSink {
    async fn save(&self, addresses: &[String]) -> Result<(), EngineError> {
        let path = self.path.clone();
        let contents = render(addresses);

        tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes()))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result)
            .map_err(EngineError::Persistence)?;

        debug!(path = %self.path.display(), count = addresses.len(), "Wrote address file");
        Ok(())
    }
}

/// Snapshot the registry and hand it to the sink. Failures are logged and
/// swallowed; the next pass writes again.
///
/// Concurrent callers are serialized per registry, and the snapshot is taken
/// inside the critical section, so a removal is never overwritten by an
/// older list.
pub async fn persist(sink: &dyn AddressSink, registry: &EndpointRegistry) -> bool {
    let _gate = registry.persist_gate().lock().await;
    let addresses = registry.snapshot_addresses();
    match sink.save(&addresses).await {
        Ok(()) => {
            info!(count = addresses.len(), "Saved webhook addresses");
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to persist webhook addresses");
            engine_metrics::record_persist_failure();
            false
        }
    }
}
