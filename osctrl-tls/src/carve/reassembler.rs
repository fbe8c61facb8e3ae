//! Reassembly is performed lazily by a downstream consumer; the engine only
//! guarantees the block set is complete and ordered-retrievable (spec.md
//! §4.4). This is that consumer.

use crate::store::{Store, StoreError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fs::directory_manager::{DirectoryManagementError, DirectoryManager};
use fs::file::renamer::FileRenamer;
use fs::file::writer::{FileWriter, WriteError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReassembleError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("carve session `{0}` is not complete")]
    NotComplete(String),

    #[error("carve session `{0}` not found")]
    NotFound(String),

    #[error("block {block_id} of session `{session}` is not valid base64: {source}")]
    BadPayload {
        session: String,
        block_id: u64,
        #[source]
        source: base64::DecodeError,
    },

    #[error("destination directory error: {0}")]
    Directory(#[from] DirectoryManagementError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),

    #[error("rename into place failed: {0}")]
    Rename(#[source] std::io::Error),
}

/// Assembles a completed carve session's blocks on disk. Requires all three
/// of the `fs` crate's local-filesystem capabilities: [`DirectoryManager`] to
/// ensure the destination directory exists, [`FileWriter`] to stage the
/// decoded payload, and [`FileRenamer`] to publish it atomically so a reader
/// of `destination_path` never observes a partially-written file.
pub struct CarveReassembler<W: FileWriter + FileRenamer + DirectoryManager> {
    store: Arc<dyn Store>,
    fs: W,
}

impl<W: FileWriter + FileRenamer + DirectoryManager> CarveReassembler<W> {
    pub fn new(store: Arc<dyn Store>, fs: W) -> Self {
        CarveReassembler { store, fs }
    }

    /// Concatenates a completed session's blocks, ordered by `block_id`,
    /// base64-decoded, into the session's destination path.
    pub fn reassemble(&self, session_id: &str) -> Result<(), ReassembleError> {
        let session = self
            .store
            .get_carve_session(session_id)?
            .ok_or_else(|| ReassembleError::NotFound(session_id.to_string()))?;

        if !session.is_complete() {
            return Err(ReassembleError::NotComplete(session_id.to_string()));
        }

        let blocks = self.store.carve_blocks_ordered(session_id)?;
        let mut payload = Vec::with_capacity((session.carve_size) as usize);
        for block in blocks {
            let mut decoded = BASE64.decode(&block.data_b64).map_err(|source| {
                ReassembleError::BadPayload {
                    session: session_id.to_string(),
                    block_id: block.block_id,
                    source,
                }
            })?;
            payload.append(&mut decoded);
        }

        if let Some(parent) = session.destination_path.parent() {
            self.fs.create(parent)?;
        }

        let staging_path: PathBuf = {
            let mut staged = session.destination_path.clone().into_os_string();
            staged.push(".partial");
            staged.into()
        };
        self.fs.write(&staging_path, &payload)?;
        self.fs
            .rename(&staging_path, &session.destination_path)
            .map_err(ReassembleError::Rename)?;
        Ok(())
    }
}
