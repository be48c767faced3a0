//! Party box: categorized, lifecycle-staged storage for torch attachments.
//!
//! Attachments move through physical locations: `attachments` (active) →
//! `quarantine` (flagged) → deleted, either explicitly or by the age-based
//! retention sweep.

pub mod error;
pub mod fs;
pub mod types;

pub use error::{PartyBoxError, PartyBoxErrorKind};
pub use fs::FileSystemPartyBox;
pub use types::{AttachmentMetadata, CategoryStats, QuarantineRecord, StorageStats};

use std::path::PathBuf;

use async_trait::async_trait;

#[async_trait]
pub trait PartyBoxPort: Send + Sync {
    /// Stores content under the active `attachments` category and returns
    /// the storage path. Re-entrant: storing the same id twice overwrites
    /// both content and metadata.
    async fn store(&self, attachment_id: &str, content: &[u8]) -> Result<PathBuf, PartyBoxError>;

    /// Returns the content bytes, or `None` when the id is not in the
    /// active category. Quarantined content is not consulted.
    async fn retrieve(&self, attachment_id: &str) -> Result<Option<Vec<u8>>, PartyBoxError>;

    /// Removes content and metadata; `false` when nothing existed.
    async fn delete(&self, attachment_id: &str) -> Result<bool, PartyBoxError>;

    /// Lists attachment ids in a category; `"all"` lists the active
    /// category, an unknown category yields an empty list with a warning.
    async fn list(&self, category: &str) -> Result<Vec<String>, PartyBoxError>;

    /// Relocates content and metadata into `quarantine` and records why.
    /// `false` when the id is not currently active. This is a move: the
    /// source location no longer resolves afterwards.
    async fn move_to_quarantine(&self, attachment_id: &str) -> Result<bool, PartyBoxError>;

    /// Sweeps every category and removes files older than the cutoff.
    /// Returns the count removed; per-file failures are logged and do not
    /// abort the sweep.
    async fn cleanup(&self, max_age_days: u64) -> Result<usize, PartyBoxError>;

    /// Per-category file counts and byte sizes plus a grand total; missing
    /// directories count as zero.
    async fn stats(&self) -> Result<StorageStats, PartyBoxError>;
}
