use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::party_box::{
    PartyBoxPort,
    error::{PartyBoxError, internal_error, io_failure},
    types::{AttachmentMetadata, CategoryStats, QuarantineRecord, StorageStats},
};

const CATEGORIES: &[&str] = &["incoming", "outgoing", "quarantine", "attachments"];
const STAGED_SUBDIRS: &[&str] = &["raw", "processed"];

/// Filesystem-backed party box. Directory layout:
///
/// ```text
/// <base>/incoming/{raw,processed}/
/// <base>/outgoing/{raw,processed}/
/// <base>/quarantine/
/// <base>/attachments/<id>.bin
/// <base>/attachments/<id>.meta
/// ```
#[derive(Debug)]
pub struct FileSystemPartyBox {
    base_path: PathBuf,
}

impl FileSystemPartyBox {
    /// Creates the category directories eagerly.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, PartyBoxError> {
        let base_path = base_path.into();
        for category in CATEGORIES {
            let dir = base_path.join(category);
            fs::create_dir_all(&dir).map_err(|err| {
                io_failure(format!(
                    "failed to create party box directory '{}': {err}",
                    dir.display()
                ))
            })?;
            if matches!(*category, "incoming" | "outgoing") {
                for sub in STAGED_SUBDIRS {
                    let staged = dir.join(sub);
                    fs::create_dir_all(&staged).map_err(|err| {
                        io_failure(format!(
                            "failed to create party box directory '{}': {err}",
                            staged.display()
                        ))
                    })?;
                }
            }
        }

        tracing::info!(
            target: "party_box",
            base_path = %base_path.display(),
            "party_box_initialized"
        );
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn category_dir(&self, category: &str) -> PathBuf {
        self.base_path.join(category)
    }

    fn content_path(&self, category: &str, attachment_id: &str) -> PathBuf {
        self.category_dir(category).join(format!("{attachment_id}.bin"))
    }

    fn meta_path(&self, category: &str, attachment_id: &str) -> PathBuf {
        self.category_dir(category).join(format!("{attachment_id}.meta"))
    }

    fn cleanup_at(&self, max_age_days: u64, now: SystemTime) -> usize {
        let cutoff = now
            .checked_sub(Duration::from_secs(max_age_days.saturating_mul(24 * 60 * 60)))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0usize;

        for category in CATEGORIES {
            let mut files = Vec::new();
            collect_files(&self.category_dir(category), &mut files);

            for path in files {
                let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
                    Ok(modified) => modified,
                    Err(err) => {
                        tracing::warn!(
                            target: "party_box",
                            path = %path.display(),
                            error = %err,
                            "cleanup_stat_failed"
                        );
                        continue;
                    }
                };

                // Inclusive cutoff: a file exactly at the age limit expires.
                if modified <= cutoff {
                    match fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(err) => {
                            tracing::warn!(
                                target: "party_box",
                                path = %path.display(),
                                error = %err,
                                "cleanup_remove_failed"
                            );
                        }
                    }
                }
            }
        }

        removed
    }
}

#[async_trait]
impl PartyBoxPort for FileSystemPartyBox {
    async fn store(&self, attachment_id: &str, content: &[u8]) -> Result<PathBuf, PartyBoxError> {
        let content_path = self.content_path("attachments", attachment_id);
        tokio::fs::write(&content_path, content).await.map_err(|err| {
            io_failure(format!(
                "failed to write attachment '{}': {err}",
                content_path.display()
            ))
        })?;

        let metadata = AttachmentMetadata {
            attachment_id: attachment_id.to_string(),
            size: content.len() as u64,
            stored_at: rfc3339_now()?,
            hash: hex_digest(content),
        };
        let meta_path = self.meta_path("attachments", attachment_id);
        write_json(&meta_path, &metadata)?;

        tracing::debug!(
            target: "party_box",
            attachment_id = %attachment_id,
            size = metadata.size,
            "attachment_stored"
        );
        Ok(content_path)
    }

    async fn retrieve(&self, attachment_id: &str) -> Result<Option<Vec<u8>>, PartyBoxError> {
        let content_path = self.content_path("attachments", attachment_id);
        match tokio::fs::read(&content_path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: "party_box",
                    attachment_id = %attachment_id,
                    "attachment_not_found"
                );
                Ok(None)
            }
            Err(err) => Err(io_failure(format!(
                "failed to read attachment '{}': {err}",
                content_path.display()
            ))),
        }
    }

    async fn delete(&self, attachment_id: &str) -> Result<bool, PartyBoxError> {
        let mut deleted = false;
        for path in [
            self.content_path("attachments", attachment_id),
            self.meta_path("attachments", attachment_id),
        ] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted = true,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(io_failure(format!(
                        "failed to delete '{}': {err}",
                        path.display()
                    )));
                }
            }
        }

        if deleted {
            tracing::debug!(
                target: "party_box",
                attachment_id = %attachment_id,
                "attachment_deleted"
            );
        }
        Ok(deleted)
    }

    async fn list(&self, category: &str) -> Result<Vec<String>, PartyBoxError> {
        let dir = if category == "all" {
            self.category_dir("attachments")
        } else if CATEGORIES.contains(&category) {
            self.category_dir(category)
        } else {
            tracing::warn!(target: "party_box", category = %category, "unknown_category");
            return Ok(Vec::new());
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(io_failure(format!(
                    "failed to scan '{}': {err}",
                    dir.display()
                )));
            }
        };

        let mut attachment_ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "bin")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                attachment_ids.push(stem.to_string());
            }
        }
        attachment_ids.sort();
        Ok(attachment_ids)
    }

    async fn move_to_quarantine(&self, attachment_id: &str) -> Result<bool, PartyBoxError> {
        let source_content = self.content_path("attachments", attachment_id);
        if !source_content.exists() {
            tracing::warn!(
                target: "party_box",
                attachment_id = %attachment_id,
                "quarantine_source_missing"
            );
            return Ok(false);
        }

        let quarantine_content = self.content_path("quarantine", attachment_id);
        tokio::fs::rename(&source_content, &quarantine_content)
            .await
            .map_err(|err| {
                io_failure(format!(
                    "failed to move '{}' to quarantine: {err}",
                    source_content.display()
                ))
            })?;

        let source_meta = self.meta_path("attachments", attachment_id);
        if source_meta.exists() {
            let quarantine_meta = self.meta_path("quarantine", attachment_id);
            tokio::fs::rename(&source_meta, &quarantine_meta)
                .await
                .map_err(|err| {
                    io_failure(format!(
                        "failed to move '{}' to quarantine: {err}",
                        source_meta.display()
                    ))
                })?;
        }

        let record = QuarantineRecord {
            quarantined_at: rfc3339_now()?,
            reason: "Security scan flagged content".to_string(),
            original_location: "attachments".to_string(),
        };
        let record_path = self
            .category_dir("quarantine")
            .join(format!("{attachment_id}.quarantine"));
        write_json(&record_path, &record)?;

        tracing::info!(
            target: "party_box",
            attachment_id = %attachment_id,
            "attachment_quarantined"
        );
        Ok(true)
    }

    async fn cleanup(&self, max_age_days: u64) -> Result<usize, PartyBoxError> {
        let removed = self.cleanup_at(max_age_days, SystemTime::now());
        tracing::info!(
            target: "party_box",
            removed = removed,
            max_age_days = max_age_days,
            "retention_sweep_completed"
        );
        Ok(removed)
    }

    async fn stats(&self) -> Result<StorageStats, PartyBoxError> {
        let mut stats = StorageStats::default();
        for category in CATEGORIES {
            let mut files = Vec::new();
            collect_files(&self.category_dir(category), &mut files);

            let mut category_stats = CategoryStats::default();
            for path in files {
                match fs::metadata(&path) {
                    Ok(meta) => {
                        category_stats.files += 1;
                        category_stats.size_bytes += meta.len();
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: "party_box",
                            path = %path.display(),
                            error = %err,
                            "stats_stat_failed"
                        );
                    }
                }
            }

            stats.total.files += category_stats.files;
            stats.total.size_bytes += category_stats.size_bytes;
            stats.categories.insert(category.to_string(), category_stats);
        }
        Ok(stats)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    target: "party_box",
                    dir = %dir.display(),
                    error = %err,
                    "directory_scan_failed"
                );
            }
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files);
        } else if path.is_file() {
            files.push(path);
        }
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PartyBoxError> {
    let body = serde_json::to_vec_pretty(value).map_err(|err| {
        internal_error(format!(
            "failed to serialize record '{}': {err}",
            path.display()
        ))
    })?;
    fs::write(path, body).map_err(|err| {
        io_failure(format!("failed to write record '{}': {err}", path.display()))
    })
}

fn rfc3339_now() -> Result<String, PartyBoxError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| internal_error(format!("failed to format timestamp: {err}")))
}

fn hex_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
