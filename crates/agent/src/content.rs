//! Campaign content download and verification.
//!
//! Assets are streamed to disk under `<content_dir>/<campaign_id>/` and
//! hashed as they arrive. A digest mismatch deletes the file, and any
//! failure removes the whole campaign directory: content is either complete
//! and verified or absent, never partial. The schedule file is only written
//! after every asset has verified.

use crate::error::{AgentError, AgentResult};
use crate::schedule::{LocalAsset, LocalSchedule, ScheduleStore};
use billboard_core::types::CreativeAsset;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ContentManager {
    client: reqwest::Client,
    content_dir: PathBuf,
    store: ScheduleStore,
}

/// Strip any path components and non-portable characters from a declared
/// filename; the server controls asset names and must not be able to write
/// outside the campaign directory.
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("asset");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "asset".to_string()
    } else {
        cleaned
    }
}

impl ContentManager {
    pub fn new(client: reqwest::Client, content_dir: impl Into<PathBuf>) -> Self {
        let content_dir = content_dir.into();
        let store = ScheduleStore::new(content_dir.join("schedule.json"));
        Self {
            client,
            content_dir,
            store,
        }
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    /// Download and verify every asset, then commit the schedule. All or
    /// nothing.
    pub async fn deploy(
        &self,
        campaign_id: Uuid,
        assets: &[CreativeAsset],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> AgentResult<LocalSchedule> {
        let dir = self.content_dir.join(campaign_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let mut local_assets = Vec::with_capacity(assets.len());
        let mut taken = std::collections::HashSet::new();
        for asset in assets {
            // Distinct declared names can sanitize to the same string; a
            // numeric prefix keeps them from overwriting each other.
            let base = sanitize_filename(&asset.filename);
            let mut filename = base.clone();
            let mut n = 1;
            while taken.contains(&filename) {
                filename = format!("{}-{}", n, base);
                n += 1;
            }
            taken.insert(filename.clone());

            match self.download_verified(&dir, asset, &filename).await {
                Ok(path) => local_assets.push(LocalAsset {
                    path,
                    duration_secs: asset.duration_secs,
                }),
                Err(e) => {
                    warn!(
                        campaign_id = %campaign_id,
                        filename = %asset.filename,
                        error = %e,
                        "Asset rejected, removing campaign content"
                    );
                    let _ = tokio::fs::remove_dir_all(&dir).await;
                    return Err(e);
                }
            }
        }

        let schedule = LocalSchedule {
            campaign_id,
            assets: local_assets,
            start_time,
            end_time,
        };
        self.store.save(&schedule)?;
        self.prune_stale(campaign_id).await;
        info!(
            campaign_id = %campaign_id,
            assets = schedule.assets.len(),
            "Campaign content deployed"
        );
        Ok(schedule)
    }

    /// Drop content directories left over from earlier campaigns. The device
    /// displays one campaign at a time, and a stop for a superseded campaign
    /// never arrives if the device was offline when it ended; anything but
    /// the current directory is dead weight against the quota.
    async fn prune_stale(&self, keep: Uuid) {
        let keep = keep.to_string();
        let Ok(mut entries) = tokio::fs::read_dir(&self.content_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy() == *keep {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => info!(dir = %entry.path().display(), "Pruned stale campaign content"),
                Err(e) => {
                    warn!(dir = %entry.path().display(), error = %e, "Stale content not removed")
                }
            }
        }
    }

    async fn download_verified(
        &self,
        dir: &Path,
        asset: &CreativeAsset,
        filename: &str,
    ) -> AgentResult<PathBuf> {
        let path = dir.join(filename);
        let mut response = self
            .client
            .get(&asset.url)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(&asset.checksum) {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(AgentError::ChecksumMismatch {
                filename: asset.filename.clone(),
                expected: asset.checksum.to_ascii_lowercase(),
                actual,
            });
        }
        Ok(path)
    }

    /// Delete a campaign's content and, if it is the scheduled one, the
    /// schedule file.
    pub async fn remove_campaign(&self, campaign_id: Uuid) -> AgentResult<()> {
        if let Some(schedule) = self.store.load()? {
            if schedule.campaign_id == campaign_id {
                self.store.clear()?;
            }
        }
        let dir = self.content_dir.join(campaign_id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes under the content directory, for disk telemetry.
    pub fn content_bytes(&self) -> u64 {
        fn dir_size(path: &Path) -> u64 {
            let Ok(entries) = std::fs::read_dir(path) else {
                return 0;
            };
            entries
                .flatten()
                .map(|entry| match entry.metadata() {
                    Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
                    Ok(meta) => meta.len(),
                    Err(_) => 0,
                })
                .sum()
        }
        dir_size(&self.content_dir)
    }
}
