//! Local playback schedule, persisted so a rebooted device resumes display
//! without waiting for the control plane.

use crate::error::AgentResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalSchedule {
    pub campaign_id: Uuid,
    pub assets: Vec<LocalAsset>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Schedule file with atomic replace semantics: writes go to a sibling temp
/// file first, then rename over the live file, so a crash mid-write never
/// leaves a truncated schedule.
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> AgentResult<Option<LocalSchedule>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, schedule: &LocalSchedule) -> AgentResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(schedule)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> AgentResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn schedule() -> LocalSchedule {
        let now = Utc::now();
        LocalSchedule {
            campaign_id: Uuid::new_v4(),
            assets: vec![LocalAsset {
                path: PathBuf::from("/tmp/creative.mp4"),
                duration_secs: 30,
            }],
            start_time: now,
            end_time: now + Duration::hours(4),
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        assert!(store.load().unwrap().is_none());

        let s = schedule();
        store.save(&s).unwrap();
        assert_eq!(store.load().unwrap(), Some(s));
    }

    #[test]
    fn save_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        store.save(&schedule()).unwrap();
        let replacement = schedule();
        store.save(&replacement).unwrap();

        assert_eq!(store.load().unwrap(), Some(replacement));
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("schedule.json")]);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        store.save(&schedule()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
