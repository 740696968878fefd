use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::calendar::SlotSummary;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Last-seen state of one item, overwritten every run. Only used for
/// deltas against the previous run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSnapshot {
    pub ts: String,
    pub run_id: String,
    pub item_id: String,
    pub name: String,
    pub stats: SlotSummary,
    pub score: f64,
    pub big_score: f64,
    pub rank_score_raw: f64,
}

/// `None` when there is no snapshot yet or the file cannot be parsed.
pub fn load_snapshot(path: &Path) -> Result<Option<StateSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;
    match serde_json::from_str(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) => {
            log_warn!("snapshot {} unreadable ({err}), ignoring", path.display());
            Ok(None)
        }
    }
}

pub fn save_snapshot(path: &Path, snapshot: &StateSnapshot) -> Result<()> {
    write_json_atomic(path, snapshot)
}

/// Serializes to a temp file next to `path`, flushes, then renames over it.
/// Readers see the old file or the new one, never a partial write.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;

    let temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_overwrites_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("g1.json");
        assert_eq!(load_snapshot(&path).unwrap(), None);

        let mut snap = StateSnapshot {
            item_id: "g1".into(),
            stats: SlotSummary::from_counts(2, 3, 0, 5, 0),
            score: 0.1,
            ..StateSnapshot::default()
        };
        save_snapshot(&path, &snap).unwrap();
        snap.score = 0.4;
        save_snapshot(&path, &snap).unwrap();

        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.score, 0.4);
        assert_eq!(loaded.stats.maru, 3);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn corrupt_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g1.json");
        fs::write(&path, "{\"score\":").unwrap();
        assert_eq!(load_snapshot(&path).unwrap(), None);
    }
}
