//! On-disk layout under the data root and the history/state stores.

pub mod history;
pub mod snapshot;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::text::safe_name;

pub use history::{append_history, load_history, HistoryEntry, TS_FORMAT};
pub use snapshot::{load_snapshot, read_json, save_snapshot, write_json_atomic, StateSnapshot};

pub const DATA_ENV: &str = "SLOTWATCH_DATA";
const DEFAULT_ROOT: &str = "score_data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `SLOTWATCH_DATA`, else `./score_data`.
    pub fn from_env() -> Self {
        let root = std::env::var_os(DATA_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
        Self::new(root)
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [self.root.clone(), self.history_dir(), self.state_dir(), self.runs_dir()] {
            fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn items_path(&self) -> PathBuf {
        self.root.join("items.json")
    }

    pub fn stop_flag(&self) -> PathBuf {
        self.root.join("stop.flag")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn history_path(&self, item_id: &str) -> PathBuf {
        self.history_dir().join(format!("{}.jsonl", safe_name(item_id)))
    }

    pub fn state_path(&self, item_id: &str) -> PathBuf {
        self.state_dir().join(format!("{}.json", safe_name(item_id)))
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(safe_name(run_id))
    }

    pub fn suspicious_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("debug").join("suspicious").join(safe_name(run_id))
    }
}
