use crate::engine::WinnerReport;
use crate::types::Strategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub recorded_at_ms: i64,
    pub winner: String,
    pub total_time_s: f64,
    pub best_lap_time_s: Option<f64>,
    pub total_laps: u32,
    pub strategy: Strategy,
}

impl LeaderboardEntry {
    pub fn from_report(report: &WinnerReport) -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self {
            recorded_at_ms: now_ms,
            winner: report.winner.clone(),
            total_time_s: report.total_time_s,
            best_lap_time_s: report.best_lap_time_s,
            total_laps: report.laps_completed,
            strategy: report.strategy.clone(),
        }
    }
}

/// Top race winners ranked by best single lap, persisted as JSON.
#[derive(Debug)]
pub struct Leaderboard {
    path: PathBuf,
    entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Missing or unreadable JSON starts an empty board.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self { path, entries: Vec::new() });
        }
        let txt = fs::read_to_string(&path)
            .with_context(|| format!("failed to read leaderboard at {}", path.display()))?;
        let entries = match serde_json::from_str(&txt) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("ignoring corrupt leaderboard {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Ok(Self { path, entries })
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds an entry, re-ranks and keeps the top [`MAX_ENTRIES`].
    pub fn record(&mut self, entry: LeaderboardEntry) {
        self.entries.push(entry);
        // entries without a best lap go last
        self.entries.sort_by(|a, b| {
            let a = a.best_lap_time_s.unwrap_or(f64::INFINITY);
            let b = b.best_lap_time_s.unwrap_or(f64::INFINITY);
            a.total_cmp(&b)
        });
        self.entries.truncate(MAX_ENTRIES);
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed writing {}", self.path.display()))
    }
}
