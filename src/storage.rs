//! Run-state persistence.
//!
//! Saves and loads the orchestrator's `RunState` as a single JSON document.
//! Writes go to a temp file in the destination directory followed by an
//! atomic rename, so a reader never observes a partially-written file and a
//! crash mid-write leaves the previous valid state intact.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::RunState;

/// Load run state from a JSON file.
/// A missing file is a first run and yields the empty state.
pub fn load_state(path: &Path) -> Result<RunState> {
    if !path.exists() {
        info!(path = %path.display(), "No saved state found, starting fresh");
        return Ok(RunState::default());
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {}", path.display()))?;
    let state: RunState = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse state from {}", path.display()))?;

    info!(
        path = %path.display(),
        last_run = ?state.last_run,
        "State loaded from disk"
    );
    Ok(state)
}

/// Persist run state: serialize to a uniquely-named sibling temp file, then
/// rename over the destination. Rename within one directory is atomic on
/// POSIX filesystems.
pub fn save_state(path: &Path, state: &RunState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Failed to serialise run state")?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create state directory {}", dir.display()))?;

    let tmp = dir.join(format!(".state-{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, &json)
        .with_context(|| format!("Failed to write temp state file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move state into place at {}", path.display()))?;

    debug!(path = %path.display(), "State saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Decision, Market, WeightVector};
    use chrono::Utc;
    use std::path::PathBuf;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("verdict_test_state_{}.json", uuid::Uuid::new_v4()));
        p
    }

    fn sample_state(draw_id: i64) -> RunState {
        RunState {
            last_run: Some(Utc::now()),
            last_decision: Some(Decision {
                draw_id,
                market: Market::Parity,
                p_star: 0.61,
                bucket: "0.50".into(),
                accept: true,
                weights: WeightVector::default(),
            }),
        }
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path();
        let state = sample_state(42);
        save_state(&path, &state).unwrap();

        let loaded = load_state(&path).unwrap();
        assert!(loaded.last_run.is_some());
        assert_eq!(loaded.last_decision.unwrap().draw_id, 42);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_nonexistent_is_fresh_start() {
        let loaded = load_state(Path::new("/tmp/verdict_nonexistent_state_12345.json")).unwrap();
        assert!(loaded.last_run.is_none());
        assert!(loaded.last_decision.is_none());
    }

    #[test]
    fn test_save_overwrites_previous_state() {
        let path = temp_path();
        save_state(&path, &sample_state(1)).unwrap();
        save_state(&path, &sample_state(2)).unwrap();

        let loaded = load_state(&path).unwrap();
        assert_eq!(loaded.last_decision.unwrap().draw_id, 2);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("verdict_state_dir_{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.json");

        save_state(&path, &sample_state(7)).unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_crash_before_rename_preserves_previous_state() {
        // Simulate a crash mid-save: a stray temp file exists next to a
        // previously valid state file. The destination must still parse.
        let path = temp_path();
        save_state(&path, &sample_state(10)).unwrap();

        let dir = path.parent().unwrap();
        let stray = dir.join(format!(".state-{}.tmp", uuid::Uuid::new_v4()));
        std::fs::write(&stray, "{\"last_run\": \"TRUNC").unwrap();

        let loaded = load_state(&path).unwrap();
        assert_eq!(loaded.last_decision.unwrap().draw_id, 10);

        std::fs::remove_file(&stray).unwrap();
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_no_partial_destination_after_save() {
        // After every save the destination file is complete valid JSON.
        let path = temp_path();
        for i in 0..20 {
            save_state(&path, &sample_state(i)).unwrap();
            let raw = std::fs::read_to_string(&path).unwrap();
            let parsed: Result<RunState, _> = serde_json::from_str(&raw);
            assert!(parsed.is_ok(), "iteration {i} left a corrupt state file");
        }
        std::fs::remove_file(&path).unwrap();
    }
}
