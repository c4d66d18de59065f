//! Path resolution for the CLI.

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Database file name.
const DATABASE_FILENAME: &str = "lorebook.redb";

/// Environment variable overriding the data directory.
const DATA_DIR_ENV: &str = "LOREBOOK_DATA_DIR";

/// Returns the data directory.
///
/// Search order:
/// 1. `--data-dir` flag
/// 2. `$LOREBOOK_DATA_DIR` environment variable
/// 3. Platform standard location (e.g. `~/.local/share/lorebook` on Linux)
pub fn data_dir(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.clone());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("dev", "lorebook", "Lorebook")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

/// Returns the database path, creating the data directory if needed.
pub fn database_path(custom_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let dir = data_dir(custom_dir)?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| anyhow!("Failed to create data directory {}: {e}", dir.display()))?;
    Ok(dir.join(DATABASE_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_dir_wins() {
        let custom = PathBuf::from("/tmp/lorebook-test");
        assert_eq!(data_dir(Some(&custom)).unwrap(), custom);
    }

    #[test]
    fn test_database_path_in_custom_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let custom = temp.path().to_path_buf();
        let path = database_path(Some(&custom)).unwrap();
        assert_eq!(path, custom.join(DATABASE_FILENAME));
    }
}
