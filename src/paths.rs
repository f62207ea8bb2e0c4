use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the operational log file: `<exe_dir>/logs/calibrator.log`
pub fn get_log_file() -> PathBuf {
    get_logs_dir().join("calibrator.log")
}

/// Returns the data directory: `<exe_dir>/data/`
///
/// Holds the session CSV and exported charts.
pub fn get_data_dir() -> PathBuf {
    get_exe_dir().join("data")
}

/// Resolves a configured file name against the data directory.
/// Absolute paths are returned unchanged.
pub fn resolve_data_path(name: &Path) -> PathBuf {
    if name.is_absolute() {
        name.to_path_buf()
    } else {
        get_data_dir().join(name)
    }
}

/// Candidate locations for `config.json`, in lookup order.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![get_exe_dir().join("config.json")];
    if let Ok(cwd) = std::env::current_dir() {
        let local = cwd.join("config.json");
        if !candidates.contains(&local) {
            candidates.push(local);
        }
    }
    candidates
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_data_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_goes_to_data_dir() {
        let resolved = resolve_data_path(Path::new("log.csv"));
        assert_eq!(resolved, get_data_dir().join("log.csv"));
    }

    #[test]
    fn test_resolve_absolute_unchanged() {
        let abs = std::env::temp_dir().join("abs.csv");
        assert_eq!(resolve_data_path(&abs), abs);
    }
}
