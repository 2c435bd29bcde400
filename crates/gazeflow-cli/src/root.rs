use gazeflow_core::paths::STUDY_CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the study root directory.
///
/// Priority:
/// 1. `--root` flag / `GAZEFLOW_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `study.yaml`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_study_root(&cwd).unwrap_or(cwd)
}

fn find_study_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(STUDY_CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_study_yaml_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STUDY_CONFIG_FILE), "session_def: []\n").unwrap();
        let deep = dir.path().join("s1/cam");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_study_root(&deep).as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_study_yaml_means_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_study_root(dir.path()), None);
    }
}
