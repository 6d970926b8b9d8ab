//! Removal of persisted state.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::paths::DataDir;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub path: PathBuf,
    pub bytes: u64,
    pub is_dir: bool,
}

/// Paths a cleanup would delete.
#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    pub items: Vec<PlanItem>,
    /// Kept on purpose, shown for reference.
    pub preserved: Vec<PathBuf>,
}

impl CleanupPlan {
    /// The files askweb itself writes under the data directory: the saved
    /// session, the auth summary and the library unless `preserve_library`
    /// is set. Anything else found there is left alone, as is the config file.
    pub fn build(paths: &DataDir, preserve_library: bool) -> Result<Self> {
        let mut plan = Self::default();

        let mut owned = vec![paths.auth_info(), paths.browser_state_dir()];
        if preserve_library {
            plan.preserved.push(paths.library());
        } else {
            owned.push(paths.library());
        }
        plan.preserved.push(paths.config_file());
        plan.preserved.retain(|p| p.exists());

        for path in owned {
            if std::fs::symlink_metadata(&path).is_err() {
                continue;
            }
            let is_dir = path.is_dir();
            let bytes = size_of(&path)?;
            plan.items.push(PlanItem {
                path,
                bytes,
                is_dir,
            });
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.bytes).sum()
    }

    /// Delete every planned path. Returns the number removed.
    pub fn execute(&self) -> Result<usize> {
        let mut removed = 0;
        for item in &self.items {
            if !item.path.exists() {
                continue;
            }
            let result = if item.is_dir {
                std::fs::remove_dir_all(&item.path)
            } else {
                std::fs::remove_file(&item.path)
            };
            result.with_context(|| format!("removing {}", item.path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }
}

impl fmt::Display for CleanupPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            writeln!(f, "Nothing to clean up.")?;
        } else {
            writeln!(f, "Will remove:")?;
            for item in &self.items {
                let suffix = if item.is_dir { "/" } else { "" };
                writeln!(
                    f,
                    "  {}{} ({})",
                    item.path.display(),
                    suffix,
                    human_size(item.bytes)
                )?;
            }
            writeln!(f, "Total: {}", human_size(self.total_bytes()))?;
        }
        for path in &self.preserved {
            writeln!(f, "Keeping: {}", path.display())?;
        }
        Ok(())
    }
}

fn size_of(path: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        total += size_of(&entry?.path())?;
    }
    Ok(total)
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> (tempfile::TempDir, DataDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataDir::new(dir.path());
        std::fs::create_dir_all(paths.browser_state_dir()).unwrap();
        std::fs::write(paths.state_file(), vec![b'x'; 100]).unwrap();
        std::fs::write(paths.auth_info(), b"{}").unwrap();
        std::fs::write(paths.library(), b"{\"notebooks\":[]}").unwrap();
        std::fs::write(paths.config_file(), b"").unwrap();
        std::fs::write(dir.path().join("stray.log"), b"abc").unwrap();
        (dir, paths)
    }

    #[test]
    fn plan_lists_only_askweb_files() {
        let (_dir, paths) = populated();
        let plan = CleanupPlan::build(&paths, false).unwrap();
        let names: Vec<String> = plan
            .items
            .iter()
            .map(|i| i.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["auth_info.json", "browser_state", "library.json"]
        );
        assert_eq!(plan.preserved, vec![paths.config_file()]);
        let state = plan.items.iter().find(|i| i.is_dir).unwrap();
        assert_eq!(state.bytes, 100);
    }

    #[test]
    fn preserve_library() {
        let (_dir, paths) = populated();
        let plan = CleanupPlan::build(&paths, true).unwrap();
        assert!(plan.items.iter().all(|i| i.path != paths.library()));
        assert!(plan.preserved.contains(&paths.library()));
    }

    #[test]
    fn building_a_plan_deletes_nothing() {
        let (_dir, paths) = populated();
        let plan = CleanupPlan::build(&paths, false).unwrap();
        assert!(plan.to_string().contains("Will remove:"));
        assert!(paths.state_file().exists());
        assert!(paths.library().exists());
    }

    #[test]
    fn execute_removes_planned_paths() {
        let (dir, paths) = populated();
        let plan = CleanupPlan::build(&paths, true).unwrap();
        assert_eq!(plan.execute().unwrap(), 2);
        assert!(!paths.browser_state_dir().exists());
        assert!(!paths.auth_info().exists());
        assert!(dir.path().join("stray.log").exists());
        assert!(paths.library().exists());
        assert!(paths.config_file().exists());
    }

    #[test]
    fn unrelated_files_in_data_dir_survive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Documents")).unwrap();
        std::fs::write(dir.path().join("Documents/notes.txt"), b"keep").unwrap();
        std::fs::write(dir.path().join(".bashrc"), b"keep").unwrap();
        let paths = DataDir::new(dir.path());

        let plan = CleanupPlan::build(&paths, false).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.execute().unwrap(), 0);
        assert!(dir.path().join("Documents/notes.txt").exists());
        assert!(dir.path().join(".bashrc").exists());
    }

    #[test]
    fn missing_data_dir_is_empty_plan() {
        let dir = tempfile::tempdir().unwrap();
        let plan = CleanupPlan::build(&DataDir::new(dir.path().join("nope")), false).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "Nothing to clean up.\n");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }
}
