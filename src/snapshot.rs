// Snapshot acquisition - where the rule and route text comes from
//
// The decision core only ever sees four text blobs (v4/v6 rules, v4/v6
// routes). This module owns the seam that produces them: the live `ip`
// binary on the local host, or a directory of previously captured output
// for validating a configuration offline.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::routing::IpFamily;

/// Producer of `ip rule show` / `ip route show table all` text for one
/// address family
pub trait SnapshotSource {
    fn rules(&self, family: IpFamily) -> AppResult<String>;
    fn routes(&self, family: IpFamily) -> AppResult<String>;
}

/// Where and when a snapshot was taken
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub hostname: String,
    pub taken_at: String,
}

impl SnapshotInfo {
    pub fn capture() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        SnapshotInfo {
            hostname,
            taken_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Runs the `ip` binary and hands back its stdout
pub struct IpCommand {
    binary: PathBuf,
}

impl IpCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        IpCommand {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> AppResult<String> {
        let output = Command::new(&self.binary).args(args).output().map_err(|e| {
            AppError::CommandExecution(format!(
                "failed to execute {}: {}",
                self.binary.display(),
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::CommandExecution(format!(
                "{} {} failed: {}",
                self.binary.display(),
                args.join(" "),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("{} {} output:\n{}", self.binary.display(), args.join(" "), stdout);
        Ok(stdout)
    }
}

impl SnapshotSource for IpCommand {
    fn rules(&self, family: IpFamily) -> AppResult<String> {
        self.run(&[family.flag(), "rule", "show"])
    }

    fn routes(&self, family: IpFamily) -> AppResult<String> {
        self.run(&[family.flag(), "route", "show", "table", "all"])
    }
}

/// Reads previously captured `ip` output from a directory holding
/// `rules-v4.txt`, `rules-v6.txt`, `routes-v4.txt` and `routes-v6.txt`.
/// A missing file reads as empty text, so a v4-only capture still loads.
pub struct FileSnapshot {
    dir: PathBuf,
}

impl FileSnapshot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileSnapshot { dir: dir.into() }
    }

    fn read(&self, name: &str) -> AppResult<String> {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("snapshot file {} not present, treating as empty", path.display());
                Ok(String::new())
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

impl SnapshotSource for FileSnapshot {
    fn rules(&self, family: IpFamily) -> AppResult<String> {
        self.read(&format!("rules-{}.txt", family.name()))
    }

    fn routes(&self, family: IpFamily) -> AppResult<String> {
        self.read(&format!("routes-{}.txt", family.name()))
    }
}

/// Capture the four blobs from one source into files another run can
/// load with `FileSnapshot`
pub fn capture_to_dir(source: &dyn SnapshotSource, dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(dir)?;
    for family in [IpFamily::V4, IpFamily::V6] {
        std::fs::write(
            dir.join(format!("rules-{}.txt", family.name())),
            source.rules(family)?,
        )?;
        std::fs::write(
            dir.join(format!("routes-{}.txt", family.name())),
            source.routes(family)?,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_flags() {
        assert_eq!(IpFamily::V4.flag(), "-4");
        assert_eq!(IpFamily::V6.flag(), "-6");
        assert_eq!(IpFamily::V4.name(), "v4");
        assert_eq!(IpFamily::V6.name(), "v6");
    }

    #[test]
    fn test_file_snapshot_missing_files_read_empty() {
        let snapshot = FileSnapshot::new(
            std::env::temp_dir().join(format!("prs-missing-{}", std::process::id())),
        );
        assert_eq!(snapshot.rules(IpFamily::V4).unwrap(), "");
        assert_eq!(snapshot.routes(IpFamily::V6).unwrap(), "");
    }

    #[test]
    fn test_file_snapshot_round_trip() {
        struct Fixed;
        impl SnapshotSource for Fixed {
            fn rules(&self, family: IpFamily) -> AppResult<String> {
                Ok(format!("0: from all lookup local # {}\n", family.name()))
            }
            fn routes(&self, family: IpFamily) -> AppResult<String> {
                Ok(format!("default dev lo # {}\n", family.name()))
            }
        }

        let dir = std::env::temp_dir().join(format!("prs-capture-{}", std::process::id()));
        capture_to_dir(&Fixed, &dir).unwrap();

        let loaded = FileSnapshot::new(&dir);
        assert!(loaded.rules(IpFamily::V4).unwrap().contains("lookup local"));
        assert!(loaded.routes(IpFamily::V6).unwrap().contains("default dev lo"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
