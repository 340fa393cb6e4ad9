//! Per-project install records.
//!
//! Each installed project carries a `version.json` file inside its install
//! directory. The record is the single source of truth for "is this project
//! installed": a directory without a valid record is only partially
//! installed and must not be launched.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::{HubError, Result};

/// Name of the record file inside an install directory.
pub const RECORD_FILE_NAME: &str = "version.json";

/// Persisted fact "project X, version Y, installed at time Z".
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct InstallRecord {
    pub version: String,
    pub install_date: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
}

/// Install state derived from the record and the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    /// Directory exists but holds no valid record.
    Partial,
    Installed(InstallRecord),
}

/// Reads and writes install records under a projects root.
#[derive(Debug, Clone)]
pub struct VersionStore {
    projects_root: PathBuf,
}

impl VersionStore {
    /// Create a store rooted at `projects_root`. Nothing is created on disk.
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            projects_root: projects_root.into(),
        }
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    /// Install directory of a project.
    pub fn install_dir(&self, project_id: &str) -> PathBuf {
        self.projects_root.join(project_id)
    }

    fn record_path(&self, project_id: &str) -> PathBuf {
        self.install_dir(project_id).join(RECORD_FILE_NAME)
    }

    /// Read the record of a project.
    ///
    /// Returns `None` when the record is missing, unreadable or malformed;
    /// this never fails.
    pub fn read(&self, project_id: &str) -> Option<InstallRecord> {
        let path = self.record_path(project_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read {}: {e}", path.display());
                return None;
            }
        };

        let record: InstallRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("Malformed install record {}: {e}", path.display());
                return None;
            }
        };

        if record.version.trim().is_empty() || record.project_id != project_id {
            warn!(
                "Install record {} does not describe project '{project_id}'",
                path.display()
            );
            return None;
        }

        Some(record)
    }

    /// Write the record of a project atomically.
    ///
    /// The install directory must already exist.
    pub fn write(&self, project_id: &str, record: &InstallRecord) -> Result<()> {
        let dir = self.install_dir(project_id);
        let path = self.record_path(project_id);

        let mut temp = tempfile::Builder::new()
            .prefix(".version-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, record).map_err(|e| HubError::Io {
            source: std::io::Error::other(e),
        })?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| HubError::Io { source: e.error })?;

        debug!("Recorded {project_id} v{}", record.version);
        Ok(())
    }

    /// Delete the record of a project. Deleting a missing record succeeds.
    pub fn delete(&self, project_id: &str) -> Result<()> {
        match std::fs::remove_file(self.record_path(project_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Derive the install state of a project.
    pub fn state(&self, project_id: &str) -> InstallState {
        if let Some(record) = self.read(project_id) {
            return InstallState::Installed(record);
        }
        if self.install_dir(project_id).is_dir() {
            InstallState::Partial
        } else {
            InstallState::NotInstalled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_temp_store() -> (TempDir, VersionStore) {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => panic!("Failed to create temp dir: {e}"),
        };
        let store = VersionStore::new(temp_dir.path());
        (temp_dir, store)
    }

    fn record(project_id: &str, version: &str) -> InstallRecord {
        InstallRecord {
            version: version.to_string(),
            install_date: "2024-05-01 10:00:00".to_string(),
            project_id: project_id.to_string(),
            updated_date: None,
        }
    }

    #[test]
    fn test_read_missing_is_none() {
        let (_temp, store) = create_temp_store();
        assert_eq!(store.read("Project1"), None);
        assert_eq!(store.state("Project1"), InstallState::NotInstalled);
    }

    #[test]
    fn test_write_and_read() {
        let (_temp, store) = create_temp_store();
        if let Err(e) = std::fs::create_dir_all(store.install_dir("Project1")) {
            panic!("Failed to create install dir: {e}");
        }

        let rec = record("Project1", "1.2.0");
        if let Err(e) = store.write("Project1", &rec) {
            panic!("Failed to write record: {e}");
        }

        assert_eq!(store.read("Project1"), Some(rec.clone()));
        assert_eq!(store.state("Project1"), InstallState::Installed(rec));
    }

    #[test]
    fn test_record_file_layout() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_temp, store) = create_temp_store();
        std::fs::create_dir_all(store.install_dir("Project2"))?;
        store.write("Project2", &record("Project2", "0.3.1"))?;

        let raw = std::fs::read_to_string(store.install_dir("Project2").join(RECORD_FILE_NAME))?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let Some(obj) = value.as_object() else {
            panic!("record should be an object");
        };
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["install_date", "project_id", "version"]);
        Ok(())
    }

    #[test]
    fn test_malformed_record_is_partial() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_temp, store) = create_temp_store();
        let dir = store.install_dir("Project3");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(RECORD_FILE_NAME), "{\"version\": \"1.0")?;

        assert_eq!(store.read("Project3"), None);
        assert_eq!(store.state("Project3"), InstallState::Partial);
        Ok(())
    }

    #[test]
    fn test_record_for_other_project_is_rejected() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_temp, store) = create_temp_store();
        std::fs::create_dir_all(store.install_dir("Project1"))?;
        store.write("Project1", &record("Project4", "1.0.0"))?;

        assert_eq!(store.read("Project1"), None);
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_temp, store) = create_temp_store();
        std::fs::create_dir_all(store.install_dir("Project1"))?;
        store.write("Project1", &record("Project1", "1.0.0"))?;

        store.delete("Project1")?;
        store.delete("Project1")?;
        assert_eq!(store.read("Project1"), None);
        Ok(())
    }

    #[test]
    fn test_write_leaves_no_temp_files() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_temp, store) = create_temp_store();
        let dir = store.install_dir("Project1");
        std::fs::create_dir_all(&dir)?;
        store.write("Project1", &record("Project1", "1.0.0"))?;
        store.write("Project1", &record("Project1", "1.1.0"))?;

        let names: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![RECORD_FILE_NAME.to_string()]);
        assert_eq!(store.read("Project1").map(|r| r.version), Some("1.1.0".to_string()));
        Ok(())
    }
}
