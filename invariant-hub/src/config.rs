//! Configuration loading and management for the hub.
//!
//! The configuration is a single JSON document that defines:
//! - GitHub owner and base repository name
//! - Where projects are installed and which hosting API is queried
//! - Project entries added or customised by the user

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::hub::error::{HubError, Result};

/// File name of the configuration document.
pub const CONFIG_FILE_NAME: &str = "master_config.json";

/// GitHub account that owns the project repositories.
pub const DEFAULT_GITHUB_OWNER: &str = "DARC0625";

/// Base name shared by the project repositories.
pub const DEFAULT_BASE_REPO_NAME: &str = "Project";

/// Root of the hosting API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// A project entry as stored in the `projects` map.
///
/// Every field is optional so that an entry can customise a single field of
/// a built-in project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Repository queried for releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,

    /// Entry point, relative to the install directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_script: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<String>,
}

const fn default_active() -> bool {
    true
}

/// Complete hub configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    #[serde(default = "default_github_owner")]
    pub github_owner: String,

    #[serde(default = "default_base_repo_name")]
    pub base_repo_name: String,

    /// Install root. Uses the platform data directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_dir: Option<PathBuf>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Optional token for authenticated API requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,

    /// Interpreter used for `.py` entry points.
    #[serde(default = "default_python")]
    pub python: String,

    /// Raw project entries, validated one by one in [`HubConfig::entries`].
    #[serde(default)]
    pub projects: serde_json::Map<String, serde_json::Value>,

    /// Top-level keys this version does not know, written back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_github_owner() -> String {
    DEFAULT_GITHUB_OWNER.to_string()
}

fn default_base_repo_name() -> String {
    DEFAULT_BASE_REPO_NAME.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_python() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            github_owner: default_github_owner(),
            base_repo_name: default_base_repo_name(),
            projects_dir: None,
            api_base_url: default_api_base_url(),
            github_token: None,
            python: default_python(),
            projects: serde_json::Map::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl HubConfig {
    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Load configuration if the file exists.
    ///
    /// A missing file is `Ok(None)`; an unreadable or malformed one is an error.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Parse configuration from a JSON string. Blank input yields defaults.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content).map_err(|source| HubError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the document atomically: temp file in the same directory, then rename.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = parent_dir(path);
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, self).map_err(|e| HubError::Config {
            message: format!("failed to serialize {}: {e}", path.display()),
        })?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| HubError::Io { source: e.error })?;
        Ok(())
    }

    /// Valid project entries in document order.
    ///
    /// Entries that do not match the schema are skipped with a warning.
    pub fn entries(&self) -> Vec<(String, ProjectEntry)> {
        self.projects
            .iter()
            .filter_map(|(id, value)| {
                match serde_json::from_value::<ProjectEntry>(value.clone()) {
                    Ok(entry) => Some((id.clone(), entry)),
                    Err(e) => {
                        warn!("Ignoring malformed project entry '{id}': {e}");
                        None
                    }
                }
            })
            .collect()
    }

    /// Merge a project entry into the document, keeping its position if present.
    ///
    /// Fields set in `entry` replace the stored ones; keys the entry does not
    /// carry, including ones unknown to [`ProjectEntry`], are left as they are.
    pub fn set_entry(&mut self, id: &str, entry: &ProjectEntry) -> Result<()> {
        let value = serde_json::to_value(entry).map_err(|e| HubError::Config {
            message: format!("failed to serialize project '{id}': {e}"),
        })?;
        let serde_json::Value::Object(fields) = value else {
            return Err(HubError::Config {
                message: format!("project '{id}' did not serialize to an object"),
            });
        };

        match self.projects.get_mut(id) {
            Some(serde_json::Value::Object(existing)) => {
                for (key, field) in fields {
                    existing.insert(key, field);
                }
            }
            _ => {
                self.projects
                    .insert(id.to_string(), serde_json::Value::Object(fields));
            }
        }
        Ok(())
    }

    /// Resolve the install root given an optional platform data directory (pure function).
    ///
    /// An explicit `projects_dir` wins; otherwise `<data_dir>/projects`, or
    /// `./projects` when no data directory is known.
    #[must_use]
    pub fn resolve_projects_root(&self, data_dir: Option<&Path>) -> PathBuf {
        if let Some(dir) = &self.projects_dir {
            return dir.clone();
        }
        match data_dir {
            Some(dir) => dir.join("projects"),
            None => PathBuf::from("projects"),
        }
    }

    /// Install root using the platform data directory.
    #[must_use]
    pub fn projects_root(&self) -> PathBuf {
        let dirs = project_dirs();
        self.resolve_projects_root(dirs.as_ref().map(|d| d.data_dir()))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "invariant", "invariant-hub")
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Default location of the configuration document.
///
/// Prefers `master_config.json` in the current directory, then the
/// platform config directory.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join(CONFIG_FILE_NAME),
        None => local,
    }
}

/// Path of the backup copy for a configuration document.
pub fn backup_path(config_path: &Path) -> PathBuf {
    let mut name = OsString::from(config_path.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

/// Copy the configuration document to its backup path.
pub fn backup_config(config_path: &Path) -> Result<PathBuf> {
    if !config_path.exists() {
        return Err(HubError::Config {
            message: format!("no config file to back up at {}", config_path.display()),
        });
    }
    let backup = backup_path(config_path);
    std::fs::copy(config_path, &backup)?;
    Ok(backup)
}

/// Restore the configuration document from its backup path.
pub fn restore_config(config_path: &Path) -> Result<PathBuf> {
    let backup = backup_path(config_path);
    if !backup.exists() {
        return Err(HubError::Config {
            message: format!("no backup found at {}", backup.display()),
        });
    }
    std::fs::copy(&backup, config_path)?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<HubConfig> {
        HubConfig::parse(content, Path::new("test.json"))
    }

    #[test]
    fn test_parse_minimal_config() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = parse(r#"{ "github_owner": "someone" }"#)?;
        assert_eq!(config.github_owner, "someone");
        assert_eq!(config.base_repo_name, DEFAULT_BASE_REPO_NAME);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(config.projects.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_blank_is_default() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = parse("   \n")?;
        assert_eq!(config, HubConfig::default());
        Ok(())
    }

    #[test]
    fn test_parse_invalid_json() {
        let Err(err) = parse("{ not json") else {
            panic!("expected parse failure");
        };
        assert!(matches!(err, HubError::ConfigParse { .. }));
    }

    #[test]
    fn test_entries_keep_document_order() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = parse(
            r#"{
                "github_owner": "DARC0625",
                "base_repo_name": "Project",
                "projects": {
                    "zeta": { "name": "Zeta", "repo_name": "zeta-repo", "main_file": "z.py" },
                    "alpha": { "name": "Alpha", "active": false, "removed_date": "2024-01-01 00:00:00" }
                }
            }"#,
        )?;

        let entries = config.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "zeta");
        assert_eq!(entries[0].1.repo_name.as_deref(), Some("zeta-repo"));
        assert!(entries[0].1.active);
        assert_eq!(entries[1].0, "alpha");
        assert!(!entries[1].1.active);
        Ok(())
    }

    #[test]
    fn test_malformed_entry_is_skipped() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = parse(
            r#"{ "projects": { "bad": { "name": 42 }, "good": { "name": "Good" } } }"#,
        )?;
        let entries = config.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "good");
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = HubConfig {
            github_owner: "owner".to_string(),
            ..Default::default()
        };
        config.set_entry(
            "demo",
            &ProjectEntry {
                name: Some("Demo".to_string()),
                repo_name: Some("demo-repo".to_string()),
                ..Default::default()
            },
        )?;
        config.save(&path)?;

        let loaded = HubConfig::load(&path)?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_unknown_keys_survive_updates() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{
                "github_owner": "me",
                "theme": "dark",
                "projects": {
                    "mine": { "repo_name": "mine-repo", "icon": "mine.png", "install_script": "setup.py" }
                }
            }"#,
        )?;

        let mut config = HubConfig::load(&path)?;
        config.set_entry(
            "mine",
            &ProjectEntry {
                name: Some("Mine".to_string()),
                active: false,
                ..Default::default()
            },
        )?;
        config.save(&path)?;

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["github_owner"], "me");
        let mine = &raw["projects"]["mine"];
        assert_eq!(mine["icon"], "mine.png");
        assert_eq!(mine["install_script"], "setup.py");
        assert_eq!(mine["repo_name"], "mine-repo");
        assert_eq!(mine["name"], "Mine");
        assert_eq!(mine["active"], false);
        Ok(())
    }

    #[test]
    fn test_load_optional() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("missing.json");
        assert_eq!(HubConfig::load_optional(&missing)?, None);

        let corrupt = temp.path().join("corrupt.json");
        std::fs::write(&corrupt, "[1, 2")?;
        let Err(err) = HubConfig::load_optional(&corrupt) else {
            panic!("expected a parse error");
        };
        assert!(matches!(err, HubError::ConfigParse { .. }));
        Ok(())
    }

    #[test]
    fn test_resolve_projects_root() {
        let config = HubConfig::default();
        assert_eq!(
            config.resolve_projects_root(Some(Path::new("/data/hub"))),
            PathBuf::from("/data/hub/projects")
        );
        assert_eq!(config.resolve_projects_root(None), PathBuf::from("projects"));

        let config = HubConfig {
            projects_dir: Some(PathBuf::from("/opt/projects")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_projects_root(Some(Path::new("/data/hub"))),
            PathBuf::from("/opt/projects")
        );
    }

    #[test]
    fn test_backup_and_restore() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(CONFIG_FILE_NAME);

        assert!(backup_config(&path).is_err());
        assert!(restore_config(&path).is_err());

        std::fs::write(&path, r#"{ "github_owner": "first" }"#)?;
        let backup = backup_config(&path)?;
        assert_eq!(backup, temp.path().join("master_config.json.backup"));

        std::fs::write(&path, r#"{ "github_owner": "second" }"#)?;
        restore_config(&path)?;
        assert_eq!(HubConfig::load(&path)?.github_owner, "first");
        Ok(())
    }
}
