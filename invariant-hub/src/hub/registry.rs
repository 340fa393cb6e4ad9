//! Project catalog: built-in projects merged with the configuration document.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::{HubError, Result};
use super::timestamp;
use crate::config::{HubConfig, ProjectEntry};

/// Entry point used when a configured project does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "main.py";

/// Static description of a project the hub can install.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Repository queried for releases.
    pub source_repo: String,
    /// File executed to start the project, relative to its install directory.
    pub entry_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_script: Option<String>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<String>,
}

impl ProjectDescriptor {
    /// Descriptor for a new project with the given id and repository.
    pub fn new(id: impl Into<String>, source_repo: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            source_repo: source_repo.into(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            install_script: None,
            active: true,
            created_date: None,
            updated_date: None,
            removed_date: None,
        }
    }

    fn to_entry(&self) -> ProjectEntry {
        ProjectEntry {
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            repo_name: Some(self.source_repo.clone()),
            main_file: Some(self.entry_point.clone()),
            install_script: self.install_script.clone(),
            active: self.active,
            created_date: self.created_date.clone(),
            updated_date: self.updated_date.clone(),
            removed_date: self.removed_date.clone(),
        }
    }

    fn apply_entry(&mut self, entry: ProjectEntry) {
        if let Some(name) = entry.name {
            self.name = name;
        }
        if let Some(description) = entry.description {
            self.description = description;
        }
        if let Some(repo) = entry.repo_name {
            self.source_repo = repo;
        }
        if let Some(main_file) = entry.main_file {
            self.entry_point = main_file;
        }
        if entry.install_script.is_some() {
            self.install_script = entry.install_script;
        }
        self.active = entry.active;
        self.created_date = entry.created_date;
        self.updated_date = entry.updated_date;
        self.removed_date = entry.removed_date;
    }
}

/// Partial change to a project's metadata. `None` and empty strings keep the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source_repo: Option<String>,
    pub entry_point: Option<String>,
    pub install_script: Option<String>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        [
            &self.name,
            &self.description,
            &self.source_repo,
            &self.entry_point,
            &self.install_script,
        ]
        .iter()
        .all(|field| non_empty(field).is_none())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

struct BuiltinProject {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    repo_name: &'static str,
    main_file: &'static str,
    install_script: &'static str,
}

const BUILTIN_PROJECTS: &[BuiltinProject] = &[
    BuiltinProject {
        id: "Project1",
        name: "Project 1",
        description: "First project",
        repo_name: "Project1",
        main_file: "main.py",
        install_script: "install.py",
    },
    BuiltinProject {
        id: "Project2",
        name: "Project 2",
        description: "Second project",
        repo_name: "Project2",
        main_file: "app.py",
        install_script: "setup.py",
    },
    BuiltinProject {
        id: "Project3",
        name: "Project 3",
        description: "Third project",
        repo_name: "Project3",
        main_file: "start.py",
        install_script: "install.py",
    },
    BuiltinProject {
        id: "Project4",
        name: "Project 4 - AI Agent",
        description: "AI agent for the Android emulator",
        repo_name: "Project4_AI_Agent",
        main_file: "windows_ai_agent_gui.py",
        install_script: "install_complete.bat",
    },
];

impl From<&BuiltinProject> for ProjectDescriptor {
    fn from(builtin: &BuiltinProject) -> Self {
        Self {
            id: builtin.id.to_string(),
            name: builtin.name.to_string(),
            description: builtin.description.to_string(),
            source_repo: builtin.repo_name.to_string(),
            entry_point: builtin.main_file.to_string(),
            install_script: Some(builtin.install_script.to_string()),
            active: true,
            created_date: None,
            updated_date: None,
            removed_date: None,
        }
    }
}

/// Ordered catalog of projects.
///
/// Built-in projects always come first, in a fixed order, followed by
/// projects that exist only in the configuration document, in document
/// order. A document entry for a built-in id customises that project.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    config: HubConfig,
    config_path: Option<PathBuf>,
    /// Why the document at `config_path` could not be used, if it couldn't.
    load_error: Option<String>,
    projects: Vec<ProjectDescriptor>,
}

impl ProjectRegistry {
    /// Build a registry from an in-memory document. Nothing is persisted.
    pub fn from_config(config: HubConfig) -> Self {
        let mut projects: Vec<ProjectDescriptor> =
            BUILTIN_PROJECTS.iter().map(ProjectDescriptor::from).collect();

        for (id, mut entry) in config.entries() {
            if let Some(main_file) = &entry.main_file {
                if let Err(e) = validate_entry_point(main_file) {
                    warn!("Ignoring main_file of '{id}': {e}");
                    entry.main_file = None;
                }
            }
            if let Some(existing) = projects.iter_mut().find(|p| p.id == id) {
                existing.apply_entry(entry);
                continue;
            }
            if let Err(e) = validate_id(&id) {
                warn!("Ignoring project entry: {e}");
                continue;
            }
            let mut descriptor = ProjectDescriptor::new(id.clone(), id);
            descriptor.apply_entry(entry);
            projects.push(descriptor);
        }

        Self {
            config,
            config_path: None,
            load_error: None,
            projects,
        }
    }

    /// Load the registry backed by the document at `path`.
    ///
    /// A missing or malformed document yields the built-in projects only.
    /// A malformed document is never overwritten: [`save`](Self::save)
    /// refuses until it is fixed or restored.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (config, load_error) = match HubConfig::load_optional(&path) {
            Ok(config) => (config.unwrap_or_default(), None),
            Err(e) => {
                warn!("Using built-in projects: {e}");
                (HubConfig::default(), Some(e.to_string()))
            }
        };
        let mut registry = Self::from_config(config);
        registry.load_error = load_error;
        debug!(
            "Loaded {} project(s) from {}",
            registry.projects.len(),
            path.display()
        );
        registry.config_path = Some(path);
        registry
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// All projects, active or not, in catalog order.
    pub fn list(&self) -> &[ProjectDescriptor] {
        &self.projects
    }

    /// Active projects in catalog order.
    pub fn active(&self) -> impl Iterator<Item = &ProjectDescriptor> {
        self.projects.iter().filter(|p| p.active)
    }

    /// Look up a project by id.
    pub fn get(&self, id: &str) -> Result<&ProjectDescriptor> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| HubError::project_not_found(id))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut ProjectDescriptor> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| HubError::project_not_found(id))
    }

    /// Register a new project.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The id is empty or not usable as a directory name
    /// - The repository or entry point is empty
    /// - A project with the same id exists, active or not
    pub fn add(&mut self, mut descriptor: ProjectDescriptor) -> Result<&ProjectDescriptor> {
        validate_id(&descriptor.id)?;
        if self.projects.iter().any(|p| p.id == descriptor.id) {
            return Err(HubError::DuplicateId { id: descriptor.id });
        }
        if descriptor.source_repo.trim().is_empty() {
            return Err(HubError::InvalidDescriptor {
                reason: format!("project '{}' has no repository", descriptor.id),
            });
        }
        validate_entry_point(&descriptor.entry_point)?;
        if descriptor.name.trim().is_empty() {
            descriptor.name = descriptor.id.clone();
        }

        descriptor.active = true;
        descriptor.created_date = Some(timestamp());
        descriptor.updated_date = None;
        descriptor.removed_date = None;

        self.config.set_entry(&descriptor.id, &descriptor.to_entry())?;
        info!("Added project {}", descriptor.id);
        self.projects.push(descriptor);
        let index = self.projects.len() - 1;
        Ok(&self.projects[index])
    }

    /// Mark a project inactive. Its descriptor stays in the catalog.
    pub fn deactivate(&mut self, id: &str) -> Result<()> {
        let project = self.get_mut(id)?;
        if !project.active {
            return Ok(());
        }
        project.active = false;
        project.removed_date = Some(timestamp());
        let entry = project.to_entry();

        self.config.set_entry(id, &entry)?;
        info!("Deactivated project {id}");
        Ok(())
    }

    /// Merge non-empty fields of `update` into a project.
    pub fn update_metadata(&mut self, id: &str, update: &ProjectUpdate) -> Result<&ProjectDescriptor> {
        if let Some(entry_point) = non_empty(&update.entry_point) {
            validate_entry_point(&entry_point)?;
        }
        let project = self.get_mut(id)?;
        if let Some(name) = non_empty(&update.name) {
            project.name = name;
        }
        if let Some(description) = non_empty(&update.description) {
            project.description = description;
        }
        if let Some(repo) = non_empty(&update.source_repo) {
            project.source_repo = repo;
        }
        if let Some(entry_point) = non_empty(&update.entry_point) {
            project.entry_point = entry_point;
        }
        if let Some(script) = non_empty(&update.install_script) {
            project.install_script = Some(script);
        }
        project.updated_date = Some(timestamp());
        let entry = project.to_entry();

        self.config.set_entry(id, &entry)?;
        info!("Updated project {id}");
        self.get(id)
    }

    /// Change the GitHub owner and base repository name.
    pub fn update_settings(&mut self, github_owner: Option<String>, base_repo_name: Option<String>) {
        if let Some(owner) = non_empty(&github_owner) {
            self.config.github_owner = owner;
        }
        if let Some(base) = non_empty(&base_repo_name) {
            self.config.base_repo_name = base;
        }
    }

    /// Persist the document to the path the registry was loaded from.
    pub fn save(&self) -> Result<()> {
        if let (Some(path), Some(reason)) = (&self.config_path, &self.load_error) {
            return Err(HubError::Config {
                message: format!(
                    "refusing to overwrite {}: {reason}. Fix the file or run `restore` first",
                    path.display()
                ),
            });
        }
        match &self.config_path {
            Some(path) => {
                self.config.save(path)?;
                debug!("Saved config to {}", path.display());
                Ok(())
            }
            None => Err(HubError::Config {
                message: "registry is not backed by a config file".to_string(),
            }),
        }
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::from_config(HubConfig::default())
    }
}

/// Ids double as install directory names.
fn validate_id(id: &str) -> Result<()> {
    let reason = if id.trim().is_empty() {
        Some("project id must not be empty".to_string())
    } else if id != id.trim() {
        Some(format!("project id '{id}' has surrounding whitespace"))
    } else if id == "." || id == ".." || id.starts_with('.') {
        Some(format!("project id '{id}' must not start with '.'"))
    } else if id.contains(['/', '\\', ':']) {
        Some(format!("project id '{id}' must not contain path separators"))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(HubError::InvalidDescriptor { reason }),
        None => Ok(()),
    }
}

/// Entry points are joined onto the install directory and must stay inside it.
fn validate_entry_point(entry_point: &str) -> Result<()> {
    let reason = if entry_point.trim().is_empty() {
        Some("entry point must not be empty".to_string())
    } else if Path::new(entry_point).is_absolute() || entry_point.starts_with(['/', '\\']) {
        Some(format!("entry point '{entry_point}' must be a relative path"))
    } else if entry_point.split(['/', '\\']).any(|part| part == ".." || part.contains(':')) {
        Some(format!(
            "entry point '{entry_point}' must stay inside the install directory"
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(HubError::InvalidDescriptor { reason }),
        None => Ok(()),
    }
}
