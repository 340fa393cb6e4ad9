//! Download, extraction, and launch of projects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::{HubError, Result};
use super::registry::{ProjectDescriptor, ProjectRegistry};
use super::release_source::{ReleaseAsset, ReleaseDescriptor, ReleaseSource};
use super::timestamp;
use super::version_store::{InstallRecord, VersionStore};
use crate::config::HubConfig;

/// Version a project without an install record compares as.
pub const UNINSTALLED_VERSION: &str = "0.0.0";

/// Archive formats recognised as packages, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    Zip,
    TarGz,
}

impl PackageFormat {
    const PREFERENCE: [PackageFormat; 2] = [PackageFormat::Zip, PackageFormat::TarGz];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::TarGz => ".tar.gz",
        }
    }

    fn matches(self, asset_name: &str) -> bool {
        asset_name.to_ascii_lowercase().ends_with(self.extension())
    }
}

/// Result of comparing the installed version with the newest release.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateCheck {
    pub project_id: String,
    pub current: Option<String>,
    pub latest: Option<String>,
    pub available: bool,
}

/// Installs, removes, and launches projects.
///
/// Every operation takes a per-project lock, so two operations on the same
/// project never overlap while different projects proceed independently.
pub struct InstallManager<S> {
    source: S,
    store: VersionStore,
    registry: Arc<RwLock<ProjectRegistry>>,
    python: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: ReleaseSource> InstallManager<S> {
    /// Create a new install manager.
    pub fn new(source: S, store: VersionStore, registry: Arc<RwLock<ProjectRegistry>>) -> Self {
        Self {
            source,
            store,
            registry,
            python: HubConfig::default().python,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Interpreter used to run `.py` entry points.
    #[must_use]
    pub fn with_interpreter(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<RwLock<ProjectRegistry>> {
        &self.registry
    }

    async fn descriptor(&self, project_id: &str) -> Result<ProjectDescriptor> {
        self.registry.read().await.get(project_id).cloned()
    }

    async fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Compare the installed version of a project with its newest release.
    ///
    /// Any difference between the two versions counts as an update, including
    /// a newest release that is older than the installed one. A repository
    /// without releases reports no update rather than an error.
    pub async fn check_update(&self, project_id: &str) -> Result<UpdateCheck> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let project = self.descriptor(project_id).await?;
        let releases = self.source.list_releases(&project.source_repo).await?;
        let current = self.store.read(project_id).map(|r| r.version);

        let Some(newest) = releases.first() else {
            debug!("{project_id}: no releases published");
            return Ok(UpdateCheck {
                project_id: project_id.to_string(),
                current,
                latest: None,
                available: false,
            });
        };

        let latest = newest.version().to_string();
        let installed = current.as_deref().unwrap_or(UNINSTALLED_VERSION);
        let available = latest != installed;
        debug!("{project_id}: installed {installed}, latest {latest}");

        Ok(UpdateCheck {
            project_id: project_id.to_string(),
            current,
            latest: Some(latest),
            available,
        })
    }

    /// Install the newest release of a project.
    ///
    /// # Process
    ///
    /// 1. Fetch releases and pick the newest one
    /// 2. Locate its package asset (`.zip`, then `.tar.gz`)
    /// 3. Download the asset into a private temp directory
    /// 4. Extract into a staging directory next to the install directory
    /// 5. Swap the staging directory in, replacing any previous contents
    /// 6. Write the install record
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The project is unknown
    /// - The repository has no releases
    /// - The newest release has no package asset
    /// - Download or extraction fails
    ///
    /// No install record is written unless every step succeeds. A failed
    /// download or extraction leaves any previous installation untouched.
    pub async fn install(&self, project_id: &str) -> Result<InstallRecord> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let project = self.descriptor(project_id).await?;
        let releases = self.source.list_releases(&project.source_repo).await?;
        let release = releases.first().ok_or_else(|| HubError::NoReleases {
            repo: project.source_repo.clone(),
        })?;
        let (asset, format) = select_package_asset(release)?;
        let version = release.version().to_string();

        let root = self.store.projects_root().to_path_buf();
        std::fs::create_dir_all(&root)?;
        remove_stale_staging(&root, project_id);

        info!("Downloading {project_id} v{version} ({})", asset.name);
        let download_dir = tempfile::Builder::new()
            .prefix("invariant-download-")
            .tempdir()?;
        let archive_path = download_dir.path().join(archive_file_name(asset));
        self.source.download_asset(asset, &archive_path).await?;

        info!("Extracting {}", asset.name);
        let staging = tempfile::Builder::new()
            .prefix(&staging_prefix(project_id))
            .tempdir_in(&root)?;
        let staging_path = staging.path().to_path_buf();
        let archive = archive_path.clone();
        tokio::task::spawn_blocking(move || extract_archive(format, &archive, &staging_path))
            .await
            .map_err(|e| HubError::extract(&archive_path, e))??;

        let install_dir = self.store.install_dir(project_id);
        let previous = self.store.read(project_id);
        self.store.delete(project_id)?;
        if install_dir.exists() {
            std::fs::remove_dir_all(&install_dir)?;
        }
        std::fs::rename(staging.path(), &install_dir)?;
        // The staging path is gone now; dropping `staging` is a no-op.
        drop(staging);

        mark_executable(&install_dir.join(&project.entry_point));

        let now = timestamp();
        let record = match previous {
            Some(previous) => InstallRecord {
                version,
                install_date: previous.install_date,
                project_id: project_id.to_string(),
                updated_date: Some(now),
            },
            None => InstallRecord {
                version,
                install_date: now,
                project_id: project_id.to_string(),
                updated_date: None,
            },
        };
        self.store.write(project_id, &record)?;

        if let Err(e) = download_dir.close() {
            warn!("Failed to remove temporary download: {e}");
        }

        info!("Installed {project_id} v{}", record.version);
        Ok(record)
    }

    /// Remove a project's installed files and record.
    ///
    /// Removing a project that is not installed succeeds.
    pub async fn uninstall(&self, project_id: &str) -> Result<()> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        self.descriptor(project_id).await?;
        let install_dir = self.store.install_dir(project_id);

        // Record first: a failed delete below leaves the project partial, not installed.
        match self.store.delete(project_id) {
            Ok(()) => {}
            Err(HubError::Io { source }) => {
                return Err(HubError::Uninstall {
                    path: install_dir,
                    source,
                });
            }
            Err(e) => return Err(e),
        }

        match std::fs::remove_dir_all(&install_dir) {
            Ok(()) => info!("Uninstalled {project_id}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{project_id} was not installed");
            }
            Err(source) => {
                return Err(HubError::Uninstall {
                    path: install_dir,
                    source,
                });
            }
        }

        remove_stale_staging(self.store.projects_root(), project_id);
        Ok(())
    }

    /// Start a project's entry point as an independent child process.
    ///
    /// The child is not waited on. `.py` entry points run through the
    /// configured interpreter; the install directory is the working directory.
    pub async fn launch(&self, project_id: &str) -> Result<Child> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let project = self.descriptor(project_id).await?;
        let not_installed = || HubError::NotInstalled {
            project_id: project_id.to_string(),
        };

        let record = self.store.read(project_id).ok_or_else(not_installed)?;
        let install_dir = self.store.install_dir(project_id);
        let entry = install_dir.join(&project.entry_point);
        if !entry.is_file() {
            warn!("{project_id}: entry point {} is missing", entry.display());
            return Err(not_installed());
        }

        let mut command = self.entry_command(&entry);
        command.current_dir(&install_dir).stdin(Stdio::null());
        let child = command.spawn().map_err(|source| HubError::Launch {
            path: entry.clone(),
            source,
        })?;

        info!(
            "Launched {project_id} v{} (pid {})",
            record.version,
            child.id()
        );
        Ok(child)
    }

    fn entry_command(&self, entry: &Path) -> Command {
        let extension = entry
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "py" | "pyw" => {
                let mut command = Command::new(&self.python);
                command.arg(entry);
                command
            }
            "bat" | "cmd" if cfg!(windows) => {
                let mut command = Command::new("cmd");
                command.arg("/C").arg(entry);
                command
            }
            _ => Command::new(entry),
        }
    }
}

/// Pick the package asset of a release, preferring zip archives.
pub fn select_package_asset(
    release: &ReleaseDescriptor,
) -> Result<(&ReleaseAsset, PackageFormat)> {
    PackageFormat::PREFERENCE
        .iter()
        .find_map(|&format| {
            release
                .assets
                .iter()
                .find(|asset| format.matches(&asset.name))
                .map(|asset| (asset, format))
        })
        .ok_or_else(|| HubError::NoPackageAsset {
            tag: release.tag.clone(),
            expected: PackageFormat::PREFERENCE
                .iter()
                .map(|f| f.extension())
                .collect::<Vec<_>>()
                .join(" or "),
        })
}

fn archive_file_name(asset: &ReleaseAsset) -> PathBuf {
    Path::new(&asset.name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("package"))
}

fn staging_prefix(project_id: &str) -> String {
    format!(".{project_id}.staging-")
}

/// Remove staging directories left behind by an interrupted install.
fn remove_stale_staging(root: &Path, project_id: &str) {
    let prefix = staging_prefix(project_id);
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(entry.path()) {
            warn!("Failed to remove {}: {e}", entry.path().display());
        }
    }
}

fn extract_archive(format: PackageFormat, archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive).map_err(|e| HubError::extract(archive, e))?;

    match format {
        PackageFormat::Zip => {
            let mut zip =
                zip::ZipArchive::new(file).map_err(|e| HubError::extract(archive, e))?;
            zip.extract(dest).map_err(|e| HubError::extract(archive, e))?;
        }
        PackageFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(file);
            let mut tar = tar::Archive::new(decoder);
            tar.unpack(dest).map_err(|e| HubError::extract(archive, e))?;
        }
    }

    Ok(())
}

/// Make a native entry point executable. Scripts run through an interpreter are left alone.
fn mark_executable(entry: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let is_script = matches!(
            entry.extension().and_then(|s| s.to_str()),
            Some("py" | "pyw" | "bat" | "cmd")
        );
        if is_script || !entry.is_file() {
            return;
        }
        let result = std::fs::metadata(entry).and_then(|meta| {
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o755);
            std::fs::set_permissions(entry, perms)
        });
        if let Err(e) = result {
            warn!("Failed to mark {} executable: {e}", entry.display());
        }
    }
    #[cfg(not(unix))]
    {
        let _ = entry;
    }
}
