//! Uniform, error-free surface over the hub for presentation layers.
//!
//! The controller never returns an error: every failure from the install
//! manager is folded into an [`ActionOutcome`]. Long-running actions can be
//! moved onto tokio tasks with [`HubController::spawn`], which reports back
//! through an mpsc channel.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{HubError, HubErrorKind};
use super::installer::InstallManager;
use super::registry::{ProjectDescriptor, ProjectRegistry};
use super::release_source::ReleaseSource;
use super::version_store::InstallState;

/// User-triggered action on a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubAction {
    CheckUpdate,
    Install,
    Uninstall,
    Launch,
}

impl fmt::Display for HubAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckUpdate => "check_update",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Launch => "launch",
        };
        write!(f, "{name}")
    }
}

/// Install status shown next to a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    NotInstalled,
    Installed,
    Partial,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotInstalled => "NOT_INSTALLED",
            Self::Installed => "INSTALLED",
            Self::Partial => "PARTIAL",
        };
        write!(f, "{name}")
    }
}

/// One row of the project list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub descriptor: ProjectDescriptor,
    pub status: ProjectStatus,
    pub version: Option<String>,
    pub install_date: Option<String>,
}

/// Result of a dispatched action.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActionOutcome {
    pub project_id: String,
    pub action: HubAction,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<HubErrorKind>,
    pub message: String,
    /// Installed version after an install, or current version after a check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ActionOutcome {
    fn success(project_id: &str, action: HubAction, message: String) -> Self {
        Self {
            project_id: project_id.to_string(),
            action,
            ok: true,
            kind: None,
            message,
            version: None,
            latest: None,
            update_available: None,
            pid: None,
        }
    }

    fn failure(project_id: &str, action: HubAction, error: &HubError) -> Self {
        Self {
            ok: false,
            kind: Some(error.kind()),
            ..Self::success(project_id, action, error.to_string())
        }
    }
}

/// Progress of a spawned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Started {
        project_id: String,
        action: HubAction,
    },
    Finished(ActionOutcome),
}

/// Front door to the hub.
pub struct HubController<S> {
    manager: Arc<InstallManager<S>>,
}

impl<S> Clone for HubController<S> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<S: ReleaseSource + 'static> HubController<S> {
    pub fn new(manager: InstallManager<S>) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    pub fn manager(&self) -> &InstallManager<S> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<RwLock<ProjectRegistry>> {
        self.manager.registry()
    }

    /// Every registered project with its install status, in catalog order.
    pub async fn snapshot(&self) -> Vec<ProjectSnapshot> {
        let registry = self.registry().read().await;
        let store = self.manager.store();

        registry
            .list()
            .iter()
            .map(|descriptor| {
                let (status, record) = match store.state(&descriptor.id) {
                    InstallState::Installed(record) => (ProjectStatus::Installed, Some(record)),
                    InstallState::Partial => (ProjectStatus::Partial, None),
                    InstallState::NotInstalled => (ProjectStatus::NotInstalled, None),
                };
                ProjectSnapshot {
                    descriptor: descriptor.clone(),
                    status,
                    version: record.as_ref().map(|r| r.version.clone()),
                    install_date: record.map(|r| r.install_date),
                }
            })
            .collect()
    }

    /// Run an action to completion and describe how it went.
    pub async fn dispatch(&self, action: HubAction, project_id: &str) -> ActionOutcome {
        debug!("Dispatching {action} for {project_id}");
        let manager = &self.manager;

        let result = match action {
            HubAction::CheckUpdate => manager.check_update(project_id).await.map(|check| {
                let message = match (&check.latest, check.available) {
                    (None, _) => "No releases published".to_string(),
                    (Some(latest), true) => format!("Update available: {latest}"),
                    (Some(latest), false) => format!("Up to date ({latest})"),
                };
                ActionOutcome {
                    version: check.current,
                    latest: check.latest,
                    update_available: Some(check.available),
                    ..ActionOutcome::success(project_id, action, message)
                }
            }),
            HubAction::Install => manager.install(project_id).await.map(|record| {
                let message = format!("Installed version {}", record.version);
                ActionOutcome {
                    version: Some(record.version),
                    ..ActionOutcome::success(project_id, action, message)
                }
            }),
            HubAction::Uninstall => manager
                .uninstall(project_id)
                .await
                .map(|()| ActionOutcome::success(project_id, action, "Uninstalled".to_string())),
            HubAction::Launch => manager.launch(project_id).await.map(|child| {
                let pid = child.id();
                ActionOutcome {
                    pid: Some(pid),
                    ..ActionOutcome::success(project_id, action, format!("Started (pid {pid})"))
                }
            }),
        };

        result.unwrap_or_else(|e| {
            warn!("{action} {project_id} failed: {e}");
            ActionOutcome::failure(project_id, action, &e)
        })
    }

    /// Run an action on a tokio task, reporting progress on `events`.
    ///
    /// A closed receiver does not stop the action.
    pub fn spawn(
        &self,
        action: HubAction,
        project_id: impl Into<String>,
        events: mpsc::UnboundedSender<HubEvent>,
    ) -> JoinHandle<ActionOutcome> {
        let controller = self.clone();
        let project_id = project_id.into();

        tokio::spawn(async move {
            let _ = events.send(HubEvent::Started {
                project_id: project_id.clone(),
                action,
            });
            let outcome = controller.dispatch(action, &project_id).await;
            let _ = events.send(HubEvent::Finished(outcome.clone()));
            outcome
        })
    }

    /// Check every active project for updates concurrently.
    ///
    /// Outcomes follow catalog order.
    pub async fn check_all(&self, events: mpsc::UnboundedSender<HubEvent>) -> Vec<ActionOutcome> {
        let ids: Vec<String> = {
            let registry = self.registry().read().await;
            registry.active().map(|p| p.id.clone()).collect()
        };

        let handles: Vec<(String, JoinHandle<ActionOutcome>)> = ids
            .into_iter()
            .map(|id| {
                let handle = self.spawn(HubAction::CheckUpdate, id.clone(), events.clone());
                (id, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => ActionOutcome {
                    ok: false,
                    kind: None,
                    ..ActionOutcome::success(&id, HubAction::CheckUpdate, format!("task failed: {e}"))
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
