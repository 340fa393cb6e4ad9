//! Project hub: installs, updates, and launches projects published as
//! GitHub releases.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Hub CLI / Controller                 │
//! │  ┌─────────┐  ┌──────────┐  ┌───────────────────┐  │
//! │  │  List   │  │ Install  │  │  Check / Launch   │  │
//! │  └─────────┘  └──────────┘  └───────────────────┘  │
//! └─────────────────────────────────────────────────────┘
//!         │                 │                 │
//!         ▼                 ▼                 ▼
//!    ┌──────────────────────────────────────────┐
//!    │      Project Registry (master config)    │
//!    │   built-in catalog + user-added projects │
//!    └──────────────────────────────────────────┘
//!         │
//!         ▼
//!    ┌──────────────────────────────────────────┐
//!    │      GitHub Releases (Packages)          │
//!    │          zip / tar.gz assets             │
//!    └──────────────────────────────────────────┘
//!         │
//!         ▼
//!    ┌──────────────────────────────────────────┐
//!    │           Projects Root                  │
//!    │   <id>/ files + version.json record      │
//!    └──────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! # Show every project and its install status
//! invariant list
//!
//! # Install or update a project
//! invariant install Project1
//!
//! # Check all projects for updates
//! invariant check
//!
//! # Start an installed project
//! invariant launch Project1
//! ```

pub mod cli;
pub mod controller;
pub mod error;
pub mod installer;
pub mod registry;
pub mod release_source;
pub mod version_store;

pub use cli::{HubArgs, HubCommand, execute};
pub use controller::{
    ActionOutcome, HubAction, HubController, HubEvent, ProjectSnapshot, ProjectStatus,
};
pub use error::{HubError, HubErrorKind, Result};
pub use installer::{InstallManager, PackageFormat, UpdateCheck};
pub use registry::{ProjectDescriptor, ProjectRegistry, ProjectUpdate};
pub use release_source::{GithubReleaseSource, ReleaseAsset, ReleaseDescriptor, ReleaseSource};
pub use version_store::{InstallRecord, InstallState, VersionStore};

/// Local wall-clock time in the format used by records and the config document.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
