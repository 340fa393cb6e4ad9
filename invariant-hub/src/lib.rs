//! Invariant Hub - installs, updates, and launches projects published as
//! GitHub releases.
//!
//! The hub keeps a catalog of projects (built-in defaults merged with a JSON
//! master config), installs the newest release package of each into its own
//! directory under a projects root, and records what is installed next to
//! the files.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        HubController                             │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────────┐  │
//! │  │  Project    │  │    Install      │  │    Version          │  │
//! │  │  Registry   │  │    Manager      │  │    Store            │  │
//! │  └─────────────┘  └─────────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!         │                 │                 │
//!         ▼                 ▼                 ▼
//!    ┌─────────┐      ┌───────────┐      ┌──────────────┐
//!    │ Config  │      │  Release  │      │ version.json │
//!    │  JSON   │      │  Source   │      │   records    │
//!    └─────────┘      └───────────┘      └──────────────┘
//! ```

pub mod config;
pub mod hub;

pub use config::HubConfig;
pub use hub::{
    ActionOutcome, GithubReleaseSource, HubAction, HubController, HubError, HubErrorKind,
    HubEvent, InstallManager, InstallRecord, ProjectDescriptor, ProjectRegistry, ProjectSnapshot,
    ProjectStatus, ReleaseSource, VersionStore,
};
