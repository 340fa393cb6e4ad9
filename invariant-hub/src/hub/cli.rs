//! CLI commands and output formatting for the hub.

use clap::{Args, Subcommand};
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

use super::controller::{ActionOutcome, HubAction, HubController, HubEvent, ProjectSnapshot};
use super::error::{HubError, Result};
use super::installer::InstallManager;
use super::registry::{DEFAULT_ENTRY_POINT, ProjectDescriptor, ProjectRegistry, ProjectUpdate};
use super::release_source::GithubReleaseSource;
use super::version_store::VersionStore;
use crate::config::{self, HubConfig};

/// Hub arguments shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct HubArgs {
    /// Path to the master config file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory projects are installed into
    #[arg(long, global = true, value_name = "DIR")]
    pub projects_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: HubCommand,
}

/// Hub subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum HubCommand {
    /// List projects with their install status
    List {
        /// Include inactive projects
        #[arg(short, long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a new project
    Add {
        /// Project id, also the install directory name
        id: String,

        /// Repository holding the releases (default: the id)
        #[arg(short, long, value_name = "REPO")]
        repo: Option<String>,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Short description
        #[arg(short, long)]
        description: Option<String>,

        /// File started by `launch`
        #[arg(long, value_name = "FILE", default_value = DEFAULT_ENTRY_POINT)]
        main_file: String,

        /// Setup script shipped with the project
        #[arg(long, value_name = "FILE")]
        install_script: Option<String>,
    },

    /// Mark a project inactive
    Remove {
        /// Project id
        id: String,

        /// Also delete the installed files
        #[arg(long)]
        purge: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Change the metadata of a project
    UpdateMetadata {
        /// Project id
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long, value_name = "REPO")]
        repo: Option<String>,

        #[arg(long, value_name = "FILE")]
        main_file: Option<String>,

        #[arg(long, value_name = "FILE")]
        install_script: Option<String>,
    },

    /// Copy the config file to its backup
    Backup,

    /// Replace the config file with its backup
    Restore {
        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show or change hub settings
    Settings {
        /// GitHub account owning the project repositories
        #[arg(long, value_name = "OWNER")]
        github_owner: Option<String>,

        /// Base name of the project repositories
        #[arg(long, value_name = "NAME")]
        base_repo_name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check one or all active projects for updates
    Check {
        /// Project id (default: all active projects)
        id: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install or update a project to its newest release
    Install {
        /// Project id
        id: String,
    },

    /// Delete a project's installed files
    Uninstall {
        /// Project id
        id: String,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Start an installed project
    Launch {
        /// Project id
        id: String,
    },
}

/// Execute a hub command.
///
/// Failed hub actions are reported on stdout and turn into a failing exit code.
pub async fn execute(args: HubArgs) -> Result<ExitCode> {
    let config_path = args.config.unwrap_or_else(config::default_config_path);
    let registry = ProjectRegistry::load(&config_path);

    match args.command {
        HubCommand::List { all, json } => {
            let controller = build_controller(registry, args.projects_dir)?;
            handle_list(&controller, all, json).await
        }
        HubCommand::Add {
            id,
            repo,
            name,
            description,
            main_file,
            install_script,
        } => {
            let mut descriptor = ProjectDescriptor::new(id.clone(), repo.unwrap_or(id));
            descriptor.name = name.unwrap_or_default();
            descriptor.description = description.unwrap_or_default();
            descriptor.entry_point = main_file;
            descriptor.install_script = install_script;
            handle_add(registry, descriptor)
        }
        HubCommand::Remove { id, purge, yes } => {
            handle_remove(registry, args.projects_dir, id, purge, yes).await
        }
        HubCommand::UpdateMetadata {
            id,
            name,
            description,
            repo,
            main_file,
            install_script,
        } => {
            let update = ProjectUpdate {
                name,
                description,
                source_repo: repo,
                entry_point: main_file,
                install_script,
            };
            handle_update_metadata(registry, &id, &update)
        }
        HubCommand::Backup => {
            let backup = config::backup_config(&config_path)?;
            println!("Backed up config to {}", backup.display());
            Ok(ExitCode::SUCCESS)
        }
        HubCommand::Restore { yes } => {
            if !yes && is_tty() {
                let prompt = format!("Overwrite {} with its backup?", config_path.display());
                if !confirm(&prompt)? {
                    eprintln!("Restore cancelled");
                    return Ok(ExitCode::SUCCESS);
                }
            }
            let backup = config::restore_config(&config_path)?;
            println!("Restored config from {}", backup.display());
            Ok(ExitCode::SUCCESS)
        }
        HubCommand::Settings {
            github_owner,
            base_repo_name,
            json,
        } => handle_settings(registry, github_owner, base_repo_name, json),
        HubCommand::Check { id, json } => {
            let controller = build_controller(registry, args.projects_dir)?;
            handle_check(&controller, id, json).await
        }
        HubCommand::Install { id } => {
            let controller = build_controller(registry, args.projects_dir)?;
            let outcome = controller.dispatch(HubAction::Install, &id).await;
            Ok(report(&outcome))
        }
        HubCommand::Uninstall { id, yes } => {
            if !yes && is_tty() && !confirm(&format!("Delete the installed files of {id}?"))? {
                eprintln!("Uninstall cancelled");
                return Ok(ExitCode::SUCCESS);
            }
            let controller = build_controller(registry, args.projects_dir)?;
            let outcome = controller.dispatch(HubAction::Uninstall, &id).await;
            Ok(report(&outcome))
        }
        HubCommand::Launch { id } => {
            let controller = build_controller(registry, args.projects_dir)?;
            let outcome = controller.dispatch(HubAction::Launch, &id).await;
            Ok(report(&outcome))
        }
    }
}

fn build_controller(
    registry: ProjectRegistry,
    projects_dir: Option<PathBuf>,
) -> Result<HubController<GithubReleaseSource>> {
    let config: &HubConfig = registry.config();
    let projects_root = projects_dir.unwrap_or_else(|| config.projects_root());
    let source = GithubReleaseSource::new(&config.api_base_url, &config.github_owner)?
        .with_token(config.github_token.clone())
        .with_progress(is_tty());
    let python = config.python.clone();

    let manager = InstallManager::new(
        source,
        VersionStore::new(projects_root),
        Arc::new(RwLock::new(registry)),
    )
    .with_interpreter(python);
    Ok(HubController::new(manager))
}

async fn handle_list(
    controller: &HubController<GithubReleaseSource>,
    all: bool,
    json: bool,
) -> Result<ExitCode> {
    let rows: Vec<_> = controller
        .snapshot()
        .await
        .into_iter()
        .filter(|row| all || row.descriptor.active)
        .collect();

    if json {
        println!("{}", format_json(&rows)?);
    } else {
        let headers = &["ID", "NAME", "STATUS", "VERSION", "REPOSITORY"];
        let rows = list_rows(&rows);
        format_table(headers, rows);
    }

    Ok(ExitCode::SUCCESS)
}

fn handle_add(mut registry: ProjectRegistry, descriptor: ProjectDescriptor) -> Result<ExitCode> {
    let added = registry.add(descriptor)?.clone();
    registry.save()?;
    println!("Added {} ({})", added.id, added.source_repo);
    Ok(ExitCode::SUCCESS)
}

async fn handle_remove(
    mut registry: ProjectRegistry,
    projects_dir: Option<PathBuf>,
    id: String,
    purge: bool,
    yes: bool,
) -> Result<ExitCode> {
    registry.get(&id)?;
    if !yes && is_tty() {
        let prompt = if purge {
            format!("Remove {id} and delete its installed files?")
        } else {
            format!("Remove {id}?")
        };
        if !confirm(&prompt)? {
            eprintln!("Removal cancelled");
            return Ok(ExitCode::SUCCESS);
        }
    }

    registry.deactivate(&id)?;
    registry.save()?;
    println!("Removed {id}");

    if purge {
        let controller = build_controller(registry, projects_dir)?;
        let outcome = controller.dispatch(HubAction::Uninstall, &id).await;
        return Ok(report(&outcome));
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_update_metadata(
    mut registry: ProjectRegistry,
    id: &str,
    update: &ProjectUpdate,
) -> Result<ExitCode> {
    if update.is_empty() {
        println!("Nothing to update for {id}");
        return Ok(ExitCode::FAILURE);
    }
    registry.update_metadata(id, update)?;
    registry.save()?;
    println!("Updated {id}");
    Ok(ExitCode::SUCCESS)
}

fn handle_settings(
    mut registry: ProjectRegistry,
    github_owner: Option<String>,
    base_repo_name: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let changed = github_owner.is_some() || base_repo_name.is_some();
    if changed {
        registry.update_settings(github_owner, base_repo_name);
        registry.save()?;
    }

    let config = registry.config();
    if json {
        let settings = serde_json::json!({
            "github_owner": config.github_owner,
            "base_repo_name": config.base_repo_name,
            "projects_dir": config.projects_root(),
            "api_base_url": config.api_base_url,
            "python": config.python,
        });
        println!("{}", format_json(&settings)?);
    } else {
        let rows = vec![
            vec!["github_owner".to_string(), config.github_owner.clone()],
            vec!["base_repo_name".to_string(), config.base_repo_name.clone()],
            vec![
                "projects_dir".to_string(),
                config.projects_root().display().to_string(),
            ],
            vec!["api_base_url".to_string(), config.api_base_url.clone()],
            vec!["python".to_string(), config.python.clone()],
        ];
        format_table(&["SETTING", "VALUE"], rows);
    }

    Ok(ExitCode::SUCCESS)
}

async fn handle_check(
    controller: &HubController<GithubReleaseSource>,
    id: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcomes = match id {
        Some(id) => {
            let outcome = controller.dispatch(HubAction::CheckUpdate, &id).await;
            vec![outcome]
        }
        None => {
            let outcomes = controller.check_all(tx).await;
            while let Some(event) = rx.recv().await {
                if let HubEvent::Finished(outcome) = event {
                    tracing::debug!("Checked {}", outcome.project_id);
                }
            }
            outcomes
        }
    };

    if json {
        println!("{}", format_json(&outcomes)?);
    } else {
        let headers = &["ID", "INSTALLED", "LATEST", "STATUS"];
        let rows = check_rows(&outcomes);
        format_table(headers, rows);
    }

    if outcomes.iter().all(|o| o.ok) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Table rows for `list`: id, name, status, version, repository.
fn list_rows(snapshots: &[ProjectSnapshot]) -> Vec<Vec<String>> {
    snapshots
        .iter()
        .map(|row| {
            let mut status = row.status.to_string();
            if !row.descriptor.active {
                status.push_str(" (inactive)");
            }
            vec![
                row.descriptor.id.clone(),
                row.descriptor.name.clone(),
                status,
                row.version.clone().unwrap_or_else(|| "-".to_string()),
                row.descriptor.source_repo.clone(),
            ]
        })
        .collect()
}

/// Table rows for `check`: id, installed version, latest version, status.
fn check_rows(outcomes: &[ActionOutcome]) -> Vec<Vec<String>> {
    outcomes
        .iter()
        .map(|o| {
            let status = match (o.ok, o.update_available) {
                (false, _) => format!("Error: {}", o.message),
                (true, Some(true)) => "update available".to_string(),
                (true, _) => "up to date".to_string(),
            };
            vec![
                o.project_id.clone(),
                o.version.clone().unwrap_or_else(|| "-".to_string()),
                o.latest.clone().unwrap_or_else(|| "-".to_string()),
                status,
            ]
        })
        .collect()
}

/// Print the outcome of an action and map it to an exit code.
fn report(outcome: &ActionOutcome) -> ExitCode {
    if outcome.ok {
        println!("{}: {}", outcome.project_id, outcome.message);
        ExitCode::SUCCESS
    } else {
        println!("Error: {}", outcome.message);
        ExitCode::FAILURE
    }
}

/// Check if stdout is a TTY.
fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Prompt user for confirmation.
fn confirm(prompt: &str) -> Result<bool> {
    let result = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(result)
}

/// Format and print a table to stdout.
fn format_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        eprintln!("No projects found");
        return;
    }

    let widths = column_widths(headers, &rows);

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_line.join("  ").trim_end());

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", separator.join("  "));

    for row in rows {
        let formatted_row: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{cell:width$}")
            })
            .collect();
        println!("{}", formatted_row.join("  ").trim_end());
    }
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

/// Format data as JSON.
fn format_json<T: serde::Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data).map_err(|e| HubError::Io {
        source: std::io::Error::other(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::controller::ProjectStatus;
    use crate::hub::error::HubErrorKind;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        hub: HubArgs,
    }

    fn parse(args: &[&str]) -> HubArgs {
        match TestCli::try_parse_from(std::iter::once("invariant").chain(args.iter().copied())) {
            Ok(cli) => cli.hub,
            Err(e) => panic!("Failed to parse {args:?}: {e}"),
        }
    }

    #[test]
    fn test_column_widths() {
        let rows = vec![
            vec!["Project1".to_string(), "INSTALLED".to_string()],
            vec!["P".to_string(), "NOT_INSTALLED".to_string()],
        ];
        assert_eq!(column_widths(&["ID", "STATUS"], &rows), vec![8, 13]);
    }

    #[test]
    fn test_list_rows() {
        let mut inactive = ProjectDescriptor::new("old", "old-repo");
        inactive.active = false;
        let snapshots = vec![
            ProjectSnapshot {
                descriptor: ProjectDescriptor::new("Project1", "Project1"),
                status: ProjectStatus::Installed,
                version: Some("1.2.0".to_string()),
                install_date: Some("2024-05-01 10:00:00".to_string()),
            },
            ProjectSnapshot {
                descriptor: inactive,
                status: ProjectStatus::NotInstalled,
                version: None,
                install_date: None,
            },
        ];

        let rows = list_rows(&snapshots);
        assert_eq!(rows[0], vec!["Project1", "Project1", "INSTALLED", "1.2.0", "Project1"]);
        assert_eq!(rows[1], vec!["old", "old", "NOT_INSTALLED (inactive)", "-", "old-repo"]);
    }

    #[test]
    fn test_check_rows() {
        let update = ActionOutcome {
            project_id: "Project1".to_string(),
            action: HubAction::CheckUpdate,
            ok: true,
            kind: None,
            message: "Update available: 1.1.0".to_string(),
            version: Some("1.0.0".to_string()),
            latest: Some("1.1.0".to_string()),
            update_available: Some(true),
            pid: None,
        };
        let no_releases = ActionOutcome {
            project_id: "Project2".to_string(),
            version: None,
            latest: None,
            update_available: Some(false),
            message: "No releases published".to_string(),
            ..update.clone()
        };
        let failed = ActionOutcome {
            project_id: "Project3".to_string(),
            ok: false,
            kind: Some(HubErrorKind::Network),
            message: "Network error: timed out".to_string(),
            version: None,
            latest: None,
            update_available: None,
            ..update.clone()
        };

        let rows = check_rows(&[update, no_releases, failed]);
        assert_eq!(rows[0], vec!["Project1", "1.0.0", "1.1.0", "update available"]);
        assert_eq!(rows[1], vec!["Project2", "-", "-", "up to date"]);
        assert_eq!(rows[2], vec!["Project3", "-", "-", "Error: Network error: timed out"]);
    }

    #[test]
    fn test_parse_add() {
        let args = parse(&["--config", "/tmp/hub.json", "add", "demo", "--repo", "demo-repo"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/hub.json")));
        let HubCommand::Add {
            id,
            repo,
            main_file,
            ..
        } = args.command
        else {
            panic!("expected add");
        };
        assert_eq!(id, "demo");
        assert_eq!(repo.as_deref(), Some("demo-repo"));
        assert_eq!(main_file, DEFAULT_ENTRY_POINT);
    }

    #[test]
    fn test_parse_remove_and_global_flags() {
        let args = parse(&["remove", "Project2", "--purge", "-y", "--projects-dir", "/srv/p"]);
        assert_eq!(args.projects_dir, Some(PathBuf::from("/srv/p")));
        assert!(matches!(
            args.command,
            HubCommand::Remove { purge: true, yes: true, .. }
        ));
    }

    #[test]
    fn test_parse_check_all() {
        let args = parse(&["check", "--json"]);
        assert!(matches!(args.command, HubCommand::Check { id: None, json: true }));
    }

    #[tokio::test]
    async fn test_execute_add_persists() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("master_config.json");
        let config_arg = config_path.to_string_lossy().into_owned();

        execute(parse(&["--config", &config_arg, "add", "demo", "-r", "demo-repo"])).await?;

        let registry = ProjectRegistry::load(&config_path);
        assert_eq!(registry.get("demo")?.source_repo, "demo-repo");

        let Err(err) = execute(parse(&["--config", &config_arg, "add", "demo"])).await else {
            panic!("expected duplicate id");
        };
        assert!(matches!(err, HubError::DuplicateId { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_remove_soft_deletes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("master_config.json");
        let config_arg = config_path.to_string_lossy().into_owned();

        execute(parse(&["--config", &config_arg, "remove", "Project3", "-y"])).await?;

        let registry = ProjectRegistry::load(&config_path);
        let project = registry.get("Project3")?;
        assert!(!project.active);
        assert!(project.removed_date.is_some());
        assert_eq!(registry.list().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_management_commands_leave_malformed_config_alone()
    -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let config_path = temp.path().join("master_config.json");
        let config_arg = config_path.to_string_lossy().into_owned();
        let original = r#"{ "github_owner": "me", "projects": { "mine": { "repo_name": "mine-repo" }, } }"#;
        std::fs::write(&config_path, original)?;

        let Err(err) = execute(parse(&["--config", &config_arg, "add", "demo", "--repo", "demo-repo"])).await
        else {
            panic!("expected add to fail on a malformed config");
        };
        assert!(matches!(err, HubError::Config { .. }));

        assert!(execute(parse(&["--config", &config_arg, "remove", "Project1", "-y"])).await.is_err());
        assert!(execute(parse(&["--config", &config_arg, "settings", "--github-owner", "x"])).await.is_err());
        assert_eq!(std::fs::read_to_string(&config_path)?, original);
        Ok(())
    }
}
