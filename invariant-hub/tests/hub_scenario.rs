//! End-to-end: register a project through the CLI, then install and remove
//! it through the controller.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use invariant_hub::hub::{
    self, HubAction, HubArgs, HubController, HubError, InstallManager, ProjectRegistry,
    ProjectStatus, ReleaseAsset, ReleaseDescriptor, ReleaseSource, VersionStore,
};
use tokio::sync::RwLock;

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    hub: HubArgs,
}

/// Serves one release of `demo-repo` from memory.
struct DemoSource {
    package: Vec<u8>,
}

impl ReleaseSource for DemoSource {
    async fn list_releases(&self, repo: &str) -> hub::Result<Vec<ReleaseDescriptor>> {
        if repo != "demo-repo" {
            return Ok(Vec::new());
        }
        Ok(vec![ReleaseDescriptor {
            tag: "v2.0.0".to_string(),
            assets: vec![ReleaseAsset {
                name: "demo.zip".to_string(),
                download_url: "memory://demo.zip".to_string(),
            }],
        }])
    }

    async fn download_asset(&self, asset: &ReleaseAsset, dest: &Path) -> hub::Result<()> {
        if asset.download_url != "memory://demo.zip" {
            return Err(HubError::Download {
                url: asset.download_url.clone(),
                message: "unknown asset".to_string(),
            });
        }
        std::fs::write(dest, &self.package)?;
        Ok(())
    }
}

fn demo_package() -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("main.py", options)?;
    writer.write_all(b"print('demo')\n")?;
    writer.start_file("data/readme.txt", options)?;
    writer.write_all(b"demo data\n")?;
    Ok(writer.finish()?.into_inner())
}

#[tokio::test]
async fn add_install_uninstall_scenario() -> TestResult {
    let temp = tempfile::tempdir()?;
    let config_path = temp.path().join("master_config.json");
    let config_arg = config_path.to_string_lossy().into_owned();

    let cli = Cli::try_parse_from([
        "invariant",
        "--config",
        &config_arg,
        "add",
        "demo",
        "--repo",
        "demo-repo",
    ])?;
    hub::execute(cli.hub).await?;

    let registry = ProjectRegistry::load(&config_path);
    let manager = InstallManager::new(
        DemoSource {
            package: demo_package()?,
        },
        VersionStore::new(temp.path().join("projects")),
        Arc::new(RwLock::new(registry)),
    );
    let controller = HubController::new(manager);

    let row = |rows: Vec<hub::ProjectSnapshot>| rows.into_iter().find(|r| r.descriptor.id == "demo");

    let Some(listed) = row(controller.snapshot().await) else {
        panic!("demo missing from the project list");
    };
    assert_eq!(listed.status, ProjectStatus::NotInstalled);
    assert_eq!(listed.descriptor.source_repo, "demo-repo");

    let check = controller.dispatch(HubAction::CheckUpdate, "demo").await;
    assert!(check.ok, "{}", check.message);
    assert_eq!(check.update_available, Some(true));
    assert_eq!(check.latest.as_deref(), Some("2.0.0"));

    let installed = controller.dispatch(HubAction::Install, "demo").await;
    assert!(installed.ok, "{}", installed.message);

    let Some(listed) = row(controller.snapshot().await) else {
        panic!("demo missing after install");
    };
    assert_eq!(listed.status, ProjectStatus::Installed);
    assert_eq!(listed.version.as_deref(), Some("2.0.0"));

    let install_dir = temp.path().join("projects").join("demo");
    assert!(install_dir.join("main.py").is_file());
    assert!(install_dir.join("data").join("readme.txt").is_file());
    assert!(install_dir.join("version.json").is_file());

    let check = controller.dispatch(HubAction::CheckUpdate, "demo").await;
    assert_eq!(check.update_available, Some(false));

    let removed = controller.dispatch(HubAction::Uninstall, "demo").await;
    assert!(removed.ok, "{}", removed.message);

    let Some(listed) = row(controller.snapshot().await) else {
        panic!("demo missing after uninstall");
    };
    assert_eq!(listed.status, ProjectStatus::NotInstalled);
    assert!(!install_dir.exists());
    Ok(())
}

#[tokio::test]
async fn defaults_survive_missing_config() {
    let temp = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("Failed to create temp dir: {e}"),
    };
    let registry = ProjectRegistry::load(temp.path().join("absent.json"));
    let ids: Vec<&str> = registry.list().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["Project1", "Project2", "Project3", "Project4"]);
}
