use ask_cli::test_utils::{RecordingSleep, ReleaseBuilder, TarballBuilder, init_test_logging};
use ask_cli::upgrade::handoff::{ensure_helper, prepare_handoff};
use ask_cli::upgrade::{
    BuildInfo, PlatformKey, ReleaseResolver, SelfUpdater, UpdateOutcome, UpgradeError, backup_path,
    restore_backup,
};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OLD: &[u8] = b"ask 1.2.0";
const NEW: &[u8] = b"ask 1.3.0";

struct Fixture {
    server: MockServer,
    sleep: RecordingSleep,
    _dir: TempDir,
    target: PathBuf,
}

impl Fixture {
    async fn new() -> Self {
        init_test_logging(None);
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("ask");
        std::fs::write(&target, OLD).unwrap();
        Self {
            server: MockServer::start().await,
            sleep: RecordingSleep::new(),
            _dir: dir,
            target,
        }
    }

    fn resolver(&self, version: &str) -> ReleaseResolver {
        ReleaseResolver::new(BuildInfo::with_version(version))
            .unwrap()
            .with_api_base(format!("{}/releases", self.server.uri()))
            .with_sleep(self.sleep.sleep_fn())
    }

    /// Resolver whose build claims to run on linux/amd64.
    fn linux_resolver(&self, version: &str) -> ReleaseResolver {
        let mut build = BuildInfo::with_version(version);
        build.platform = PlatformKey::new("linux", "amd64");
        ReleaseResolver::new(build)
            .unwrap()
            .with_api_base(format!("{}/releases", self.server.uri()))
            .with_sleep(self.sleep.sleep_fn())
    }

    fn updater(&self, version: &str) -> SelfUpdater {
        SelfUpdater::with_target(self.resolver(version), &self.target)
            .platform(PlatformKey::new("linux", "amd64"))
            .grace(Duration::ZERO)
            .show_progress(false)
    }

    async fn publish(&self, route: &str, release: ReleaseBuilder) {
        Mock::given(method("GET"))
            .and(path(format!("/releases/{route}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(release.to_json()))
            .mount(&self.server)
            .await;
    }

    async fn serve(&self, name: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("/download/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&self.server)
            .await;
    }
}

#[tokio::test]
async fn test_check_install_and_rollback() {
    let f = Fixture::new().await;
    let base = f.server.uri();
    f.publish(
        "latest",
        ReleaseBuilder::new("v1.3.0")
            .body("Faster startup")
            .asset_at(&base, "ask_1.3.0_linux_amd64")
            .asset_at(&base, "ask_1.3.0_darwin_arm64"),
    )
    .await;
    f.serve("ask_1.3.0_linux_amd64", NEW.to_vec()).await;

    let updater = f.updater("1.2.0");
    let check = updater.check().await.unwrap();
    assert!(check.available);
    assert_eq!(check.release.body, "Faster startup");

    match updater.update_to(&check.release).await.unwrap() {
        UpdateOutcome::Installed { tag, reaper } => {
            assert_eq!(tag, "v1.3.0");
            reaper.wait();
        }
        UpdateOutcome::HandoffRequired(_) => panic!("target is not locked"),
    }
    assert_eq!(std::fs::read(&f.target).unwrap(), NEW);
    assert!(!backup_path(&f.target).exists());

    // No backup survives the grace delay, so there is nothing to roll back to.
    assert!(restore_backup(&f.target).is_err());
    assert_eq!(std::fs::read(&f.target).unwrap(), NEW);
}

#[cfg(unix)]
#[tokio::test]
async fn test_archive_only_release_installs_extracted_binary() {
    let f = Fixture::new().await;
    let base = f.server.uri();
    let bundle = TarballBuilder::new()
        .dir("docs")
        .file("docs/README.md", b"docs", 0o644)
        .file("ask", NEW, 0o755)
        .to_bytes()
        .unwrap();
    f.publish(
        "latest",
        ReleaseBuilder::new("v1.3.0").asset_at(&base, "ask_1.3.0_linux_amd64.tar.gz"),
    )
    .await;
    f.serve("ask_1.3.0_linux_amd64.tar.gz", bundle).await;

    let updater = f.updater("1.2.0");
    let check = updater.check().await.unwrap();
    let outcome = updater.update_to(&check.release).await.unwrap();
    let UpdateOutcome::Installed { reaper, .. } = outcome else {
        panic!("expected a direct install");
    };
    reaper.wait();

    assert_eq!(std::fs::read(&f.target).unwrap(), NEW);
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(&f.target).unwrap().permissions().mode();
    assert_eq!(mode & 0o755, 0o755);
}

#[tokio::test]
async fn test_bundle_without_binary_is_extract_error() {
    let f = Fixture::new().await;
    let base = f.server.uri();
    let bundle = TarballBuilder::new()
        .dir("nested")
        .file("nested/ask", NEW, 0o755)
        .to_bytes()
        .unwrap();
    f.publish(
        "latest",
        ReleaseBuilder::new("v1.3.0").asset_at(&base, "ask_1.3.0_linux_amd64.tar.gz"),
    )
    .await;
    f.serve("ask_1.3.0_linux_amd64.tar.gz", bundle).await;

    let updater = f.updater("1.2.0");
    let check = updater.check().await.unwrap();
    let err = updater.update_to(&check.release).await.unwrap_err();

    assert!(matches!(err, UpgradeError::Extract { .. }), "got {err:?}");
    assert_eq!(std::fs::read(&f.target).unwrap(), OLD);
}

#[tokio::test]
async fn test_same_version_is_not_an_update() {
    let f = Fixture::new().await;
    f.publish("latest", ReleaseBuilder::new("v1.3.0")).await;

    let check = f.updater("1.3.0").check().await.unwrap();
    assert!(!check.available);

    let check = f.updater("v1.10.0").check().await.unwrap();
    assert!(!check.available, "1.10.0 is newer than 1.3.0");
}

#[tokio::test]
async fn test_handoff_uses_helper_from_running_release() {
    let f = Fixture::new().await;
    let base = f.server.uri();
    f.publish(
        "latest",
        ReleaseBuilder::new("v1.3.0")
            .asset_at(&base, "ask_1.3.0_linux_amd64")
            .asset_at(&base, "ask_updater_1.3.0_linux_amd64"),
    )
    .await;
    f.publish(
        "tags/v1.2.0",
        ReleaseBuilder::new("v1.2.0").asset_at(&base, "ask_updater_1.2.0_linux_amd64"),
    )
    .await;
    f.serve("ask_1.3.0_linux_amd64", NEW.to_vec()).await;
    f.serve("ask_updater_1.2.0_linux_amd64", b"helper 1.2.0".to_vec()).await;

    let mut build = BuildInfo::with_version("1.2.0");
    build.platform = PlatformKey::new("linux", "amd64");
    let resolver = ReleaseResolver::new(build)
        .unwrap()
        .with_api_base(format!("{}/releases", f.server.uri()))
        .with_sleep(f.sleep.sleep_fn());
    let updater = SelfUpdater::with_target(resolver, &f.target).show_progress(false);

    let check = updater.check().await.unwrap();
    let selected = updater.select(&check.release).unwrap();
    let staged = updater.stage(&check.release, &selected).await.unwrap();
    let scratch = staged.scratch.path().to_path_buf();

    let temp_dir = TempDir::new().unwrap();
    let plan = prepare_handoff(updater.resolver(), &f.target, staged, temp_dir.path(), false)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&plan.helper).unwrap(), b"helper 1.2.0");
    assert_eq!(std::fs::read(&plan.staged).unwrap(), NEW);
    assert!(plan.staged.starts_with(temp_dir.path()));
    assert!(!scratch.exists(), "scratch directory is removed once the binary is relocated");
    assert_eq!(std::fs::read(&f.target).unwrap(), OLD);
    assert!(f.sleep.delays().is_empty());
}

fn entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(unix)]
#[tokio::test]
async fn test_helper_from_archive_only_release() {
    let f = Fixture::new().await;
    let base = f.server.uri();
    let helper_bundle = TarballBuilder::new()
        .file("ask_updater", b"helper 1.2.0", 0o755)
        .to_bytes()
        .unwrap();
    f.publish(
        "tags/v1.2.0",
        ReleaseBuilder::new("v1.2.0")
            .asset_at(&base, "ask_1.2.0_linux_amd64.tar.gz")
            .asset_at(&base, "ask_updater_1.2.0_linux_amd64.tar.gz"),
    )
    .await;
    f.serve("ask_updater_1.2.0_linux_amd64.tar.gz", helper_bundle).await;

    let temp_dir = TempDir::new().unwrap();
    let helper = ensure_helper(&f.linux_resolver("1.2.0"), None, temp_dir.path(), false)
        .await
        .unwrap();

    assert_eq!(helper, temp_dir.path().join("ask_updater"));
    assert_eq!(std::fs::read(&helper).unwrap(), b"helper 1.2.0");
    assert_eq!(entries(temp_dir.path()), vec!["ask_updater"], "download and unpack dir are removed");
}

#[cfg(unix)]
#[tokio::test]
async fn test_unplaceable_helper_leaves_no_partial_download() {
    let f = Fixture::new().await;
    let base = f.server.uri();
    f.publish(
        "tags/v1.2.0",
        ReleaseBuilder::new("v1.2.0").asset_at(&base, "ask_updater_1.2.0_linux_amd64"),
    )
    .await;
    f.serve("ask_updater_1.2.0_linux_amd64", b"helper 1.2.0".to_vec()).await;

    // A non-empty directory where the helper should go makes the final rename fail.
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("ask_updater");
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), b"x").unwrap();

    let err = ensure_helper(&f.linux_resolver("1.2.0"), None, temp_dir.path(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, UpgradeError::Download { .. }), "got {err:?}");
    assert_eq!(entries(temp_dir.path()), vec!["ask_updater"]);
    assert!(blocker.join("keep").exists());
}
