use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `ask_updater` with fast timing read from a config file in `dir`.
fn updater(dir: &Path) -> Command {
    let config = dir.join("config.json");
    std::fs::write(
        &config,
        r#"{"upgrade": {"backup_grace_secs": 0, "lock_wait_secs": 1, "lock_poll_millis": 50}}"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("ask_updater").unwrap();
    cmd.env("ASK_CONFIG", config).env("NO_COLOR", "1");
    cmd
}

fn write_executable(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

fn backup_of(target: &Path) -> PathBuf {
    let mut backup = target.as_os_str().to_os_string();
    backup.push(".backup");
    PathBuf::from(backup)
}

#[test]
fn test_missing_arguments_is_usage_error() {
    let temp = TempDir::new().unwrap();
    updater(temp.path())
        .assert()
        .code(64)
        .stderr(predicate::str::contains("Usage: ask_updater"));

    updater(temp.path()).arg("only-one").assert().code(64);
    updater(temp.path()).args(["a", "b", "c"]).assert().code(64);
    updater(temp.path()).arg("--help").assert().success();
}

#[cfg(unix)]
#[test]
fn test_swaps_and_relaunches() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("ask");
    let staged = temp.path().join("ask-update-1");
    write_executable(&target, "#!/bin/sh\necho old \"$@\"\n");
    write_executable(&staged, "#!/bin/sh\necho relaunched \"$@\"\n");

    updater(temp.path())
        .arg(&target)
        .arg(&staged)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed the new version"));

    let installed = std::fs::read_to_string(&target).unwrap();
    assert!(installed.contains("relaunched"));
    assert!(!staged.exists());
    assert!(!backup_of(&target).exists(), "backup removed after the grace delay");
}

#[cfg(unix)]
#[test]
fn test_missing_staged_file_leaves_target() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("ask");
    write_executable(&target, "#!/bin/sh\necho old\n");

    updater(temp.path())
        .arg(&target)
        .arg(temp.path().join("does-not-exist"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Update failed"));

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "#!/bin/sh\necho old\n");
    assert!(!backup_of(&target).exists());
}

#[test]
fn test_staged_equal_to_target_is_rejected() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("ask");
    std::fs::write(&target, b"live").unwrap();

    updater(temp.path()).arg(&target).arg(&target).assert().code(1);
    assert_eq!(std::fs::read(&target).unwrap(), b"live");
}
