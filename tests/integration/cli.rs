use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `ask` with a config path inside `dir` and no inherited credentials.
fn ask(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ask").unwrap();
    cmd.env("ASK_CONFIG", dir.path().join("config.json"))
        .env_remove("ASK_API_KEY")
        .env_remove("ASK_API_URL")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_version_prints_build_info() {
    let temp = TempDir::new().unwrap();
    ask(&temp)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("ask v{}", env!("CARGO_PKG_VERSION"))))
        .stdout(predicate::str::contains("Platform:"));
}

#[test]
fn test_init_then_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.json");

    ask(&temp).arg("init").assert().success().stdout(predicate::str::contains("Created"));
    assert!(config.exists());

    ask(&temp)
        .arg("init")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_flag_overrides_env() {
    let temp = TempDir::new().unwrap();
    let explicit = temp.path().join("other.json");

    ask(&temp)
        .args(["--config", explicit.to_str().unwrap(), "config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("other.json"));
}

#[test]
fn test_config_masks_api_key() {
    let temp = TempDir::new().unwrap();
    ask(&temp)
        .env("ASK_API_KEY", "sk-0123456789abcdef")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("qwen-plus"))
        .stdout(predicate::str::contains("sk-0123456789abcdef").not());
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("config.json"), "{ not json").unwrap();

    ask(&temp)
        .arg("config")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration file"));
}

#[test]
fn test_chat_without_key_fails() {
    let temp = TempDir::new().unwrap();
    ask(&temp)
        .args(["chat", "hello"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No API key configured"))
        .stderr(predicate::str::contains("ASK_API_KEY"));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    let temp = TempDir::new().unwrap();
    ask(&temp).arg("frobnicate").assert().failure().code(2);
}

#[test]
fn test_completion_scripts() {
    let temp = TempDir::new().unwrap();
    ask(&temp)
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_ask"));
    ask(&temp)
        .args(["completion", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#compdef ask"));
    ask(&temp).args(["completion", "tcsh"]).assert().failure().code(2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connectivity_check_against_endpoint() {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello!\"}}]}\n\ndata: [DONE]\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let url = format!("{}/v1/chat/completions", server.uri());
    let assert = tokio::task::spawn_blocking(move || {
        ask(&temp).env("ASK_API_URL", url).env("ASK_API_KEY", "sk-test").arg("test").assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Connectivity test successful!"))
        .stdout(predicate::str::contains("Hello!"));
}

#[test]
fn test_connectivity_check_without_key_fails() {
    let temp = TempDir::new().unwrap();
    ask(&temp)
        .arg("test")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No API key configured"));
}
