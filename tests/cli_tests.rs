use std::fs;
use std::process::Command;

fn exe() -> Command {
    Command::new(env!("CARGO_BIN_EXE_yomu-server"))
}

#[test]
fn test_routes_lists_api_before_web() {
    let output = exe().arg("routes").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    let first_api = lines.iter().position(|l| l.contains("/api/library")).unwrap();
    let web_file = lines.iter().position(|l| l.contains("web_file")).unwrap();
    assert!(first_api < web_file);
    assert!(stdout.contains("event_stream"));
}

#[test]
fn test_config_init_writes_defaults_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf").join("yomu.yaml");

    let status = exe().args(["config", "init"]).arg(&path).status().unwrap();
    assert!(status.success());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("http_port: 6969"));
    assert!(written.contains("ws_port: 42069"));

    let again = exe().args(["config", "init"]).arg(&path).output().unwrap();
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));

    let forced = exe()
        .args(["config", "init", "--force"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(forced.success());
}

#[test]
fn test_unknown_subcommand_fails() {
    let output = exe().arg("frobnicate").output().unwrap();
    assert!(!output.status.success());
}
