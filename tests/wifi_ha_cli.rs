use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

fn write_config(dir: &Path, file_name: &str, body: &str) -> PathBuf {
    let config_path = dir.join(file_name);
    fs::write(&config_path, body).expect("write config");
    config_path
}

fn write_valid_config(dir: &Path, file_name: &str) -> PathBuf {
    let status_dir = dir.join("status");
    write_config(
        dir,
        file_name,
        &format!(
            r#"
name = "wifi-ha-cli-test"

[observability.log]
output = "console"

[gateway]
cluster_virtual_ip = "10.10.10.5/24"
traffic_interface = "eth1"
gre_peers = ["192.168.40.2", "192.168.41.0/24"]

[gateway.server]
ip = "127.0.0.1"
port = 39107

[operator]
status_dir = "{status}"

[[operator.clusters]]
name = "cwf-ha"
pair_id = "pair-1"
gateway_resources = ["cwag-1", "cwag-2"]
"#,
            status = status_dir.display()
        ),
    )
}

fn run_wifi_ha(args: &[&str], current_dir: Option<&Path>) -> Output {
    let mut cmd = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_wifi-ha")));
    cmd.args(args);
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }
    cmd.output().expect("run wifi-ha command")
}

#[test]
fn test_command_accepts_explicit_valid_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_valid_config(temp.path(), "valid.toml");
    let output = run_wifi_ha(&["test", config_path.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 cluster(s)"), "unexpected stdout: {stdout}");
}

#[test]
fn test_command_finds_default_config_in_current_directory() {
    let temp = tempfile::tempdir().expect("temp dir");
    write_valid_config(temp.path(), "config.toml");
    let output = run_wifi_ha(&["test"], Some(temp.path()));

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_command_fails_for_missing_custom_config_path() {
    let temp = tempfile::tempdir().expect("temp dir");
    let missing_path = temp.path().join("missing.toml");
    let output = run_wifi_ha(&["test", missing_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("Config file not found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_command_fails_when_no_default_config_exists() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_wifi_ha(&["test"], Some(temp.path()));
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("No configuration file found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_command_fails_for_invalid_config_content() {
    let temp = tempfile::tempdir().expect("temp dir");
    let bad_path = write_config(temp.path(), "bad.toml", "name = \"broken\"\n[gateway\n");

    let output = run_wifi_ha(&["test", bad_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(stderr.contains("配置解析失败"), "unexpected stderr: {stderr}");
}

#[test]
fn test_command_fails_for_malformed_vip() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(
        temp.path(),
        "bad-vip.toml",
        r#"
name = "cwag-1"

[gateway]
cluster_virtual_ip = "10.10.10.300/24"
"#,
    );
    let output = run_wifi_ha(&["test", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("cluster_virtual_ip"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_command_fails_for_invalid_error_ceiling() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(
        temp.path(),
        "bad-ceiling.toml",
        r#"
name = "ha-operator"

[operator]

[[operator.clusters]]
name = "cwf-ha"
pair_id = "pair-1"
gateway_resources = ["cwag-1", "cwag-2"]
max_consecutive_errors = 9
"#,
    );
    let output = run_wifi_ha(&["test", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("max_consecutive_errors"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_command_succeeds_with_warning_only_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "warning.toml", "name = \"idle\"\n");
    let output = run_wifi_ha(&["test", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "warning-only config should succeed, stderr: {stderr}"
    );
}

#[test]
fn gateway_command_requires_gateway_section() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(
        temp.path(),
        "operator-only.toml",
        r#"
name = "ha-operator"

[operator]
"#,
    );
    let output = run_wifi_ha(
        &["gateway", "--config", config_path.to_str().expect("utf8 path")],
        None,
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "gateway command should fail");
    assert!(
        stderr.contains("[gateway] section"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn run_mode_fails_when_no_default_config_exists() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_wifi_ha(&[], Some(temp.path()));
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "run mode should fail");
    assert!(
        stderr.contains("No configuration file found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn run_mode_fails_when_nothing_is_configured() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "idle.toml", "name = \"idle\"\n");
    let output = run_wifi_ha(&["--config", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "run mode should fail");
    assert!(stderr.contains("nothing to run"), "unexpected stderr: {stderr}");
}

#[test]
fn gateway_health_config_overrides_and_is_validated() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_config(temp.path(), "node.toml", "name = \"cwag-1\"\n");
    let health_path = write_config(
        temp.path(),
        "health.toml",
        r#"
[gateway]
cluster_virtual_ip = "10.10.10.300/24"
"#,
    );
    let output = run_wifi_ha(
        &[
            "gateway",
            "--config",
            config_path.to_str().expect("utf8 path"),
            "--health-config",
            health_path.to_str().expect("utf8 path"),
        ],
        None,
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "malformed VIP should abort startup");
    assert!(
        stderr.contains("cluster_virtual_ip"),
        "unexpected stderr: {stderr}"
    );
}
