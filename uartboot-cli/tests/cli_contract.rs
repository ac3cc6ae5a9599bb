//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("uartboot");
    cmd.env_remove("UARTBOOT_PORT")
        .env_remove("UARTBOOT_BAUD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("uartboot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_flag_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("uartboot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_all_commands() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("version")
                .and(predicate::str::contains("flash"))
                .and(predicate::str::contains("run"))
                .and(predicate::str::contains("list-ports"))
                .and(predicate::str::contains("completions")),
        );
}

#[test]
fn list_ports_json_returns_valid_json() {
    let output = cli_cmd()
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert!(parsed.is_array());
}

#[test]
fn completions_command_writes_to_stdout() {
    cli_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .code(0)
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_uartboot()"));
}

#[test]
fn exit_code_two_for_unknown_command() {
    cli_cmd()
        .arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_invalid_flag() {
    cli_cmd()
        .arg("--invalid-flag-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn flash_without_firmware_is_usage_error() {
    cli_cmd()
        .arg("flash")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("FIRMWARE"));
}

#[test]
fn unknown_command_suggests_similar() {
    cli_cmd()
        .arg("falsh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("flash"));
}

#[test]
fn flash_missing_image_fails_with_code_one() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("missing.hex");

    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "/dev/uartboot-test-none", "flash"])
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn flash_with_missing_port_fails() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("app.hex");
    fs::write(&image, ":10000000AABBCCDD\n:00000001FF\n").expect("write image");

    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "/dev/uartboot-test-none", "--non-interactive", "flash"])
        .arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn version_with_missing_port_fails() {
    let dir = tempdir().expect("tempdir should be created");

    cli_cmd()
        .current_dir(dir.path())
        .env("UARTBOOT_PORT", "/dev/uartboot-test-none")
        .arg("version")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn invalid_config_file_only_warns() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("uartboot.toml"), "invalid toml [[[").expect("write config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");

    assert!(output.status.success(), "invalid config should not be fatal");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("uartboot.toml"), "should warn about the config file");
}

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir should be created");

    cli_cmd()
        .current_dir(dir.path())
        .args(["--port", "/dev/uartboot-test-none", "flash", "--", "-app.hex"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("-app.hex"));
}
