use std::fs;
use std::process::Command;

use tempfile::TempDir;

#[test]
fn where_prints_overridden_directories() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");
    let data_dir = root.path().join("data");
    let shader_dir = root.path().join("glsl");

    let output = Command::new(env!("CARGO_BIN_EXE_quadloop"))
        .env("QUADLOOP_CONFIG_DIR", &config_dir)
        .env("QUADLOOP_DATA_DIR", &data_dir)
        .env("QUADLOOP_SHADER_DIR", &shader_dir)
        .arg("where")
        .output()
        .expect("failed to run quadloop where");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&config_dir.display().to_string()));
    assert!(stdout.contains(&data_dir.display().to_string()));
    assert!(stdout.contains(&shader_dir.display().to_string()));
    assert!(stdout.contains("basic, slate-1"));
}

#[test]
fn invalid_config_fails_before_opening_a_window() {
    let root = TempDir::new().unwrap();
    let config = root.path().join("loop.toml");
    fs::write(&config, "version = 1\nwidth = 0\n\n[[shaders]]\nkey = \"basic\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_quadloop"))
        .env("QUADLOOP_CONFIG_DIR", root.path().join("config"))
        .env("QUADLOOP_DATA_DIR", root.path().join("data"))
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run quadloop");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loop.toml"));
}

#[test]
fn malformed_size_is_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_quadloop"))
        .args(["--size", "wide"])
        .output()
        .expect("failed to run quadloop");

    assert_eq!(output.status.code(), Some(2));
}
