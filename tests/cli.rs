mod support;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("harness.toml");
    fs::write(&config_path, support::config_toml(tmp.path())).unwrap();
    (tmp, config_path)
}

fn run_rh(config_path: Option<&Path>, args: &[&str]) -> (String, String, bool) {
    let binary = rh_binary();
    let mut cmd = Command::new(&binary);
    if let Some(config) = config_path {
        cmd.arg("--config").arg(config);
    }
    let output = cmd
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_tools_list_needs_no_config() {
    let (stdout, stderr, success) = run_rh(Some(Path::new("/nonexistent/harness.toml")), &["tools", "list"]);
    assert!(success, "tools list failed: {}", stderr);
    assert!(stdout.contains("validate_test_syntax(test_code)"));
    assert!(stdout.contains("save_renode_code("));
    assert_eq!(stdout.lines().filter(|l| !l.starts_with(' ')).count(), 11);
}

#[test]
fn test_tools_run_template() {
    let (stdout, stderr, success) = run_rh(
        None,
        &["tools", "run", "get_renode_template", "--param", "template_type=repl_uart"],
    );
    assert!(success, "tools run failed: {}", stderr);
    assert!(stdout.contains("UART"));
}

#[test]
fn test_tools_run_validation_reports_errors() {
    let (stdout, stderr, success) = run_rh(
        None,
        &[
            "tools",
            "run",
            "validate_test_syntax",
            "--param",
            "test_code=def helper(:\n    pass",
        ],
    );
    assert!(success, "tools run failed: {}", stderr);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["is_valid"], false);
}

#[test]
fn test_tools_run_save_sanitizes_name() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("generated");
    let (stdout, stderr, success) = run_rh(
        None,
        &[
            "tools",
            "run",
            "save_test_case",
            "--param",
            "test_name=../../etc/passwd",
            "--param",
            "test_code=def test_x(): pass",
            "--output-dir",
            out.to_str().unwrap(),
        ],
    );
    assert!(success, "save failed: {}", stderr);
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["status"], "success");
    let saved = PathBuf::from(result["filepath"].as_str().unwrap());
    assert!(saved.starts_with(out.join("general")));
    assert!(saved.exists());
}

#[test]
fn test_unknown_tool_fails() {
    let (_, stderr, success) = run_rh(None, &["tools", "run", "rm_rf"]);
    assert!(!success);
    assert!(stderr.contains("Unknown tool"));
}

#[test]
fn test_pages_lists_configured_pages() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_rh(Some(&config), &["pages"]);
    assert!(success, "pages failed: {}", stderr);
    assert!(stdout.contains("code-analysis"));
    assert!(stdout.contains("tab \"Code Analysis\" → Code Analyzer (requires code)"));
    assert!(stdout.contains("pynvme"));
}

#[test]
fn test_ask_without_uploads_fails_fast() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_rh(
        Some(&config),
        &["ask", "code-analysis", "Code Analysis", "check for buffer overflow"],
    );
    assert!(!success);
    assert!(stderr.contains("Please upload at least one code file first"));
}

#[test]
fn test_missing_config_is_reported() {
    let (_, stderr, success) = run_rh(Some(Path::new("/nonexistent/harness.toml")), &["pages"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
