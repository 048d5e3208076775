use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn harvest_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_harvest"))
}

fn setup_test_env(queries: &[&str]) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let mut config_content = format!(
        r#"[db]
path = "{}/data/harvest.sqlite"

[export]
dir = "{}/exports"
"#,
        root.display(),
        root.display()
    );
    for q in queries {
        config_content.push_str(&format!("\n[[queries]]\nkeywords = \"{}\"\n", q));
    }

    let config_path = config_dir.join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harvest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env(&[]);

    let (stdout, stderr, success) = run_harvest(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/harvest.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(&[]);

    let (_, _, success1) = run_harvest(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_harvest(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_runs_empty_ledger() {
    let (_tmp, config_path) = setup_test_env(&[]);
    run_harvest(&config_path, &["init"]);

    let (stdout, stderr, success) = run_harvest(&config_path, &["runs"]);
    assert!(success, "runs failed: stderr={}", stderr);
    assert!(stdout.contains("QUERY"));
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn test_export_empty_listings() {
    let (tmp, config_path) = setup_test_env(&[]);
    let out = tmp.path().join("out/listings.json");

    let (_, stderr, success) =
        run_harvest(&config_path, &["export", "--output", out.to_str().unwrap()]);
    assert!(success, "export failed: stderr={}", stderr);
    let content = fs::read_to_string(&out).unwrap();
    assert_eq!(content.trim(), "[]");
}

#[test]
fn test_run_without_queries_fails() {
    let (_tmp, config_path) = setup_test_env(&[]);

    let (_, stderr, success) = run_harvest(&config_path, &["run"]);
    assert!(!success);
    assert!(stderr.contains("No queries configured"), "stderr={}", stderr);
}

#[test]
fn test_run_unknown_query_fails() {
    let (_tmp, config_path) = setup_test_env(&["Data Engineer"]);

    let (_, stderr, success) = run_harvest(&config_path, &["run", "--query", "Plumber"]);
    assert!(!success);
    assert!(stderr.contains("No configured query matches"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, config_path) = setup_test_env(&[]);
    let mut content = fs::read_to_string(&config_path).unwrap();
    content.push_str("\n[fetch]\nrate_limit_backoff_secs = [90.0, 45.0]\n");
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) = run_harvest(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("rate_limit_backoff_secs"), "stderr={}", stderr);
    assert!(!tmp.path().join("data/harvest.sqlite").exists());
}
