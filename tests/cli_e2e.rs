//! End-to-end CLI tests for the ads-downloader binary.

mod support;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use support::pages::{Card, five_cards, page};

const CDN: &str = "https://scontent.fbcdn.net/v";

fn snapshot(dir: &TempDir, cards: &[Card]) -> std::path::PathBuf {
    let path = dir.path().join("page.html");
    fs::write(&path, page(cards)).unwrap();
    path
}

fn bin(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ads-downloader").unwrap();
    // Keep a developer's own config file out of the way.
    cmd.env("XDG_CONFIG_HOME", dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let dir = TempDir::new().unwrap();
    bin(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Find ads in a saved ad-library page"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    bin(&dir).assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_scan_lists_every_ad() {
    let dir = TempDir::new().unwrap();
    let page = snapshot(&dir, &five_cards(CDN));

    bin(&dir)
        .args(["scan", "--today", "2024-06-15", "--include-offscreen"])
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme\t2024-06-10\tactive"))
        .stdout(predicate::str::contains("Umbrella\t2024-06-01\tunknown"))
        .stdout(predicate::str::contains("Hooli"));
}

#[test]
fn test_scan_filter_hides_non_matching_ads() {
    let dir = TempDir::new().unwrap();
    let page = snapshot(&dir, &five_cards(CDN));

    bin(&dir)
        .args(["scan", "--today", "2024-06-15", "--media", "video"])
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme"))
        .stdout(predicate::str::contains("Initech"))
        .stdout(predicate::str::contains("Globex").not());
}

#[test]
fn test_scan_json_emits_one_object_per_ad() {
    let dir = TempDir::new().unwrap();
    let page = snapshot(&dir, &five_cards(CDN));

    let output = bin(&dir)
        .args(["scan", "--json", "--today", "2024-06-15"])
        .arg(&page)
        .output()
        .unwrap();

    assert!(output.status.success());
    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0]["brand"], "Acme");
    assert_eq!(lines[0]["media"][0]["kind"], "video");
}

#[test]
fn test_stats_prints_aggregates() {
    let dir = TempDir::new().unwrap();
    let page = snapshot(&dir, &five_cards(CDN));

    bin(&dir)
        .args(["stats", "--today", "2024-06-15"])
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 5"))
        .stdout(predicate::str::contains("\"minDate\": \"2024-01-15\""));
}

#[test]
fn test_missing_snapshot_reports_error() {
    let dir = TempDir::new().unwrap();
    bin(&dir)
        .args(["scan", "does-not-exist.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load snapshot"));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let page = snapshot(&dir, &five_cards(CDN));
    let config = dir.path().join("bad.toml");
    fs::write(&config, "item_delay_ms = 999999\n").unwrap();

    bin(&dir)
        .arg("--config")
        .arg(&config)
        .arg("scan")
        .arg(&page)
        .assert()
        .failure()
        .stderr(predicate::str::contains("item_delay_ms"));
}

#[test]
fn test_download_with_no_media_reports_skips() {
    let dir = TempDir::new().unwrap();
    let page = snapshot(&dir, &[Card::new("Acme", 0).status("Active")]);
    let out = dir.path().join("out");

    bin(&dir)
        .args(["download", "--no-delay", "-o"])
        .arg(&out)
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 downloaded, 0 failed, 1 skipped"));
}
