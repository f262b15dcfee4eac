#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use logvault_core::KeyParser;
use predicates::str::contains;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;
use zip::write::SimpleFileOptions;

fn zip_bytes(name: &str, contents: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, SimpleFileOptions::default()).unwrap();
    writer.write_all(contents.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

fn put(root: &Path, key: &str, data: &[u8]) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

fn put_archive(root: &Path, prefix: &str, ts: OffsetDateTime, contents: &str) -> String {
    let key = KeyParser::default().object_key(prefix, ts);
    put(root, &key, &zip_bytes("log.txt", contents));
    key
}

/// Archives for `dev1` every hour from 22:00 to 02:00, across midnight.
fn seeded_storage() -> (TempDir, Vec<String>) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("storage");
    let keys = vec![
        put_archive(&root, "dev1", datetime!(2024-03-04 22:00 UTC), "22\n"),
        put_archive(&root, "dev1", datetime!(2024-03-04 23:00 UTC), "23\n"),
        put_archive(&root, "dev1", datetime!(2024-03-05 00:00 UTC), "00\n"),
        put_archive(&root, "dev1", datetime!(2024-03-05 01:00 UTC), "01\n"),
        put_archive(&root, "dev1", datetime!(2024-03-05 02:00 UTC), "02\n"),
    ];
    (temp, keys)
}

/// `logvaultctl` configured purely through env vars, with filesystem storage in `temp`.
fn logvaultctl(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("logvaultctl").unwrap();
    cmd.env("LOGVAULT_CONFIG", temp.path().join("missing.toml"))
        .env("LOGVAULT_STORAGE__TYPE", "filesystem")
        .env("LOGVAULT_STORAGE__PATH", temp.path().join("storage"));
    cmd
}

#[test]
fn fetch_writes_window_across_midnight() {
    let (temp, _) = seeded_storage();
    let output = temp.path().join("out.log");

    logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1"])
        .args(["--start-time", "2024-03-04T23:30:00Z"])
        .args(["--end-time", "2024-03-05T00:30:00Z"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(contains("from 3 archives"));

    assert_eq!(fs::read_to_string(&output).unwrap(), "23\n00\n01\n");
}

#[test]
fn fetch_dry_run_lists_keys() {
    let (temp, keys) = seeded_storage();

    let assert = logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1", "--dry-run"])
        .args(["--start-time", "2024-03-04T23:30:00Z"])
        .args(["--end-time", "2024-03-05T00:30:00Z"])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let listed: Vec<&str> = stdout.lines().collect();
    assert_eq!(listed, vec![&keys[1], &keys[2], &keys[3]]);
}

#[test]
fn fetch_empty_storage_writes_empty_file() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out.log");

    logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1"])
        .args(["--start-time", "2024-03-05T10:00:00Z"])
        .args(["--end-time", "2024-03-05T11:00:00Z"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(fs::read(&output).unwrap(), b"");
}

#[test]
fn fetch_rejects_end_before_start() {
    let temp = TempDir::new().unwrap();

    logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1", "--output", "unused.log"])
        .args(["--start-time", "2024-03-05T11:00:00Z"])
        .args(["--end-time", "2024-03-05T10:00:00Z"])
        .assert()
        .failure()
        .stderr(contains("before begin time"));
}

#[test]
fn fetch_rejects_malformed_time() {
    let temp = TempDir::new().unwrap();

    logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1", "--output", "unused.log"])
        .args(["--start-time", "yesterday"])
        .args(["--end-time", "2024-03-05T10:00:00Z"])
        .assert()
        .failure()
        .stderr(contains("invalid start-time"));
}

#[test]
fn fetch_requires_output_unless_dry_run() {
    let temp = TempDir::new().unwrap();

    logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1"])
        .args(["--start-time", "2024-03-05T10:00:00Z"])
        .args(["--end-time", "2024-03-05T11:00:00Z"])
        .assert()
        .failure()
        .stderr(contains("--output"));
}

#[test]
fn fetch_reports_corrupt_archive() {
    let (temp, keys) = seeded_storage();
    put(&temp.path().join("storage"), &keys[2], b"not a zip");
    let output = temp.path().join("out.log");

    logvaultctl(&temp)
        .args(["fetch", "--prefix", "dev1"])
        .args(["--start-time", "2024-03-04T23:30:00Z"])
        .args(["--end-time", "2024-03-05T00:30:00Z"])
        .arg("--output")
        .arg(&output)
        .assert()
        .failure()
        .stderr(contains("retrieval failed"));

    assert_eq!(fs::read_to_string(&output).unwrap(), "23\n");
}

#[test]
fn show_upload_prints_envelope_and_body() {
    let temp = TempDir::new().unwrap();
    let header = "{\"token\":\"dev1\",\"tz\":\"UTC\",\"encoding\":\"\"}";
    let stored = format!("log 1\n{}\n{header}\nhello from dev1\n", header.len() + 1);
    put(
        &temp.path().join("storage"),
        "inbound/00112233aabbccdd",
        stored.as_bytes(),
    );

    logvaultctl(&temp)
        .args(["show-upload", "inbound/00112233aabbccdd"])
        .assert()
        .success()
        .stdout(contains("token: dev1"))
        .stdout(contains("tz: UTC"))
        .stdout(contains("hello from dev1"));
}

#[test]
fn show_upload_rejects_foreign_objects() {
    let temp = TempDir::new().unwrap();
    put(&temp.path().join("storage"), "inbound/raw", b"just bytes");

    logvaultctl(&temp)
        .args(["show-upload", "inbound/raw"])
        .assert()
        .failure()
        .stderr(contains("not an uploaded log"));
}
