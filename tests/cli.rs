use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn zborg() -> Command {
    let mut cmd = Command::cargo_bin("zborg").unwrap();
    cmd.env_remove("ZBORG_LOG").env("ZBORG_CONFIG_DIR", "/nonexistent");
    cmd
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let backup = dir.join("backup");
    fs::create_dir_all(&backup).unwrap();
    let passphrase = dir.join("passphrase");
    fs::write(&passphrase, "correct horse battery staple\n").unwrap();

    let config = dir.join("nightly.conf");
    fs::write(
        &config,
        format!(
            "DATASETS=\"pool/data pool/photos\"\n\
             BACKUP_MODE=snapshot\n\
             RECURSIVE=yes\n\
             LOCAL_DEST={}\n\
             PASSPHRASE_FILE={}\n\
             MONTH_KEEP=12\n\
             WEEK_KEEP=4\n\
             DAY_KEEP=7\n\
             COMPRESSION=auto,zstd\n\
             FILES_CACHE=ctime,size,inode\n",
            backup.display(),
            passphrase.display()
        ),
    )
    .unwrap();
    config
}

#[test]
fn help_lists_subcommands() {
    zborg()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("snap"))
        .stdout(predicate::str::contains("tidy"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn snap_requires_label() {
    zborg().args(["snap", "nightly"]).assert().failure();
}

#[test]
fn missing_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.conf");
    zborg()
        .args(["run", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn check_prints_effective_settings() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());

    zborg()
        .args(["check", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pool/photos\""))
        .stdout(predicate::str::contains("pool_photos"))
        .stdout(predicate::str::contains("\"day_keep\": 7"))
        .stdout(predicate::str::contains("correct horse").not());
}

#[test]
fn check_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());
    let contents = fs::read_to_string(&config).unwrap();
    fs::write(&config, contents.replace("DAY_KEEP=7", "DAY_KEEP=0")).unwrap();

    zborg()
        .args(["check", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DAY_KEEP"));
}

#[test]
fn check_finds_config_by_name() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path());

    zborg()
        .env("ZBORG_CONFIG_DIR", temp_dir.path())
        .args(["check", "nightly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly.conf"));
}
