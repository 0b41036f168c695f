use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PASSPHRASE: &str = "correct horse battery";
const GROUP: &str = "6f1c2a4e-9b7d-4c3e-8a11-2f5d6e7c8b90";
const ALICE: &str = "0b8e4f6a-1c2d-4e3f-9a5b-6c7d8e9f0a1b";
const BOB: &str = "7d3a9c1e-5f2b-4a6d-8e0c-1b2a3c4d5e6f";

fn splitcrypt(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("splitcrypt").unwrap();
    cmd.env("SPLITCRYPT_DATA_DIR", dir.path())
        .env("SPLITCRYPT_PASSPHRASE", PASSPHRASE)
        .env_remove("SPLITCRYPT_NEW_PASSPHRASE")
        .env_remove("RUST_LOG");
    cmd
}

fn init_with_group(dir: &TempDir) {
    splitcrypt(dir).arg("init").assert().success();
    splitcrypt(dir)
        .args(["key", "create", GROUP])
        .assert()
        .success()
        .stdout(predicate::str::contains(GROUP));
}

fn encrypt_as(dir: &TempDir, user: &str, title: &str, out: &str) {
    splitcrypt(dir)
        .args(["expense", "encrypt", "--user", user, "--group", GROUP, "--tag", "2025"])
        .args(["--title", title, "--date", "2025-04-01", "--amount", "12.30"])
        .args(["--output", out])
        .assert()
        .success();
}

#[test]
fn test_init_and_status() {
    let dir = TempDir::new().unwrap();

    splitcrypt(&dir)
        .args(["protection", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT CONFIGURED"));

    splitcrypt(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialization complete"));

    splitcrypt(&dir)
        .args(["protection", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Passphrase is correct"));
}

#[test]
fn test_wrong_passphrase_is_rejected() {
    let dir = TempDir::new().unwrap();
    splitcrypt(&dir).arg("init").assert().success();

    splitcrypt(&dir)
        .env("SPLITCRYPT_PASSPHRASE", "not the passphrase")
        .args(["protection", "verify"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid passphrase"));
}

#[test]
fn test_key_commands_require_init() {
    let dir = TempDir::new().unwrap();

    splitcrypt(&dir)
        .args(["key", "create", GROUP])
        .assert()
        .failure()
        .stderr(predicate::str::contains("splitcrypt init"));
}

#[test]
fn test_duplicate_group_key_rejected() {
    let dir = TempDir::new().unwrap();
    init_with_group(&dir);

    splitcrypt(&dir)
        .args(["key", "create", GROUP])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    splitcrypt(&dir)
        .args(["key", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 group key(s)"));
}

#[test]
fn test_encrypt_then_recover_owner() {
    let dir = TempDir::new().unwrap();
    init_with_group(&dir);

    let record = dir.path().join("expense.json");
    encrypt_as(&dir, BOB, "Campsite", record.to_str().unwrap());

    let contents = std::fs::read_to_string(&record).unwrap();
    assert!(!contents.contains("Campsite"));
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    let batch = dir.path().join("batch.json");
    std::fs::write(&batch, serde_json::to_string(&vec![value]).unwrap()).unwrap();

    splitcrypt(&dir)
        .args(["expense", "recover", "--group", GROUP, "--tag", "2025"])
        .args(["--candidate", &format!("{},{}", ALICE, BOB)])
        .arg(&batch)
        .assert()
        .success()
        .stdout(predicate::str::contains("Campsite"))
        .stdout(predicate::str::contains("$12.30"));

    splitcrypt(&dir)
        .args(["expense", "recover", "--group", GROUP, "--tag", "2025"])
        .args(["--candidate", ALICE])
        .arg(&batch)
        .assert()
        .success()
        .stdout(predicate::str::contains("could not be decrypted"));
}

#[test]
fn test_decrypt_with_wrong_owner_fails() {
    let dir = TempDir::new().unwrap();
    init_with_group(&dir);

    let record = dir.path().join("expense.json");
    encrypt_as(&dir, BOB, "Ferry", record.to_str().unwrap());

    splitcrypt(&dir)
        .args(["expense", "decrypt", "--user", BOB, "--group", GROUP, "--tag", "2025"])
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("Ferry"));

    splitcrypt(&dir)
        .args(["expense", "decrypt", "--user", ALICE, "--group", GROUP, "--tag", "2025"])
        .arg(&record)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Authentication failed"));
}

#[test]
fn test_change_passphrase_keeps_records_readable() {
    let dir = TempDir::new().unwrap();
    init_with_group(&dir);

    let record = dir.path().join("expense.json");
    encrypt_as(&dir, ALICE, "Museum", record.to_str().unwrap());

    splitcrypt(&dir)
        .env("SPLITCRYPT_NEW_PASSPHRASE", "a brand new passphrase")
        .args(["protection", "change-passphrase"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 group key(s) re-protected"));

    splitcrypt(&dir)
        .env("SPLITCRYPT_PASSPHRASE", "a brand new passphrase")
        .args(["expense", "decrypt", "--user", ALICE, "--group", GROUP, "--tag", "2025"])
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains("Museum"));

    splitcrypt(&dir)
        .args(["protection", "verify"])
        .assert()
        .failure();
}

#[test]
fn test_delete_key_then_encrypt_fails() {
    let dir = TempDir::new().unwrap();
    init_with_group(&dir);

    splitcrypt(&dir)
        .args(["key", "delete", GROUP])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted master key"));

    splitcrypt(&dir)
        .args(["key", "history", GROUP])
        .assert()
        .success()
        .stdout(predicate::str::contains("DELETE"));

    let out = dir.path().join("expense.json");
    splitcrypt(&dir)
        .args(["expense", "encrypt", "--user", BOB, "--group", GROUP, "--tag", "2025"])
        .args(["--title", "Tent", "--date", "2025-04-01", "--amount", "80"])
        .arg("--output")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Key derivation failed"));
    assert!(!out.exists());
}

#[test]
fn test_audit_shows_key_creation() {
    let dir = TempDir::new().unwrap();
    init_with_group(&dir);

    splitcrypt(&dir)
        .args(["audit", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE GroupKey"));
}
