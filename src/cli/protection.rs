//! Protection passphrase CLI commands
//!
//! Sets up, checks and changes the passphrase that protects every group
//! master key at rest.

use clap::Subcommand;
use serde_json::json;
use tracing::info;

use crate::audit::EntityType;
use crate::config::{paths::SplitPaths, settings::Settings};
use crate::crypto::{derive_protection_key, AeadKeyProtector, KeyDerivationParams, SecureString};
use crate::error::{SplitError, SplitResult};
use crate::services::GroupKeyService;
use crate::storage::Storage;

/// Environment variable holding the current protection passphrase
pub const PASSPHRASE_ENV: &str = "SPLITCRYPT_PASSPHRASE";

/// Environment variable holding the replacement passphrase for `change-passphrase`
pub const NEW_PASSPHRASE_ENV: &str = "SPLITCRYPT_NEW_PASSPHRASE";

const MIN_PASSPHRASE_LEN: usize = 8;

/// Protection passphrase commands
#[derive(Subcommand)]
pub enum ProtectionCommands {
    /// Show whether a protection passphrase is set up
    Status,

    /// Verify the protection passphrase is correct
    Verify,

    /// Change the passphrase and re-protect every group key
    #[command(alias = "change")]
    ChangePassphrase,
}

/// Handle protection commands
pub fn handle_protection_command(
    paths: &SplitPaths,
    settings: &mut Settings,
    storage: &Storage,
    cmd: ProtectionCommands,
) -> SplitResult<()> {
    match cmd {
        ProtectionCommands::Status => show_status(settings, storage),
        ProtectionCommands::Verify => {
            unlock(settings)?;
            println!("Passphrase is correct.");
            Ok(())
        }
        ProtectionCommands::ChangePassphrase => change_passphrase(paths, settings, storage),
    }
}

/// Set up the protection passphrase and write the initial settings
pub fn handle_init(paths: &SplitPaths, settings: &mut Settings, storage: &Storage) -> SplitResult<()> {
    if settings.protection.is_configured() {
        println!("splitcrypt is already initialized at {}", paths.base_dir().display());
        println!("Use 'splitcrypt protection change-passphrase' to change the passphrase.");
        return Ok(());
    }

    println!("Initializing splitcrypt at: {}", paths.base_dir().display());
    println!();
    println!("Group master keys are protected with a passphrase.");
    println!("If you lose it, no expense can be decrypted again.");
    println!();

    let passphrase = read_new_passphrase(PASSPHRASE_ENV)?;
    let key_params = KeyDerivationParams::new();
    let protector = build_protector(&passphrase, &key_params)?;

    settings.protection.verification = Some(protector.verification_token()?);
    settings.protection.key_params = Some(key_params.clone());
    settings.save(paths)?;

    storage.log_create(
        EntityType::ProtectionKey,
        "protection",
        &json!({
            "algorithm": "argon2id",
            "memory_cost": key_params.memory_cost,
            "time_cost": key_params.time_cost,
            "parallelism": key_params.parallelism,
        }),
    )?;

    info!("Protection passphrase configured");
    println!("Initialization complete.");
    Ok(())
}

/// Derive and verify the protector from the configured passphrase
pub fn unlock(settings: &Settings) -> SplitResult<AeadKeyProtector> {
    let (Some(key_params), Some(token)) = (
        settings.protection.key_params.as_ref(),
        settings.protection.verification.as_ref(),
    ) else {
        return Err(SplitError::Config(
            "No protection passphrase configured. Run 'splitcrypt init' first.".into(),
        ));
    };

    let passphrase = read_passphrase(PASSPHRASE_ENV, "Protection passphrase: ")?;
    let protector = build_protector(&passphrase, key_params)?;
    protector.verify(token)?;
    Ok(protector)
}

fn show_status(settings: &Settings, storage: &Storage) -> SplitResult<()> {
    println!("Protection Status");
    println!("=================");
    println!();

    match settings.protection.key_params.as_ref() {
        Some(params) if settings.protection.is_configured() => {
            println!("Status: CONFIGURED");
            println!();
            println!("Key Derivation Parameters:");
            println!("  Algorithm:   Argon2id");
            println!("  Memory Cost: {} KiB", params.memory_cost);
            println!("  Time Cost:   {} iterations", params.time_cost);
            println!("  Parallelism: {} threads", params.parallelism);
        }
        _ => {
            println!("Status: NOT CONFIGURED");
            println!();
            println!("Run 'splitcrypt init' to set a protection passphrase.");
        }
    }

    println!();
    println!("Member key derivation: PBKDF2-HMAC-SHA256");
    println!("  Iterations:    {}", settings.derivation.iterations);
    println!("  Output length: {} bytes", settings.derivation.output_length);
    println!("Field format:    {:?}", settings.field_format);
    println!("Stored group keys: {}", storage.group_keys.count()?);

    Ok(())
}

fn change_passphrase(paths: &SplitPaths, settings: &mut Settings, storage: &Storage) -> SplitResult<()> {
    let current = unlock(settings)?;
    println!("Current passphrase verified.");

    let new_passphrase = read_new_passphrase(NEW_PASSPHRASE_ENV)?;
    let new_params = KeyDerivationParams::new();
    let replacement = build_protector(&new_passphrase, &new_params)?;

    let count = GroupKeyService::new(storage, &current).reprotect_all(&replacement)?;

    let previous = settings.protection.clone();
    settings.protection.verification = Some(replacement.verification_token()?);
    settings.protection.key_params = Some(new_params);

    if let Err(e) = settings.save(paths) {
        // Settings still name the old passphrase: put the keys back under it
        GroupKeyService::new(storage, &replacement).reprotect_all(&current)?;
        settings.protection = previous;
        return Err(e);
    }

    storage.log_update(
        EntityType::ProtectionKey,
        "protection",
        &json!({ "reprotected_group_keys": count }),
        Some("passphrase changed".to_string()),
    )?;

    println!("Passphrase changed. {} group key(s) re-protected.", count);
    Ok(())
}

fn build_protector(passphrase: &str, params: &KeyDerivationParams) -> SplitResult<AeadKeyProtector> {
    Ok(AeadKeyProtector::new(derive_protection_key(passphrase, params)?))
}

/// Read a passphrase from `env_var`, or prompt with hidden input
fn read_passphrase(env_var: &str, prompt: &str) -> SplitResult<SecureString> {
    match std::env::var(env_var) {
        Ok(value) => Ok(SecureString::new(value)),
        Err(_) => prompt_passphrase(prompt),
    }
}

fn prompt_passphrase(prompt: &str) -> SplitResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::new)
        .map_err(|e| SplitError::Encryption(format!("Failed to read passphrase: {}", e)))
}

/// Read a new passphrase from `env_var`, or prompt twice until both entries match
fn read_new_passphrase(env_var: &str) -> SplitResult<SecureString> {
    if let Ok(value) = std::env::var(env_var) {
        let value = SecureString::new(value);
        check_length(&value)?;
        return Ok(value);
    }

    loop {
        let first = prompt_passphrase("Enter new passphrase: ")?;
        if let Err(e) = check_length(&first) {
            println!("{}", e);
            continue;
        }

        let second = prompt_passphrase("Confirm passphrase: ")?;
        if first.as_str() != second.as_str() {
            println!("Passphrases do not match. Please try again.");
            continue;
        }

        return Ok(first);
    }
}

fn check_length(passphrase: &SecureString) -> SplitResult<()> {
    if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
        return Err(SplitError::Validation(format!(
            "Passphrase must be at least {} characters",
            MIN_PASSPHRASE_LEN
        )));
    }
    Ok(())
}
