use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use splitcrypt::cli::{
    handle_expense_command, handle_init, handle_key_command, handle_protection_command,
    ExpenseCommands, KeyCommands, ProtectionCommands,
};
use splitcrypt::config::{paths::SplitPaths, settings::Settings};
use splitcrypt::storage::Storage;

#[derive(Parser)]
#[command(
    name = "splitcrypt",
    version,
    about = "Per-group field encryption for shared expenses",
    long_about = "splitcrypt keeps one protected master key per group, derives a \
                  per-member key for every rotation tag, and encrypts expense \
                  fields so only the member who wrote them (or someone holding \
                  the group key) can read them back."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (overrides SPLITCRYPT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the protection passphrase and write the initial settings
    Init,

    /// Protection passphrase commands
    #[command(subcommand)]
    Protection(ProtectionCommands),

    /// Group master key commands
    #[command(subcommand)]
    Key(KeyCommands),

    /// Expense encryption commands
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show current configuration and paths
    Config,
}

fn init_tracing(verbose: bool, settings: &Settings) {
    let filter = if verbose {
        EnvFilter::new("splitcrypt=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => SplitPaths::with_base_dir(dir),
        None => SplitPaths::new()?,
    };
    let mut settings = Settings::load_or_create(&paths)?;
    init_tracing(cli.verbose, &settings);

    let storage = Storage::open(paths)?;
    let paths = storage.paths();

    match cli.command {
        Some(Commands::Init) => handle_init(paths, &mut settings, &storage)?,
        Some(Commands::Protection(cmd)) => {
            handle_protection_command(paths, &mut settings, &storage, cmd)?
        }
        Some(Commands::Key(cmd)) => handle_key_command(&settings, &storage, cmd)?,
        Some(Commands::Expense(cmd)) => handle_expense_command(&settings, &storage, cmd)?,
        Some(Commands::Audit { limit }) => {
            let entries = storage.audit().read_recent(limit)?;
            if entries.is_empty() {
                println!("Audit log is empty.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
        Some(Commands::Config) => {
            println!("splitcrypt Configuration");
            println!("========================");
            println!("Base directory:  {}", paths.base_dir().display());
            println!("Settings file:   {}", paths.settings_file().display());
            println!("Group keys file: {}", paths.group_keys_file().display());
            println!("Audit log:       {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            println!("  Derivation iterations: {}", settings.derivation.iterations);
            println!("  Field format:          {:?}", settings.field_format);
            println!("  Protection configured: {}", settings.protection.is_configured());
            println!("  Log filter:            {}", settings.log_filter);
        }
        None => {
            println!("splitcrypt - per-group field encryption for shared expenses");
            println!();
            println!("Run 'splitcrypt --help' for usage information.");
        }
    }

    Ok(())
}
