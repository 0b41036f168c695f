//! Group key CLI commands

use clap::Subcommand;

use crate::config::settings::Settings;
use crate::display::{format_group_key_details, format_group_key_list};
use crate::error::{SplitError, SplitResult};
use crate::models::GroupId;
use crate::services::GroupKeyService;
use crate::storage::Storage;

use super::protection::unlock;

/// Group key subcommands
#[derive(Subcommand)]
pub enum KeyCommands {
    /// Create the master key for a group (a new group id if none is given)
    Create {
        /// Group UUID
        group: Option<String>,
    },

    /// Delete a group's master key
    Delete {
        /// Group UUID
        group: String,
    },

    /// List stored group keys
    List,

    /// Show one group key's metadata
    Show {
        /// Group UUID
        group: String,
    },

    /// Show the audit history of a group key
    History {
        /// Group UUID
        group: String,
    },
}

/// Handle group key commands
pub fn handle_key_command(settings: &Settings, storage: &Storage, cmd: KeyCommands) -> SplitResult<()> {
    match cmd {
        KeyCommands::Create { group } => {
            let group_id = match group {
                Some(g) => parse_group(&g)?,
                None => GroupId::new(),
            };
            let protector = unlock(settings)?;
            let summary = GroupKeyService::new(storage, &protector).create_group_key(group_id)?;

            println!("Created master key for group {}", summary.group_id.as_uuid());
        }
        KeyCommands::Delete { group } => {
            let group_id = parse_group(&group)?;
            let protector = unlock(settings)?;

            if GroupKeyService::new(storage, &protector).delete_group_key(group_id)? {
                println!("Deleted master key for group {}", group_id.as_uuid());
            } else {
                println!("Group {} has no master key.", group_id.as_uuid());
            }
        }
        KeyCommands::List => {
            let summaries = GroupKeyService::list(storage)?;
            print!("{}", format_group_key_list(&summaries));
            if summaries.is_empty() {
                println!();
            }
        }
        KeyCommands::Show { group } => {
            let group_id = parse_group(&group)?;
            let summary = GroupKeyService::get(storage, group_id)?;
            print!("{}", format_group_key_details(&summary));
        }
        KeyCommands::History { group } => {
            let group_id = parse_group(&group)?;
            let entries = storage
                .audit()
                .read_for_entity(&group_id.as_uuid().to_string())?;

            if entries.is_empty() {
                println!("No history for group {}", group_id.as_uuid());
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
    }

    Ok(())
}

/// Parse a group id argument
pub fn parse_group(s: &str) -> SplitResult<GroupId> {
    s.parse()
        .map_err(|e| SplitError::Validation(format!("Invalid group id '{}': {}", s, e)))
}
