//! Group key display formatting

use crate::services::GroupKeySummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Format stored group keys as a table
pub fn format_group_key_list(summaries: &[GroupKeySummary]) -> String {
    if summaries.is_empty() {
        return "No group keys found.".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:<36}  {:<20}  {:<20}\n",
        "Group", "Created", "Re-protected"
    ));
    output.push_str(&format!("{:-<36}  {:-<20}  {:-<20}\n", "", "", ""));

    for summary in summaries {
        let updated = summary
            .updated_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());

        output.push_str(&format!(
            "{:<36}  {:<20}  {:<20}\n",
            summary.group_id.as_uuid(),
            summary.created_at.format(TIME_FORMAT).to_string(),
            updated,
        ));
    }

    output.push_str(&format!("\n{} group key(s)\n", summaries.len()));
    output
}

/// Format one group key's metadata (never the key material)
pub fn format_group_key_details(summary: &GroupKeySummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("Group key: {}\n", summary.group_id.as_uuid()));
    output.push_str(&format!(
        "  Created:        {}\n",
        summary.created_at.format(TIME_FORMAT)
    ));
    if let Some(updated) = summary.updated_at {
        output.push_str(&format!("  Re-protected:   {}\n", updated.format(TIME_FORMAT)));
    }
    output.push_str(&format!("  Protected size: {} bytes\n", summary.protected_len));

    output
}
