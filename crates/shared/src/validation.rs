use crate::constants::*;

pub fn validate_channel_id(channel_id: &str) -> Result<(), String> {
    let trimmed = channel_id.trim();
    if trimmed.is_empty() {
        return Err("Channel id is required".into());
    }
    if trimmed.len() > MAX_CHANNEL_ID_LENGTH {
        return Err(format!(
            "Channel id must be at most {} characters",
            MAX_CHANNEL_ID_LENGTH
        ));
    }
    // Ids are interpolated into URL paths
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Channel id can only contain letters, numbers, hyphens, and underscores".into());
    }
    Ok(())
}

pub fn validate_message_content(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message content is required".into());
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

pub fn clamp_history_limit(limit: u32) -> u32 {
    limit.clamp(1, HISTORY_PAGE_SIZE_MAX)
}
