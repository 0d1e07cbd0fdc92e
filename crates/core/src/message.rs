//! Chat messages posted into a channel.

use chrono::{DateTime, Utc};
use mc_common::ids::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Uuid);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub sender_id: Uuid,
    pub content: String,
    pub mentions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Extract `@<uuid>` mentions from message content, de-duplicated and
/// unioned with any mentions the client already supplied explicitly.
pub fn extract_mentions(content: &str, explicit: &[Uuid]) -> Vec<Uuid> {
    let mut found: HashSet<Uuid> = explicit.iter().copied().collect();

    for token in content.split_whitespace() {
        if let Some(rest) = token.strip_prefix('@') {
            let candidate = rest.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '-');
            if let Ok(uuid) = Uuid::parse_str(candidate) {
                found.insert(uuid);
            }
        }
    }

    found.into_iter().collect()
}

/// The slash-command token and argument tail, if `content` (after trimming
/// leading whitespace) starts with `/`.
pub fn parse_command(content: &str) -> Option<(String, String)> {
    let trimmed = content.trim_start();
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_string();
    if command.is_empty() {
        return None;
    }
    let args = parts.next().unwrap_or("").trim_start().to_string();
    Some((command, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_mentions_finds_uuid_tokens() {
        let uuid = Uuid::new_v4();
        let content = format!("hey @{uuid} check this out");
        let mentions = extract_mentions(&content, &[]);
        assert_eq!(mentions, vec![uuid]);
    }

    #[test]
    fn extract_mentions_unions_with_explicit() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let content = format!("cc @{a}");
        let mentions = extract_mentions(&content, &[b]);
        assert_eq!(mentions.len(), 2);
        assert!(mentions.contains(&a));
        assert!(mentions.contains(&b));
    }

    #[test]
    fn extract_mentions_ignores_non_uuid_at_tokens() {
        let content = "thanks @bob for the help";
        assert!(extract_mentions(content, &[]).is_empty());
    }

    #[test]
    fn parse_command_splits_token_and_args() {
        let (cmd, args) = parse_command("/status").unwrap();
        assert_eq!(cmd, "status");
        assert_eq!(args, "");

        let (cmd, args) = parse_command("  /assign  task-1 bob").unwrap();
        assert_eq!(cmd, "assign");
        assert_eq!(args, "task-1 bob");
    }

    #[test]
    fn parse_command_rejects_non_command_content() {
        assert!(parse_command("no slash here").is_none());
        assert!(parse_command("hi / there").is_some()); // leading-slash-free text first
    }
}
