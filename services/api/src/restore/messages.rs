//! services/api/src/restore/messages.rs
//!
//! Re-links dumped messages and their replies to the restored users.

use chrono::Utc;
use scriptorium_core::domain::{Message, Reply, DEFAULT_SUBJECT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::extjson::{date_value, id_value};
use super::identity::IdentityMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    sender_id: Value,
    #[serde(default)]
    recipient_id: Value,
    subject: Option<String>,
    message: Option<String>,
    #[serde(default)]
    read_at: Value,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    replies: Vec<RawReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReply {
    #[serde(default)]
    sender_id: Value,
    message: Option<String>,
    #[serde(default)]
    created_at: Value,
}

/// Messages that survived re-linking, with what had to be left behind.
#[derive(Debug, Default)]
pub struct MessagePlan {
    pub messages: Vec<Message>,
    pub dropped_messages: usize,
    pub dropped_replies: usize,
    /// Messages kept without a recipient because theirs did not resolve.
    pub unlinked_recipients: usize,
}

/// Maps senders, recipients and reply senders through the user table.
/// A message whose sender cannot be resolved is dropped, as is any reply whose
/// sender cannot be resolved. An unresolved recipient only clears the
/// recipient; such a message stays visible to its sender and admins.
pub fn plan_messages(records: &[Value], identities: &IdentityMap) -> MessagePlan {
    let mut plan = MessagePlan::default();
    let resolve = |value: &Value| id_value(value).and_then(|old| identities.user(&old));

    for record in records {
        let raw: RawMessage = match serde_json::from_value(record.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed message record: {}", e);
                plan.dropped_messages += 1;
                continue;
            }
        };

        let Some(sender_id) = resolve(&raw.sender_id) else {
            debug!("Dropping message from unknown sender {}", raw.sender_id);
            plan.dropped_messages += 1;
            continue;
        };
        let recipient_id = match id_value(&raw.recipient_id) {
            Some(old) => match identities.user(&old) {
                Some(id) => Some(id),
                None => {
                    warn!("Message to unknown recipient {} kept without a recipient", old);
                    plan.unlinked_recipients += 1;
                    None
                }
            },
            None => None,
        };

        let total_replies = raw.replies.len();
        let replies: Vec<Reply> = raw
            .replies
            .into_iter()
            .filter_map(|reply| {
                Some(Reply {
                    sender_id: resolve(&reply.sender_id)?,
                    content: reply.message.unwrap_or_default(),
                    created_at: date_value(&reply.created_at).unwrap_or_else(Utc::now),
                })
            })
            .collect();
        plan.dropped_replies += total_replies - replies.len();

        plan.messages.push(Message {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            subject: raw
                .subject
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            content: raw.message.unwrap_or_default(),
            is_read: is_truthy(&raw.read_at),
            replies,
            created_at: date_value(&raw.created_at).unwrap_or_else(Utc::now),
        });
    }
    plan
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
