//! Channel identifiers and the inbound message contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer-facing channel the platform receives messages on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    Whatsapp,
    BusinessChat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Whatsapp => "whatsapp",
            Channel::BusinessChat => "business_chat",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile fields a channel adapter may attach to an inbound message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// Message body of an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub text: String,
}

/// The inbound message contract every channel adapter posts to the
/// gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: Channel,
    pub conversation_id: String,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    #[serde(default)]
    pub user_profile: UserProfile,
    pub message: MessageBody,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub contact_id: Option<String>,
}

fn default_tenant() -> String {
    "default".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_deserializes_with_defaults() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"channel":"web","conversation_id":"c1","message":{"text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(msg.tenant_id, "default");
        assert_eq!(msg.channel, Channel::Web);
        assert!(msg.visitor_id.is_none());
    }

    #[test]
    fn channel_round_trips() {
        for ch in [Channel::Web, Channel::Whatsapp, Channel::BusinessChat] {
            let json = serde_json::to_string(&ch).unwrap();
            let back: Channel = serde_json::from_str(&json).unwrap();
            assert_eq!(ch, back);
        }
    }
}
