//! Outward-facing collaborators: channel outbound, ticketing, and the
//! customer directory.
//!
//! Each is a trait plus one webhook/HTTP implementation riding the
//! shared back-office client. Test doubles implement the traits
//! directly.

use async_trait::async_trait;
use serde_json::Value;

use rv_domain::channel::Channel;
use rv_domain::config::{BackofficeEndpoint, ChannelsConfig, CustomerDirectoryConfig, TicketingConfig};
use rv_domain::trace::TraceEvent;
use rv_domain::{Error, Result};
use rv_tools::clients::BackofficeHttp;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel outbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_message(&self, conversation_id: &str, text: &str, channel: Channel)
        -> Result<()>;
    async fn send_typing(&self, conversation_id: &str, channel: Channel) -> Result<()>;
    async fn escalate_to_human(
        &self,
        conversation_id: &str,
        reason: &str,
        summary: &str,
        channel: Channel,
    ) -> Result<()>;
    /// Channel-neutral rich payload. Implementations without rich media
    /// keep the default and the caller falls back to plain text.
    async fn send_rich_message(
        &self,
        _conversation_id: &str,
        _payload: &Value,
        _channel: Channel,
    ) -> Result<()> {
        Err(Error::Other("rich media not supported".into()))
    }
}

/// POSTs outbound events to the per-channel webhook URLs from config.
/// Channels without a configured URL log and succeed — dev mode.
pub struct WebhookOutbound {
    http: reqwest::Client,
    channels: ChannelsConfig,
}

impl WebhookOutbound {
    pub fn new(channels: ChannelsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self { http, channels })
    }

    async fn post(&self, channel: Channel, body: Value) -> Result<()> {
        let Some(url) = &self.channels.endpoint(channel).outbound_url else {
            tracing::debug!(channel = %channel, "no outbound URL configured; dropping event");
            return Ok(());
        };
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Http(format!(
                "outbound {channel} returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelOutbound for WebhookOutbound {
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        channel: Channel,
    ) -> Result<()> {
        self.post(
            channel,
            serde_json::json!({
                "type": "message",
                "conversation_id": conversation_id,
                "text": text,
            }),
        )
        .await?;
        TraceEvent::OutboundSent {
            conversation_id: conversation_id.to_owned(),
            channel: channel.as_str().to_owned(),
            rich: false,
        }
        .emit();
        Ok(())
    }

    async fn send_typing(&self, conversation_id: &str, channel: Channel) -> Result<()> {
        self.post(
            channel,
            serde_json::json!({
                "type": "typing",
                "conversation_id": conversation_id,
            }),
        )
        .await
    }

    async fn escalate_to_human(
        &self,
        conversation_id: &str,
        reason: &str,
        summary: &str,
        channel: Channel,
    ) -> Result<()> {
        self.post(
            channel,
            serde_json::json!({
                "type": "escalation",
                "conversation_id": conversation_id,
                "reason": reason,
                "summary": summary,
            }),
        )
        .await
    }

    async fn send_rich_message(
        &self,
        conversation_id: &str,
        payload: &Value,
        channel: Channel,
    ) -> Result<()> {
        self.post(
            channel,
            serde_json::json!({
                "type": "rich",
                "conversation_id": conversation_id,
                "payload": payload,
            }),
        )
        .await?;
        TraceEvent::OutboundSent {
            conversation_id: conversation_id.to_owned(),
            channel: channel.as_str().to_owned(),
            rich: true,
        }
        .emit();
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ticketing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub conversation_id: String,
    pub tenant_id: String,
    pub subject: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTicket {
    pub summary: String,
    pub tags: Vec<String>,
    pub status: Option<String>,
    pub lead_fields: Value,
    pub intent_classification: Option<String>,
}

#[async_trait]
pub trait Ticketing: Send + Sync {
    async fn create_ticket(&self, params: CreateTicket) -> Result<String>;
    async fn update_ticket(&self, ticket_id: &str, params: UpdateTicket) -> Result<()>;
}

pub struct HttpTicketing {
    http: BackofficeHttp,
    enabled: bool,
}

impl HttpTicketing {
    pub fn new(cfg: &TicketingConfig) -> Result<Self> {
        let endpoint = BackofficeEndpoint {
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            timeout_ms: cfg.timeout_ms,
            max_retries: 2,
        };
        Ok(Self {
            http: BackofficeHttp::new(&endpoint)?,
            enabled: !cfg.base_url.is_empty(),
        })
    }
}

#[async_trait]
impl Ticketing for HttpTicketing {
    async fn create_ticket(&self, params: CreateTicket) -> Result<String> {
        if !self.enabled {
            return Err(Error::Config("ticketing.base_url is not configured".into()));
        }
        let resp = self
            .http
            .post_json(
                "/api/tickets",
                &serde_json::json!({
                    "conversation_id": params.conversation_id,
                    "tenant_id": params.tenant_id,
                    "subject": params.subject,
                    "channel": params.channel.as_str(),
                }),
            )
            .await?;
        resp.get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::Http("ticketing response has no id".into()))
    }

    async fn update_ticket(&self, ticket_id: &str, params: UpdateTicket) -> Result<()> {
        if !self.enabled {
            return Err(Error::Config("ticketing.base_url is not configured".into()));
        }
        self.http
            .post_json(
                &format!("/api/tickets/{ticket_id}"),
                &serde_json::json!({
                    "summary": params.summary,
                    "tags": params.tags,
                    "status": params.status,
                    "lead_fields": params.lead_fields,
                    "intent_classification": params.intent_classification,
                }),
            )
            .await?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Customer directory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Resolve a customer id from a phone or email.
    async fn find_by_contact(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<String>>;
    /// Full Customer-360 profile, when the directory has one.
    async fn fetch_profile(&self, customer_id: &str) -> Result<Option<Value>>;
}

pub struct HttpCustomerDirectory {
    http: BackofficeHttp,
    enabled: bool,
}

impl HttpCustomerDirectory {
    pub fn new(cfg: &CustomerDirectoryConfig) -> Result<Self> {
        let endpoint = BackofficeEndpoint {
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            timeout_ms: cfg.timeout_ms,
            max_retries: 2,
        };
        Ok(Self {
            http: BackofficeHttp::new(&endpoint)?,
            enabled: !cfg.base_url.is_empty(),
        })
    }
}

#[async_trait]
impl CustomerDirectory for HttpCustomerDirectory {
    async fn find_by_contact(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<String>> {
        if !self.enabled || (phone.is_none() && email.is_none()) {
            return Ok(None);
        }
        let resp = self
            .http
            .post_json(
                "/api/customers/lookup",
                &serde_json::json!({ "phone": phone, "email": email }),
            )
            .await?;
        Ok(resp
            .get("customer_id")
            .and_then(Value::as_str)
            .map(str::to_owned))
    }

    async fn fetch_profile(&self, customer_id: &str) -> Result<Option<Value>> {
        if !self.enabled {
            return Ok(None);
        }
        match self.http.get_json(&format!("/api/customers/{customer_id}")).await {
            Ok(profile) => Ok(Some(profile)),
            Err(Error::Http(msg)) if msg.contains("404") => Ok(None),
            Err(e) => Err(e),
        }
    }
}

