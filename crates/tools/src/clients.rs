//! Back-office API collaborators.
//!
//! Each trait names the seam one retail system sits behind (orders,
//! shipment tracking, payments, knowledge search). The HTTP
//! implementations share one JSON client with retry + exponential
//! backoff on transient (5xx / timeout) failures — 4xx responses are
//! permanent and never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use rv_domain::config::BackofficeEndpoint;
use rv_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collaborator traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait OmsApi: Send + Sync {
    /// Orders for a customer phone number.
    async fn orders_by_phone(&self, phone: &str) -> Result<Value>;
    /// One order by its number.
    async fn order_by_number(&self, order_no: &str) -> Result<Value>;
    /// Start a refund. Side-effecting — callers must not retry.
    async fn initiate_refund(&self, order_no: &str, reason: &str, amount: Option<f64>)
        -> Result<Value>;
}

#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// Track by AWB or order number.
    async fn track(&self, reference: &str) -> Result<Value>;
}

#[async_trait]
pub trait PaymentApi: Send + Sync {
    /// Create a payment link. Side-effecting — callers must not retry.
    async fn create_payment_link(&self, order_no: &str, amount: f64, purpose: &str)
        -> Result<Value>;
}

#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Value>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared HTTP client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-over-HTTP client for one back-office endpoint.
#[derive(Clone)]
pub struct BackofficeHttp {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl BackofficeHttp {
    pub fn new(cfg: &BackofficeEndpoint) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key: cfg.api_key.clone(),
            max_retries: cfg.max_retries,
        })
    }

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => rb.header("X-Api-Key", key),
            None => rb,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        self.execute_with_retry(path, || self.decorate(self.http.get(&url)))
            .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        self.execute_with_retry(path, || self.decorate(self.http.post(&url).json(body)))
            .await
    }

    /// Send with retry + exponential backoff on 5xx and timeouts. 4xx
    /// responses are permanent.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Value> {
        let mut last_err = Error::Http(format!("{endpoint}: no attempt made"));

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            match build_request().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Error::Http(format!("{endpoint} returned {status}: {body}"));
                        continue;
                    }
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Http(format!("{endpoint} returned {status}: {body}")));
                    }
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| Error::Http(format!("{endpoint}: invalid JSON: {e}")));
                }
                Err(e) if e.is_timeout() => {
                    last_err = Error::Timeout(format!("{endpoint}: {e}"));
                }
                Err(e) => {
                    last_err = Error::Http(format!("{endpoint}: {e}"));
                }
            }
        }

        Err(last_err)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpOmsClient {
    http: BackofficeHttp,
}

impl HttpOmsClient {
    pub fn new(cfg: &BackofficeEndpoint) -> Result<Self> {
        Ok(Self { http: BackofficeHttp::new(cfg)? })
    }
}

#[async_trait]
impl OmsApi for HttpOmsClient {
    async fn orders_by_phone(&self, phone: &str) -> Result<Value> {
        self.http
            .post_json("/api/orders/search", &serde_json::json!({ "phone": phone }))
            .await
    }

    async fn order_by_number(&self, order_no: &str) -> Result<Value> {
        self.http.get_json(&format!("/api/orders/{order_no}")).await
    }

    async fn initiate_refund(
        &self,
        order_no: &str,
        reason: &str,
        amount: Option<f64>,
    ) -> Result<Value> {
        self.http
            .post_json(
                &format!("/api/orders/{order_no}/refund"),
                &serde_json::json!({ "reason": reason, "amount": amount }),
            )
            .await
    }
}

pub struct HttpTrackingClient {
    http: BackofficeHttp,
}

impl HttpTrackingClient {
    pub fn new(cfg: &BackofficeEndpoint) -> Result<Self> {
        Ok(Self { http: BackofficeHttp::new(cfg)? })
    }
}

#[async_trait]
impl TrackingApi for HttpTrackingClient {
    async fn track(&self, reference: &str) -> Result<Value> {
        self.http.get_json(&format!("/api/track/{reference}")).await
    }
}

pub struct HttpPaymentClient {
    http: BackofficeHttp,
}

impl HttpPaymentClient {
    pub fn new(cfg: &BackofficeEndpoint) -> Result<Self> {
        Ok(Self { http: BackofficeHttp::new(cfg)? })
    }
}

#[async_trait]
impl PaymentApi for HttpPaymentClient {
    async fn create_payment_link(
        &self,
        order_no: &str,
        amount: f64,
        purpose: &str,
    ) -> Result<Value> {
        self.http
            .post_json(
                "/api/payment-links",
                &serde_json::json!({
                    "order_no": order_no,
                    "amount": amount,
                    "purpose": purpose,
                }),
            )
            .await
    }
}

pub struct HttpKnowledgeClient {
    http: BackofficeHttp,
}

impl HttpKnowledgeClient {
    pub fn new(cfg: &BackofficeEndpoint) -> Result<Self> {
        Ok(Self { http: BackofficeHttp::new(cfg)? })
    }
}

#[async_trait]
impl KnowledgeApi for HttpKnowledgeClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Value> {
        self.http
            .post_json(
                "/api/knowledge/search",
                &serde_json::json!({ "query": query, "limit": limit }),
            )
            .await
    }
}
