//! The retail tool set: definitions, handlers, and registration.
//!
//! Handlers are thin adapters from validated tool arguments onto the
//! back-office collaborator traits. Governance (rate limits, circuits,
//! caching) lives in the runtime, not here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use rv_domain::channel::Channel;
use rv_domain::tool::Dependency;
use rv_domain::{Error, Result};
use rv_stores::CacheStore;

use crate::clients::{KnowledgeApi, OmsApi, PaymentApi, TrackingApi};
use crate::definition::{ToolContext, ToolDefinition, ToolHandler};
use crate::registry::ToolRegistry;

/// Tools whose successful results can be rendered by the deterministic
/// template formatter, skipping the refinement LLM call.
pub const FAST_PATH_TOOLS: &[&str] = &["lookup_customer_orders", "track_shipment"];

/// TTL for the per-order index entries written on successful lookups.
const ORDER_INDEX_TTL: Duration = Duration::from_secs(180);

/// The collaborator bundle the retail tools are built over.
#[derive(Clone)]
pub struct RetailServices {
    pub oms: Arc<dyn OmsApi>,
    pub tracking: Arc<dyn TrackingApi>,
    pub payment: Arc<dyn PaymentApi>,
    pub knowledge: Arc<dyn KnowledgeApi>,
}

/// Register the full retail tool set.
pub fn register_retail_tools(
    registry: &mut ToolRegistry,
    services: &RetailServices,
    cache: Arc<CacheStore>,
) -> Result<()> {
    // ── lookup_customer_orders ───────────────────────────────────
    let mut def = ToolDefinition::new(
        "lookup_customer_orders",
        "Look up a customer's orders by phone number or a single order by its number.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone": { "type": "string", "description": "Customer phone (10 digits)" },
                "order_no": { "type": "string", "description": "Order number, e.g. Q2593VU" }
            },
            "additionalProperties": false
        }),
        Arc::new(LookupCustomerOrders {
            oms: services.oms.clone(),
            cache,
        }),
    );
    def.dependency = Some(Dependency::Oms);
    def.cacheable = true;
    def.cache_ttl = Some(Duration::from_secs(180));
    def.output_schema = Some(serde_json::json!({
        "type": "object",
        "properties": { "orders": { "type": "array" } },
        "required": ["orders"]
    }));
    registry.register(def)?;

    // ── track_shipment ───────────────────────────────────────────
    let mut def = ToolDefinition::new(
        "track_shipment",
        "Track a shipment by AWB number or order number.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "awb": { "type": "string", "description": "Air waybill number" },
                "order_no": { "type": "string", "description": "Order number" }
            },
            "additionalProperties": false
        }),
        Arc::new(TrackShipment { tracking: services.tracking.clone() }),
    );
    def.dependency = Some(Dependency::Tracking);
    def.cacheable = true;
    def.cache_ttl = Some(Duration::from_secs(120));
    registry.register(def)?;

    // ── initiate_refund ──────────────────────────────────────────
    let mut def = ToolDefinition::new(
        "initiate_refund",
        "Start a refund for an order. Requires an explicit reason.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "order_no": { "type": "string" },
                "reason": {
                    "type": "string",
                    "enum": ["damaged", "late", "wrong_item", "not_as_described", "customer_request"]
                },
                "amount": { "type": "number", "description": "Partial refund amount; omit for full" }
            },
            "required": ["order_no", "reason"],
            "additionalProperties": false
        }),
        Arc::new(InitiateRefund { oms: services.oms.clone() }),
    );
    def.dependency = Some(Dependency::Oms);
    def.retryable = false;
    def.rate_limit_per_minute = 10;
    registry.register(def)?;

    // ── generate_payment_link ────────────────────────────────────
    let mut def = ToolDefinition::new(
        "generate_payment_link",
        "Generate a payment link for an order balance or exchange difference.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "order_no": { "type": "string" },
                "amount": { "type": "number" },
                "purpose": { "type": "string" }
            },
            "required": ["order_no", "amount"],
            "additionalProperties": false
        }),
        Arc::new(GeneratePaymentLink { payment: services.payment.clone() }),
    );
    def.dependency = Some(Dependency::Payment);
    def.retryable = false;
    def.rate_limit_per_minute = 10;
    registry.register(def)?;

    // ── handoff_to_human ─────────────────────────────────────────
    let def = ToolDefinition::new(
        "handoff_to_human",
        "Hand the conversation to a human agent. Use when the customer asks for a person or the situation needs judgment.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string" },
                "summary": { "type": "string", "description": "One-paragraph context for the agent" }
            },
            "additionalProperties": false
        }),
        Arc::new(HandoffToHuman),
    );
    registry.register(def)?;

    // ── create_ar_session ────────────────────────────────────────
    let mut def = ToolDefinition::new(
        "create_ar_session",
        "Create an AR try-on session for a product (web chat only).",
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string" }
            },
            "required": ["product_id"],
            "additionalProperties": false
        }),
        Arc::new(CreateArSession),
    );
    def.allowed_channels = vec![Channel::Web];
    def.feature_flag = Some("ar_sessions".into());
    registry.register(def)?;

    // ── search_knowledge_base ────────────────────────────────────
    let mut def = ToolDefinition::new(
        "search_knowledge_base",
        "Search product and policy knowledge for grounding an answer.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 10 }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
        Arc::new(SearchKnowledgeBase { knowledge: services.knowledge.clone() }),
    );
    def.dependency = Some(Dependency::Search);
    def.cacheable = true;
    def.cache_ttl = Some(Duration::from_secs(300));
    registry.register(def)?;

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct LookupCustomerOrders {
    oms: Arc<dyn OmsApi>,
    cache: Arc<CacheStore>,
}

#[async_trait]
impl ToolHandler for LookupCustomerOrders {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let phone = args.get("phone").and_then(Value::as_str);
        let order_no = args.get("order_no").and_then(Value::as_str);

        let orders = match (order_no, phone) {
            (Some(order_no), _) => {
                let order = self.oms.order_by_number(order_no).await?;
                vec![order]
            }
            (None, Some(phone)) => {
                let result = self.oms.orders_by_phone(phone).await?;
                match result.get("orders").and_then(Value::as_array) {
                    Some(list) => list.clone(),
                    None => vec![result],
                }
            }
            (None, None) => {
                return Err(Error::InvalidInput(
                    "either phone or order_no is required".into(),
                ));
            }
        };

        // Index each order so prefetch and follow-up turns can read it
        // without another OMS round-trip.
        for order in &orders {
            if let Some(no) = order_number_of(order) {
                let mut indexed = order.clone();
                if let (Some(obj), Some(phone)) = (indexed.as_object_mut(), phone) {
                    obj.insert("_source_phone".into(), Value::String(phone.to_owned()));
                }
                self.cache
                    .set(&order_index_key(&no), &indexed, Some(ORDER_INDEX_TTL), true)
                    .await;
            }
        }

        Ok(serde_json::json!({ "orders": orders }))
    }
}

/// Cache subkey for one order's indexed record.
pub fn order_index_key(order_no: &str) -> String {
    format!("order:no:{}", order_no.to_uppercase())
}

fn order_number_of(order: &Value) -> Option<String> {
    order
        .get("order_no")
        .or_else(|| order.get("orderNo"))
        .or_else(|| order.get("order_number"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

struct TrackShipment {
    tracking: Arc<dyn TrackingApi>,
}

#[async_trait]
impl ToolHandler for TrackShipment {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let reference = args
            .get("awb")
            .or_else(|| args.get("order_no"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("either awb or order_no is required".into()))?;
        self.tracking.track(reference).await
    }
}

struct InitiateRefund {
    oms: Arc<dyn OmsApi>,
}

#[async_trait]
impl ToolHandler for InitiateRefund {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let order_no = args
            .get("order_no")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("order_no is required".into()))?;
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("reason is required".into()))?;
        let amount = args.get("amount").and_then(Value::as_f64);
        self.oms.initiate_refund(order_no, reason, amount).await
    }
}

struct GeneratePaymentLink {
    payment: Arc<dyn PaymentApi>,
}

#[async_trait]
impl ToolHandler for GeneratePaymentLink {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let order_no = args
            .get("order_no")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("order_no is required".into()))?;
        let amount = args
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::InvalidInput("amount is required".into()))?;
        let purpose = args
            .get("purpose")
            .and_then(Value::as_str)
            .unwrap_or("order balance");
        self.payment.create_payment_link(order_no, amount, purpose).await
    }
}

/// The handoff tool does no I/O itself: it returns an acknowledgment
/// the orchestrator reacts to by escalating the conversation.
struct HandoffToHuman;

#[async_trait]
impl ToolHandler for HandoffToHuman {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::json!({
            "handoff": true,
            "reason": args.get("reason").and_then(Value::as_str).unwrap_or("agent_requested"),
            "summary": args.get("summary").and_then(Value::as_str).unwrap_or(""),
        }))
    }
}

struct CreateArSession;

#[async_trait]
impl ToolHandler for CreateArSession {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let product_id = args
            .get("product_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("product_id is required".into()))?;
        let session_id = uuid::Uuid::new_v4();
        Ok(serde_json::json!({
            "session_id": session_id,
            "product_id": product_id,
            "session_url": format!("https://ar.resolvr.app/s/{session_id}"),
        }))
    }
}

struct SearchKnowledgeBase {
    knowledge: Arc<dyn KnowledgeApi>,
}

#[async_trait]
impl ToolHandler for SearchKnowledgeBase {
    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("query is required".into()))?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as u32;
        self.knowledge.search(query, limit).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use rv_stores::InMemoryKv;

    pub(crate) struct FakeOms;

    #[async_trait]
    impl OmsApi for FakeOms {
        async fn orders_by_phone(&self, phone: &str) -> Result<Value> {
            Ok(serde_json::json!({
                "orders": [
                    { "order_no": "Q2593VU", "status": "shipped", "phone": phone }
                ]
            }))
        }

        async fn order_by_number(&self, order_no: &str) -> Result<Value> {
            Ok(serde_json::json!({ "order_no": order_no, "status": "shipped" }))
        }

        async fn initiate_refund(
            &self,
            order_no: &str,
            reason: &str,
            _amount: Option<f64>,
        ) -> Result<Value> {
            Ok(serde_json::json!({ "refund_id": "rf_1", "order_no": order_no, "reason": reason }))
        }
    }

    struct FakeTracking;

    #[async_trait]
    impl TrackingApi for FakeTracking {
        async fn track(&self, reference: &str) -> Result<Value> {
            Ok(serde_json::json!({ "reference": reference, "status": "in_transit" }))
        }
    }

    struct FakePayment;

    #[async_trait]
    impl PaymentApi for FakePayment {
        async fn create_payment_link(
            &self,
            order_no: &str,
            amount: f64,
            _purpose: &str,
        ) -> Result<Value> {
            Ok(serde_json::json!({ "url": format!("https://pay.test/{order_no}"), "amount": amount }))
        }
    }

    struct FakeKnowledge;

    #[async_trait]
    impl KnowledgeApi for FakeKnowledge {
        async fn search(&self, query: &str, _limit: u32) -> Result<Value> {
            Ok(serde_json::json!({ "results": [ { "title": query } ] }))
        }
    }

    fn services() -> RetailServices {
        RetailServices {
            oms: Arc::new(FakeOms),
            tracking: Arc::new(FakeTracking),
            payment: Arc::new(FakePayment),
            knowledge: Arc::new(FakeKnowledge),
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::for_conversation("default", Channel::Web, "c1", "r1")
    }

    #[test]
    fn all_tools_register() {
        let mut registry = ToolRegistry::new();
        let cache = Arc::new(CacheStore::new(Arc::new(InMemoryKv::new(100))));
        register_retail_tools(&mut registry, &services(), cache).unwrap();
        assert_eq!(registry.len(), 7);
        for name in FAST_PATH_TOOLS {
            assert!(registry.get(name).is_some(), "{name} must be registered");
        }
    }

    #[tokio::test]
    async fn lookup_indexes_each_order() {
        let cache = Arc::new(CacheStore::new(Arc::new(InMemoryKv::new(100))));
        let handler = LookupCustomerOrders {
            oms: Arc::new(FakeOms),
            cache: cache.clone(),
        };
        let out = handler
            .call(serde_json::json!({ "phone": "9876543210" }), &ctx())
            .await
            .unwrap();
        assert_eq!(out["orders"][0]["order_no"], "Q2593VU");

        let indexed: Option<Value> = cache.get(&order_index_key("Q2593VU")).await;
        let indexed = indexed.unwrap();
        assert_eq!(indexed["_source_phone"], "9876543210");
    }

    #[tokio::test]
    async fn lookup_by_order_number_wraps_single_order() {
        let cache = Arc::new(CacheStore::new(Arc::new(InMemoryKv::new(100))));
        let handler = LookupCustomerOrders { oms: Arc::new(FakeOms), cache };
        let out = handler
            .call(serde_json::json!({ "order_no": "Q1000AB" }), &ctx())
            .await
            .unwrap();
        assert_eq!(out["orders"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookup_requires_a_key() {
        let cache = Arc::new(CacheStore::new(Arc::new(InMemoryKv::new(100))));
        let handler = LookupCustomerOrders { oms: Arc::new(FakeOms), cache };
        let err = handler.call(serde_json::json!({}), &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("phone or order_no"));
    }

    #[tokio::test]
    async fn handoff_echoes_reason() {
        let out = HandoffToHuman
            .call(serde_json::json!({ "reason": "customer asked" }), &ctx())
            .await
            .unwrap();
        assert_eq!(out["handoff"], true);
        assert_eq!(out["reason"], "customer asked");
    }

    #[tokio::test]
    async fn ar_session_returns_url() {
        let out = CreateArSession
            .call(serde_json::json!({ "product_id": "sku-9" }), &ctx())
            .await
            .unwrap();
        assert!(out["session_url"].as_str().unwrap().starts_with("https://"));
    }
}
