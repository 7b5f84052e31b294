//! The proactive checker: inspect known orders and shipments before the
//! LLM runs, so the agent opens with the problem instead of discovering
//! it mid-conversation.

use std::sync::Arc;

use serde_json::Value;

use rv_domain::conversation::StructuredMemory;
use rv_domain::voc::{EntityType, VocAnalysis};
use rv_stores::CacheStore;
use rv_tools::{order_index_key, ToolContext, ToolRuntime};

/// Order statuses worth surfacing before the customer asks.
const ISSUE_STATUSES: &[(&str, &str)] = &[
    ("delayed", "is running late"),
    ("rto", "is being returned to origin"),
    ("payment_failed", "has a failed payment"),
    ("return_in_progress", "has a return in progress"),
    ("cancelled", "was cancelled"),
    ("stuck", "appears stuck in transit"),
];

/// How many references we inspect per message.
const MAX_CHECKS: usize = 2;

pub struct ProactiveChecker {
    tools: Arc<ToolRuntime>,
    cache: Arc<CacheStore>,
}

impl ProactiveChecker {
    pub fn new(tools: Arc<ToolRuntime>, cache: Arc<CacheStore>) -> Self {
        Self { tools, cache }
    }

    /// Look up the message's order references and report known issues
    /// as a context block, or `None` when everything looks fine.
    pub async fn check(
        &self,
        analysis: &VocAnalysis,
        memory: &StructuredMemory,
        ctx: &ToolContext,
    ) -> Option<String> {
        let mut order_numbers: Vec<String> = analysis
            .entities_of(EntityType::OrderNumber)
            .map(|e| e.value.clone())
            .collect();
        for no in &memory.order_numbers {
            if !order_numbers.contains(no) {
                order_numbers.push(no.clone());
            }
        }
        order_numbers.truncate(MAX_CHECKS);

        let mut findings = Vec::new();
        for order_no in &order_numbers {
            // A recently-indexed order record saves the OMS round-trip.
            if let Some(order) = self.cache.get::<Value>(&order_index_key(order_no)).await {
                if let Some(finding) = issue_for(&order) {
                    findings.push(finding);
                }
                continue;
            }

            let result = self
                .tools
                .execute(
                    "lookup_customer_orders",
                    serde_json::json!({ "order_no": order_no }),
                    ctx,
                )
                .await;
            let Some(data) = result.data() else {
                continue;
            };
            let Some(orders) = data.get("orders").and_then(Value::as_array) else {
                continue;
            };
            for order in orders {
                if let Some(finding) = issue_for(order) {
                    findings.push(finding);
                }
            }
        }

        if findings.is_empty() {
            None
        } else {
            Some(findings.join("\n"))
        }
    }
}

fn issue_for(order: &Value) -> Option<String> {
    let status = order.get("status").and_then(Value::as_str)?;
    let no = order
        .get("order_no")
        .and_then(Value::as_str)
        .unwrap_or("(unknown)");
    let (_, description) = ISSUE_STATUSES
        .iter()
        .find(|(s, _)| status.eq_ignore_ascii_case(s))?;
    Some(format!("Order {no} {description} (status: {status})."))
}
