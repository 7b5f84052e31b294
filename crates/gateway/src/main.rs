use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use rv_agent::{AgentCore, OpenAiCompatProvider};
use rv_domain::config::{Config, ConfigSeverity};
use rv_stores::{
    open_backend, AuditChain, CacheStore, ConversationStore, CustomerSessionIndex, PiiVault,
};
use rv_tools::clients::{
    HttpKnowledgeClient, HttpOmsClient, HttpPaymentClient, HttpTrackingClient,
};
use rv_tools::{register_retail_tools, DependencyHealth, RetailServices, ToolRegistry, ToolRuntime};
use rv_voc::VocProcessor;

use rv_gateway::api;
use rv_gateway::collaborators::{HttpCustomerDirectory, HttpTicketing, WebhookOutbound};
use rv_gateway::metrics::Metrics;
use rv_gateway::runtime::cancel::CancelMap;
use rv_gateway::runtime::conversation_lock::ConversationLockMap;
use rv_gateway::runtime::experiment::ExperimentEngine;
use rv_gateway::runtime::learning::{LearningCollector, VocLog};
use rv_gateway::runtime::linker::CustomerLinker;
use rv_gateway::runtime::proactive::ProactiveChecker;
use rv_gateway::runtime::skills::SkillRouter;
use rv_gateway::runtime::sla::SlaEngine;
use rv_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "resolvr", about = "Multi-tenant conversational support gateway")]
struct Cli {
    /// Path to the TOML config file (or RESOLVR_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Config inspection.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate the config file and report issues.
    Validate,
    /// Print the effective config with secret fields masked.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let issues = config.validate();
            for issue in &issues {
                match issue.severity {
                    ConfigSeverity::Warning => println!("warning: {issue}"),
                    ConfigSeverity::Error => println!("error: {issue}"),
                }
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("config OK");
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        }
        Some(Command::Version) => {
            println!("resolvr {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let path = path
        .map(PathBuf::from)
        .or_else(|| std::env::var("RESOLVR_CONFIG").ok().map(PathBuf::from));
    match path {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path.display())),
        None => {
            let mut config = Config::default();
            config.apply_env();
            Ok(config)
        }
    }
}

/// Structured JSON tracing for the serve command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rv_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Resolvr starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    // No durable transport is wired in this binary yet; the factory
    // falls back to the bounded in-memory backend.
    let backend = open_backend(None, &config.storage);
    let conversations = Arc::new(ConversationStore::new(
        backend.clone(),
        Duration::from_secs(config.storage.conversation_ttl_secs),
    ));
    let cache = Arc::new(CacheStore::new(backend.clone()));
    let vault = Arc::new(PiiVault::new(
        backend.clone(),
        config.pii.key_material.as_deref(),
    ));
    let audit = Arc::new(AuditChain::new());
    let customer_index = Arc::new(CustomerSessionIndex::new(backend.clone()));
    tracing::info!(max_entries = config.storage.max_entries, "stores ready");

    // ── VOC pre-processor ────────────────────────────────────────────
    let voc = Arc::new(VocProcessor::new(&config));
    tracing::info!(tenants = config.tenants.len(), "voc processor ready");

    // ── Tool runtime ─────────────────────────────────────────────────
    let services = RetailServices {
        oms: Arc::new(HttpOmsClient::new(&config.tools.oms)?),
        tracking: Arc::new(HttpTrackingClient::new(&config.tools.tracking)?),
        payment: Arc::new(HttpPaymentClient::new(&config.tools.payment)?),
        knowledge: Arc::new(HttpKnowledgeClient::new(&config.tools.knowledge)?),
    };
    let mut registry = ToolRegistry::new();
    register_retail_tools(&mut registry, &services, cache.clone())
        .context("registering retail tools")?;
    let health = Arc::new(DependencyHealth::new(
        config.tools.circuit_failure_threshold,
        Duration::from_millis(config.tools.circuit_reset_ms),
    ));
    let tools = Arc::new(ToolRuntime::new(
        registry,
        cache.clone(),
        audit.clone(),
        health,
        config.tools.feature_flags.clone(),
        Duration::from_secs(config.tools.execution_timeout_secs),
    ));
    tracing::info!(tools = tools.registry().len(), "tool runtime ready");

    // ── Agent core ───────────────────────────────────────────────────
    let provider = Arc::new(
        OpenAiCompatProvider::from_config(&config.llm).context("initializing LLM provider")?,
    );
    let agent = Arc::new(AgentCore::new(
        provider,
        &config.llm.prompt_version,
        tools.registry().prompt_catalog(),
    ));
    tracing::info!(model = %config.llm.model, "agent core ready");

    // ── Collaborators ────────────────────────────────────────────────
    let outbound = Arc::new(WebhookOutbound::new(config.channels.clone())?);
    let ticketing = Arc::new(HttpTicketing::new(&config.ticketing)?);
    let customers = Arc::new(HttpCustomerDirectory::new(&config.customers)?);

    // ── Runtime services ─────────────────────────────────────────────
    let linker = Arc::new(CustomerLinker::new(
        customers.clone(),
        customer_index.clone(),
        conversations.clone(),
    ));
    let proactive = Arc::new(ProactiveChecker::new(tools.clone(), cache.clone()));
    let sla = Arc::new(SlaEngine::new(backend.clone(), config.sla.clone()));
    let experiments = Arc::new(ExperimentEngine::new(&config.experiments));
    let skills = Arc::new(SkillRouter::new(config.skill_routing.clone()));
    let locks = Arc::new(ConversationLockMap::new());
    let cancel = Arc::new(CancelMap::new());
    let learning = Arc::new(LearningCollector::start(backend.clone()));
    let voc_log = Arc::new(VocLog::start(backend.clone()));
    let metrics = Arc::new(Metrics::new());

    let admin_key_hash = config
        .admin
        .api_key
        .as_deref()
        .map(|key| Sha256::digest(key.as_bytes()).to_vec());

    let state = AppState {
        config: config.clone(),
        backend,
        conversations,
        cache,
        vault: vault.clone(),
        audit,
        customer_index,
        voc,
        tools: tools.clone(),
        agent,
        outbound,
        ticketing,
        customers,
        linker,
        proactive,
        sla,
        experiments,
        skills,
        locks: locks.clone(),
        cancel,
        learning,
        voc_log,
        metrics,
        admin_key_hash,
    };

    // ── Housekeeping: eviction, lock pruning, vault sweep ────────────
    {
        let interval = Duration::from_secs(config.storage.eviction_interval_secs.max(1));
        let backend = state.backend.clone();
        let vault = vault.clone();
        let locks = locks.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = backend.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "expired entries evicted");
                }
                vault.purge_expired().await;
                locks.prune_idle();
            }
        });
    }

    // ── Serve ────────────────────────────────────────────────────────
    let router = api::router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Resolvr listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
