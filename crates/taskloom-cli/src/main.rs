mod config;
mod config_watcher;

use clap::{Parser, Subcommand, ValueEnum};
use config::TaskloomConfig;
use config_watcher::ConfigWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use taskloom_core::EventBus;
use taskloom_gateway::{AppState, GatewayServer, HttpTrainingClient};
use taskloom_llm::ProviderGateway;
use taskloom_orchestrator::{
    Agent, AgentCoordinator, AgentRole, Assistant, ExecutionMode, FileTaskStore,
    InMemoryTaskStore, Scheduler, TaskManager, TaskSpec, TaskStore,
};
use taskloom_retrieval::{RetrievalFusion, SearchSource, WebEngine};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskloom", about = "taskloom: scheduled multi-agent tasks over LLM providers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskloom.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server and the scheduler
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Reload provider settings when the config file changes
        #[arg(long)]
        watch: bool,
    },
    /// Send one message to a provider
    Chat {
        message: String,
        /// Provider id (defaults to the configured default)
        #[arg(long)]
        provider: Option<String>,
        /// Ground the reply in search results (web, knowledge or both)
        #[arg(long)]
        search: Option<SearchSource>,
        #[arg(long, default_value = "serper")]
        engine: WebEngine,
    },
    /// Run a retrieval query
    Search {
        query: String,
        #[arg(long, default_value = "web")]
        source: SearchSource,
        #[arg(long, default_value = "serper")]
        engine: WebEngine,
    },
    /// Run a one-off task in the foreground and print its result
    Run {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// single or collaborative
        #[arg(long, default_value = "single")]
        mode: ExecutionMode,
        /// Agent as role:provider[:model], repeatable
        #[arg(long = "agent")]
        agents: Vec<String>,
    },
    /// List configured providers
    Providers,
}

/// Services shared by every command.
struct Services {
    gateway: Arc<ProviderGateway>,
    fusion: Arc<RetrievalFusion>,
    http: reqwest::Client,
}

impl Services {
    fn build(config: &TaskloomConfig) -> anyhow::Result<Self> {
        let settings = config.provider_settings()?;
        let gateway = Arc::new(
            ProviderGateway::new(settings).with_default_timeout(config.runtime.request_timeout()),
        );
        let http = reqwest::Client::builder()
            .timeout(config.runtime.request_timeout())
            .build()?;
        let fusion = Arc::new(RetrievalFusion::from_settings(&config.search, http.clone()));
        Ok(Self {
            gateway,
            fusion,
            http,
        })
    }

    fn manager(&self, config: &TaskloomConfig, store: Arc<dyn TaskStore>) -> Arc<TaskManager> {
        let mut coordinator = AgentCoordinator::new(self.gateway.clone())
            .with_retry_policy(config.runtime.retry.clone())
            .with_timeout(config.runtime.request_timeout());
        if let Some(enrichment) = config.runtime.enrichment() {
            info!(source = %enrichment.source, engine = %enrichment.engine, "Task enrichment enabled");
            coordinator = coordinator.with_enrichment(self.fusion.clone(), enrichment);
        }
        TaskManager::new(store, Arc::new(coordinator), EventBus::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }

    let config = TaskloomConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port, watch } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(&cli.config, &config, host, port, watch).await?;
        }
        Commands::Chat {
            message,
            provider,
            search,
            engine,
        } => {
            let services = Services::build(&config)?;
            let assistant = Assistant::new(services.gateway).with_fusion(services.fusion);
            let reply = assistant
                .chat(&message, provider.as_deref(), search.map(|s| (s, engine)))
                .await?;
            println!("{}", reply.content);
            if let Some(sources) = reply.sources.filter(|s| !s.is_empty()) {
                println!("\nSources:");
                for source in sources {
                    println!("  {source}");
                }
            }
        }
        Commands::Search {
            query,
            source,
            engine,
        } => {
            let services = Services::build(&config)?;
            let results = services.fusion.search(&query, source, engine).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, result) in results.iter().enumerate() {
                println!("{}. [{}] {}", i + 1, result.source, result.title);
                println!("   {}", result.url);
                if !result.snippet.is_empty() {
                    println!("   {}", result.snippet);
                }
            }
        }
        Commands::Run {
            title,
            description,
            mode,
            agents,
        } => {
            let mut spec = TaskSpec::new(title, description).with_mode(mode);
            for agent in &agents {
                spec = spec.with_agent(parse_agent(agent)?);
            }

            let services = Services::build(&config)?;
            let manager = services.manager(&config, Arc::new(InMemoryTaskStore::new()));
            let (task, handle) = manager.submit(spec).await?;
            let task = match handle {
                Some(handle) => handle.wait().await?,
                None => task,
            };
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Commands::Providers => {
            let settings = config.provider_settings()?;
            println!("Providers (default: {}):", settings.default_provider);
            for provider in &settings.providers {
                let kind = provider
                    .resolved_kind()
                    .map(|k| k.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                let state = if provider.enabled { "enabled" } else { "disabled" };
                let key = if provider.api_key().is_some() { "key set" } else { "no key" };
                println!(
                    "  {:<12} {:<10} {:<9} {:<8} {}",
                    provider.id, kind, state, key, provider.model
                );
            }
        }
    }

    Ok(())
}

async fn serve(
    config_path: &std::path::Path,
    config: &TaskloomConfig,
    host: String,
    port: u16,
    watch_config: bool,
) -> anyhow::Result<()> {
    info!("Starting taskloom on {host}:{port}");

    let services = Services::build(config)?;
    let store = Arc::new(FileTaskStore::new(config.data_dir.join("tasks")).await?);
    let manager = services.manager(config, store);
    let restored = manager.load().await?;
    info!(tasks = restored, "Task registry loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(manager.clone())
        .with_tick(config.runtime.scheduler_tick())
        .start(shutdown_rx);

    let _watcher = if watch_config {
        let gateway = services.gateway.clone();
        Some(ConfigWatcher::start(config_path.to_path_buf(), 500, move |settings| {
            if let Err(e) = gateway.replace_settings(settings) {
                tracing::warn!(error = %e, "Rejected reloaded provider settings");
            }
        })?)
    } else {
        None
    };

    let mut state = AppState::new(manager, services.gateway.clone(), services.fusion.clone());
    if let Some(endpoint) = &config.training.endpoint {
        info!(endpoint = %endpoint, "Training service configured");
        state = state.with_training(Arc::new(HttpTrainingClient::new(
            endpoint.clone(),
            services.http.clone(),
        )));
    }
    let app = GatewayServer::build(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("taskloom listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// `role:provider[:model]`.
fn parse_agent(value: &str) -> anyhow::Result<Agent> {
    let mut parts = value.splitn(3, ':');
    let role = parts.next().unwrap_or_default();
    let provider = parts
        .next()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("agent '{value}' must be role:provider[:model]"))?;
    let mut agent = Agent::new(role.parse::<AgentRole>()?, provider.trim());
    if let Some(model) = parts.next().filter(|m| !m.trim().is_empty()) {
        agent = agent.with_model(model.trim());
    }
    Ok(agent)
}
