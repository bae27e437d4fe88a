//! Entry point: loads configuration, wires the Agent, and serves the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use rosterguard_core::case_store::CaseStore;
use rosterguard_core::config::Config;
use rosterguard_core::http::{router, AppState};
use rosterguard_core::knowledge_base::KnowledgeBase;
use rosterguard_core::schema::StandardSchema;
use rosterguard_core::Agent;

#[derive(Parser, Debug)]
#[command(name = "rosterguard-server", about = "Roster validation agent server")]
struct Cli {
    #[arg(long, env = "ROSTERGUARD_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    #[arg(long, env = "ROSTERGUARD_CASE_STORE", default_value = "rosterguard_cases.db")]
    case_store_path: PathBuf,

    #[arg(long, env = "ROSTERGUARD_KNOWLEDGE_BASE", default_value = "rosterguard_knowledge.db")]
    knowledge_base_path: PathBuf,

    #[arg(long, env = "ROSTERGUARD_ENV", default_value = "development")]
    environment: String,

    #[arg(long, env = "ANTHROPIC_API_KEY")]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "ROSTERGUARD_MAX_ITERATIONS", default_value_t = 5)]
    max_iterations: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let cli = Cli::parse();

    let llm_enabled = cli.anthropic_api_key.is_some();
    let config = Config { max_iterations: cli.max_iterations, llm_enabled, ..Config::default() };

    let case_store = CaseStore::open(&cli.case_store_path)?;
    let knowledge_base = KnowledgeBase::open(&cli.knowledge_base_path)?;
    let schema = StandardSchema::default();

    let llm: Option<Arc<dyn rosterguard_core::llm::LlmClient>> = cli.anthropic_api_key.map(|key| {
        let client: Arc<dyn rosterguard_core::llm::LlmClient> =
            Arc::new(rosterguard_core::llm::AnthropicClient::new(rosterguard_core::llm::ClientConfig::new(key)));
        client
    });

    let agent = Agent::new(schema, case_store, llm, config).with_knowledge_base(Arc::new(knowledge_base));
    let state = Arc::new(AppState { agent, environment: cli.environment });

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(bind = %cli.bind, "rosterguard-server listening");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
