use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_core::config::{AppConfig, ApprovalMode, ModelConfig};
use switchyard_core::event::EventBus;
use switchyard_core::types::{ApprovalRequest, RunId, WorkflowEvent};

use switchyard_agent::approval::{gate_from_config, ApprovalDecision, ApprovalGate};
use switchyard_agent::{catalog, OrchestratorBuilder, RunLogger};
use switchyard_guard::{GuardrailKind, GuardrailPipeline};
use switchyard_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Guarded multi-agent workflow runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Log filter for switchyard crates (e.g. debug); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bundled workflow on one input and print the outcome
    Run {
        /// Workflow name (see `switchyard workflows`)
        workflow: String,
        /// Input text; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
        /// Approval mode: auto, deny, prompt, policy
        #[arg(long)]
        approve: Option<ApprovalMode>,
    },
    /// Run only the guardrail pipeline over some text
    Guard {
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// List bundled workflows
    Workflows,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = format!("switchyard={},warn", cli.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Workflows => {
            for entry in catalog::entries() {
                println!("{:<16} {}", entry.name, entry.description);
            }
        }
        Commands::Config => {
            let config = load_config(&cli.config)?;
            println!("{}", toml::to_string_pretty(&masked(&config))?);
        }
        Commands::Guard { input } => {
            let config = load_config(&cli.config)?;
            let text = input_text(input);
            let llm = switchyard_llm::build_client(&config)?;
            let pipeline = GuardrailPipeline::from_config(&config, llm)?;
            let enabled = if config.guardrails.enabled.is_empty() {
                pipeline.kinds()
            } else {
                GuardrailKind::parse_list(&config.guardrails.enabled)?
            };
            let outcome = pipeline.evaluate(&text, &enabled).await;
            let out = serde_json::json!({
                "tripwire_triggered": outcome.tripwire_triggered,
                "safe_text": outcome.safe_text,
                "report": outcome.report,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Run {
            workflow,
            input,
            approve,
        } => {
            let config = load_config(&cli.config)?;
            let text = input_text(input);
            run_workflow(config, &workflow, &text, approve).await?;
        }
    }

    Ok(())
}

async fn run_workflow(
    mut config: AppConfig,
    name: &str,
    text: &str,
    approve: Option<ApprovalMode>,
) -> anyhow::Result<()> {
    let mut workflow = catalog::build(name)?;
    if !config.guardrails.enabled.is_empty() {
        workflow = workflow.with_guardrails(&GuardrailKind::parse_list(&config.guardrails.enabled)?);
    }
    if let Some(mode) = approve {
        config.approval.mode = mode;
    }

    let event_bus = Arc::new(EventBus::default());
    let approval: Arc<dyn ApprovalGate> = match config.approval.mode {
        ApprovalMode::Prompt => Arc::new(PromptApproval {
            timeout: Duration::from_secs(config.approval.timeout_secs),
        }),
        _ => gate_from_config(&config.approval)?,
    };

    let mut tools = ToolRegistry::new();
    catalog::register_tools(&mut tools);

    let llm = switchyard_llm::build_client(&config)?;
    let log_dir = config.log_dir();
    let log_level = config.log.as_ref().map_or(2, |l| l.level);

    let orchestrator = OrchestratorBuilder::new(config, llm)
        .tools(Arc::new(tools))
        .event_bus(event_bus.clone())
        .approval(approval)
        .build()?;

    let run_id = RunId::new();
    let cancel = CancellationToken::new();
    let logger = log_dir.map(|dir| {
        let logger = RunLogger::new(dir, log_level);
        info!(path = %logger.log_path(&run_id).display(), "Writing run log");
        tokio::spawn(logger.run(event_bus.subscribe(), run_id.clone(), cancel.clone()))
    });
    let progress = tokio::spawn(print_progress(event_bus.subscribe()));

    let record = orchestrator.run_detailed(&workflow, text, run_id).await;

    cancel.cancel();
    if let Some(handle) = logger {
        handle.await.ok();
    }
    progress.abort();

    println!("{}", serde_json::to_string_pretty(&record.outcome)?);
    Ok(())
}

/// Node and tool activity on stderr.
async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<WorkflowEvent>) {
    while let Ok(event) = rx.recv().await {
        match event {
            WorkflowEvent::RouteSelected {
                classification,
                branch,
                ..
            } => {
                eprintln!(
                    "[route] {} -> {}",
                    classification.as_deref().unwrap_or("-"),
                    branch
                );
            }
            WorkflowEvent::NodeStarted { node, .. } => eprintln!("[{}] running", node),
            WorkflowEvent::ToolEnd { name, result, .. } => {
                let status = if result.is_error { "ERROR" } else { "ok" };
                eprintln!("[{}: {}] {}", name, status, truncate(&result.content, 200));
            }
            WorkflowEvent::RunFinished { .. } => break,
            _ => {}
        }
    }
}

/// Asks on the terminal; no answer within `timeout` defers.
struct PromptApproval {
    timeout: Duration,
}

impl ApprovalGate for PromptApproval {
    fn request_approval<'a>(
        &'a self,
        request: &'a ApprovalRequest,
    ) -> BoxFuture<'a, switchyard_core::Result<ApprovalDecision>> {
        let message = request.message.clone();
        Box::pin(async move {
            eprintln!("\n[APPROVAL] {}", message);
            let prompt = tokio::task::spawn_blocking(|| {
                dialoguer::Confirm::new()
                    .with_prompt("Approve?")
                    .default(true)
                    .interact_opt()
            });

            Ok(match tokio::time::timeout(self.timeout, prompt).await {
                Ok(Ok(Ok(Some(true)))) => ApprovalDecision::Approved,
                Ok(Ok(Ok(Some(false)))) => ApprovalDecision::Denied,
                // Timeout, escape, no terminal, or a panicked prompt
                _ => ApprovalDecision::Deferred,
            })
        })
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        let config = AppConfig::load(path)?;
        info!(path = %path.display(), "Loaded config");
        return Ok(config);
    }
    warn!(path = %path.display(), "Config file not found, using environment defaults");
    Ok(create_env_config())
}

/// OpenAI when `OPENAI_API_KEY` is set, otherwise a local Ollama.
fn create_env_config() -> AppConfig {
    let model = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            let mut model = ModelConfig::new("gpt-4.1-mini");
            model.api_key = Some(key);
            model
        }
        Err(_) => {
            let mut model = ModelConfig::new("llama3.2");
            model.provider = "ollama".into();
            model.base_url = Some("http://localhost:11434/v1/chat/completions".into());
            model
        }
    };
    AppConfig::with_model(model)
}

fn masked(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    let models = std::iter::once(&mut config.model)
        .chain(config.fallback_models.iter_mut())
        .chain(config.models.values_mut());
    for model in models {
        if model.api_key.is_some() {
            model.api_key = Some("***".into());
        }
    }
    config
}

fn input_text(words: Vec<String>) -> String {
    let text = words.join(" ");
    if !text.is_empty() {
        return text;
    }
    io::stdin()
        .lock()
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
