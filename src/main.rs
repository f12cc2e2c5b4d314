use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use taskforge::console::{self, ConsolePresenter};
use taskforge::constants::{DEFAULT_PORT, DEFAULT_STAGE_DELAY_MS, DEFAULT_STATIC_DIR, DEFAULT_TEMPLATES_DIR};
use taskforge::script::{run_script, ScriptMode, ScriptOptions};
use taskforge::session::SessionStore;
use taskforge::web_server::{self, WebConfig};
use taskforge::{build_client, prompts, CompletionClient, LlmSettings, PromptChain, PromptTemplate, Provider, Workflow};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    llm: LlmArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct LlmArgs {
    #[arg(long, value_enum, global = true, default_value_t = Provider::Openai, help = "Completion provider.")]
    provider: Provider,
    #[arg(long, global = true, help = "Model name (defaults to TASKFORGE_MODEL or OLLAMA_MODEL).")]
    model: Option<String>,
    #[arg(long, global = true, help = "Provider base URL (defaults to OPENAI_API_BASE or OLLAMA_URL).")]
    api_base: Option<String>,
    #[arg(long, global = true, help = "API key (defaults to OPENAI_API_KEY).")]
    api_key: Option<String>,
    #[arg(long, global = true, help = "Sampling temperature.")]
    temperature: Option<f32>,
}

impl LlmArgs {
    fn settings(&self) -> LlmSettings {
        let mut settings = LlmSettings::for_provider(self.provider);
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(api_base) = &self.api_base {
            settings.api_base = api_base.clone();
        }
        if self.api_key.is_some() {
            settings.api_key = self.api_key.clone();
        }
        settings.temperature = self.temperature;
        settings
    }
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the linear script: analysis, task definition, generated function.
    Run {
        #[arg(long, help = "Issue task definition and code generation as two chained calls.")]
        chain: bool,
        #[arg(long, help = "Read the analysis from a file instead of the built-in sample.")]
        analysis_file: Option<PathBuf>,
        #[arg(long, help = "Prompt template with {{ history }} and {{ input }} placeholders.")]
        template: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_STAGE_DELAY_MS, help = "Simulated latency of stages without a model call.")]
        delay_ms: u64,
    },
    /// Step through the gated wizard in the terminal.
    Wizard {
        #[arg(long, help = "Read the analysis from a file instead of the built-in sample.")]
        analysis_file: Option<PathBuf>,
        #[arg(long, help = "Prompt template with {{ history }} and {{ input }} placeholders.")]
        template: Option<PathBuf>,
        #[arg(long, short, help = "Proceed through every stage without asking.")]
        yes: bool,
    },
    /// Serve the wizard as a web UI.
    Serve {
        #[arg(long, env = "TASKFORGE_PORT", default_value_t = DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = DEFAULT_TEMPLATES_DIR)]
        templates_dir: PathBuf,
        #[arg(long, default_value = DEFAULT_STATIC_DIR)]
        static_dir: PathBuf,
        #[arg(long, help = "Read the analysis from a file instead of the built-in sample.")]
        analysis_file: Option<PathBuf>,
        #[arg(long, help = "Prompt template with {{ history }} and {{ input }} placeholders.")]
        template: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,taskforge=debug); stdout is left to the console output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Taskforge starting with command: {:?}", cli.command);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            console::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.llm.settings();
    let client = build_client(&settings);
    info!(provider = ?settings.provider, model = %settings.model, "Using completion provider");

    match cli.command {
        Commands::Run {
            chain,
            analysis_file,
            template,
            delay_ms,
        } => {
            let analysis = load_analysis(analysis_file.as_deref())?;
            let template = load_template(template.as_deref(), prompts::TASK_AND_FUNCTION_TEMPLATE)?;
            let options = ScriptOptions {
                mode: if chain { ScriptMode::Chained } else { ScriptMode::SingleShot },
                delay: Duration::from_millis(delay_ms),
            };
            let mut chain = PromptChain::new(client, template);
            run_script(&mut chain, &analysis, &options, &mut ConsolePresenter::stdout()).await?;
        }
        Commands::Wizard {
            analysis_file,
            template,
            yes,
        } => {
            let analysis = load_analysis(analysis_file.as_deref())?;
            let template = load_template(template.as_deref(), prompts::WIZARD_TEMPLATE)?;
            run_terminal_wizard(client, template, analysis, yes).await?;
        }
        Commands::Serve {
            port,
            templates_dir,
            static_dir,
            analysis_file,
            template,
        } => {
            let analysis = load_analysis(analysis_file.as_deref())?;
            let template = load_template(template.as_deref(), prompts::WIZARD_TEMPLATE)?;
            let sessions = SessionStore::new(client, template, analysis);
            let config = WebConfig {
                port,
                templates_dir,
                static_dir,
            };
            info!("Starting wizard web server on port {}...", port);

            tokio::select! {
                res = web_server::start_web_server(config, sessions) => res?,
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down."),
            }
        }
    }

    Ok(())
}

async fn run_terminal_wizard(
    client: Arc<dyn CompletionClient>,
    template: PromptTemplate,
    analysis: String,
    yes: bool,
) -> Result<()> {
    let mut chain = PromptChain::new(client, template);
    let mut workflow = Workflow::new(analysis);
    let mut presenter = ConsolePresenter::stdout();

    workflow.ensure_analysis(&mut presenter);

    if !yes && !ask("Generate the user story task definition?")? {
        println!("Stopped before the task definition.");
        return Ok(());
    }
    workflow.define_user_story(&mut chain, &mut presenter).await?;

    if !yes && !ask("Generate the code for this task?")? {
        println!("Stopped before code generation.");
        return Ok(());
    }
    workflow.generate_code(&mut chain, &mut presenter).await?;
    Ok(())
}

fn ask(question: &str) -> Result<bool> {
    console::confirm(&mut io::stdin().lock(), &mut io::stdout(), question).context("Failed to read confirmation")
}

fn load_analysis(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map(|text| text.trim().to_string())
            .with_context(|| format!("Failed to read analysis from {}", path.display())),
        None => Ok(prompts::SAMPLE_ANALYSIS.to_string()),
    }
}

fn load_template(path: Option<&Path>, builtin: &str) -> Result<PromptTemplate> {
    let template = match path {
        Some(path) => PromptTemplate::from_file(path)?,
        None => PromptTemplate::new(builtin)?,
    };
    Ok(template)
}
