use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use journey_agent::config::{Config, LogFormat};
use journey_agent::core::{AgentOutcome, ReactAgent, Step, StepCallback};
use journey_agent::{OpenAIClient, api, default_tools};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_REQUEST: &str = "Hello, please help me check today's weather in Beijing, and then recommend a suitable tourist attraction based on the weather.";

#[derive(Parser, Debug)]
#[command(name = "journey-agent")]
#[command(version)]
#[command(about = "Travel assistant agent and AI prompt service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Load environment from this file instead of .env")]
    env_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    api_key: Option<String>,

    #[arg(short, long, global = true)]
    model: Option<String>,

    #[arg(short, long, global = true, help = "Base URL for the LLM API")]
    base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the travel assistant agent loop")]
    Run {
        #[arg(help = "User request", default_value = DEFAULT_REQUEST)]
        request: String,

        #[arg(
            short = 'n',
            long,
            help = "Maximum Thought/Action iterations",
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        max_iterations: Option<usize>,
    },

    #[command(about = "Serve the HTTP prompt API")]
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    #[command(about = "List the tools available to the agent")]
    Tools,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn print_step(step: &Step) {
    println!("{}", format!("--- Loop {} ---", step.iteration).bold());
    if step.truncated {
        println!("{}", "Truncated extra Thought-Action pairs".yellow());
    }
    println!("{}\n{}\n", "Model output:".cyan(), step.output);
    if let Some(observation) = &step.observation {
        let line = format!("Observation: {}", observation);
        if observation.starts_with("Error:") {
            println!("{}", line.red());
        } else {
            println!("{}", line.green());
        }
        println!("{}", "=".repeat(40));
    }
}

async fn run_agent(config: &Config, request: &str) -> Result<ExitCode> {
    if config.llm.api_key.is_none() {
        anyhow::bail!(
            "API key not found. Please set OPENAI_API_KEY (or API_KEY) or use --api-key flag."
        );
    }

    let client = OpenAIClient::from_config(&config.llm);
    let tools = default_tools(&config.tools);
    let callback: StepCallback = Arc::new(print_step);
    let agent = ReactAgent::new(
        Box::new(client),
        tools,
        Some(config.max_iterations),
        Some(callback),
    );

    println!("User input: {}\n{}", request, "=".repeat(40));

    let run = agent.run(request).await;
    match run.outcome {
        AgentOutcome::Finished { answer, .. } => {
            println!("{} {}", "Task completed, final answer:".green().bold(), answer);
            Ok(ExitCode::SUCCESS)
        }
        AgentOutcome::Exhausted { iterations } => {
            println!(
                "{}",
                format!("No final answer within {} iterations.", iterations)
                    .red()
                    .bold()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = Config::load(args.env_file.as_deref())?;
    if let Some(key) = args.api_key {
        config.llm.api_key = Some(key);
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }
    if let Some(base_url) = args.base_url {
        config.llm.base_url = base_url;
    }

    init_tracing(&config);

    match args.command {
        Commands::Run {
            request,
            max_iterations,
        } => {
            if let Some(max) = max_iterations {
                config.max_iterations = max;
            }
            run_agent(&config, &request).await
        }

        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            api::serve(&config).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Tools => {
            for info in default_tools(&config.tools).definitions() {
                println!("{} - {}", info.signature().bold(), info.description);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
