mod cmd;

use clap::{Parser, Subcommand};
use happychatter::EnvConfig;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "happychatter")]
#[command(version)]
#[command(about = "Chat with pre-trained conversational language models", long_about = None)]
struct Cli {
    /// Where model snapshots are cached [env: HAPPYCHATTER_MODELS]
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Where chat logs are written [env: HAPPYCHATTER_LOGS]
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    /// Command line of the model worker [env: HAPPYCHATTER_WORKER]
    #[arg(long, global = true)]
    worker: Option<String>,

    /// Attempts per model load, 0 retries forever [env: HAPPYCHATTER_MAX_RETRIES]
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported models
    #[command(alias = "ls")]
    List,
    /// Describe a model and its cache state
    Show { model: String },
    /// Download a model into the cache
    Download {
        model: String,
        /// Run the download in a child process and relay its output
        #[arg(long)]
        external: bool,
    },
    /// Download every supported model
    DownloadAll,
    /// Chat interactively
    Chat {
        model: String,
        #[command(flatten)]
        params: cmd::ParamArgs,
    },
    /// Generate a single reply
    Generate {
        model: String,
        #[command(flatten)]
        params: cmd::ParamArgs,
        /// Also print the raw generation result
        #[arg(long)]
        raw: bool,
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },
    /// Fine-tune a model on a text file
    Train {
        model: String,
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        epochs: u32,
        /// Only resume from previously preprocessed data
        #[arg(long)]
        load: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HAPPYCHATTER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let mut env = EnvConfig::from_env();
    if let Some(dir) = cli.models_dir {
        env.models_dir = dir;
    }
    if let Some(dir) = cli.logs_dir {
        env.logs_dir = dir;
    }
    if let Some(worker) = cli.worker {
        env.worker = happychatter::envconfig::parse_command(&worker);
    }
    if let Some(retries) = cli.max_retries {
        env.max_retries = if retries == 0 { None } else { Some(retries) };
    }
    let ctx = cmd::Context::new(env);

    let result = match cli.command {
        Commands::List => cmd::list(&ctx),
        Commands::Show { model } => cmd::show(&ctx, &model),
        Commands::Download { model, external } => cmd::download(&ctx, &model, external).await,
        Commands::DownloadAll => cmd::download_all(&ctx).await,
        Commands::Chat { model, params } => cmd::chat(&ctx, &model, params).await,
        Commands::Generate { model, params, raw, prompt } => {
            cmd::generate(&ctx, &model, params, &prompt.join(" "), raw).await
        }
        Commands::Train { model, file, epochs, load } => cmd::train(&ctx, &model, file, epochs, load).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
