use anyhow::{bail, Context as _, Result};
use clap::Args;
use happychatter::catalog::{self, ModelKind};
use happychatter::format::{human_bytes, human_time};
use happychatter::progress::Progress;
use happychatter::{
    downloader, Backend, CacheLayout, CancelToken, ChatSession, DownloadManager, EnvConfig,
    EventHandler, GenerationParameters, LifecycleEvent, ModelSession, ProcessBackend, SessionConfig,
    TrainOutcome, TrainingRequest,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Context {
    env: EnvConfig,
}

impl Context {
    pub fn new(env: EnvConfig) -> Self {
        Self { env }
    }

    fn cache(&self) -> CacheLayout {
        CacheLayout::new(&self.env.models_dir)
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig::from_env(&self.env)
    }

    fn backend(&self) -> Result<Arc<dyn Backend>> {
        let backend = ProcessBackend::spawn(&self.env.worker)
            .with_context(|| format!("failed to start model worker `{}`", self.env.worker.join(" ")))?;
        Ok(Arc::new(backend))
    }
}

/// Generation flags. Setting any of them switches the session from the
/// implicit defaults to a full custom parameter set.
#[derive(Args, Debug, Default, Clone)]
pub struct ParamArgs {
    #[arg(long)]
    min_length: Option<usize>,
    #[arg(long)]
    max_length: Option<usize>,
    #[arg(long)]
    do_sample: Option<bool>,
    #[arg(long)]
    early_stopping: Option<bool>,
    #[arg(long)]
    num_beams: Option<usize>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    top_k: Option<usize>,
    #[arg(long)]
    top_p: Option<f32>,
    #[arg(long)]
    no_repeat_ngram_size: Option<usize>,
    /// Word the model must not produce; repeat for several
    #[arg(long = "bad-word")]
    bad_words: Vec<String>,
}

impl ParamArgs {
    pub fn into_parameters(self) -> Option<GenerationParameters> {
        let any = self.min_length.is_some()
            || self.max_length.is_some()
            || self.do_sample.is_some()
            || self.early_stopping.is_some()
            || self.num_beams.is_some()
            || self.temperature.is_some()
            || self.top_k.is_some()
            || self.top_p.is_some()
            || self.no_repeat_ngram_size.is_some()
            || !self.bad_words.is_empty();
        if !any {
            return None;
        }

        let defaults = GenerationParameters::default();
        Some(GenerationParameters {
            min_length: self.min_length.unwrap_or(defaults.min_length),
            max_length: self.max_length.unwrap_or(defaults.max_length),
            do_sample: self.do_sample.unwrap_or(defaults.do_sample),
            early_stopping: self.early_stopping.unwrap_or(defaults.early_stopping),
            num_beams: self.num_beams.unwrap_or(defaults.num_beams),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            no_repeat_ngram_size: self.no_repeat_ngram_size.unwrap_or(defaults.no_repeat_ngram_size),
            bad_words: if self.bad_words.is_empty() {
                None
            } else {
                Some(self.bad_words.into_iter().collect())
            },
        })
    }
}

fn resolve(key: &str) -> Result<ModelKind> {
    Ok(catalog::resolve(key)?.kind)
}

/// Loads `kind` on a blocking thread behind a spinner. Ctrl-C cancels any
/// pending retry wait.
async fn open_session(ctx: &Context, kind: ModelKind, events: Arc<dyn EventHandler>) -> Result<ModelSession> {
    let cancel = CancelToken::new();
    let builder = ModelSession::builder(ctx.backend()?)
        .config(ctx.session_config())
        .cancel_token(cancel.clone())
        .events(events);

    let mut task = tokio::task::spawn_blocking(move || builder.open(kind));
    let result = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n[!] Cancelling, waiting for the current attempt to finish...");
            cancel.cancel();
            task.await?
        }
    };

    Ok(result?)
}

async fn open_with_spinner(ctx: &Context, kind: ModelKind) -> Result<ModelSession> {
    let progress = Arc::new(Progress::spinner(&format!("loading {}", kind)));
    let result = open_session(ctx, kind, progress.clone()).await;
    progress.stop_and_clear();
    result
}

/// Prints every lifecycle event as a plain line so a parent process can relay it.
fn line_printer() -> Arc<dyn EventHandler> {
    Arc::new(|event: &LifecycleEvent| match event {
        LifecycleEvent::Retrying { .. } | LifecycleEvent::Failed { .. } => {
            println!("[!] {}", event.status_line())
        }
        _ => println!("[*] {}", event.status_line()),
    })
}

pub fn list(ctx: &Context) -> Result<()> {
    let cache = ctx.cache();

    println!(
        "{:<16} {:<24} {:<40} {:<10} {:<6}",
        "KEY", "MODEL", "HUB ID", "SIZE", "CACHED"
    );
    for entry in catalog::entries() {
        let size = entry
            .approx_size
            .map(human_bytes)
            .unwrap_or_else(|| "-".to_string());
        let cached = if cache.is_cached(entry.kind) { "yes" } else { "no" };
        println!(
            "{:<16} {:<24} {:<40} {:<10} {:<6}",
            entry.key, entry.display_name, entry.publisher_id, size, cached
        );
    }
    Ok(())
}

pub fn show(ctx: &Context, key: &str) -> Result<()> {
    let entry = catalog::resolve(key)?;
    let cache = ctx.cache();

    println!("  Model:        {}", entry.display_name);
    println!("  Key:          {}", entry.key);
    println!("  Hub id:       {}", entry.publisher_id);
    if let Some(size) = entry.approx_size {
        println!("  Approx size:  {}", human_bytes(size));
    }
    println!();
    println!("  {}", entry.description);
    println!();

    let dir = cache.model_dir(entry.kind);
    if cache.is_cached(entry.kind) {
        println!("  Cached at:    {}", dir.display());
        if let Some(size) = cache.cached_size(entry.kind) {
            println!("  On disk:      {}", human_bytes(size));
        }
        if let Ok(modified) = std::fs::metadata(cache.marker_path(entry.kind)).and_then(|m| m.modified()) {
            println!("  Downloaded:   {}", human_time(modified));
        }
        let trained = if cache.has_preprocessed(entry.kind) { "yes" } else { "no" };
        println!("  Preprocessed: {}", trained);
    } else {
        println!("  Not downloaded yet (run `happychatter download {}`)", entry.key);
    }
    Ok(())
}

pub async fn download(ctx: &Context, key: &str, external: bool) -> Result<()> {
    let kind = resolve(key)?;

    if external {
        let manager = DownloadManager::for_current_exe()?
            .env("HAPPYCHATTER_MODELS", ctx.env.models_dir.to_string_lossy())
            .env("HAPPYCHATTER_WORKER", ctx.env.worker.join(" "))
            .env(
                "HAPPYCHATTER_MAX_RETRIES",
                ctx.env.max_retries.unwrap_or(0).to_string(),
            );
        tokio::task::spawn_blocking(move || manager.run(kind, |line| println!("{}", line)))
            .await?
            .with_context(|| format!("download of {} failed", kind))?;
        return Ok(());
    }

    let session = open_session(ctx, kind, line_printer()).await?;
    println!(
        "[+] {} is in {}",
        kind,
        session.cache().model_dir(kind).display()
    );
    Ok(())
}

pub async fn download_all(ctx: &Context) -> Result<()> {
    let backend = ctx.backend()?;
    let config = ctx.session_config();
    let events = line_printer();

    let results = tokio::task::spawn_blocking(move || {
        downloader::download_all(|kind| {
            ModelSession::builder(backend.clone())
                .config(config.clone())
                .events(events.clone())
                .open(kind)
        })
    })
    .await?;

    let mut failed = 0;
    for (kind, result) in &results {
        match result {
            Ok(()) => println!("[+] {}", kind),
            Err(e) => {
                failed += 1;
                println!("[x] {}: {}", kind, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} downloads failed", failed, results.len());
    }
    Ok(())
}

pub async fn generate(ctx: &Context, key: &str, params: ParamArgs, prompt: &str, raw: bool) -> Result<()> {
    let kind = resolve(key)?;
    let mut session = open_with_spinner(ctx, kind).await?;
    if let Some(parameters) = params.into_parameters() {
        session.set_parameters(parameters)?;
    }

    let prompt = prompt.to_string();
    let (reply, generation) = tokio::task::spawn_blocking(move || session.generate(&prompt)).await??;

    println!("{}", reply);
    if raw {
        println!("{}", serde_json::to_string_pretty(&generation.payload)?);
    }
    Ok(())
}

pub async fn train(ctx: &Context, key: &str, file: PathBuf, epochs: u32, load: bool) -> Result<()> {
    let kind = resolve(key)?;
    if !load && !file.is_file() {
        bail!("training file {} does not exist", file.display());
    }

    let mut session = open_with_spinner(ctx, kind).await?;
    let request = TrainingRequest::new(file).epochs(epochs).load_only(load);

    let progress = Progress::spinner(&format!("training {} for {} epoch(s)", kind, epochs));
    let outcome = tokio::task::spawn_blocking(move || session.train(&request)).await?;
    progress.stop_and_clear();

    match outcome? {
        TrainOutcome::Skipped => println!("[*] No preprocessed data for {}, nothing to do", kind),
        TrainOutcome::Trained { .. } => println!("[+] Training of {} complete", kind),
    }
    Ok(())
}

pub async fn chat(ctx: &Context, key: &str, params: ParamArgs) -> Result<()> {
    let kind = resolve(key)?;
    let mut session = open_with_spinner(ctx, kind).await?;
    if let Some(parameters) = params.into_parameters() {
        session.set_parameters(parameters)?;
    }

    let chat = ChatSession::new(session, &ctx.env.logs_dir)
        .with_context(|| format!("cannot create chat log in {}", ctx.env.logs_dir.display()))?;

    tokio::task::spawn_blocking(move || interactive_chat(chat)).await?
}

fn interactive_chat(mut chat: ChatSession) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!(">>> Chatting with {}", chat.session().entry().display_name);
    println!("Type /help for commands, /exit to quit");

    loop {
        let line = match rl.readline(">>> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        if line.starts_with('/') {
            if handle_command(&mut chat, line)? {
                break;
            }
            continue;
        }

        match chat.turn(line) {
            Ok(reply) => println!("{}", reply),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    println!("Conversation saved to {}", chat.log_path().display());
    Ok(())
}

fn handle_command(chat: &mut ChatSession, cmd: &str) -> Result<bool> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();

    match parts[0] {
        "/help" | "/?" => {
            println!("Commands:");
            println!("  /exit, /quit          Leave the chat");
            println!("  /reset                Forget the conversation so far");
            println!("  /params               Show the active generation settings");
            println!("  /train <file> [n]     Fine-tune on a text file for n epochs");
        }
        "/exit" | "/quit" => return Ok(true),
        "/reset" => {
            chat.clear();
            println!("Conversation cleared.");
        }
        "/params" => {
            let settings = chat.session().active_settings();
            let label = if chat.session().has_custom_parameters() { "custom" } else { "default" };
            println!("{} {}", label, serde_json::to_string(&settings)?);
        }
        "/train" => {
            let Some(file) = parts.get(1) else {
                println!("Usage: /train <file> [epochs]");
                return Ok(false);
            };
            let epochs = match parts.get(2).map(|n| n.parse::<u32>()) {
                None => 1,
                Some(Ok(n)) => n,
                Some(Err(_)) => {
                    println!("Epochs must be a number");
                    return Ok(false);
                }
            };
            println!("[*] Training on {}...", file);
            match chat.session_mut().train_file(std::path::Path::new(file), epochs) {
                Ok(_) => println!("[+] Training complete"),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
        other => println!("Unknown command: {}", other),
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use happychatter::GenerationSettings;

    #[test]
    fn test_no_flags_keeps_implicit_defaults() {
        assert_eq!(ParamArgs::default().into_parameters(), None);
    }

    #[test]
    fn test_flags_fill_from_defaults() {
        let args = ParamArgs {
            temperature: Some(0.9),
            bad_words: vec!["darn".to_string(), "heck".to_string()],
            ..Default::default()
        };
        let parameters = args.into_parameters().unwrap();

        assert_eq!(parameters.temperature, 0.9);
        assert_eq!(parameters.max_length, GenerationParameters::default().max_length);
        assert_eq!(parameters.top_k, 50);
        assert_eq!(parameters.no_repeat_ngram_size, 1);
        assert_eq!(
            parameters.bad_words.as_ref().map(|words| words.len()),
            Some(2)
        );

        let settings = parameters.to_settings();
        assert_ne!(settings, GenerationSettings::implicit_default());
        assert_eq!(settings.min_length, Some(10));
    }

    #[test]
    fn test_conflicting_flags_fail_validation() {
        let args = ParamArgs {
            min_length: Some(80),
            ..Default::default()
        };
        assert!(args.into_parameters().unwrap().validate().is_err());
    }
}
