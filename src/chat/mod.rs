use crate::error::Result;
use crate::session::ModelSession;
use crate::training::TrainingRequest;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOG_HEADER: &str = "HappyChatter Logfile\n\n\n";

/// A running conversation: the transcript fed to the model on every turn and
/// the append-only log of what was said.
pub struct ChatSession {
    session: ModelSession,
    transcript: String,
    log_path: PathBuf,
}

impl ChatSession {
    /// Starts a conversation logged to a fresh `<log_dir>/<uuid>` file.
    pub fn new(session: ModelSession, log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(uuid::Uuid::new_v4().to_string());
        std::fs::write(&log_path, LOG_HEADER)?;
        debug!(path = %log_path.display(), "chat log created");

        Ok(Self {
            session,
            transcript: String::new(),
            log_path,
        })
    }

    pub fn session(&self) -> &ModelSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ModelSession {
        &mut self.session
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Forgets the transcript; the log file is kept.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Sends one user message and returns the bot's reply.
    pub fn turn(&mut self, user_text: &str) -> Result<String> {
        self.transcript.push_str(user_text);
        self.transcript.push('\n');

        self.session.train(&TrainingRequest::warm_load())?;

        let (reply, raw) = self.session.generate(&self.transcript)?;
        debug!(raw = %raw.payload, "generation result");
        let reply = reply.trim().to_string();

        self.transcript.push_str(&reply);
        self.transcript.push('\n');
        self.append_log(user_text, &reply)?;

        Ok(reply)
    }

    fn append_log(&self, user_text: &str, reply: &str) -> Result<()> {
        let mut log = OpenOptions::new().append(true).open(&self.log_path)?;
        writeln!(log, "Human: {}", user_text)?;
        writeln!(log, "Bot: {}", reply)?;
        Ok(())
    }
}
