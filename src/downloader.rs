use crate::catalog::ModelKind;
use crate::error::{Error, Result};
use crate::session::ModelSession;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Runs a model download in a child process and relays its output line by line,
/// so a front-end can show progress without blocking on the download itself.
pub struct DownloadManager {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl DownloadManager {
    /// `program args... <model-key>` is spawned for every download.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    /// Re-runs the current executable as `<exe> download <key>`.
    pub fn for_current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe, vec!["download".to_string()]))
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Blocks until the child exits, handing each stdout/stderr line to `sink`.
    pub fn run<F>(&self, kind: ModelKind, mut sink: F) -> Result<ExitStatus>
    where
        F: FnMut(&str),
    {
        info!(model = %kind, program = %self.program.display(), "starting downloader");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(kind.key())
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Worker(format!("cannot start {}: {}", self.program.display(), e)))?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(relay(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(relay(stderr, tx.clone()));
        }
        drop(tx);

        for line in rx {
            sink(&line);
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(Error::Worker(format!("download of {} exited with {}", kind, status)));
        }
        Ok(status)
    }
}

fn relay<R>(stream: R, tx: mpsc::Sender<String>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(line) = last_segment(&String::from_utf8_lossy(&buf)) {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    debug!("downloader output closed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Progress bars redraw with `\r`; only the last visible state of a line matters.
fn last_segment(raw: &str) -> Option<String> {
    raw.trim_end()
        .rsplit('\r')
        .map(str::trim_end)
        .find(|segment| !segment.is_empty())
        .map(String::from)
}

/// Opens every catalog model in order so each ends up in the cache.
/// Failures are collected and do not stop the remaining downloads.
pub fn download_all<F>(mut open: F) -> Vec<(ModelKind, Result<()>)>
where
    F: FnMut(ModelKind) -> Result<ModelSession>,
{
    ModelKind::ALL
        .iter()
        .map(|&kind| {
            info!(model = %kind, "downloading");
            let result = open(kind).map(drop);
            if let Err(e) = &result {
                warn!(model = %kind, "download failed: {}", e);
            }
            (kind, result)
        })
        .collect()
}
