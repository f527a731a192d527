use super::{Backend, BackendError, LoadedModel, RawGeneration};
use crate::error::{Error, Result};
use crate::generation::GenerationSettings;
use crate::training::TrainingArgs;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Fetch {
        publisher_id: &'a str,
    },
    Load {
        publisher_id: &'a str,
        path: &'a Path,
    },
    Save {
        handle: &'a str,
        path: &'a Path,
    },
    Generate {
        handle: &'a str,
        prompt: &'a str,
        settings: &'a GenerationSettings,
    },
    Train {
        handle: &'a str,
        file: &'a Path,
        args: &'a TrainingArgs,
    },
    Release {
        handle: &'a str,
    },
}

struct WorkerIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

struct Worker {
    program: String,
    child: Mutex<Child>,
    io: Mutex<WorkerIo>,
}

impl Worker {
    fn call(&self, request: &Request<'_>) -> std::result::Result<Value, BackendError> {
        let line = serde_json::to_string(request)
            .map_err(|e| BackendError::fatal(format!("encoding request: {}", e)))?;

        let mut io = self.io.lock();
        writeln!(io.stdin, "{}", line)
            .and_then(|_| io.stdin.flush())
            .map_err(|e| BackendError::fatal(format!("{} stdin: {}", self.program, e)))?;

        let mut reply = String::new();
        let read = io
            .stdout
            .read_line(&mut reply)
            .map_err(|e| BackendError::fatal(format!("{} stdout: {}", self.program, e)))?;
        if read == 0 {
            return Err(BackendError::fatal(format!("{} exited unexpectedly", self.program)));
        }
        drop(io);

        let value: Value = serde_json::from_str(reply.trim())
            .map_err(|e| BackendError::fatal(format!("malformed worker reply: {}", e)))?;

        if value.get("ok").and_then(Value::as_bool) == Some(true) {
            Ok(value)
        } else {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("worker reported an unspecified error");
            Err(BackendError::new(message))
        }
    }

    fn open(self: &Arc<Self>, request: &Request<'_>) -> std::result::Result<Box<dyn LoadedModel>, BackendError> {
        let reply = self.call(request)?;
        let handle = reply
            .get("handle")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::fatal("worker reply has no handle"))?;

        Ok(Box::new(WorkerModel {
            worker: Arc::clone(self),
            handle: handle.to_string(),
        }))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let mut child = self.child.lock();
        if let Err(e) = child.kill() {
            debug!("stopping {}: {}", self.program, e);
        }
        let _ = child.wait();
    }
}

/// Backend that drives a single out-of-process worker; requests are serialised.
///
/// The worker reads one JSON request per line on stdin and answers each with
/// exactly one JSON line on stdout:
///
/// ```text
/// -> {"op":"fetch","publisher_id":"EleutherAI/gpt-neo-125M"}
/// <- {"ok":true,"handle":"m1"}
/// -> {"op":"generate","handle":"m1","prompt":"Hello","settings":{"top_k":50}}
/// <- {"ok":true,"text":"Hello there"}
/// -> {"op":"save","handle":"m1","path":"models/neo-small"}
/// <- {"ok":false,"error":"No space left on device"}
/// ```
///
/// Failures are classified from the `error` message.
#[derive(Clone)]
pub struct ProcessBackend {
    worker: Arc<Worker>,
}

impl ProcessBackend {
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Worker("empty worker command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Worker(format!("cannot start {}: {}", program, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| Error::Worker("worker stdin unavailable".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Worker("worker stdout unavailable".to_string()))?;
        debug!(program = %program, pid = child.id(), "worker started");

        Ok(Self {
            worker: Arc::new(Worker {
                program: program.clone(),
                child: Mutex::new(child),
                io: Mutex::new(WorkerIo {
                    stdin,
                    stdout: BufReader::new(stdout),
                }),
            }),
        })
    }
}

impl Backend for ProcessBackend {
    fn fetch(&self, publisher_id: &str) -> std::result::Result<Box<dyn LoadedModel>, BackendError> {
        self.worker.open(&Request::Fetch { publisher_id })
    }

    fn load(&self, publisher_id: &str, dir: &Path) -> std::result::Result<Box<dyn LoadedModel>, BackendError> {
        self.worker.open(&Request::Load {
            publisher_id,
            path: dir,
        })
    }
}

struct WorkerModel {
    worker: Arc<Worker>,
    handle: String,
}

impl LoadedModel for WorkerModel {
    fn save(&self, dir: &Path) -> std::result::Result<(), BackendError> {
        self.worker.call(&Request::Save {
            handle: &self.handle,
            path: dir,
        })?;
        Ok(())
    }

    fn generate(
        &mut self,
        prompt: &str,
        settings: &GenerationSettings,
    ) -> std::result::Result<RawGeneration, BackendError> {
        let mut payload = self.worker.call(&Request::Generate {
            handle: &self.handle,
            prompt,
            settings,
        })?;

        let text = payload
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::fatal("generation reply has no text"))?
            .to_string();
        if let Some(object) = payload.as_object_mut() {
            object.remove("ok");
        }

        Ok(RawGeneration { text, payload })
    }

    fn train(&mut self, file: &Path, args: &TrainingArgs) -> std::result::Result<(), BackendError> {
        self.worker.call(&Request::Train {
            handle: &self.handle,
            file,
            args,
        })?;
        Ok(())
    }
}

impl Drop for WorkerModel {
    fn drop(&mut self) {
        if let Err(e) = self.worker.call(&Request::Release { handle: &self.handle }) {
            warn!(handle = %self.handle, "release failed: {}", e);
        }
    }
}
