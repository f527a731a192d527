use std::env;
use std::path::PathBuf;

/// Installed from `worker/` with `pip install ./worker`. Any program speaking
/// the protocol in `backend::process` can replace it via `HAPPYCHATTER_WORKER`.
pub const DEFAULT_WORKER: &str = "python3 -m happychatter_worker";
pub const DEFAULT_MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub models_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub worker: Vec<String>,
    /// `None` retries transient failures forever.
    pub max_retries: Option<u32>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            models_dir: models_dir(),
            logs_dir: logs_dir(),
            worker: worker_command(),
            max_retries: max_retries(),
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn expand_home(path: String) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn models_dir() -> PathBuf {
    expand_home(env::var("HAPPYCHATTER_MODELS").unwrap_or_else(|_| "models".to_string()))
}

pub fn logs_dir() -> PathBuf {
    expand_home(env::var("HAPPYCHATTER_LOGS").unwrap_or_else(|_| "logs".to_string()))
}

pub fn worker_command() -> Vec<String> {
    parse_command(&env::var("HAPPYCHATTER_WORKER").unwrap_or_else(|_| DEFAULT_WORKER.to_string()))
}

pub fn max_retries() -> Option<u32> {
    parse_max_retries(env::var("HAPPYCHATTER_MAX_RETRIES").ok().as_deref())
}

/// `0` means retry forever; unset or unparsable values fall back to the default.
fn parse_max_retries(value: Option<&str>) -> Option<u32> {
    let retries = value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES);

    if retries == 0 {
        None
    } else {
        Some(retries)
    }
}

/// Splits a command line on whitespace. Quoting is not supported.
pub fn parse_command(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command("  python3 -m  happychatter_worker "),
            vec!["python3", "-m", "happychatter_worker"]
        );
        assert!(parse_command("   ").is_empty());
    }

    #[test]
    fn test_parse_max_retries() {
        assert_eq!(parse_max_retries(None), Some(DEFAULT_MAX_RETRIES));
        assert_eq!(parse_max_retries(Some(" 3 ")), Some(3));
        assert_eq!(parse_max_retries(Some("0")), None);
        assert_eq!(parse_max_retries(Some("lots")), Some(DEFAULT_MAX_RETRIES));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("models".to_string()), PathBuf::from("models"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/hc/models".to_string()), home.join("hc/models"));
        }
    }
}
