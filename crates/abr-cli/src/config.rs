use abr_core::{PatternError, PatternSet, DEFAULT_PRIMARY_PATTERN, DEFAULT_SECONDARY_PATTERN};
use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const CONFIG_FILE_NAME: &str = ".absolutelyright_config.json";
pub const DATA_DIR_NAME: &str = ".absolutelyright";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 2;

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Root directory holding one sub-directory of logs per project
    #[arg(long, global = true, value_name = "DIR")]
    pub projects: Option<PathBuf>,

    /// Directory for the persisted counters
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Primary (strict) pattern, case-insensitive
    #[arg(long, global = true, value_name = "REGEX")]
    pub pattern: Option<String>,

    /// Secondary (loose) pattern, case-insensitive; empty disables it
    #[arg(long, global = true, value_name = "REGEX")]
    pub pattern_right: Option<String>,

    /// JSON config file [default: ~/.absolutelyright_config.json]
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub claude_projects_base: Option<String>,
    pub check_interval: Option<u64>,
    pub pattern: Option<String>,
    pub pattern_right: Option<String>,
    pub data_dir: Option<String>,
    pub upload_url: Option<String>,
    pub upload_secret: Option<String>,
}

impl FileConfig {
    /// Reads the config file if present. An unreadable or invalid file is
    /// reported and treated as empty.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "error loading config");
                return Self::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "error loading config");
            Self::default()
        })
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub projects_root: PathBuf,
    pub data_dir: PathBuf,
    pub check_interval: Duration,
    pub pattern: String,
    pub pattern_right: Option<String>,
    pub upload_url: Option<String>,
    pub upload_secret: Option<String>,
}

impl Settings {
    /// Loads settings from the process environment and the config file.
    pub fn from_env(args: &CommonArgs) -> Self {
        let home = home_dir();
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| home.join(CONFIG_FILE_NAME));
        let file = FileConfig::load(&config_path);
        Self::resolve(args, &file, &home, |key| std::env::var(key).ok())
    }

    /// Layers defaults, config file, environment and flags, in increasing
    /// precedence.
    pub fn resolve(
        args: &CommonArgs,
        file: &FileConfig,
        home: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let raw_env = env;
        let env = |key: &str| raw_env(key).filter(|value| !value.trim().is_empty());

        let projects_root = args
            .projects
            .clone()
            .or_else(|| env("CLAUDE_PROJECTS").map(|value| expand_home(&value, home)))
            .or_else(|| {
                file.claude_projects_base
                    .as_deref()
                    .map(|value| expand_home(value, home))
            })
            .unwrap_or_else(|| home.join(".claude").join("projects"));

        let data_dir = args
            .data_dir
            .clone()
            .or_else(|| env("ABR_DATA_DIR").map(|value| expand_home(&value, home)))
            .or_else(|| file.data_dir.as_deref().map(|value| expand_home(value, home)))
            .unwrap_or_else(|| home.join(DATA_DIR_NAME));

        let interval_secs = env("ABR_CHECK_INTERVAL")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .or(file.check_interval)
            .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS)
            .max(1);

        let pattern = args
            .pattern
            .clone()
            .or_else(|| env("PATTERN"))
            .or_else(|| file.pattern.clone())
            .unwrap_or_else(|| DEFAULT_PRIMARY_PATTERN.to_string());

        // An explicitly empty secondary pattern turns that counter off.
        let pattern_right = args
            .pattern_right
            .clone()
            .or_else(|| raw_env("PATTERN_RIGHT"))
            .or_else(|| file.pattern_right.clone())
            .unwrap_or_else(|| DEFAULT_SECONDARY_PATTERN.to_string());
        let pattern_right = Some(pattern_right).filter(|value| !value.trim().is_empty());

        let upload_url = env("ABSOLUTELYRIGHT_URL")
            .or_else(|| file.upload_url.clone())
            .filter(|value| !value.trim().is_empty());
        let upload_secret = env("ABSOLUTELYRIGHT_SECRET")
            .or_else(|| file.upload_secret.clone())
            .filter(|value| !value.is_empty());

        Self {
            projects_root,
            data_dir,
            check_interval: Duration::from_secs(interval_secs),
            pattern,
            pattern_right,
            upload_url,
            upload_secret,
        }
    }

    pub fn patterns(&self) -> Result<PatternSet, PatternError> {
        PatternSet::new(&self.pattern, self.pattern_right.as_deref())
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    match value.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(value),
    }
}
