//! CLI command implementations
//!
//! Every command loads the configuration, builds a `QueryEngine`, loads
//! the dataset into it and then answers requests. stdout carries only
//! responses; logs go to stderr.

use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::ApiHandler;
use crate::cursor::CursorConfig;
use crate::executor::ExecutorConfig;
use crate::observability::{Event, LogSink, Logger, Severity};
use crate::ops::QueryEngine;
use crate::planner::PlanSelectionPolicy;

use super::args::Command;
use super::dataset::Dataset;
use super::errors::{CliError, CliResult};
use super::io::{read_request, read_requests, stdin, stdout, write_error, write_json};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dataset loaded at startup
    #[serde(default)]
    pub dataset: Option<String>,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Plans every query may run (optional, default "any")
    #[serde(default)]
    pub policy: PlanSelectionPolicy,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub cursor: CursorConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: None,
            log_level: default_log_level(),
            policy: PlanSelectionPolicy::default(),
            executor: ExecutorConfig::default(),
            cursor: CursorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Logger::info(
            Event::ConfigLoaded.as_str(),
            &[
                ("path", path.to_string_lossy().as_ref()),
                ("policy", config.policy.name()),
            ],
        );
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        self.severity()?;
        self.executor.validate().map_err(CliError::config_error)?;
        self.cursor.validate().map_err(CliError::config_error)?;
        Ok(())
    }

    pub fn severity(&self) -> CliResult<Severity> {
        self.log_level.parse().map_err(CliError::config_error)
    }
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    Logger::set_sink(LogSink::Stderr);
    match cmd {
        Command::Query { config, dataset } => {
            let engine = boot(&config, dataset.as_deref())?;
            query(&engine, &mut stdin(), &mut stdout())
        }
        Command::Explain { config, dataset } => {
            let engine = boot(&config, dataset.as_deref())?;
            explain(&engine, &mut stdin(), &mut stdout())
        }
        Command::Serve { config, dataset } => {
            let engine = boot(&config, dataset.as_deref())?;
            serve(engine, stdin(), &mut stdout())?;
            Ok(())
        }
    }
}

/// Loads the configuration and dataset into a fresh engine.
///
/// A missing config file is not an error; defaults are used.
pub fn boot(config_path: &Path, dataset: Option<&Path>) -> CliResult<Arc<QueryEngine>> {
    let config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        Config::default()
    };
    Logger::set_min_severity(config.severity()?);

    let engine = QueryEngine::new(config.executor.clone(), config.cursor.clone()).with_policy(config.policy);
    let dataset_path = dataset.map(Path::to_path_buf).or_else(|| config.dataset.as_ref().map(Into::into));
    if let Some(path) = dataset_path {
        Dataset::load(&path)?.apply(&engine)?;
    }
    Ok(Arc::new(engine))
}

/// Runs one find request and writes its first batch
pub fn query<R: BufRead, W: Write>(engine: &Arc<QueryEngine>, input: &mut R, output: &mut W) -> CliResult<()> {
    one_shot(engine, "find", input, output)
}

/// Explains one find request
pub fn explain<R: BufRead, W: Write>(engine: &Arc<QueryEngine>, input: &mut R, output: &mut W) -> CliResult<()> {
    one_shot(engine, "explain", input, output)
}

fn one_shot<R: BufRead, W: Write>(
    engine: &Arc<QueryEngine>,
    op: &str,
    input: &mut R,
    output: &mut W,
) -> CliResult<()> {
    let mut request = read_request(input)?;
    if let Some(obj) = request.as_object_mut() {
        obj.insert("op".to_string(), json!(op));
    }
    let handler = ApiHandler::new(Arc::clone(engine));
    let response = handler.handle(&request.to_string());
    write_json(output, &response.to_json())
}

/// Answers request lines until end of input; returns how many were handled.
///
/// The idle-cursor monitor runs for the duration.
pub fn serve<R: BufRead, W: Write>(engine: Arc<QueryEngine>, input: R, output: &mut W) -> CliResult<usize> {
    let monitor = engine
        .start_monitor()
        .map_err(|e| CliError::boot_failed(format!("Failed to start cursor monitor: {}", e)))?;
    let handler = ApiHandler::new(engine);
    Logger::info(Event::ServeStart.as_str(), &[]);

    let mut handled = 0;
    for line in read_requests(input) {
        match line {
            Ok(line) => {
                let response = handler.handle(&line);
                write_json(output, &response.to_json())?;
                handled += 1;
            }
            Err(e) => {
                // I/O error reading - this is fatal
                write_error(output, e.code_str(), e.message())?;
                break;
            }
        }
    }

    monitor.stop();
    Logger::info(
        Event::ServeStop.as_str(),
        &[("requests", handled.to_string().as_str())],
    );
    Ok(handled)
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use serde_json::Value;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn write_dataset(temp_dir: &TempDir) -> std::path::PathBuf {
        let path = temp_dir.path().join("data.json");
        let documents: Vec<Value> = (0..20).map(|i| json!({"_id": i, "a": i % 4})).collect();
        let dataset = json!({"collections": [{"ns": "db.c", "indexes": [{"a": 1}], "documents": documents}]});
        fs::write(&path, dataset.to_string()).unwrap();
        path
    }

    fn lines(out: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("aerocursor.json");
        fs::write(&config_path, "{}").unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.policy, PlanSelectionPolicy::Any);
        assert_eq!(config.executor, ExecutorConfig::default());
        assert_eq!(config.cursor.idle_timeout_ms, 600_000);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("aerocursor.json");

        fs::write(&config_path, json!({"log_level": "loud"}).to_string()).unwrap();
        let err = Config::load(&config_path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);

        fs::write(&config_path, json!({"cursor": {"sweep_interval_ms": 0}}).to_string()).unwrap();
        assert!(Config::load(&config_path).is_err());
    }

    #[test]
    fn test_query_command_forces_find() {
        let temp_dir = TempDir::new().unwrap();
        let dataset = write_dataset(&temp_dir);
        let engine = boot(&temp_dir.path().join("absent.json"), Some(&dataset)).unwrap();

        let mut input = Cursor::new(r#"{"ns": "db.c", "filter": {"a": 1}}"#);
        let mut out = Vec::new();
        query(&engine, &mut input, &mut out).unwrap();
        let response = &lines(&out)[0];
        assert_eq!(response["status"], "ok");
        assert_eq!(response["data"]["documents"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_explain_command() {
        let temp_dir = TempDir::new().unwrap();
        let dataset = write_dataset(&temp_dir);
        let engine = boot(&temp_dir.path().join("absent.json"), Some(&dataset)).unwrap();

        let mut input = Cursor::new(r#"{"ns": "db.c", "filter": {"a": 1}}"#);
        let mut out = Vec::new();
        explain(&engine, &mut input, &mut out).unwrap();
        assert_eq!(lines(&out)[0]["data"]["cursor"], "BtreeCursor a_1");
    }

    #[test]
    fn test_serve_answers_each_line() {
        let temp_dir = TempDir::new().unwrap();
        let dataset = write_dataset(&temp_dir);
        let config_path = temp_dir.path().join("aerocursor.json");
        fs::write(
            &config_path,
            json!({"dataset": dataset.to_string_lossy(), "log_level": "error"}).to_string(),
        )
        .unwrap();
        let engine = boot(&config_path, None).unwrap();

        let input = Cursor::new(concat!(
            r#"{"op": "find", "ns": "db.c", "batchSize": 3}"#,
            "\n\n",
            r#"{"op": "cursorInfo"}"#,
            "\n",
            r#"{"op": "bogus"}"#,
            "\n"
        ));
        let mut out = Vec::new();
        let handled = serve(engine, input, &mut out).unwrap();
        assert_eq!(handled, 3);

        let responses = lines(&out);
        assert_eq!(responses[0]["data"]["documents"].as_array().unwrap().len(), 3);
        assert_eq!(responses[1]["data"]["totalOpen"], 1);
        assert_eq!(responses[2]["code"], "AERO_UNKNOWN_OPERATION");
    }
}
