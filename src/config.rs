use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::MilvusConfig;
use crate::bench::config::{parse_levels, BenchConfig, MockServerConfig, QueryErrorPolicy};
use crate::error::ConfigError;

const DEFAULT_OUTPUT: &str = "./conc_test_results.json";

/// Concurrent search benchmark for vector databases
#[derive(Parser, Debug)]
#[command(name = "conc-bench", author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (.toml/.yaml/.json, or .txt with `key#value` lines)
    #[arg(long, env = "CONC_BENCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the sweep against a Milvus endpoint
    Run {
        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Start a mock Milvus server and run the sweep against it
    Standalone {
        #[command(flatten)]
        sweep: SweepArgs,

        #[command(flatten)]
        mock: MockArgs,
    },
}

#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    /// Concurrency levels to test (comma-separated)
    #[arg(short = 'c', long, env = "CONC_LIST")]
    pub conc_list: Option<String>,

    /// Duration per concurrency level in seconds
    #[arg(short = 'd', long, env = "CONC_DURATION")]
    pub duration: Option<u64>,

    /// Idle seconds between two levels
    #[arg(long, env = "CONC_INTERMISSION")]
    pub cooldown: Option<u64>,

    /// Query vector dimension
    #[arg(long, env = "DIM")]
    pub dim: Option<usize>,

    /// Neighbours requested per search
    #[arg(short = 'k', long, env = "TOPK")]
    pub topk: Option<usize>,

    /// Number of random query vectors generated per level
    #[arg(long, env = "POOL_SIZE")]
    pub pool_size: Option<usize>,

    /// Seconds to wait for all workers to become ready (0 waits forever)
    #[arg(long, env = "READY_TIMEOUT")]
    pub ready_timeout: Option<u64>,

    /// Seconds past the run duration to wait for worker results
    #[arg(long, env = "JOIN_GRACE")]
    pub join_grace: Option<u64>,

    /// What to do when a search fails (abort, skip)
    #[arg(long, env = "QUERY_ERROR_POLICY")]
    pub on_query_error: Option<String>,

    /// Path of the JSON results file
    #[arg(short = 'o', long, env = "CONC_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Default)]
pub struct BackendArgs {
    /// Milvus URI
    #[arg(short = 'u', long, env = "MILVUS_URI")]
    pub uri: Option<String>,

    /// Milvus token (`user:password` or API key)
    #[arg(short = 't', long, env = "MILVUS_TOKEN")]
    pub token: Option<String>,

    /// Collection to search
    #[arg(long, env = "COLLECTION_NAME")]
    pub collection: Option<String>,

    /// Vector field to search
    #[arg(long, env = "VECTOR_FIELD")]
    pub vector_field: Option<String>,

    /// Connect and request timeout in seconds
    #[arg(long, env = "CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct MockArgs {
    /// Minimum simulated search latency in milliseconds
    #[arg(long, default_value = "5")]
    pub latency_min_ms: u64,

    /// Maximum simulated search latency in milliseconds
    #[arg(long, default_value = "15")]
    pub latency_max_ms: u64,

    /// Mock server error rate (0.0 to 1.0)
    #[arg(long, default_value = "0.0")]
    pub error_rate: f64,
}

/// Concurrency levels as written in a config file: `"1,5,10"` or `[1, 5, 10]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LevelList {
    Csv(String),
    List(Vec<usize>),
}

impl LevelList {
    fn into_levels(self) -> Result<Vec<usize>, ConfigError> {
        match self {
            LevelList::Csv(s) => parse_levels(&s),
            LevelList::List(levels) => Ok(levels),
        }
    }
}

/// Values read from a config file; keys follow the `config.txt` naming
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub uri: Option<String>,
    pub token: Option<String>,
    pub collection_name: Option<String>,
    pub vector_field: Option<String>,
    pub dim: Option<usize>,
    pub topk: Option<usize>,
    pub conc_list: Option<LevelList>,
    pub conc_duration: Option<u64>,
    pub conc_intermission: Option<u64>,
    pub pool_size: Option<usize>,
    pub connect_timeout: Option<u64>,
    pub ready_timeout: Option<u64>,
    pub join_grace: Option<u64>,
    pub query_error_policy: Option<String>,
    pub output: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl FileConfig {
    /// Load a config file; `.txt` files use the `key#value` line format
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |message: String| ConfigError::File {
            path: path.display().to_string(),
            message,
        };

        let is_txt = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);

        let mut builder = config::Config::builder();
        if is_txt {
            let text = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
            for (key, value) in parse_key_hash_value(&text)? {
                builder = builder
                    .set_override(key, value)
                    .map_err(|e| file_error(e.to_string()))?;
            }
        } else {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize::<FileConfig>())
            .map_err(|e| file_error(e.to_string()))
    }
}

/// Parse `key#value` lines; blank lines are skipped
pub fn parse_key_hash_value(text: &str) -> Result<Vec<(String, String)>, ConfigError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let line = line.trim();
            match line.split_once('#') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.trim().to_string()))
                }
                _ => Err(ConfigError::Malformed {
                    line: i + 1,
                    content: line.to_string(),
                }),
            }
        })
        .collect()
}

/// Logging settings
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

impl LogConfig {
    /// Priority: CLI > ENV > file > default
    pub fn resolve(cli: &Cli, file: &FileConfig) -> Self {
        let level = cli
            .log_level
            .clone()
            .or_else(|| file.log_level.clone())
            .unwrap_or_else(|| "info".to_string());
        let format = cli
            .log_format
            .as_deref()
            .or(file.log_format.as_deref())
            .map(parse_log_format)
            .unwrap_or(LogFormat::Text);

        Self { level, format }
    }
}

/// Everything a sweep needs besides the backend
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub bench: BenchConfig,
    pub output: PathBuf,
    pub json: bool,
}

impl SweepSettings {
    /// Merge CLI/env values over file values over defaults, then validate
    pub fn resolve(args: &SweepArgs, file: &FileConfig) -> Result<Self, ConfigError> {
        let defaults = BenchConfig::default();

        let concurrency_levels = match &args.conc_list {
            Some(list) => parse_levels(list)?,
            None => match file.conc_list.clone() {
                Some(list) => list.into_levels()?,
                None => defaults.concurrency_levels,
            },
        };

        let query_error_policy = match args
            .on_query_error
            .as_deref()
            .or(file.query_error_policy.as_deref())
        {
            Some(s) => s.parse::<QueryErrorPolicy>().map_err(ConfigError::Invalid)?,
            None => defaults.query_error_policy,
        };

        let ready_timeout_secs = match args.ready_timeout.or(file.ready_timeout) {
            Some(0) => None,
            Some(secs) => Some(secs),
            None => defaults.ready_timeout_secs,
        };

        let bench = BenchConfig {
            dimension: args.dim.or(file.dim).unwrap_or(defaults.dimension),
            pool_size: args.pool_size.or(file.pool_size).unwrap_or(defaults.pool_size),
            concurrency_levels,
            duration_secs: args
                .duration
                .or(file.conc_duration)
                .unwrap_or(defaults.duration_secs),
            cooldown_secs: args
                .cooldown
                .or(file.conc_intermission)
                .unwrap_or(defaults.cooldown_secs),
            top_k: args.topk.or(file.topk).unwrap_or(defaults.top_k),
            ready_timeout_secs,
            join_grace_secs: args
                .join_grace
                .or(file.join_grace)
                .unwrap_or(defaults.join_grace_secs),
            query_error_policy,
        };
        bench.validate()?;

        let output = args
            .output
            .clone()
            .or_else(|| file.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        Ok(Self {
            bench,
            output,
            json: args.json,
        })
    }
}

/// Merge Milvus connection values; CLI/env over file over defaults
pub fn resolve_milvus(args: &BackendArgs, file: &FileConfig) -> Result<MilvusConfig, ConfigError> {
    let defaults = MilvusConfig::default();
    let config = MilvusConfig {
        uri: args
            .uri
            .clone()
            .or_else(|| file.uri.clone())
            .unwrap_or(defaults.uri),
        token: args
            .token
            .clone()
            .or_else(|| file.token.clone())
            .unwrap_or(defaults.token),
        collection_name: args
            .collection
            .clone()
            .or_else(|| file.collection_name.clone())
            .unwrap_or(defaults.collection_name),
        vector_field: args
            .vector_field
            .clone()
            .or_else(|| file.vector_field.clone())
            .unwrap_or(defaults.vector_field),
        timeout_secs: args
            .connect_timeout
            .or(file.connect_timeout)
            .unwrap_or(defaults.timeout_secs),
    };

    if !config.uri.starts_with("http://") && !config.uri.starts_with("https://") {
        return Err(ConfigError::Invalid(format!(
            "uri must start with http:// or https://: {}",
            config.uri
        )));
    }

    Ok(config)
}

/// Mock server settings for standalone mode
pub fn resolve_mock(args: &MockArgs, file: &FileConfig) -> Result<MockServerConfig, ConfigError> {
    if !(0.0..=1.0).contains(&args.error_rate) {
        return Err(ConfigError::Invalid(format!(
            "error rate must be between 0.0 and 1.0: {}",
            args.error_rate
        )));
    }

    let defaults = MockServerConfig::default();
    Ok(MockServerConfig {
        port: 0,
        latency_min_ms: args.latency_min_ms,
        latency_max_ms: args.latency_max_ms,
        error_rate: args.error_rate,
        collection_name: file.collection_name.clone().unwrap_or(defaults.collection_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("conc-bench-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_key_hash_value() {
        let pairs = parse_key_hash_value("uri#http://localhost:19530\n\ndim#300\n").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("uri".to_string(), "http://localhost:19530".to_string()),
                ("dim".to_string(), "300".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_key_hash_value_rejects_missing_separator() {
        let err = parse_key_hash_value("dim#300\ntopk=10").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_load_txt_config() {
        let path = temp_file(
            "config.txt",
            "uri#http://milvus:19530\ntoken#root:Milvus\ncollection_name#test_glove\n\
             vector_field#vector\ndim#300\ntopk#100\nconc_list#1,10,20\n\
             conc_duration#60\nconc_intermission#5\n",
        );

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.uri.as_deref(), Some("http://milvus:19530"));
        assert_eq!(file.collection_name.as_deref(), Some("test_glove"));
        assert_eq!(file.dim, Some(300));
        assert_eq!(file.topk, Some(100));
        assert_eq!(file.conc_duration, Some(60));
        assert_eq!(file.conc_list, Some(LevelList::Csv("1,10,20".to_string())));
    }

    #[test]
    fn test_load_toml_config() {
        let path = temp_file(
            "bench.toml",
            "dim = 64\nconc_list = [1, 4, 8]\nquery_error_policy = \"skip\"\n",
        );

        let file = FileConfig::load(&path).unwrap();
        let settings = SweepSettings::resolve(&SweepArgs::default(), &file).unwrap();
        assert_eq!(settings.bench.dimension, 64);
        assert_eq!(settings.bench.concurrency_levels, vec![1, 4, 8]);
        assert_eq!(settings.bench.query_error_policy, QueryErrorPolicy::Skip);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            dim: Some(300),
            conc_list: Some(LevelList::Csv("1,5".to_string())),
            conc_duration: Some(60),
            ..Default::default()
        };
        let args = SweepArgs {
            conc_list: Some("2,4".to_string()),
            duration: Some(5),
            ..Default::default()
        };

        let settings = SweepSettings::resolve(&args, &file).unwrap();
        assert_eq!(settings.bench.concurrency_levels, vec![2, 4]);
        assert_eq!(settings.bench.duration_secs, 5);
        assert_eq!(settings.bench.dimension, 300);
        assert_eq!(settings.output, PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn test_zero_ready_timeout_waits_forever() {
        let args = SweepArgs {
            ready_timeout: Some(0),
            ..Default::default()
        };
        let settings = SweepSettings::resolve(&args, &FileConfig::default()).unwrap();
        assert_eq!(settings.bench.ready_timeout_secs, None);
    }

    #[test]
    fn test_invalid_settings_are_fatal() {
        let args = SweepArgs {
            conc_list: Some("".to_string()),
            ..Default::default()
        };
        assert!(SweepSettings::resolve(&args, &FileConfig::default()).is_err());

        let args = SweepArgs {
            on_query_error: Some("retry".to_string()),
            ..Default::default()
        };
        assert!(SweepSettings::resolve(&args, &FileConfig::default()).is_err());
    }

    #[test]
    fn test_resolve_milvus_defaults_and_validation() {
        let config = resolve_milvus(&BackendArgs::default(), &FileConfig::default()).unwrap();
        assert_eq!(config.uri, "http://localhost:19530");
        assert_eq!(config.token, "root:Milvus");

        let args = BackendArgs {
            uri: Some("localhost:19530".to_string()),
            ..Default::default()
        };
        assert!(resolve_milvus(&args, &FileConfig::default()).is_err());
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format("json"), LogFormat::Json);
        assert_eq!(parse_log_format("JSON"), LogFormat::Json);
        assert_eq!(parse_log_format("text"), LogFormat::Text);
        assert_eq!(parse_log_format("anything"), LogFormat::Text);
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "conc-bench",
            "--log-level",
            "debug",
            "run",
            "--uri",
            "http://milvus:19530",
            "-c",
            "1,5,10",
            "-d",
            "30",
        ])
        .unwrap();

        match cli.command {
            Command::Run { backend, sweep } => {
                assert_eq!(backend.uri.as_deref(), Some("http://milvus:19530"));
                assert_eq!(sweep.conc_list.as_deref(), Some("1,5,10"));
                assert_eq!(sweep.duration, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
