use clap::Parser;
use std::path::PathBuf;
use url::Url;

/// testdeck: author test cases, trigger web-agent runs, keep run history.
#[derive(Parser, Debug, Clone)]
#[command(name = "testdeck")]
pub struct CliArgs {
    /// Dashboard HTTP port
    #[arg(long = "port", env = "TESTDECK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding testdeck.db and the rolling log files
    #[arg(short = 'd', long = "data-dir", env = "TESTDECK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the web-agent backend (serves /run)
    #[arg(short = 'a', long = "agent-url", env = "TESTDECK_AGENT_URL", default_value = DEFAULT_AGENT_URL)]
    pub agent_url: String,

    /// Base URL serving /api/test_runs/{id}/details (defaults to --agent-url)
    #[arg(long = "details-url", env = "TESTDECK_DETAILS_URL")]
    pub details_url: Option<String>,

    /// Import a browser local-storage export before serving
    #[arg(short = 'i', long = "import")]
    pub import: Option<PathBuf>,

    /// Start with empty collections instead of the seed dataset
    #[arg(long = "no-seed")]
    pub no_seed: bool,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub agent_url: Url,
    pub details_url: Url,
    pub import: Option<PathBuf>,
    pub seed: bool,
}

pub const DEFAULT_PORT: u16 = 9880;
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:5000";

// Storage keys, one serialized collection each
pub const KEY_USERS: &str = "users";
pub const KEY_ACTIONS: &str = "actions";
pub const KEY_TEST_CASES: &str = "testCases";
pub const KEY_TEST_RUNS: &str = "testRuns";
pub const KEY_CURRENT_USER: &str = "currentUserId";

pub const DB_FILE_NAME: &str = "testdeck.db";
pub const LOG_FILE_PREFIX: &str = "testdeck.log";

// Activity log constants
pub const ACTIVITY_BUFFER_SIZE: usize = 500;
pub const ACTIVITY_CHANNEL_CAPACITY: usize = 256;

// Outbound HTTP constants. /run has no client-side timeout.
pub const AUX_REQUEST_TIMEOUT_SECS: u64 = 10;

impl DashboardConfig {
    pub fn from_args(args: CliArgs) -> anyhow::Result<Self> {
        let agent_url = parse_base_url(&args.agent_url)?;
        let details_url = match args.details_url.as_deref() {
            Some(raw) => parse_base_url(raw)?,
            None => agent_url.clone(),
        };
        let data_dir = args.data_dir.unwrap_or_else(default_data_dir);

        Ok(DashboardConfig {
            port: args.port,
            data_dir,
            agent_url,
            details_url,
            import: args.import,
            seed: !args.no_seed,
        })
    }

    /// Path of the SQLite key-value file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("testdeck"))
        .unwrap_or_else(|| PathBuf::from(".testdeck"))
}

/// Parse a base URL, rejecting anything that is not http(s).
pub fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported URL scheme '{}' in {}", other, raw),
    }
}

/// Join a path onto a base URL, keeping any path prefix the base carries.
pub fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
