//! Command-line argument parsing with clap.

use clap::{Parser, ValueEnum};

/// Stdio MCP gateway relaying tool calls to a WebSocket MCP server.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Upstream WebSocket URL (ws:// or wss://).
    #[arg(short = 'w', long, env = "MCP_WEBSOCKET_URL")]
    pub url: Option<String>,

    /// Extra handshake header as "Name: value" (repeatable).
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Comma-separated "Name: value" headers, added after any --header.
    #[arg(long, env = "MCP_HEADERS", value_name = "LIST")]
    pub header_list: Option<String>,

    /// Reconnection attempts before giving up (-1 = retry forever).
    #[arg(
        long,
        env = "MCP_MAX_RETRIES",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    pub max_retries: i64,

    /// Delay before the first reconnection attempt, in milliseconds.
    #[arg(long, env = "MCP_INITIAL_DELAY_MS", default_value_t = 1000)]
    pub initial_delay_ms: u64,

    /// Upper bound on the reconnection delay, in milliseconds.
    #[arg(long, env = "MCP_MAX_DELAY_MS", default_value_t = 30_000)]
    pub max_delay_ms: u64,

    /// Growth factor applied to the delay after each attempt.
    #[arg(long, env = "MCP_BACKOFF_MULTIPLIER", default_value_t = 1.5)]
    pub backoff_multiplier: f64,

    /// How long a request waits for the upstream to come back, in milliseconds.
    #[arg(long, env = "MCP_WAIT_TIMEOUT_MS", default_value_t = 10_000)]
    pub wait_timeout_ms: u64,

    /// Bound on opening a connection and completing the handshake, in milliseconds.
    #[arg(long, env = "MCP_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Bound on a single upstream request, in milliseconds.
    #[arg(long, env = "MCP_REQUEST_TIMEOUT_MS", default_value_t = 60_000)]
    pub request_timeout_ms: u64,

    /// Log output format (logs always go to stderr).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Every requested header line: each `--header` verbatim, then the
    /// comma-separated entries of `--header-list`.
    pub fn header_lines(&self) -> impl Iterator<Item = &str> {
        let listed = self.header_list.as_deref().into_iter().flat_map(|list| list.split(','));
        self.headers
            .iter()
            .map(String::as_str)
            .chain(listed)
            .filter(|line| !line.trim().is_empty())
    }
}

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
