//! Gateway configuration.
//!
//! Built from the command line and validated before anything connects.

use std::time::Duration;

use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;

use crate::cli::Cli;
use crate::error::GatewayError;
use crate::gateway::ReconnectConfig;
use crate::transport::WebSocketConnector;

/// Expected shape of the upstream URL, shown when it is missing or invalid.
pub const URL_FORMAT_HINT: &str = "Format: wss://<host>/<workspace>/functions/<function>";

/// Validated gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upstream WebSocket URL.
    pub upstream_url: String,
    /// Extra headers for the upstream handshake.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
    /// How long a request waits for a connection.
    pub wait_timeout: Duration,
    /// Bound on connect plus handshake.
    pub connect_timeout: Duration,
    /// Bound on a single upstream request.
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// Build and validate a configuration from parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the URL is missing or invalid, a
    /// header is malformed, or a timing value is out of range.
    pub fn from_cli(cli: &Cli) -> Result<Self, GatewayError> {
        let upstream_url = match cli.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                return Err(GatewayError::Config(format!(
                    "Please provide a WebSocket URL with the --url flag or MCP_WEBSOCKET_URL. {URL_FORMAT_HINT}"
                )));
            }
        };
        validate_url(&upstream_url)?;

        let headers = cli
            .header_lines()
            .map(parse_header)
            .collect::<Result<Vec<_>, _>>()?;

        let max_retries = if cli.max_retries < 0 {
            None
        } else {
            Some(u32::try_from(cli.max_retries).map_err(|_| {
                GatewayError::Config(format!("max retries out of range: {}", cli.max_retries))
            })?)
        };

        let config = Self {
            upstream_url,
            headers,
            reconnect: ReconnectConfig {
                max_retries,
                initial_delay: Duration::from_millis(cli.initial_delay_ms),
                max_delay: Duration::from_millis(cli.max_delay_ms),
                backoff_multiplier: cli.backoff_multiplier,
            },
            wait_timeout: Duration::from_millis(cli.wait_timeout_ms),
            connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
            request_timeout: Duration::from_millis(cli.request_timeout_ms),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), GatewayError> {
        validate_url(&self.upstream_url)?;
        self.reconnect.validate()?;

        if self.connect_timeout.is_zero() {
            return Err(GatewayError::Config(
                "connect timeout must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(GatewayError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the upstream connector described by this configuration.
    #[must_use]
    pub fn connector(&self) -> WebSocketConnector {
        WebSocketConnector::new(self.upstream_url.clone())
            .with_headers(self.headers.clone())
            .with_connect_timeout(self.connect_timeout)
            .with_request_timeout(self.request_timeout)
    }
}

fn validate_url(raw: &str) -> Result<(), GatewayError> {
    let url = Url::parse(raw)
        .map_err(|e| GatewayError::Config(format!("invalid upstream URL '{raw}': {e}. {URL_FORMAT_HINT}")))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(GatewayError::Config(format!(
                "unsupported URL scheme '{other}', expected ws or wss. {URL_FORMAT_HINT}"
            )));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(GatewayError::Config(format!(
            "upstream URL '{raw}' has no host. {URL_FORMAT_HINT}"
        )));
    }

    Ok(())
}

/// Parse a `Name: value` header.
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), GatewayError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| GatewayError::Config(format!("invalid header '{raw}', expected 'Name: value'")))?;

    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| GatewayError::Config(format!("invalid header name in '{raw}': {e}")))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| GatewayError::Config(format!("invalid header value in '{raw}': {e}")))?;

    Ok((name, value))
}
