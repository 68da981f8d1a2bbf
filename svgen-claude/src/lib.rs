use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod extract;
pub mod prompt;

pub use extract::extract_svg;
pub use prompt::{SYSTEM_PROMPT, SvgRequest, build_prompt};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const API_KEY_PREFIX: &str = "sk-ant-";
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("Anthropic API key is missing")]
    MissingApiKey,
    #[error(
        "Anthropic API rejected the credential (HTTP {status}): {}",
        .message.as_deref().unwrap_or("no details")
    )]
    Unauthorized { status: u16, message: Option<String> },
    #[error(
        "Anthropic API rate limit reached: {}",
        .message.as_deref().unwrap_or("no details")
    )]
    RateLimited {
        retry_after: Option<Duration>,
        message: Option<String>,
    },
    #[error(
        "Anthropic API returned HTTP {status}: {}",
        .message.as_deref().unwrap_or("no details")
    )]
    Status { status: u16, message: Option<String> },
    #[error("request to the Anthropic API failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Anthropic API response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
    #[error(
        "Anthropic API response did not contain SVG markup{}",
        truncation_note(.truncated)
    )]
    NoSvgMarkup { truncated: bool },
}

impl ClaudeError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_timeout() || error.is_connect(),
            Self::RateLimited { .. } => true,
            Self::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based). A server hint
    /// replaces the computed delay but is still capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            self.initial_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        });
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Anything that can turn an instruction into SVG markup.
pub trait SvgGenerator {
    fn generate(&self, instruction: &str) -> Result<String, ClaudeError>;
}

impl<T: SvgGenerator + ?Sized> SvgGenerator for &T {
    fn generate(&self, instruction: &str) -> Result<String, ClaudeError> {
        (**self).generate(instruction)
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    /// Text blocks joined in order; other block kinds are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect()
    }

    pub fn hit_token_limit(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<TextBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct TextBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> MessagesRequest<'a> {
    fn new(settings: &'a ClientSettings, instruction: &'a str) -> Self {
        Self {
            model: &settings.model,
            max_tokens: settings.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: vec![TextBlock {
                    kind: "text",
                    text: instruction,
                }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

/// Blocking client for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    http: Client,
    api_key: String,
    endpoint: String,
    settings: ClientSettings,
}

impl ClaudeClient {
    /// Build a client with its own HTTP connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`ClaudeError::MissingApiKey`] when the key is empty or
    /// whitespace only.
    pub fn new(api_key: impl Into<String>, settings: ClientSettings) -> Result<Self, ClaudeError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ClaudeError::Transport)?;
        Self::with_http_client(api_key, settings, http)
    }

    /// Build a client around a preconfigured HTTP client.
    pub fn with_http_client(
        api_key: impl Into<String>,
        settings: ClientSettings,
        http: Client,
    ) -> Result<Self, ClaudeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClaudeError::MissingApiKey);
        }

        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            endpoint: endpoint_url(&settings.base_url),
            settings,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Send `instruction` as a single user message, retrying transient
    /// failures according to the configured [`RetryPolicy`].
    pub fn send_message(&self, instruction: &str) -> Result<MessagesResponse, ClaudeError> {
        let body = MessagesRequest::new(&self.settings, instruction);
        let policy = self.settings.retry;
        let mut attempt = 0;

        loop {
            log::debug!(
                "POST {} with model {} (attempt {}/{})",
                self.endpoint,
                self.settings.model,
                attempt + 1,
                policy.max_retries.saturating_add(1)
            );

            match self.send_once(&body) {
                Ok(response) => return Ok(response),
                Err(error) if error.is_transient() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt, error.retry_after());
                    log::warn!(
                        "Anthropic API request failed ({error}); retrying in {:.1}s",
                        delay.as_secs_f32()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn send_once(&self, body: &MessagesRequest<'_>) -> Result<MessagesResponse, ClaudeError> {
        let request = self
            .http
            .post(&self.endpoint)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body);

        let request = if self.api_key.starts_with(API_KEY_PREFIX) {
            request.header("x-api-key", &self.api_key)
        } else {
            request.bearer_auth(&self.api_key)
        };

        let response = request.send().map_err(ClaudeError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response));
        }

        let payload = response.text().map_err(ClaudeError::Transport)?;
        serde_json::from_str(&payload).map_err(ClaudeError::Decode)
    }
}

impl SvgGenerator for ClaudeClient {
    fn generate(&self, instruction: &str) -> Result<String, ClaudeError> {
        let response = self.send_message(instruction)?;
        let text = response.text();
        match extract_svg(&text) {
            Some(markup) => Ok(markup.to_string()),
            None => Err(ClaudeError::NoSvgMarkup {
                truncated: response.hit_token_limit(),
            }),
        }
    }
}

fn truncation_note(truncated: &bool) -> &'static str {
    if *truncated {
        " (output hit the max_tokens limit)"
    } else {
        ""
    }
}

fn endpoint_url(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

fn status_error(status: StatusCode, response: Response) -> ClaudeError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = response
        .text()
        .ok()
        .and_then(|body| error_message(&body));
    let status = status.as_u16();

    match status {
        401 | 403 => ClaudeError::Unauthorized { status, message },
        429 => ClaudeError::RateLimited {
            retry_after,
            message,
        },
        _ => ClaudeError::Status { status, message },
    }
}

fn error_message(body: &str) -> Option<String> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let ErrorDetail { kind, message } = envelope.error;
        return match (kind, message) {
            (Some(kind), Some(message)) => Some(format!("{kind}: {message}")),
            (None, Some(message)) => Some(message),
            (Some(kind), None) => Some(kind),
            (None, None) => None,
        };
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect())
    }
}
