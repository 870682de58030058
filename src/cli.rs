//! Command-line interface for llm-proxy
//!
//! Provides argument parsing and subcommand handling for the llm-proxy binary.

use clap::{Parser, Subcommand};

/// HTTP gateway for chat-completion backends
#[derive(Parser)]
#[command(name = "llm-proxy")]
#[command(version)]
#[command(about = "HTTP gateway for chat-completion backends")]
#[command(
    long_about = "llm-proxy accepts chat-completion requests, validates them, and forwards \
    them to the backend configured for the requested model, either as a single response \
    or as a server-sent event stream."
)]
pub struct Cli {
    /// Path to configuration file (defaults plus environment when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# llm-proxy Configuration
# ========================
#
# Every value below is the built-in default. Environment variables override
# the file; the variable name is given next to each setting.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# Bind address (HOST)
host = "0.0.0.0"

# Port to listen on (PORT)
port = 8000

# Reject request bodies larger than this many bytes with 413; 0 disables the
# limit (MAX_REQUEST_BYTES)
max_request_bytes = 0

# ─────────────────────────────────────────────────────────────────────────────
# OPENAI-COMPATIBLE BACKEND
# ─────────────────────────────────────────────────────────────────────────────

[provider]
# Base URL; requests go to {base_url}/chat/completions (OPENAI_COMPAT_BASE_URL)
base_url = "http://localhost:11434/v1"

# Static bearer key, used when the caller sends no Authorization header of its
# own (OPENAI_COMPAT_API_KEY)
# api_key = "sk-..."

# Timeout for non-streaming calls; streams have no read timeout
# (OPENAI_COMPAT_TIMEOUT_SECONDS)
timeout_seconds = 600

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────

[routing]
# pattern=provider pairs, comma separated. Exact names win over `prefix*`
# patterns; patterns are tried in order (MODEL_PROVIDER_MAP)
model_provider_map = ""

# Provider for models that match nothing. "stub" answers locally; "ollama",
# "openai", "vllm" and friends use the backend above (LLM_PROVIDER)
default_provider = "stub"

# ─────────────────────────────────────────────────────────────────────────────
# RATE LIMITING
# ─────────────────────────────────────────────────────────────────────────────
#
# Sliding window per caller. Callers are keyed by Authorization header, else
# client IP address.

[rate_limit]
enabled = false               # RATE_LIMIT_ENABLED
window_seconds = 60           # RATE_LIMIT_WINDOW_SECONDS
max_requests = 60             # RATE_LIMIT_MAX_REQUESTS
sweep_interval_seconds = 60   # RATE_LIMIT_SWEEP_INTERVAL_SECONDS

# ─────────────────────────────────────────────────────────────────────────────
# API KEY AUTH
# ─────────────────────────────────────────────────────────────────────────────

[auth]
# Require an x-api-key header on every route (API_KEY_AUTH_ENABLED)
enabled = false

# Accepted keys (API_KEYS, comma separated)
api_keys = []

# ─────────────────────────────────────────────────────────────────────────────
# CORS
# ─────────────────────────────────────────────────────────────────────────────

[cors]
# "*" allows any origin (CORS_ALLOW_ORIGINS, comma separated)
allow_origins = ["*"]

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (LOG_LEVEL)
# RUST_LOG takes precedence when set
log_level = "info"

# Per-request access log lines (LOG_REQUESTS)
log_requests = false

# Prometheus metrics are always available at /metrics
"#
}
