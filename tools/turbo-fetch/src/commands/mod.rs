//! CLI command implementations.

pub mod config;
pub mod request;

use clap::{Args, ValueEnum};
use turbo_net::Method;

/// HTTP method as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl From<MethodArg> for Method {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => Method::Get,
            MethodArg::Head => Method::Head,
            MethodArg::Post => Method::Post,
            MethodArg::Put => Method::Put,
            MethodArg::Patch => Method::Patch,
            MethodArg::Delete => Method::Delete,
            MethodArg::Options => Method::Options,
        }
    }
}

/// Arguments for the request command.
#[derive(Args)]
pub struct RequestArgs {
    /// Endpoint path, relative to the base URL, or an absolute URL.
    pub path: String,

    /// HTTP method.
    #[arg(short = 'X', long, value_enum, default_value = "get")]
    pub method: MethodArg,

    /// Parameter as key=value. Values that parse as JSON are sent as JSON.
    #[arg(short, long = "param")]
    pub params: Vec<String>,

    /// Header as "Name: value".
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Bearer token (overrides the config file).
    #[arg(long, env = "TURBO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Refresh token (overrides the config file).
    #[arg(long, env = "TURBO_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Explicit deduplication key.
    #[arg(long)]
    pub task_id: Option<String>,

    /// Issue the request this many times concurrently through the
    /// deduplicating cache.
    #[arg(long, default_value = "1")]
    pub repeat: usize,

    /// Cap on retries per request (overrides the config file).
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    /// Include secrets in the output.
    #[arg(long)]
    pub show_secrets: bool,
}
