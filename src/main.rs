//! Bot Risk Agent for Zentinel
//!
//! Command-line front end for decoding risk cookies, evaluating a single
//! request and resetting visitors.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zentinel_agent_bot_risk::api::{Header, ResetReason};
use zentinel_agent_bot_risk::{
    BotRiskAgent, BotRiskConfig, CookieCodec, HttpTransport, RequestInfo,
};

const API_TOKEN_ENV: &str = "BOT_RISK_API_TOKEN";
const SECRET_KEY_ENV: &str = "BOT_RISK_SECRET_KEY";

#[derive(Parser, Debug)]
#[command(name = "zentinel-agent-bot-risk")]
#[command(author, version, about = "Bot risk evaluation agent for Zentinel")]
struct Args {
    /// Path to configuration file (JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable JSON logging format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decrypt and verify a risk cookie
    Decode {
        /// Raw cookie value
        #[arg(long)]
        cookie: String,

        /// User-Agent the cookie was issued to
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Evaluate a single request against the risk API
    Evaluate {
        #[command(flatten)]
        request: RequestArgs,

        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,

        /// Raw risk cookie value
        #[arg(long)]
        cookie: Option<String>,
    },

    /// Reset a visitor after a solved challenge
    Reset {
        #[command(flatten)]
        request: RequestArgs,

        /// Visitor id to reset
        #[arg(long)]
        vid: String,

        /// Reset reason (captcha_solved, customer_support, other)
        #[arg(long, default_value = "captcha_solved")]
        reason: String,
    },
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Client IP address
    #[arg(long)]
    ip: String,

    /// Full request URL
    #[arg(long)]
    url: String,

    /// Request path
    #[arg(long)]
    path: Option<String>,

    /// User-Agent header
    #[arg(long)]
    user_agent: Option<String>,
}

impl RequestArgs {
    fn into_request(self, method: String, risk_cookie: Option<(&str, String)>) -> RequestInfo {
        let mut headers = Vec::new();
        if let Some(user_agent) = self.user_agent {
            headers.push(Header::new("user-agent", user_agent));
        }
        if let Some((name, value)) = risk_cookie {
            headers.push(Header::new("cookie", format!("{name}={value}")));
        }

        RequestInfo {
            client_ip: self.ip,
            url: self.url,
            path: self.path,
            method,
            http_version: "1.1".to_string(),
            headers,
        }
    }
}

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env()
        .add_directive(level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<BotRiskConfig> {
    let mut config: BotRiskConfig = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
                serde_yaml::from_str(&content)?
            } else {
                serde_json::from_str(&content)?
            }
        }
        None => BotRiskConfig::default(),
    };

    // Secrets may be kept out of the config file
    if let Ok(token) = std::env::var(API_TOKEN_ENV) {
        config.api_token = token;
    }
    if let Ok(secret) = std::env::var(SECRET_KEY_ENV) {
        config.secret_key = secret;
    }

    Ok(config)
}

fn build_agent(config: BotRiskConfig) -> Result<BotRiskAgent> {
    let transport = HttpTransport::new(&config.api)?;
    let agent = BotRiskAgent::new(config, Arc::new(transport))?;
    info!(
        agent = agent.name(),
        base_url = %agent.config().api.base_url,
        threshold = agent.config().score_threshold,
        "Bot risk agent ready"
    );
    Ok(agent)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(args.json_logs, &args.log_level);

    // Load configuration
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Decode { cookie, user_agent } => {
            config.validate()?;
            let codec = CookieCodec::new(config.secret_key, config.max_cookie_iterations);
            let decoded = codec.decode(Some(&cookie), user_agent.as_deref(), SystemTime::now())?;
            println!("{}", serde_json::to_string_pretty(&decoded.summary())?);
        }
        Command::Evaluate {
            request,
            method,
            cookie,
        } => {
            let request = request.into_request(
                method,
                cookie.map(|value| (config.cookie_name.as_str(), value)),
            );
            let agent = build_agent(config)?;

            let evaluation = agent.evaluate(&request).await?;
            println!("{}", serde_json::to_string_pretty(&evaluation.summary())?);
        }
        Command::Reset {
            request,
            vid,
            reason,
        } => {
            let reason: ResetReason = reason.parse()?;
            let agent = build_agent(config)?;
            let request = request.into_request("GET".to_string(), None);

            let uuid = agent.reset_with_reason(&request, &vid, reason).await?;
            println!("{uuid}");
        }
    }

    Ok(())
}
