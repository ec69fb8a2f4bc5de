use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use throttle::config::ThrottleConfig;
use throttle::ratelimit::{RateLimitPolicy, RateLimiter};
use throttle::response::{build_exceeded_response, quota_headers};

/// Run rate limit checks against the configured counter stores.
#[derive(Parser, Debug)]
#[command(name = "throttle", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Caller identity to count requests for
    #[arg(short, long)]
    identity: String,

    /// Named policy from configuration
    #[arg(short, long, default_value = "general")]
    policy: String,

    /// Override the policy quota (requires --window-secs)
    #[arg(long, requires = "window_secs")]
    max_requests: Option<u32>,

    /// Override the policy window in seconds (requires --max-requests)
    #[arg(long, requires = "max_requests")]
    window_secs: Option<u64>,

    /// Number of checks to run
    #[arg(short, long, default_value_t = 1)]
    repeat: u32,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ThrottleConfig::load(args.config.as_deref())?;
    let policy = match (args.max_requests, args.window_secs) {
        (Some(max), Some(secs)) => {
            RateLimitPolicy::new(max, Duration::from_secs(secs), args.policy.clone())?
        }
        _ => config.policies.policy(&args.policy)?,
    };
    info!(
        policy = %policy.namespace(),
        max_requests = policy.max_requests(),
        window = ?policy.window(),
        "Policy loaded"
    );

    let limiter = RateLimiter::from_config(&config)?;
    info!(mode = %limiter.mode(), "Rate limiter initialized");

    for _ in 0..args.repeat {
        let result = limiter.check_rate_limit(&args.identity, &policy).await;

        if result.allowed {
            let headers = quota_headers(&result);
            info!(?headers, "Request allowed");
            println!("{}", serde_json::to_string(&result)?);
            continue;
        }

        let rejection = build_exceeded_response(&result);
        info!(status = %rejection.status, headers = ?rejection.headers, "Request rejected");
        println!("{}", serde_json::to_string(&result)?);
        println!("{}", rejection.body_json()?);
    }

    Ok(())
}
