//! Clinic API server binary.
//!
//! Prints `{"port": N}` to stdout once bound so a supervising process can
//! discover an ephemeral port.

use clap::Parser;
use clinic_api::config::ApiConfig;
use tracing::info;

/// CLI arguments for the API server. Unset values fall back to the
/// environment (see [`ApiConfig::from_env`]).
#[derive(Parser, Debug)]
#[command(name = "clinic_api_server", about = "Clinic portal API server")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:3100 (port 0 = ephemeral).
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Skip seeding the demo accounts.
    #[arg(long, default_value_t = false)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Write logs to stderr so stdout is reserved for the JSON port message.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clinic_api=debug,clinic_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.no_seed {
        config.seed_demo_accounts = false;
    }

    info!(
        bind_addr = %config.bind_addr,
        access_token_ttl_secs = config.access_token_ttl_secs,
        refresh_token_ttl_days = config.refresh_token_ttl_days,
        "starting clinic_api_server"
    );

    let state = clinic_api::AppState::new(config.clone());
    if config.seed_demo_accounts {
        state.directory.seed_demo_accounts()?;
        info!(accounts = state.directory.len(), "demo accounts seeded");
    }
    state.refresh_tokens.spawn_cleanup_task();

    let app = clinic_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    println!("{}", serde_json::json!({"port": local_addr.port()}));
    info!(addr = %local_addr, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
