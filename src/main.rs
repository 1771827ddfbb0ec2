use std::sync::Arc;

use anyhow::{Context, Result};
use call_relay::call::control::TwilioCallControl;
use call_relay::config::{self, Config};
use call_relay::server::{self, AppState};
use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Relays phone calls between a media stream and a conversational agent")]
struct Cli {
    /// Address to listen on, overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<String>,
    /// Telephony encoding used when a stream does not announce one ("mulaw" or "alaw")
    #[arg(long)]
    encoding: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = Config::from_env().context("Failed to load application configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = config::parse_encoding(&encoding).context("Invalid --encoding")?;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!("Configuration loaded: {:?}", config.agent);

    let settings = config.session_settings();
    let control = Arc::new(TwilioCallControl::new(
        &config.twilio_api_base,
        &config.twilio_account_sid,
        config.twilio_auth_token,
    ));
    let state = Arc::new(AppState {
        agent: config.agent.clone(),
        encoding: config.encoding.clone(),
        settings,
        control,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    tracing::info!(
        "Listening on {}, media streams at {}",
        config.bind_address,
        server::AUDIO_STREAM_PATH
    );

    axum::serve(listener, server::router(state))
        .await
        .context("Server failed")?;
    Ok(())
}
