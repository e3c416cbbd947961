//! Demo client
//!
//! Connects to an in-process broker advertised on the configured server URL,
//! then walks through the basic flows: two channel subscriptions, a few
//! fire-and-forget publishes, a `help` responder answering a request, and a
//! graceful drain.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use subjectbus::config::{Settings, load_config_from};
use subjectbus::utils::logging;
use subjectbus::{BoxError, ConnectOptions, Error, HandlerResult, LocalBroker, Message, connect};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "subjectbus", about = "Publish/subscribe and request/reply demo")]
struct Args {
    /// Configuration file, without extension
    #[arg(long, env = "SUBJECTBUS_CONFIG", default_value = "config/default")]
    config: String,

    /// Server URL, overrides the configured list
    #[arg(long)]
    server: Option<String>,

    /// Log level, overrides the configured one
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let mut settings = match load_config_from(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(
        args.log_level
            .as_deref()
            .unwrap_or(&settings.logging.level),
    );
    if let Some(server) = args.server {
        settings.connection.servers = vec![server];
    }

    if let Err(e) = run(settings).await {
        error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn message_handler(msg: Message) -> HandlerResult {
    println!(
        "Received a message on '{} {}': {}",
        msg.subject(),
        msg.reply_to().map(|r| r.as_str()).unwrap_or(""),
        String::from_utf8_lossy(msg.payload())
    );
    Ok(())
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let url = settings
        .connection
        .servers
        .first()
        .cloned()
        .ok_or(Error::NoServers)?;
    let broker = LocalBroker::new(url);
    let nc = connect(ConnectOptions::from_settings(&settings, Arc::new(broker.clone()))).await?;

    let sub1 = nc.subscribe("channel1", message_handler)?;
    let sub2 = nc.subscribe("channel2", message_handler)?;

    nc.publish("channel1", "Hello from channel1")?;
    nc.publish("channel1", "Sensors are working")?;
    nc.publish("channel1", "Bye from channel1")?;

    nc.publish("channel2", "Hello from channel2")?;
    nc.publish("channel2", "Rocket is healthy")?;
    nc.publish("channel2", "Bye from channel2")?;

    let responder = nc.clone();
    let help = nc.queue_subscribe("help", "workers", move |msg: Message| {
        let nc = responder.clone();
        async move {
            println!(
                "Received a message on '{} {}': {}",
                msg.subject(),
                msg.reply_to().map(|r| r.as_str()).unwrap_or(""),
                String::from_utf8_lossy(msg.payload())
            );
            nc.respond(&msg, "I help you")?;
            Ok::<(), BoxError>(())
        }
    })?;

    let timeout = Duration::from_millis(settings.connection.request_timeout_ms);
    match nc.request("help", "Plz help me", timeout).await {
        Ok(response) => println!(
            "Received response: {}",
            String::from_utf8_lossy(response.payload())
        ),
        Err(Error::Timeout) => println!("Request timed out"),
        Err(e) => return Err(e.into()),
    }

    help.unsubscribe();
    nc.drain().await;

    info!(
        channel1 = sub1.delivered(),
        channel2 = sub2.delivered(),
        routed = broker.routed(),
        stats = ?nc.stats(),
        "demo finished"
    );
    Ok(())
}
