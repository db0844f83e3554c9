//! Relay one file from a Telegram chat through the full pipeline
//!
//! Usage: cargo run --example telegram_ingest
//!
//! Reads its settings from the environment (or a .env file):
//! - `TELEGRAM_BOT_TOKEN` - Bot token
//! - `TELEGRAM_CHAT_ID` - Chat the file was posted in
//! - `TELEGRAM_FILE_ID` - file_id of the posted document
//! - `TELEGRAM_FILE_NAME` - Its file name
//! - `TELEGRAM_DEST_CHAT_ID` - Chat to relay into (optional, defaults to the source chat)

use archive_relay::{
    BotApiTransport, Config, Error, Event, IncomingTransfer, Ingestor, run_with_shutdown,
};
use std::sync::Arc;

fn required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(name).map_err(|_| format!("{name} not set").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Install a subscriber to see the library's logs:
    // tracing_subscriber::fmt::init();

    let token = required("TELEGRAM_BOT_TOKEN")?;
    let chat_id: i64 = required("TELEGRAM_CHAT_ID")?.parse()?;
    let file_id = required("TELEGRAM_FILE_ID")?;
    let file_name = required("TELEGRAM_FILE_NAME")?;
    let destination: Option<i64> = match std::env::var("TELEGRAM_DEST_CHAT_ID") {
        Ok(raw) => Some(raw.parse()?),
        Err(_) => None,
    };

    let transport = Arc::new(BotApiTransport::new(token)?);
    let ingestor = Ingestor::with_configured_probe(Config::default(), transport).await?;

    let mut events = ingestor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Downloading { percent, .. } => println!("  download {percent:.1}%"),
                Event::Transmitting { entry, percent, .. } => {
                    println!("  upload {entry}: {percent:.1}%")
                }
                Event::EntryTransmitted { entry, link, .. } => println!("  sent {entry} -> {link}"),
                Event::EntryFailed { entry, error, .. } => println!("  FAILED {entry}: {error}"),
                other => println!("{other:?}"),
            }
        }
    });

    let mut transfer = IncomingTransfer::new(chat_id, file_name, 0, file_id);
    transfer.destination_chat_id = destination;

    // Ctrl+C cancels the run; its working area is still removed
    tokio::select! {
        result = ingestor.ingest(transfer) => match result {
            Ok(report) => println!(
                "Done: {} sent, {} failed",
                report.transmitted,
                report.failures.len()
            ),
            Err(Error::Cancelled { .. }) => println!("Interrupted"),
            Err(e) => return Err(e.into()),
        },
        result = run_with_shutdown(ingestor.clone()) => {
            result?;
            println!("Interrupted");
        }
    }

    Ok(())
}
