//! Sign in and print the first page of surveys.
//!
//! ```text
//! SURVEY_CLIENT_ID=... SURVEY_CLIENT_SECRET=... \
//!     cargo run -p core-service --example list_surveys -- john@appleseed.com 12345678
//! ```

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::{bootstrap_desktop, CoreEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let mut args = std::env::args().skip(1);
    let (Some(email), Some(password)) = (args.next(), args.next()) else {
        eprintln!("usage: list_surveys <email> <password>");
        std::process::exit(2);
    };

    let service = bootstrap_desktop()?;
    let mut events = service.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let CoreEvent::Auth(auth) = &event;
            tracing::info!(severity = ?event.severity(), event = ?auth, "{}", event.description());
        }
    });

    let client = service.client();
    if !client.has_credentials().await {
        client.authenticate(&email, &password).await?;
    }

    for survey in client.fetch_surveys(1, 10).await? {
        println!("{}  {}", survey.id, survey.title);
        if let Some(cover) = survey.high_resolution_cover_image_url() {
            println!("    {cover}");
        }
    }

    Ok(())
}
