use anyhow::{Context, Result};
use reqwest::Method;

use jobboard_client::config::{CliArgs, Config, LogFormat};
use jobboard_client::{ApiClients, Domain, RequestDescriptor, SessionState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, args) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .init(),
    }

    let domain: Domain = args.domain.parse()?;
    let request = build_request(&args)?;

    let clients = ApiClients::new(&config)?;

    // Session listeners: a state tracker plus a log of raw events
    let state = SessionState::new();
    let tracker = state.track(clients.subscribe());
    let mut event_log = clients.subscribe();

    tracing::debug!(
        domain = %domain,
        method = %request.method(),
        path = request.path(),
        "Sending request"
    );

    let result = clients.for_domain(domain).send(request).await;

    while let Some(event) = event_log.try_recv() {
        tracing::info!(
            event = event.name(),
            payload = %serde_json::to_string(&event).unwrap_or_default(),
            "Session event"
        );
    }

    // Dropping the clients closes the hub, which ends the tracker
    drop(clients);
    tracker.await.context("Session tracker task failed")?;
    let snapshot = state.snapshot().await;
    tracing::debug!(status = ?snapshot.status, user = ?snapshot.user, "Final session state");

    let response = result?;
    match response.json::<serde_json::Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.text()),
    }

    Ok(())
}

/// Turn CLI arguments into a request descriptor
fn build_request(args: &CliArgs) -> Result<RequestDescriptor> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", args.method))?;

    let mut request = RequestDescriptor::new(method, args.path.clone());

    for pair in &args.query {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Query parameter must be key=value: {}", pair))?;
        request = request.query(key, value);
    }

    if let Some(data) = &args.data {
        let body: serde_json::Value =
            serde_json::from_str(data).context("--data must be valid JSON")?;
        request = request.json(&body)?;
    }

    Ok(request)
}
