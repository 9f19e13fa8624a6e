use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{ConnectInfo, Request},
    routing::any,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tower_http::trace::TraceLayer;
use wicket::{
    adapters::{AllowlistRefresher, HttpClientAdapter, HttpHandler},
    config::{GatewayConfigValidator, loader::load_config},
    core::{ServiceRegistry, UpstreamForwarder},
    ports::http_client::HttpClient,
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");

    let config = load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    GatewayConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration: {e}"))?;

    let registry = Arc::new(
        ServiceRegistry::from_config(&config)
            .map_err(|e| eyre!("Failed to build service registry: {e}"))?,
    );

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);

    if config.allowlist.enabled {
        let refresher =
            AllowlistRefresher::new(registry.clone(), http_client.clone(), &config.allowlist);
        tokio::spawn(async move {
            refresher.run().await;
        });
    } else {
        tracing::info!("Access control is disabled; allow-list refresher not started.");
    }

    let forwarder = Arc::new(UpstreamForwarder::new(
        http_client.clone(),
        Duration::from_secs(config.upstream.request_timeout_secs),
    ));
    let handler = Arc::new(HttpHandler::new(registry.clone(), forwarder));

    let make_request_route = |handler: Arc<HttpHandler>| {
        any(
            move |ConnectInfo(peer): ConnectInfo<SocketAddr>, req: Request| {
                let handler = handler.clone();
                async move { handler.handle_request(req, peer).await }
            },
        )
    };

    let app = Router::new()
        .route("/{*path}", make_request_route(handler.clone()))
        .route("/", make_request_route(handler.clone()))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(services = registry.len(), "wicket gateway listening on {addr}");
    println!(
        "wicket gateway listening on {addr} ({} services)",
        registry.len()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    // First check if file exists and is readable
    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    // Try to parse the configuration
    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    // Validate the configuration
    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Services: {}", config.services.len());
            println!("   • Access Control: {}", config.allowlist.enabled);
            println!(
                "   • Refresh Interval: {} min",
                config.allowlist.refresh_interval_mins
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure target and allowlist URLs start with http:// or https://");
            println!("   • Service names may only contain letters and dashes");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Static ranges must be CIDR literals (e.g., '10.0.0.0/8')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# wicket gateway configuration

# The address to listen on
listen_addr: "0.0.0.0:8080"

# Allow-list refresh settings
allowlist:
  enabled: true
  refresh_interval_mins: 5
  fetch_timeout_secs: 10

# Outbound forwarding settings
upstream:
  request_timeout_secs: 30

# Named services, addressed as /{name}
services:
  billing:
    target: "http://billing.internal:8000/api/charge"
    allowlist_url: "https://config.internal/networks.json"
    allowlist_query_path: "ranges[*]"

  # A service gated by a fixed set of networks instead of a remote source
  # metrics-push:
  #   target: "http://metrics.internal:9000/ingest"
  #   static_allowed_ranges: ["10.0.0.0/8"]
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'wicket serve --config {config_path}' to start the gateway");
    Ok(())
}
