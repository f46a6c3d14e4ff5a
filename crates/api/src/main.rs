use api::{
    build_app, init_auth_state, init_database, init_domain_services, init_inference_provider,
    init_web_search,
};
use config::{ApiConfig, LoggingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = ApiConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    let database = init_database(&config.database).await;

    let engine = init_inference_provider(&config.inference).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create inference provider");
        std::process::exit(1);
    });
    let web_search = init_web_search(&config.search).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create web search provider");
        std::process::exit(1);
    });

    let auth_state = init_auth_state(
        database.users.clone(),
        database.sessions.clone(),
        &config.auth,
    );
    let services = init_domain_services(
        database.conversations.clone(),
        database.usage.clone(),
        engine,
        web_search,
        &config.inference,
        &config.chat,
        &config.quota,
    );
    let app = build_app(auth_state, services);

    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            error!(address = %bind_address, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    info!(address = %bind_address, "Server started");
    info!("  - POST /chat");
    info!("  - GET  /chats");
    info!("  - GET  /chats/{{chat_id}}");
    info!("  - GET  /health");
    info!("  - GET  /openapi.json");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
    }

    database.close();
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
