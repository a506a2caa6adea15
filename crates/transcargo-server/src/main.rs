//! TransCargo: content and lead-management backend for Asia Trans Cargo.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use transcargo_server::{build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("TRANSCARGO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "gen-key" | "--gen-key" => {
                println!("{}", transcargo_privacy::generate_key());
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("TransCargo: content and lead-management backend");
                println!();
                println!("Usage: transcargo [command]");
                println!();
                println!("Commands:");
                println!("  (none)       Start the server");
                println!("  gen-key      Print a fresh ENCRYPTION_KEY");
                println!("  help         Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'transcargo help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = transcargo_core::AppConfig::from_env(&data_dir)?;
    let port = config.port;

    let store = transcargo_store::SqliteStore::open(&config.data_paths.db)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;

    let state = Arc::new(AppState::new(config, store));
    state.start_background();

    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("TransCargo server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
