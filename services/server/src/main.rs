// object-store-server: serves the IPC and RPC endpoints over the shared
// object store protocol.

use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "object store server starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/object-store/server.json".to_string());

    let spec = match server::config::load_from_path(std::path::Path::new(&config_path)) {
        Ok(spec) => {
            info!(
                ipc_socket = %spec.ipc_socket.display(),
                rpc_endpoint = %spec.rpc_endpoint,
                "config loaded"
            );
            spec
        }
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let mut supervisor = match server::Supervisor::start(spec).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("FATAL: failed to start server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown signal received");
    supervisor.stop().await;
    info!("server stopped");
}
