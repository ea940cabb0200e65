//! Gateway entrypoint: load configuration, load the local model if one is
//! configured (fatal on failure), then serve.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ft_gateway::backends::LocalOnnxBackend;
use ft_gateway::{server, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    // Startup is the only synchronization point: the local model must finish
    // loading before the listener accepts traffic, and a load failure aborts
    // the process instead of serving degraded traffic.
    let local = match config.onnx_dir.clone() {
        Some(dir) => {
            info!(artifact_dir = %dir.display(), "loading local model");
            let backend =
                tokio::task::spawn_blocking(move || LocalOnnxBackend::load(&dir)).await??;
            Some(Arc::new(backend))
        }
        None => {
            warn!("ONNX_DIR not set; local generation disabled");
            None
        }
    };

    let bind_addr = config.bind_addr;
    let state = Arc::new(server::build_state(config, local)?);
    let app = server::build_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
