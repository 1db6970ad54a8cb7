use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chatgate_catalog::ModelCatalog;
use chatgate_config::{FileStore, KvStore, ServerConfig};

use crate::routes;

pub struct ServerState {
    pub config: ServerConfig,
    pub client: Client,
    pub catalog: ModelCatalog,
}

impl ServerState {
    pub fn new(config: ServerConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            config,
            client: Client::new(),
            catalog: ModelCatalog::new(store),
        }
    }

    pub fn from_env() -> Self {
        let config = ServerConfig::from_env();
        let store = Arc::new(FileStore::in_data_dir(&config.data_dir));
        Self::new(config, store)
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn run_server(addr: SocketAddr) -> anyhow::Result<()> {
    run_server_with_state(addr, Arc::new(ServerState::from_env())).await
}

pub async fn run_server_with_state(
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let app = routes::router()
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
