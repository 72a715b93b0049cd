//! Trigger API: start harvest runs and list harvested channels.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::harvest::WorkerSupervisor;
use crate::store::ChannelStore;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<WorkerSupervisor>,
    pub store: Arc<dyn ChannelStore>,
}

impl AppState {
    pub fn new(supervisor: Arc<WorkerSupervisor>, store: Arc<dyn ChannelStore>) -> Self {
        Self { supervisor, store }
    }
}

/// Start the web server.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
