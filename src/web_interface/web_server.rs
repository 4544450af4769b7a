use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::info;

use super::routes::api_routes;
use crate::detection::detection_engine::DetectionEngine;
use crate::error_handling::types::WebError;
use crate::flow_management::flow_manager::FlowManager;
use crate::policy_enforcement::policy_enforcer::PolicyEnforcer;
use crate::storage::storage_trait::AlertStore;
use crate::topology::topology_registry::TopologyRegistry;

/// API error payload
#[derive(serde::Serialize)]
pub(crate) struct ApiError {
    pub message: String,
}

/// Read-only handles the inventory API serves from.
#[derive(Clone)]
pub struct ApiState {
    pub topology: Arc<TopologyRegistry>,
    pub flows: Arc<FlowManager>,
    pub enforcer: Arc<PolicyEnforcer>,
    pub engine: Arc<DetectionEngine>,
    pub alerts: Option<Arc<dyn AlertStore>>,
}

/// HTTP server for the inventory API
pub struct WebServer {
    state: ApiState,
}

impl WebServer {
    pub fn new(state: ApiState) -> Self {
        Self { state }
    }

    /// Serves the API on `bind_address:port` until the task is dropped.
    pub async fn start(&self, bind_address: &str, port: u16) -> Result<(), WebError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|e| WebError::BindFailed(format!("{}: {}", bind_address, e)))?;
        let addr = SocketAddr::new(ip, port);

        info!("Inventory API listening on http://{}", addr);
        warp::serve(api_routes(self.state.clone())).run(addr).await;

        Ok(())
    }
}
