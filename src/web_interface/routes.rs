use chrono::Utc;
use serde::Deserialize;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::*;
use super::web_server::{ApiError, ApiState};
use crate::error_handling::types::StorageError;
use crate::storage::types::{AlertFilter, AlertRecord};

/// Query string of `GET /alerts`.
#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub limit: Option<usize>,
    pub severity: Option<u8>,
}

const DEFAULT_ALERT_LIMIT: usize = 100;

pub fn health(state: &ApiState) -> HealthResponse {
    let now = Utc::now();
    HealthResponse {
        status: "ok",
        switches: state.topology.statistics().switches,
        tracked_sources: state.engine.tracked_sources(),
        blocked: state.enforcer.blocked_identities(now).len(),
        active_rules: state.flows.active_rules(now).len(),
    }
}

pub fn switches(state: &ApiState) -> Vec<SwitchResponse> {
    state
        .topology
        .switches()
        .iter()
        .map(SwitchResponse::from)
        .collect()
}

pub fn blocked(state: &ApiState) -> Vec<BlockedResponse> {
    state
        .enforcer
        .blocked_identities(Utc::now())
        .iter()
        .map(BlockedResponse::from)
        .collect()
}

pub fn flow_rules(state: &ApiState) -> Vec<FlowRuleResponse> {
    state
        .flows
        .active_rules(Utc::now())
        .iter()
        .map(FlowRuleResponse::from)
        .collect()
}

/// `Ok(None)` when alert storage is disabled.
pub fn alerts(state: &ApiState, query: &AlertQuery) -> Result<Option<Vec<AlertRecord>>, StorageError> {
    let Some(store) = &state.alerts else {
        return Ok(None);
    };
    let filter = AlertFilter {
        max_severity: query.severity,
        limit: Some(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT)),
        ..AlertFilter::default()
    };
    store.recent_alerts(&filter).map(Some)
}

/// GET /health
pub fn health_route(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || reply::json(&health(&state)))
}

/// GET /switches
pub fn switches_route(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("switches")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || reply::json(&switches(&state)))
}

/// GET /topology
pub fn topology_route(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("topology")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || reply::json(&state.topology.snapshot()))
}

/// GET /topology/stats
pub fn topology_stats_route(
    state: ApiState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("topology" / "stats")
        .and(warp::get())
        .map(move || reply::json(&state.topology.statistics()))
}

/// GET /blocked
pub fn blocked_route(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("blocked")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || reply::json(&blocked(&state)))
}

/// GET /flows
pub fn flows_route(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("flows")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || reply::json(&flow_rules(&state)))
}

/// GET /alerts?limit=&severity=
pub fn alerts_route(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("alerts")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<AlertQuery>())
        .and_then(move |query: AlertQuery| {
            let state = state.clone();
            async move {
                match alerts(&state, &query) {
                    Ok(Some(list)) => Ok::<_, Rejection>(reply::with_status(
                        reply::json(&list),
                        StatusCode::OK,
                    )),
                    Ok(None) => Ok::<_, Rejection>(reply::with_status(
                        reply::json(&ApiError {
                            message: "Alert storage is disabled".to_string(),
                        }),
                        StatusCode::NOT_FOUND,
                    )),
                    Err(_) => Ok::<_, Rejection>(reply::with_status(
                        reply::json(&ApiError {
                            message: "Failed to load alerts".to_string(),
                        }),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )),
                }
            }
        })
}

/// Every inventory endpoint.
pub fn api_routes(state: ApiState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    health_route(state.clone())
        .or(switches_route(state.clone()))
        .or(topology_stats_route(state.clone()))
        .or(topology_route(state.clone()))
        .or(blocked_route(state.clone()))
        .or(flows_route(state.clone()))
        .or(alerts_route(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classifier_adapter::ClassifierAdapter;
    use crate::detection::detection_engine::{DetectionEngine, DetectionSettings};
    use crate::flow_management::flow_manager::FlowManager;
    use crate::policy_enforcement::policy_enforcer::{EnforcementSettings, PolicyEnforcer};
    use crate::southbound::transport::test_transports::RecordingTransport;
    use crate::southbound::types::{FlowAction, FlowMatch, OutputPort, SwitchId};
    use crate::storage::file_storage::FileAlertStore;
    use crate::storage::storage_trait::AlertStore;
    use crate::topology::topology_registry::TopologyRegistry;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn state(alerts: Option<Arc<dyn AlertStore>>) -> ApiState {
        let transport = Arc::new(RecordingTransport::new());
        let topology = Arc::new(TopologyRegistry::new());
        let flows = Arc::new(FlowManager::new(transport));
        let enforcer = Arc::new(PolicyEnforcer::new(
            EnforcementSettings::default(),
            flows.clone(),
            topology.clone(),
        ));
        let engine = Arc::new(DetectionEngine::new(
            DetectionSettings::default(),
            ClassifierAdapter::disabled(),
        ));
        ApiState {
            topology,
            flows,
            enforcer,
            engine,
            alerts,
        }
    }

    #[test]
    fn test_health_counts() {
        let state = state(None);
        state.topology.add_switch(SwitchId(1));
        state.topology.add_switch(SwitchId(2));
        state
            .enforcer
            .block_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), "test", 1);

        let health = health(&state);

        assert_eq!(health.status, "ok");
        assert_eq!(health.switches, 2);
        assert_eq!(health.blocked, 1);
        assert_eq!(health.active_rules, 2);
    }

    #[test]
    fn test_blocked_and_flow_views() {
        let state = state(None);
        state.topology.add_switch(SwitchId(1));
        state.flows
            .install(
                SwitchId(1),
                0,
                FlowMatch::any(),
                vec![FlowAction::Output(OutputPort::Controller)],
                0,
                0,
            )
            .unwrap();
        state
            .enforcer
            .block_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), "ET SCAN", 2);

        let blocked = blocked(&state);
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].address, "10.0.0.1");
        assert!(!blocked[0].flow);
        assert_eq!(blocked[0].switches, vec!["0000000000000001".to_string()]);

        let rules = flow_rules(&state);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].priority, 100);
        assert_eq!(rules[0].actions, vec!["drop".to_string()]);
        assert_eq!(rules[1].flow_match, "*");
        assert_eq!(rules[1].actions, vec!["output:controller".to_string()]);
    }

    #[test]
    fn test_switch_view() {
        let state = state(None);
        state.topology.add_switch(SwitchId(0x1f));

        let switches = switches(&state);

        assert_eq!(switches.len(), 1);
        assert_eq!(switches[0].id, "000000000000001f");
        assert_eq!(switches[0].dpid, 31);
        assert!(switches[0].alive);
    }

    #[test]
    fn test_alerts_view() {
        assert!(alerts(&state(None), &AlertQuery::default()).unwrap().is_none());

        let dir = TempDir::new().unwrap();
        let store: Arc<dyn AlertStore> =
            Arc::new(FileAlertStore::new(dir.path().join("alerts.jsonl")).unwrap());
        let state = state(Some(store));
        let list = alerts(
            &state,
            &AlertQuery {
                limit: Some(5),
                severity: Some(2),
            },
        )
        .unwrap()
        .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_serialized_rule_uses_match_key() {
        let state = state(None);
        state
            .flows
            .install(SwitchId(1), 0, FlowMatch::any(), Vec::new(), 0, 0)
            .unwrap();

        let json = serde_json::to_value(flow_rules(&state)).unwrap();

        assert_eq!(json[0]["match"], "*");
        assert_eq!(json[0]["switch"], "0000000000000001");
    }
}
