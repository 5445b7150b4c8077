use crate::bridge::model::EstimateModel;
use anyhow::{anyhow, Context};
use log::info;
use std::{
    net::SocketAddr,
    sync::{mpsc, Arc, PoisonError, RwLock},
    thread::{self, JoinHandle},
};
use tokio::runtime::Builder;
use warp::Filter;

/// Holds the latest estimate model and optionally serves it as JSON on `GET /estimate`.
pub struct EstimateBridge {
    state: Arc<RwLock<EstimateModel>>,
}

impl EstimateBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(EstimateModel::default())),
        }
    }

    /// Starts the HTTP endpoint on its own thread and runtime.
    ///
    /// Returns after the listener is bound, with the bound address; a bind
    /// failure is reported here instead of on the bridge thread.
    pub fn serve(&self, address: SocketAddr) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
        let state = self.state.clone();
        let (bound_tx, bound_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("estimate-bridge".to_string())
            .spawn(move || {
                let state_filter = warp::any().map(move || state.clone());
                let route = warp::path("estimate")
                    .and(warp::get())
                    .and(state_filter)
                    .map(|state: Arc<RwLock<EstimateModel>>| {
                        let model = state
                            .read()
                            .unwrap_or_else(PoisonError::into_inner)
                            .clone();
                        warp::reply::json(&model)
                    });

                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let failure = anyhow!(err).context("building bridge runtime");
                        let _ = bound_tx.send(Err(failure));
                        return;
                    }
                };
                let bound = {
                    let _context = runtime.enter();
                    warp::serve(route).try_bind_ephemeral(address)
                };
                match bound {
                    Ok((local, server)) => {
                        let _ = bound_tx.send(Ok(local));
                        info!("estimate bridge listening on http://{}/estimate", local);
                        runtime.block_on(server);
                    }
                    Err(err) => {
                        let failure = anyhow!(err).context(format!("binding {}", address));
                        let _ = bound_tx.send(Err(failure));
                    }
                }
            })
            .context("spawning estimate bridge thread")?;

        let local = bound_rx
            .recv()
            .context("estimate bridge thread exited before binding")??;
        Ok((local, handle))
    }

    pub fn publish(&self, model: &EstimateModel) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = model.clone();
        info!(
            "[bridge] estimates: {}, undefined: {}, mean bearing: {:?}",
            guard.estimate_count, guard.undefined_count, guard.mean_degrees
        );
    }

    pub fn publish_status(&self, message: &str) {
        info!("[bridge] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> EstimateModel {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for EstimateBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::WorkflowConfig;
    use crate::workflow::runner::Runner;
    use dfcore::processing::DoaEstimate;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn bridge_publishes_workflow_results() {
        let mut cfg = WorkflowConfig::from_args(0.15, 1e9, 4, 0.0, false).unwrap();
        cfg.generator.packet_size = 64;
        cfg.generator.interval_ms = 0;
        let result = Runner::new(cfg).execute().unwrap();

        let bridge = EstimateBridge::new();
        bridge.publish(&EstimateModel::from(&result));

        let snapshot = bridge.snapshot();
        assert_eq!(snapshot.estimate_count, 4);
        assert_eq!(snapshot.latest, result.estimates.last().copied());
        assert_eq!(snapshot.metrics.aligned_pairs, 4);
    }

    #[test]
    fn model_serializes_latest_estimate() {
        let model = EstimateModel {
            latest: Some(DoaEstimate::Angle { radians: 0.25 }),
            estimate_count: 1,
            ..EstimateModel::default()
        };
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["latest"]["kind"], "angle");
        assert_eq!(json["estimate_count"], 1);
    }

    #[test]
    fn bridge_serves_latest_model_over_http() {
        let bridge = EstimateBridge::new();
        bridge.publish(&EstimateModel {
            latest: Some(DoaEstimate::Angle { radians: 0.1 }),
            estimate_count: 7,
            ..EstimateModel::default()
        });
        let (local, _handle) = bridge.serve("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(local.port(), 0);

        let mut stream = TcpStream::connect(local).unwrap();
        stream
            .write_all(b"GET /estimate HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"estimate_count\":7"));
    }

    #[test]
    fn occupied_address_fails_to_serve() {
        let first = EstimateBridge::new();
        let (local, _handle) = first.serve("127.0.0.1:0".parse().unwrap()).unwrap();

        let second = EstimateBridge::new();
        assert!(second.serve(local).is_err());
    }
}
