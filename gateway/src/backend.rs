//! Backend selection

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::service::AgentService;
use evmauth_chain::{ChainAdapter, RpcLedgerClient};
use evmauth_core::{AgentLedger, BackendMode, LedgerEvent};
use evmauth_sim::SimulationAdapter;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// A connected ledger plus its event feed, when it has one
pub struct Backend {
    /// Records and writes
    pub ledger: Arc<dyn AgentLedger>,
    /// Changes made outside the facade; only the simulation publishes them
    pub events: Option<broadcast::Receiver<LedgerEvent>>,
}

impl Backend {
    /// Wrap the ledger in a facade that follows the event feed
    #[must_use]
    pub fn into_service(self, config: &GatewayConfig) -> AgentService {
        let service = AgentService::new(self.ledger, config.cache, config.budget_policy);
        match self.events {
            Some(events) => service.with_event_feed(events),
            None => service,
        }
    }
}

/// Build the ledger backend named by `config.mode`.
///
/// A simulation session starts immediately and ends when the returned
/// ledger is dropped. Must be called from within a tokio runtime.
///
/// # Errors
/// Invalid chain settings or simulation configuration.
pub fn connect(config: &GatewayConfig) -> Result<Backend, GatewayError> {
    match config.mode {
        BackendMode::Live => {
            let chain = &config.chain;
            let client = RpcLedgerClient::new(chain.endpoint(), chain.account, chain.request_timeout())
                .map_err(|e| GatewayError::invalid(format!("chain client: {e}")))?;
            info!(
                network = %chain.network,
                chain_id = chain.network.chain_id(),
                contract = %chain.contract_address,
                "connecting to live ledger"
            );
            let adapter = ChainAdapter::new(Arc::new(client), chain.descriptor())
                .with_poll_interval(chain.poll_interval());
            Ok(Backend {
                ledger: Arc::new(adapter),
                events: None,
            })
        }
        BackendMode::Simulation => {
            let sim = SimulationAdapter::start(config.simulation.clone())?;
            let events = sim.subscribe();
            Ok(Backend {
                ledger: Arc::new(sim),
                events: Some(events),
            })
        }
    }
}
