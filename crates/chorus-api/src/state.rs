//! Application state wiring the orchestrator to its infrastructure.
//!
//! The orchestrator is generic over backend and seat source; AppState pins it
//! to the Ollama HTTP backend and the TOML seat file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chorus_core::orchestrator::Orchestrator;
use chorus_infra::config::{TomlSeatSource, resolve_seats_path};
use chorus_infra::llm::{OllamaBackend, PoolSettings, ResourceManager};

/// Orchestrator pinned to the concrete infra implementations.
pub type ConcreteOrchestrator = Orchestrator<OllamaBackend, TomlSeatSource>;

pub struct AppState {
    pub orchestrator: ConcreteOrchestrator,
    pub resources: Arc<ResourceManager>,
    pub seats_path: PathBuf,
}

impl AppState {
    /// Wire the orchestrator. Nothing touches the network or the seat file
    /// until the first command needs it.
    pub fn init(config: Option<&Path>) -> Self {
        let seats_path = resolve_seats_path(config);
        let resources = Arc::new(ResourceManager::new(PoolSettings::default()));
        let backend = Arc::new(OllamaBackend::new(Arc::clone(&resources)));
        let orchestrator = Orchestrator::new(backend, TomlSeatSource::new(&seats_path));

        tracing::debug!(seats = %seats_path.display(), "app state initialized");

        Self {
            orchestrator,
            resources,
            seats_path,
        }
    }

    /// Release pooled connections and cancel anything still in flight.
    pub fn shutdown(&self) {
        self.resources.shutdown();
    }
}
