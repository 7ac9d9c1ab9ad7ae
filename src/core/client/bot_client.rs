// Client facade: owns the registry, router, event bus and module loader, and the
// lifecycle of the platform connection.

use crate::core::cooldowns::CooldownTracker;
use crate::core::dispatch::{DispatchOutcome, DispatchRouter, InboundInteraction};
use crate::core::events::{BotEvent, EventBus};
use crate::core::handlers::{ActionCatalog, Data, Registry, RegistryError};
use crate::core::plugins::{ModuleError, ModuleLoader};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is already running")]
    AlreadyRunning,

    #[error("client is not running")]
    NotRunning,

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// The platform side of the connection.
#[async_trait]
pub trait GatewayConnection: Send + Sync {
    /// Connect and stay connected until `shutdown` is called or the link fails.
    async fn run(&self) -> Result<(), ClientError>;
    async fn shutdown(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub events: usize,
    pub commands: usize,
    pub modules: usize,
}

pub struct BotClient {
    registry: Arc<Registry>,
    modules: Arc<ModuleLoader>,
    router: DispatchRouter,
    bus: Arc<EventBus>,
    state: Mutex<ClientState>,
    connection: Mutex<Option<Arc<dyn GatewayConnection>>>,
}

impl BotClient {
    pub fn new(catalog: ActionCatalog, data: Data) -> Self {
        let data = Arc::new(data);
        let cooldowns = Arc::new(CooldownTracker::new());
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(Registry::new(
            Arc::new(catalog),
            Arc::clone(&bus),
            Arc::clone(&data),
        ));

        let modules = Arc::new(ModuleLoader::new(Arc::clone(&registry), Arc::clone(&data)));

        Self {
            router: DispatchRouter::new(
                Arc::clone(&registry),
                cooldowns,
                Arc::clone(&modules),
                data,
            ),
            modules,
            registry,
            bus,
            state: Mutex::new(ClientState::Idle),
            connection: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn modules(&self) -> &ModuleLoader {
        &self.modules
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load `<root>/events`, then `<root>/commands`, then `<root>/modules`.
    ///
    /// `root` itself must exist. A missing subdirectory is only a warning.
    pub async fn load_components(&self, root: &Path) -> Result<LoadSummary, ClientError> {
        if !root.is_dir() {
            return Err(RegistryError::Io {
                path: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "handlers directory does not exist",
                ),
            }
            .into());
        }

        let mut summary = LoadSummary::default();

        let events_dir = root.join("events");
        if events_dir.is_dir() {
            summary.events = self.registry.load_events(&events_dir)?.len();
        } else {
            warn!(path = %events_dir.display(), "No events directory");
        }

        let commands_dir = root.join("commands");
        if commands_dir.is_dir() {
            summary.commands = self.registry.load_commands(&commands_dir)?.len();
        } else {
            warn!(path = %commands_dir.display(), "No commands directory");
        }

        let modules_dir = root.join("modules");
        if modules_dir.is_dir() {
            summary.modules = self.modules.load_from_directory(&modules_dir).await?.len();
        }

        info!(
            events = summary.events,
            commands = summary.commands,
            modules = summary.modules,
            "Components loaded"
        );
        Ok(summary)
    }

    pub async fn handle_interaction(&self, inbound: InboundInteraction<'_>) -> DispatchOutcome {
        self.router.dispatch(inbound).await
    }

    /// Forward a platform event to every attached listener.
    pub async fn emit(&self, event: BotEvent) {
        let name = event.name().to_string();
        match self.bus.emit(event).await {
            Ok(delivered) => debug!(event = %name, delivered, "Event emitted"),
            Err(e) => error!(event = %name, error = %e, "Event listener failed"),
        }
    }

    /// Run the connection until it ends. Only one run at a time.
    pub async fn start(&self, connection: Arc<dyn GatewayConnection>) -> Result<(), ClientError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == ClientState::Running {
                return Err(ClientError::AlreadyRunning);
            }
            *self.connection.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(Arc::clone(&connection));
            *state = ClientState::Running;
        }

        info!("Client starting");
        let result = connection.run().await;

        *self.connection.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = ClientState::Stopped;
        match &result {
            Ok(()) => info!("Client stopped"),
            Err(e) => error!(error = %e, "Client stopped with an error"),
        }
        result
    }

    /// Close the connection and unload every module.
    pub async fn stop(&self) -> Result<(), ClientError> {
        if self.state() != ClientState::Running {
            return Err(ClientError::NotRunning);
        }

        let connection = self
            .connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(connection) = connection {
            connection.shutdown().await;
        }

        for name in self.modules.list_loaded() {
            if let Err(e) = self.modules.unload_module(&name).await {
                warn!(module = %name, error = %e, "Module did not unload cleanly");
            }
        }
        Ok(())
    }
}
