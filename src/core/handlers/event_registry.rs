// Event handlers registry.
//
// Handlers are never attached to the bus directly. Each one is wrapped in a
// shim that swallows and logs errors and panics, and the shim is what gets
// attached and later detached. Re-registering a name replaces the previous
// handler (last write wins) after detaching its shim.

use super::handler_context::{Data, EventContext};
use super::handler_models::{EventAction, EventDescriptor, EventInfo, HandlerKind};
use super::handler_table::HandlerTable;
use super::handler_validation::validate_meta;
use super::registry_error::RegistryError;
use crate::core::events::{BotEvent, EventBus, Listener, ListenerError};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct EventRegistry {
    table: HandlerTable<dyn EventAction>,
    // The shim built for each registered name. Whether it is live is the bus's answer,
    // so a spent `once` handler reads as disabled.
    shims: DashMap<String, Listener>,
    bus: Arc<EventBus>,
    data: Arc<Data>,
}

/// Wrap `action` so nothing it does can reach the bus's delivery loop.
fn isolating_shim(name: String, action: Arc<dyn EventAction>, data: Arc<Data>) -> Listener {
    Arc::new(
        move |event: Arc<BotEvent>| -> BoxFuture<'static, Result<(), ListenerError>> {
            let name = name.clone();
            let action = Arc::clone(&action);
            let data = Arc::clone(&data);
            Box::pin(async move {
                let ctx = EventContext {
                    event: &event,
                    data: &data,
                };
                match AssertUnwindSafe(action.execute(&ctx)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(event = %name, error = %e, "Event handler failed"),
                    Err(_) => error!(event = %name, "Event handler panicked"),
                }
                Ok(())
            })
        },
    )
}

impl EventRegistry {
    pub fn new(bus: Arc<EventBus>, data: Arc<Data>) -> Self {
        Self {
            table: HandlerTable::new(HandlerKind::Event),
            shims: DashMap::new(),
            bus,
            data,
        }
    }

    fn attach(&self, name: &str, shim: &Listener, once: bool) {
        if once {
            self.bus.once(name, Arc::clone(shim));
        } else {
            self.bus.on(name, Arc::clone(shim));
        }
    }

    pub fn register(&self, descriptor: EventDescriptor) -> Result<(), RegistryError> {
        validate_meta(HandlerKind::Event, &descriptor.meta)
            .map_err(|e| RegistryError::validation(HandlerKind::Event, e))?;

        let name = descriptor.meta.name.clone();
        if self.table.contains(&name) {
            warn!(event = %name, "Event handler already registered, replacing it");
            self.unregister(&name)?;
        }

        let once = descriptor.meta.once;
        let enabled = descriptor.meta.enabled;
        let shim = isolating_shim(
            name.clone(),
            Arc::clone(&descriptor.action),
            Arc::clone(&self.data),
        );

        self.table.insert_unique(descriptor)?;
        if enabled {
            self.attach(&name, &shim, once);
        }
        self.shims.insert(name.clone(), shim);

        info!(event = %name, once, enabled, "Event handler registered");
        Ok(())
    }

    /// Remove a handler and detach the exact shim that was attached for it.
    pub fn unregister(&self, name: &str) -> Result<EventDescriptor, RegistryError> {
        let removed = self.table.remove(name)?;
        if let Some((_, shim)) = self.shims.remove(name) {
            self.bus.remove_listener(name, &shim);
        }
        debug!(event = %name, "Event handler unregistered");
        Ok(removed)
    }

    fn not_found(name: &str) -> RegistryError {
        RegistryError::NotFound {
            kind: HandlerKind::Event,
            name: name.to_string(),
        }
    }

    fn shim(&self, name: &str) -> Result<Listener, RegistryError> {
        self.shims
            .get(name)
            .map(|shim| Arc::clone(shim.value()))
            .ok_or_else(|| Self::not_found(name))
    }

    /// Re-attach a disabled handler. No-op when already attached.
    ///
    /// A `once` handler that already fired is armed again.
    pub fn enable(&self, name: &str) -> Result<(), RegistryError> {
        let once = self
            .table
            .get(name)
            .ok_or_else(|| Self::not_found(name))?
            .meta
            .once;
        let shim = self.shim(name)?;

        if !self.bus.is_attached(name, &shim) {
            self.attach(name, &shim, once);
            info!(event = %name, "Event handler enabled");
        }
        Ok(())
    }

    /// Detach a handler from the bus but keep it registered.
    pub fn disable(&self, name: &str) -> Result<(), RegistryError> {
        let shim = self.shim(name)?;
        if self.bus.remove_listener(name, &shim) {
            info!(event = %name, "Event handler disabled");
        }
        Ok(())
    }

    /// `None` for unknown names, otherwise whether the handler is attached right now.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let shim = self.shims.get(name)?;
        Some(self.bus.is_attached(name, shim.value()))
    }

    pub fn get(&self, name: &str) -> Option<EventDescriptor> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn list(&self) -> Vec<String> {
        self.table
            .ordered()
            .into_iter()
            .map(|d| d.meta.name)
            .collect()
    }

    pub fn info(&self) -> Vec<EventInfo> {
        self.table
            .ordered()
            .into_iter()
            .map(|d| EventInfo {
                enabled: self.is_enabled(&d.meta.name).unwrap_or(false),
                event_type: d.meta.event_type_or_default().to_string(),
                name: d.meta.name,
                description: d.meta.description,
                once: d.meta.once,
            })
            .collect()
    }

    /// Info rows whose event type matches `event_type`.
    pub fn by_type(&self, event_type: &str) -> Vec<EventInfo> {
        self.info()
            .into_iter()
            .filter(|info| info.event_type == event_type)
            .collect()
    }

    pub(crate) fn record_source(&self, name: &str, path: &Path) {
        self.table.record_source(name, path);
    }

    pub fn source_of(&self, name: &str) -> Option<PathBuf> {
        self.table.source(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handlers::{HandlerError, HandlerMeta};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EventAction for Counting {
        async fn execute(&self, _ctx: &EventContext<'_>) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventAction for Failing {
        async fn execute(&self, _ctx: &EventContext<'_>) -> Result<(), HandlerError> {
            Err("database unreachable".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventAction for Panicking {
        async fn execute(&self, _ctx: &EventContext<'_>) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    fn tick() -> BotEvent {
        BotEvent::Custom {
            name: "tick".into(),
            payload: serde_json::Value::Null,
        }
    }

    fn setup() -> (EventRegistry, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let registry = EventRegistry::new(Arc::clone(&bus), Arc::new(Data::detached()));
        (registry, bus)
    }

    fn counter_on(meta: HandlerMeta) -> (EventDescriptor, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        (
            EventDescriptor::new(meta, Arc::new(Counting(Arc::clone(&hits)))),
            hits,
        )
    }

    fn raw_counter(hits: Arc<AtomicUsize>) -> Listener {
        Arc::new(move |_event| -> BoxFuture<'static, Result<(), ListenerError>> {
            let hits = Arc::clone(&hits);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn registered_handler_receives_events() {
        let (registry, bus) = setup();
        let (descriptor, hits) = counter_on(HandlerMeta::named("tick"));
        registry.register(descriptor).unwrap();

        bus.emit(tick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_and_panics_stay_inside_the_shim() {
        let (registry, bus) = setup();
        let after = Arc::new(AtomicUsize::new(0));

        registry
            .register(EventDescriptor::new(HandlerMeta::named("tick"), Arc::new(Failing)))
            .unwrap();
        bus.on("tick", raw_counter(Arc::clone(&after)));
        assert!(bus.emit(tick()).await.is_ok());

        registry
            .register(EventDescriptor::new(HandlerMeta::named("tick"), Arc::new(Panicking)))
            .unwrap();
        assert!(bus.emit(tick()).await.is_ok());

        assert_eq!(after.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn re_registration_replaces_and_detaches_the_old_shim() {
        let (registry, bus) = setup();
        let (old, old_hits) = counter_on(HandlerMeta::named("tick"));
        let (new, new_hits) = counter_on(HandlerMeta::named("tick"));

        registry.register(old).unwrap();
        registry.register(new).unwrap();
        bus.emit(tick()).await.unwrap();

        assert_eq!(old_hits.load(Ordering::SeqCst), 0);
        assert_eq!(new_hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("tick"), 1);
    }

    #[tokio::test]
    async fn unregister_detaches() {
        let (registry, bus) = setup();
        let (descriptor, hits) = counter_on(HandlerMeta::named("tick"));
        registry.register(descriptor).unwrap();
        registry.unregister("tick").unwrap();

        assert_eq!(bus.emit(tick()).await.unwrap(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(registry.unregister("tick").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn disable_and_enable_toggle_delivery() {
        let (registry, bus) = setup();
        let (descriptor, hits) = counter_on(HandlerMeta::named("tick"));
        registry.register(descriptor).unwrap();

        registry.disable("tick").unwrap();
        registry.disable("tick").unwrap();
        bus.emit(tick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.is_enabled("tick"), Some(false));

        registry.enable("tick").unwrap();
        registry.enable("tick").unwrap();
        bus.emit(tick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("tick"), 1);

        assert!(registry.enable("ghost").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn disabled_manifest_registers_without_attaching() {
        let (registry, bus) = setup();
        let (descriptor, _hits) = counter_on(HandlerMeta::named("tick").disabled());
        registry.register(descriptor).unwrap();

        assert_eq!(bus.listener_count("tick"), 0);
        assert!(!registry.info()[0].enabled);
    }

    #[tokio::test]
    async fn once_handler_fires_a_single_time() {
        let (registry, bus) = setup();
        let (descriptor, hits) = counter_on(HandlerMeta::named("tick").once());
        registry.register(descriptor).unwrap();

        bus.emit(tick()).await.unwrap();
        bus.emit(tick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.contains("tick"));
    }

    #[tokio::test]
    async fn fired_once_handler_reports_disabled_until_re_enabled() {
        let (registry, bus) = setup();
        let (descriptor, hits) = counter_on(HandlerMeta::named("tick").once());
        registry.register(descriptor).unwrap();
        assert_eq!(registry.is_enabled("tick"), Some(true));

        bus.emit(tick()).await.unwrap();
        assert_eq!(registry.is_enabled("tick"), Some(false));
        assert!(!registry.info()[0].enabled);

        registry.enable("tick").unwrap();
        bus.emit(tick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(registry.is_enabled("tick"), Some(false));
    }

    #[test]
    fn by_type_filters_on_the_default_tag_too() {
        let (registry, _bus) = setup();
        let (ready, _) = counter_on(HandlerMeta::named("ready"));
        let (custom, _) = counter_on(HandlerMeta::named("bot_ready").event_type("custom"));
        registry.register(ready).unwrap();
        registry.register(custom).unwrap();

        let discord: Vec<String> = registry.by_type("discord").into_iter().map(|i| i.name).collect();
        assert_eq!(discord, vec!["ready"]);
        assert_eq!(registry.by_type("custom")[0].name, "bot_ready");
        assert!(registry.by_type("webhook").is_empty());
    }
}
