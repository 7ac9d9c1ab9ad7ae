// In-process event source.
//
// Mirrors the emitter the gateway bridge feeds: listeners are attached per
// event name and detached by reference identity, so whoever attached a
// listener must keep the exact `Arc` around to remove it later.
//
// A listener that fails aborts delivery to the listeners after it and the
// error surfaces to the emitter. Registered handlers are therefore never
// attached directly; see `EventRegistry`, which wraps them first.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type Listener =
    Arc<dyn Fn(Arc<BotEvent>) -> BoxFuture<'static, Result<(), ListenerError>> + Send + Sync>;

/// Events the gateway bridge forwards into the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    Ready {
        bot_name: String,
        guild_count: usize,
        user_count: usize,
    },
    MemberJoin {
        guild_id: u64,
        user_id: u64,
        user_name: String,
    },
    MemberLeave {
        guild_id: u64,
        user_id: u64,
        user_name: String,
    },
    MessageCreate {
        guild_id: Option<u64>,
        channel_id: u64,
        author_id: u64,
        content: String,
    },
    Custom {
        name: String,
        payload: serde_json::Value,
    },
}

impl BotEvent {
    pub fn name(&self) -> &str {
        match self {
            BotEvent::Ready { .. } => "ready",
            BotEvent::MemberJoin { .. } => "guild_member_add",
            BotEvent::MemberLeave { .. } => "guild_member_remove",
            BotEvent::MessageCreate { .. } => "message_create",
            BotEvent::Custom { name, .. } => name,
        }
    }
}

struct Slot {
    listener: Listener,
    once: bool,
}

#[derive(Default)]
pub struct EventBus {
    // Never held across an await: emit snapshots the slots and releases the lock.
    slots: RwLock<HashMap<String, Vec<Slot>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, name: &str, listener: Listener, once: bool) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(name.to_string())
            .or_default()
            .push(Slot { listener, once });
    }

    pub fn on(&self, name: &str, listener: Listener) {
        self.attach(name, listener, false);
    }

    /// Attach a listener the bus drops right before its first delivery.
    pub fn once(&self, name: &str, listener: Listener) {
        self.attach(name, listener, true);
    }

    /// Detach the first slot holding this exact listener. Returns whether one was found.
    pub fn remove_listener(&self, name: &str, listener: &Listener) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = slots.get_mut(name) else {
            return false;
        };

        let Some(index) = list
            .iter()
            .position(|slot| Arc::ptr_eq(&slot.listener, listener))
        else {
            return false;
        };

        list.remove(index);
        if list.is_empty() {
            slots.remove(name);
        }
        true
    }

    /// Whether this exact listener is still attached under `name`.
    pub fn is_attached(&self, name: &str, listener: &Listener) -> bool {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(name).is_some_and(|list| {
            list.iter()
                .any(|slot| Arc::ptr_eq(&slot.listener, listener))
        })
    }

    #[allow(dead_code)]
    pub fn listener_count(&self, name: &str) -> usize {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(name).map(Vec::len).unwrap_or(0)
    }

    /// Deliver `event` to every listener of its name, in attachment order.
    ///
    /// Returns how many listeners ran. The first failing listener stops delivery.
    pub async fn emit(&self, event: BotEvent) -> Result<usize, ListenerError> {
        let name = event.name().to_string();

        let targets: Vec<Listener> = {
            let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
            let Some(list) = slots.get_mut(&name) else {
                return Ok(0);
            };

            let targets = list.iter().map(|slot| Arc::clone(&slot.listener)).collect();
            list.retain(|slot| !slot.once);
            if list.is_empty() {
                slots.remove(&name);
            }
            targets
        };

        let event = Arc::new(event);
        let mut delivered = 0;
        for listener in targets {
            listener(Arc::clone(&event)).await?;
            delivered += 1;
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> Listener {
        Arc::new(move |_event| -> BoxFuture<'static, Result<(), ListenerError>> {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing() -> Listener {
        Arc::new(|_event| -> BoxFuture<'static, Result<(), ListenerError>> {
            Box::pin(async { Err("boom".into()) })
        })
    }

    fn custom(name: &str) -> BotEvent {
        BotEvent::Custom {
            name: name.to_string(),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn emits_to_every_listener_of_the_name() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on("tick", counting(hits.clone()));
        bus.on("tick", counting(hits.clone()));
        bus.on("other", counting(hits.clone()));

        assert_eq!(bus.emit(custom("tick")).await.unwrap(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn once_listener_fires_a_single_time() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.once("tick", counting(hits.clone()));

        bus.emit(custom("tick")).await.unwrap();
        bus.emit(custom("tick")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[tokio::test]
    async fn spent_once_listener_is_no_longer_attached() {
        let bus = EventBus::new();
        let listener = counting(Arc::new(AtomicUsize::new(0)));
        bus.once("tick", Arc::clone(&listener));
        assert!(bus.is_attached("tick", &listener));

        bus.emit(custom("tick")).await.unwrap();
        assert!(!bus.is_attached("tick", &listener));
    }

    #[tokio::test]
    async fn remove_matches_by_reference_not_by_behaviour() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let attached = counting(hits.clone());
        let lookalike = counting(hits.clone());
        bus.on("tick", Arc::clone(&attached));

        assert!(!bus.remove_listener("tick", &lookalike));
        assert!(bus.remove_listener("tick", &attached));
        assert_eq!(bus.emit(custom("tick")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_listener_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on("tick", failing());
        bus.on("tick", counting(hits.clone()));

        assert!(bus.emit(custom("tick")).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn event_names_are_stable() {
        let ready = BotEvent::Ready {
            bot_name: "lucy".into(),
            guild_count: 1,
            user_count: 2,
        };
        assert_eq!(ready.name(), "ready");
        assert_eq!(custom("bot_ready").name(), "bot_ready");
    }
}
