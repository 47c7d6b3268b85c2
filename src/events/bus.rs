//! Typed publish/subscribe bus.
//!
//! One topic per event category. Observers run sequentially in registration
//! order against a single decision value, so a later observer sees what an
//! earlier one decided.

use std::fmt;
use std::sync::Arc;

use super::decision::{MessageDecision, PacketDecision, RouteDecision};
use super::types::{
    ConnectionEvent, EngineEvent, ErrorEvent, EventKind, MessageEvent, OpenEvent, SocketEvent,
};

type Observer<E, D> = Arc<dyn Fn(&E, &mut D) + Send + Sync>;

struct Topic<E, D> {
    observers: Vec<Observer<E, D>>,
}

impl<E, D> Topic<E, D> {
    fn push(&mut self, observer: impl Fn(&E, &mut D) + Send + Sync + 'static) {
        self.observers.push(Arc::new(observer));
    }

    fn dispatch(&self, event: &E, mut decision: D) -> D {
        for observer in &self.observers {
            observer(event, &mut decision);
        }
        decision
    }

    fn len(&self) -> usize {
        self.observers.len()
    }
}

impl<E, D> Default for Topic<E, D> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

/// Registry of observers for every event category.
///
/// Built once at startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct EventBus {
    connection: Topic<ConnectionEvent, RouteDecision>,
    open: Topic<OpenEvent, RouteDecision>,
    engine: Topic<EngineEvent, PacketDecision>,
    socket: Topic<SocketEvent, PacketDecision>,
    message: Topic<MessageEvent, MessageDecision>,
    error: Topic<ErrorEvent, ()>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connection(&mut self, f: impl Fn(&ConnectionEvent, &mut RouteDecision) + Send + Sync + 'static) -> &mut Self {
        self.connection.push(f);
        self
    }

    pub fn on_open(&mut self, f: impl Fn(&OpenEvent, &mut RouteDecision) + Send + Sync + 'static) -> &mut Self {
        self.open.push(f);
        self
    }

    pub fn on_engine(&mut self, f: impl Fn(&EngineEvent, &mut PacketDecision) + Send + Sync + 'static) -> &mut Self {
        self.engine.push(f);
        self
    }

    pub fn on_socket(&mut self, f: impl Fn(&SocketEvent, &mut PacketDecision) + Send + Sync + 'static) -> &mut Self {
        self.socket.push(f);
        self
    }

    pub fn on_message(&mut self, f: impl Fn(&MessageEvent, &mut MessageDecision) + Send + Sync + 'static) -> &mut Self {
        self.message.push(f);
        self
    }

    pub fn on_error(&mut self, f: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> &mut Self {
        self.error.push(move |event, _: &mut ()| f(event));
        self
    }

    pub fn emit_connection(&self, event: &ConnectionEvent) -> RouteDecision {
        self.connection.dispatch(event, RouteDecision::default())
    }

    pub fn emit_open(&self, event: &OpenEvent) -> RouteDecision {
        self.open.dispatch(event, RouteDecision::default())
    }

    pub fn emit_engine(&self, event: &EngineEvent) -> PacketDecision {
        self.engine.dispatch(event, PacketDecision::default())
    }

    pub fn emit_socket(&self, event: &SocketEvent) -> PacketDecision {
        self.socket.dispatch(event, PacketDecision::default())
    }

    pub fn emit_message(&self, event: &MessageEvent) -> MessageDecision {
        self.message.dispatch(event, MessageDecision::new(event.message.clone()))
    }

    pub fn emit_error(&self, event: &ErrorEvent) {
        self.error.dispatch(event, ());
    }

    pub fn observer_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Connection => self.connection.len(),
            EventKind::Open => self.open.len(),
            EventKind::Engine => self.engine.len(),
            EventKind::Socket => self.socket.len(),
            EventKind::Message => self.message.len(),
            EventKind::Error => self.error.len(),
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("connection", &self.connection.len())
            .field("open", &self.open.len())
            .field("engine", &self.engine.len())
            .field("socket", &self.socket.len())
            .field("message", &self.message.len())
            .field("error", &self.error.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, Message};
    use serde_json::json;
    use std::sync::Mutex;

    fn message_event() -> MessageEvent {
        MessageEvent::new(
            Message {
                nsp: "/".into(),
                event: Some("my-message".into()),
                args: vec![json!("hi")],
                ack_id: None,
                direction: Direction::ClientToServer,
                sid: Some("abc".into()),
                attachments: Vec::new(),
            },
            "http://localhost/socket.io/",
        )
    }

    #[test]
    fn observers_run_in_registration_order_and_see_earlier_mutations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.on_message(|_, decision| {
            decision.args_mut()[0] = json!("hello world");
        });
        {
            let seen = Arc::clone(&seen);
            bus.on_message(move |event, decision| {
                seen.lock().unwrap().push((event.message.args.clone(), decision.args().to_vec()));
            });
        }

        let decision = bus.emit_message(&message_event());
        assert!(decision.is_modified());
        assert_eq!(decision.args(), &[json!("hello world")]);

        let seen = seen.lock().unwrap();
        // The event itself is an immutable snapshot; only the decision changes.
        assert_eq!(seen[0], (vec![json!("hi")], vec![json!("hello world")]));
    }

    #[test]
    fn no_observers_leaves_decision_untouched() {
        let bus = EventBus::new();
        let decision = bus.emit_message(&message_event());
        assert!(!decision.is_modified());
        assert!(!decision.is_dropped());
        assert_eq!(bus.observer_count(EventKind::Message), 0);
    }

    #[test]
    fn error_observers_receive_events() {
        use crate::events::{ErrorEvent, ErrorKind};

        let count = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        {
            let count = Arc::clone(&count);
            bus.on_error(move |event| {
                assert_eq!(event.kind, ErrorKind::Decode);
                *count.lock().unwrap() += 1;
            });
        }
        bus.emit_error(&ErrorEvent::new(ErrorKind::Decode, "bad frame"));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
