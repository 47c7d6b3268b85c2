//! Mutable decisions observers fill in during dispatch.

use serde_json::Value;

use crate::protocol::Message;

/// Decision for `connection` and `open` events: where the session's traffic goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDecision {
    upstream: Option<String>,
}

impl RouteDecision {
    /// Send the session's traffic to `authority` (`host:port`) instead of the default upstream.
    pub fn forward_to(&mut self, authority: impl Into<String>) {
        self.upstream = Some(authority.into());
    }

    pub fn upstream(&self) -> Option<&str> {
        self.upstream.as_deref()
    }
}

/// Decision for `engine` and `socket` events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketDecision {
    dropped: bool,
}

impl PacketDecision {
    pub fn drop_packet(&mut self) {
        self.dropped = true;
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }
}

/// Decision for `message` events.
///
/// Starts as a copy of the observed message; any mutation marks it modified,
/// which makes the forwarder re-encode instead of sending the original bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDecision {
    message: Message,
    dropped: bool,
    modified: bool,
}

impl MessageDecision {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            dropped: false,
            modified: false,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn event(&self) -> Option<&str> {
        self.message.event.as_deref()
    }

    pub fn args(&self) -> &[Value] {
        &self.message.args
    }

    /// Rename the event. Ignored for acknowledgements, which carry no name.
    pub fn set_event(&mut self, event: impl Into<String>) {
        if self.message.event.is_some() {
            self.message.event = Some(event.into());
            self.modified = true;
        }
    }

    pub fn set_args(&mut self, args: Vec<Value>) {
        self.message.args = args;
        self.modified = true;
    }

    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        self.modified = true;
        &mut self.message.args
    }

    /// Attach binary data; push the returned placeholder into the arguments to send it.
    pub fn push_attachment(&mut self, bytes: Vec<u8>) -> Value {
        self.modified = true;
        self.message.push_attachment(bytes)
    }

    pub fn drop_packet(&mut self) {
        self.dropped = true;
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Direction;
    use serde_json::json;

    fn message(event: Option<&str>) -> Message {
        Message {
            nsp: "/".into(),
            event: event.map(String::from),
            args: vec![json!("hi")],
            ack_id: None,
            direction: Direction::ClientToServer,
            sid: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn reads_do_not_mark_modified() {
        let decision = MessageDecision::new(message(Some("chat")));
        assert_eq!(decision.event(), Some("chat"));
        assert_eq!(decision.args(), &[json!("hi")]);
        assert!(!decision.is_modified());
        assert!(!decision.is_dropped());
    }

    #[test]
    fn mutations_mark_modified() {
        let mut decision = MessageDecision::new(message(Some("chat")));
        decision.args_mut()[0] = json!("hello world");
        assert!(decision.is_modified());
        assert_eq!(decision.into_message().args, vec![json!("hello world")]);
    }

    #[test]
    fn acks_cannot_be_renamed() {
        let mut decision = MessageDecision::new(message(None));
        decision.set_event("nope");
        assert_eq!(decision.event(), None);
        assert!(!decision.is_modified());
    }

    #[test]
    fn route_decision_records_target() {
        let mut decision = RouteDecision::default();
        assert_eq!(decision.upstream(), None);
        decision.forward_to("127.0.0.1:4000");
        assert_eq!(decision.upstream(), Some("127.0.0.1:4000"));
    }
}
