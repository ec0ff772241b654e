use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bglab_core::{ClientMsg, ServerEvent, ServerMsg};

pub type Handler = Rc<dyn Fn(&ServerMsg)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// One persistent, ordered, fire-and-forget connection to a room.
///
/// Subscribing twice with the same handler registers it twice; each
/// registration gets its own id.
pub trait Transport {
    fn send(&self, msg: ClientMsg);
    fn subscribe(&self, event: ServerEvent, handler: Handler) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

#[derive(Default)]
pub struct Subscribers {
    entries: RefCell<Vec<(SubscriptionId, ServerEvent, Handler)>>,
    next_id: Cell<u64>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: ServerEvent, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0.wrapping_add(1));
        self.entries.borrow_mut().push((id, event, handler));
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Handlers may subscribe or unsubscribe while being dispatched to.
    pub fn dispatch(&self, msg: &ServerMsg) -> usize {
        let kind = msg.kind();
        let matching: Vec<Handler> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, event, _)| *event == kind)
            .map(|(_, _, handler)| Rc::clone(handler))
            .collect();
        for handler in &matching {
            (handler)(msg);
        }
        matching.len()
    }
}

/// In-memory transport: sends queue up until an I/O driver drains them,
/// inbound messages are pushed in with `deliver`.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    outbox: Rc<RefCell<VecDeque<ClientMsg>>>,
    subscribers: Rc<Subscribers>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, msg: &ServerMsg) -> usize {
        self.subscribers.dispatch(msg)
    }

    pub fn drain_sent(&self) -> Vec<ClientMsg> {
        self.outbox.borrow_mut().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.outbox.borrow().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, msg: ClientMsg) {
        tracing::trace!(event = msg.event(), "queue outbound");
        self.outbox.borrow_mut().push_back(msg);
    }

    fn subscribe(&self, event: ServerEvent, handler: Handler) -> SubscriptionId {
        self.subscribers.add(event, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bglab_core::protocol::{ParticipantLeft, Pong};
    use bglab_core::ParticipantId;

    #[test]
    fn dispatch_only_reaches_matching_event() {
        let transport = ChannelTransport::new();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        transport.subscribe(
            ServerEvent::Pong,
            Rc::new(move |_| counter.set(counter.get() + 1)),
        );
        transport.deliver(&ServerMsg::Pong(Pong::default()));
        transport.deliver(&ServerMsg::ParticipantLeft(ParticipantLeft {
            participant_id: ParticipantId(1),
        }));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_is_safe() {
        let transport = ChannelTransport::new();
        let slot: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let hits = Rc::new(Cell::new(0));
        let handler: Handler = {
            let transport = transport.clone();
            let slot = Rc::clone(&slot);
            let hits = Rc::clone(&hits);
            Rc::new(move |_| {
                hits.set(hits.get() + 1);
                if let Some(id) = slot.take() {
                    transport.unsubscribe(id);
                }
            })
        };
        slot.set(Some(transport.subscribe(ServerEvent::Pong, handler)));
        transport.deliver(&ServerMsg::Pong(Pong::default()));
        transport.deliver(&ServerMsg::Pong(Pong::default()));
        assert_eq!(hits.get(), 1);
        assert_eq!(transport.subscriber_count(), 0);
    }

    #[test]
    fn sends_queue_in_order() {
        let transport = ChannelTransport::new();
        transport.send(ClientMsg::Ping(bglab_core::protocol::Ping { nonce: Some(1) }));
        transport.send(ClientMsg::Ping(bglab_core::protocol::Ping { nonce: Some(2) }));
        assert_eq!(transport.pending(), 2);
        let sent = transport.drain_sent();
        assert_eq!(
            sent,
            vec![
                ClientMsg::Ping(bglab_core::protocol::Ping { nonce: Some(1) }),
                ClientMsg::Ping(bglab_core::protocol::Ping { nonce: Some(2) }),
            ]
        );
        assert_eq!(transport.pending(), 0);
    }
}
