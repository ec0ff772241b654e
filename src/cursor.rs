use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use bglab_core::protocol::CursorUpdate;
use bglab_core::{
    ParticipantId, Point, ReferenceFrame, ScreenPoint, ServerEvent, ServerMsg, Viewport,
};

use crate::clock::Clock;
use crate::roster::Roster;
use crate::transport::{SubscriptionId, Transport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorEntry {
    pub position: Point,
    pub last_seen_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CursorSprite {
    pub participant_id: ParticipantId,
    pub screen: ScreenPoint,
    pub label: String,
    pub color: &'static str,
}

/// Last known pointer position of every other participant.
#[derive(Debug, Clone)]
pub struct RemoteCursors {
    local: Option<ParticipantId>,
    entries: BTreeMap<ParticipantId, CursorEntry>,
    ttl_ms: u64,
    visible: bool,
}

impl RemoteCursors {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            local: None,
            entries: BTreeMap::new(),
            ttl_ms,
            visible: true,
        }
    }

    pub fn set_local(&mut self, local: Option<ParticipantId>) {
        self.local = local;
        if let Some(id) = local {
            self.entries.remove(&id);
        }
    }

    pub fn local(&self) -> Option<ParticipantId> {
        self.local
    }

    /// Returns false for our own broadcasts, which never enter the cache.
    pub fn apply(&mut self, update: &CursorUpdate, now_ms: u64) -> bool {
        if self.local == Some(update.participant_id) {
            return false;
        }
        self.entries.insert(
            update.participant_id,
            CursorEntry {
                position: update.point(),
                last_seen_ms: now_ms,
            },
        );
        true
    }

    pub fn remove(&mut self, participant_id: ParticipantId) -> bool {
        self.entries.remove(&participant_id).is_some()
    }

    pub fn evict_stale(&mut self, now_ms: u64) -> usize {
        let ttl_ms = self.ttl_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.last_seen_ms) < ttl_ms);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "dropped idle cursors");
        }
        evicted
    }

    pub fn get(&self, participant_id: ParticipantId) -> Option<&CursorEntry> {
        self.entries.get(&participant_id)
    }

    pub fn position(&self, participant_id: ParticipantId) -> Option<Point> {
        self.get(participant_id).map(|entry| entry.position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn render(
        &self,
        roster: &Roster,
        viewport: &Viewport,
        frame: &ReferenceFrame,
    ) -> Vec<CursorSprite> {
        if !self.visible {
            return Vec::new();
        }
        self.entries
            .iter()
            .map(|(participant_id, entry)| {
                let badge = roster.badge(*participant_id);
                CursorSprite {
                    participant_id: *participant_id,
                    screen: viewport.to_screen(frame, entry.position),
                    label: badge.name.to_string(),
                    color: badge.color,
                }
            })
            .collect()
    }
}

/// Keeps a cursor cache fed from `cursor:update` and `participant:left`.
pub struct CursorLayer {
    transport: Rc<dyn Transport>,
    subscriptions: Vec<SubscriptionId>,
}

impl CursorLayer {
    pub fn attach(
        transport: Rc<dyn Transport>,
        cursors: Rc<RefCell<RemoteCursors>>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let on_update = {
            let cursors = Rc::clone(&cursors);
            Rc::new(move |msg: &ServerMsg| {
                if let ServerMsg::CursorUpdate(update) = msg {
                    cursors.borrow_mut().apply(update, clock.now_ms());
                }
            })
        };
        let on_left = Rc::new(move |msg: &ServerMsg| {
            if let ServerMsg::ParticipantLeft(left) = msg {
                cursors.borrow_mut().remove(left.participant_id);
            }
        });
        let subscriptions = vec![
            transport.subscribe(ServerEvent::CursorUpdate, on_update),
            transport.subscribe(ServerEvent::ParticipantLeft, on_left),
        ];
        Self {
            transport,
            subscriptions,
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn detach(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.transport.unsubscribe(id);
        }
    }
}

impl Drop for CursorLayer {
    fn drop(&mut self) {
        self.detach();
    }
}
