// Per-draft broadcast of draft events to connected viewers.
//
// Each viewer owns a bounded mailbox. Delivery never blocks the caller: a
// full mailbox loses that one event for that one viewer, everyone else
// still receives it. Drafts are independent entries in a sharded map, so
// traffic on one draft never contends with another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::{DraftId, DraftStatus, PickId, PlayerId, TeamId};

/// Mailbox size used when the server config does not say otherwise.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Something that happened to a draft, as seen by its viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftEvent {
    #[serde(rename_all = "camelCase")]
    PickMade {
        pick_id: PickId,
        player_id: PlayerId,
        player_name: String,
        team_id: TeamId,
        team_name: String,
        round: i64,
        overall_pick: i64,
    },
    #[serde(rename_all = "camelCase")]
    PickUndone { pick_id: PickId, overall_pick: i64 },
    #[serde(rename_all = "camelCase")]
    PickTraded {
        pick_id: PickId,
        from_team_id: TeamId,
        to_team_id: TeamId,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged { status: DraftStatus },
    #[serde(rename_all = "camelCase")]
    DraftCompleted { draft_id: DraftId },
}

#[derive(Default)]
struct DraftChannel {
    subscribers: Vec<(u64, mpsc::Sender<DraftEvent>)>,
}

struct Registry {
    capacity: usize,
    drafts: DashMap<DraftId, DraftChannel>,
    next_id: AtomicU64,
}

impl Registry {
    fn unsubscribe(&self, draft_id: DraftId, subscriber_id: u64) {
        if let Some(mut channel) = self.drafts.get_mut(&draft_id) {
            channel.subscribers.retain(|(id, _)| *id != subscriber_id);
        }
        self.drafts
            .remove_if(&draft_id, |_, channel| channel.subscribers.is_empty());
    }

    fn prune(&self, draft_id: DraftId, closed: &[u64]) {
        if let Some(mut channel) = self.drafts.get_mut(&draft_id) {
            channel.subscribers.retain(|(id, _)| !closed.contains(id));
        }
        self.drafts
            .remove_if(&draft_id, |_, channel| channel.subscribers.is_empty());
    }
}

/// Registry of viewers per draft. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<Registry>,
}

impl Notifier {
    /// `mailbox_capacity` is the number of undelivered events a viewer may
    /// have queued before further events are dropped for it.
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                capacity: mailbox_capacity.max(1),
                drafts: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self, draft_id: DraftId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .drafts
            .entry(draft_id)
            .or_default()
            .subscribers
            .push((id, tx));
        debug!(draft_id, subscriber = id, "viewer subscribed");

        Subscription {
            draft_id,
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Offer `event` to every viewer of `draft_id`. Returns how many
    /// mailboxes accepted it.
    pub fn notify(&self, draft_id: DraftId, event: &DraftEvent) -> usize {
        // Snapshot the senders so no map guard is held while sending.
        let senders = match self.registry.drafts.get(&draft_id) {
            Some(channel) => channel.subscribers.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in &senders {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(draft_id, subscriber = id, "viewer mailbox full, event dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        if !closed.is_empty() {
            debug!(draft_id, count = closed.len(), "pruning closed mailboxes");
            self.registry.prune(draft_id, &closed);
        }
        delivered
    }

    pub fn subscriber_count(&self, draft_id: DraftId) -> usize {
        self.registry
            .drafts
            .get(&draft_id)
            .map(|channel| channel.subscribers.len())
            .unwrap_or(0)
    }

    /// Drafts that currently have at least one viewer.
    pub fn active_drafts(&self) -> Vec<DraftId> {
        self.registry.drafts.iter().map(|entry| *entry.key()).collect()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

/// A viewer's registration. Dropping it deregisters the viewer.
pub struct Subscription {
    draft_id: DraftId,
    id: u64,
    rx: mpsc::Receiver<DraftEvent>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn draft_id(&self) -> DraftId {
        self.draft_id
    }

    /// Wait for the next event. Never returns `None` while the notifier
    /// holds this viewer's sender.
    pub async fn recv(&mut self) -> Option<DraftEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DraftEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.draft_id, self.id);
        debug!(draft_id = self.draft_id, subscriber = self.id, "viewer unsubscribed");
    }
}
