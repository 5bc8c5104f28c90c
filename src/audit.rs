use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Event, Ms};

const CHANNEL_CAPACITY: usize = 256;

/// Which stream an audit entry is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every committed unit, in commit order.
    All,
    Room(Ulid),
    /// An employee or a guest.
    Occupant(Ulid),
}

/// One committed unit of work as seen by audit subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub committed_at: Ms,
    pub events: Vec<Event>,
}

/// Broadcast hub for committed mutations. Publishing never blocks and never
/// fails: lagging or absent subscribers simply miss entries.
pub struct AuditHub {
    channels: DashMap<Topic, broadcast::Sender<AuditEntry>>,
}

impl Default for AuditHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a topic. Creates the channel if needed.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<AuditEntry> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan a committed unit out to `All` plus every room and occupant it touched.
    pub fn publish(&self, entry: &AuditEntry) {
        let mut topics = vec![Topic::All];
        for event in &entry.events {
            let touched = [
                event.room_id().map(Topic::Room),
                event.occupant_id().map(Topic::Occupant),
            ];
            for topic in touched.into_iter().flatten() {
                if !topics.contains(&topic) {
                    topics.push(topic);
                }
            }
        }
        for topic in topics {
            self.send(topic, entry);
        }
    }

    fn send(&self, topic: Topic, entry: &AuditEntry) {
        if let Some(sender) = self.channels.get(&topic) {
            let _ = sender.send(entry.clone());
        }
    }

    /// Drop a topic's channel, e.g. once its room is deleted.
    pub fn remove(&self, topic: &Topic) {
        self.channels.remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Occupant, RoomStatus};

    fn allocation_entry(room_id: Ulid, occupant: Occupant) -> AuditEntry {
        AuditEntry {
            committed_at: 42,
            events: vec![
                Event::Allocated {
                    id: Ulid::new(),
                    room_id,
                    room_code: "A-1".into(),
                    occupant,
                    allocated_at: 42,
                    notes: None,
                },
                Event::RoomStatusChanged {
                    id: room_id,
                    status: RoomStatus::Occupied,
                },
            ],
        }
    }

    #[tokio::test]
    async fn subscribers_receive_by_topic() {
        let hub = AuditHub::new();
        let room_id = Ulid::new();
        let occupant = Occupant::Guest(Ulid::new());
        let mut all = hub.subscribe(Topic::All);
        let mut room = hub.subscribe(Topic::Room(room_id));
        let mut guest = hub.subscribe(Topic::Occupant(occupant.id()));
        let mut other = hub.subscribe(Topic::Room(Ulid::new()));

        let entry = allocation_entry(room_id, occupant);
        hub.publish(&entry);

        assert_eq!(all.recv().await.unwrap(), entry);
        assert_eq!(room.recv().await.unwrap(), entry);
        assert_eq!(guest.recv().await.unwrap(), entry);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_topic_gets_one_copy_per_unit() {
        let hub = AuditHub::new();
        let room_id = Ulid::new();
        let mut room = hub.subscribe(Topic::Room(room_id));

        hub.publish(&allocation_entry(room_id, Occupant::Employee(Ulid::new())));

        assert!(room.recv().await.is_ok());
        assert!(room.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = AuditHub::new();
        hub.publish(&allocation_entry(Ulid::new(), Occupant::Employee(Ulid::new())));
    }
}
