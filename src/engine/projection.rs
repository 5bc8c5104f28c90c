use std::collections::HashMap;

use ulid::Ulid;

use crate::model::{Event, Occupant, RoomState, RoomStatus};

use super::Engine;

/// Status event for a room whose active count is about to change by `delta`.
/// `None` when the cached status already matches.
pub fn project(rs: &RoomState, delta: i32) -> Option<Event> {
    let active = rs.active_count().saturating_add_signed(delta);
    let status = RoomStatus::for_active_count(active);
    (status != rs.room.status).then_some(Event::RoomStatusChanged {
        id: rs.room.id,
        status,
    })
}

/// A broken store-wide invariant, as found by `Engine::check_invariants`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    StatusMismatch {
        room_id: Ulid,
        cached: RoomStatus,
        derived: RoomStatus,
    },
    OverCapacity {
        room_id: Ulid,
        active: u32,
        capacity: u32,
    },
    MultipleActive {
        occupant: Occupant,
        allocations: Vec<Ulid>,
    },
    /// Occupant's placement disagrees with the active allocation on record.
    PlacementMismatch {
        occupant: Occupant,
        placed: Option<Ulid>,
        active: Option<Ulid>,
    },
}

impl Engine {
    /// Scan the whole store for projection, capacity and placement drift.
    /// Takes one read lock at a time.
    pub async fn check_invariants(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut active_by_occupant: HashMap<Occupant, Vec<Ulid>> = HashMap::new();

        for rs in self.room_handles() {
            let guard = rs.read().await;
            let derived = guard.derived_status();
            if guard.room.status != derived {
                violations.push(Violation::StatusMismatch {
                    room_id: guard.room.id,
                    cached: guard.room.status,
                    derived,
                });
            }
            let active = guard.active_count();
            let capacity = guard.room.capacity.slots();
            if active > capacity {
                violations.push(Violation::OverCapacity {
                    room_id: guard.room.id,
                    active,
                    capacity,
                });
            }
            for a in guard.active() {
                active_by_occupant.entry(a.occupant).or_default().push(a.id);
            }
        }

        for os in self.occupant_handles() {
            let guard = os.read().await;
            let occupant = guard.occupant();
            let active = active_by_occupant.remove(&occupant).unwrap_or_default();
            if active.len() > 1 {
                violations.push(Violation::MultipleActive {
                    occupant,
                    allocations: active.clone(),
                });
            }
            let placed = guard.placement.as_ref().map(|p| p.allocation_id);
            if active.len() <= 1 && placed != active.first().copied() {
                violations.push(Violation::PlacementMismatch {
                    occupant,
                    placed,
                    active: active.first().copied(),
                });
            }
        }

        // Allocations whose occupant is not in the registry at all
        for (occupant, allocations) in active_by_occupant {
            violations.push(Violation::PlacementMismatch {
                occupant,
                placed: None,
                active: allocations.first().copied(),
            });
        }

        violations
    }
}
