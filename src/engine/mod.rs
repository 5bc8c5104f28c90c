mod allocation;
mod error;
mod projection;
mod queries;
mod registry;
mod reports;
mod validate;

pub use allocation::BulkRelease;
pub use error::{EngineError, EntityKind};
pub use projection::{Violation, project};
pub use queries::{AllocationFilter, AllocationState, GuestWindow};
pub use registry::GuestDetails;
pub use reports::{
    ActivityEntry, ActivityKind, AllocationSummary, Dashboard, DepartmentBreakdown,
    RoomStatistics,
};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::audit::{AuditEntry, AuditHub};
use crate::clock::{Clock, SystemClock};
use crate::config::Policy;
use crate::model::*;
use crate::observability;
use crate::wal::{Unit, Wal};

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedOccupantState = Arc<RwLock<OccupantState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        unit: Unit,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        units: Vec<Unit>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    #[cfg(test)]
    FailNextFlush,
}

type PendingAppend = (Unit, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches units for group commit:
/// buffer the first append, drain whatever else is already queued, then
/// fsync once and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { unit, response } => {
                let mut batch = vec![(unit, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { unit, response }) => batch.push((unit, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(ref e) = result {
        tracing::error!("wal: group commit of {} unit(s) failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(unit, _)| wal.append_buffered(unit))
        .and_then(|()| wal.flush_sync());
    // Every caller in this batch is told it failed, so none of its units may
    // survive in the buffer or on disk.
    if result.is_err()
        && let Err(e) = wal.rollback()
    {
        tracing::error!("wal: rollback failed, refusing further appends: {e}");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { units, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &units).and_then(|()| wal.swap_compact_file());
            let status = if result.is_ok() { "ok" } else { "error" };
            metrics::counter!(observability::WAL_COMPACTIONS_TOTAL, "status" => status)
                .increment(1);
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        #[cfg(test)]
        WalCommand::FailNextFlush => wal.fail_next_flush(),
        WalCommand::Append { unit, response } => {
            let mut batch = vec![(unit, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Engine ───────────────────────────────────────────────

/// Where an allocation lives. Fixed at creation, so it is safe to read
/// without any lock.
#[derive(Debug, Clone, Copy)]
pub(super) struct AllocationRef {
    pub room_id: Ulid,
    pub occupant: Occupant,
}

pub struct Engine {
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    /// Employees and guests share one map; `Occupant` carries the kind.
    pub(super) occupants: DashMap<Ulid, SharedOccupantState>,
    pub(super) allocation_index: DashMap<Ulid, AllocationRef>,
    /// Codes of non-deleted rooms and employees.
    pub(super) room_codes: DashMap<String, Ulid>,
    pub(super) employee_codes: DashMap<String, Ulid>,
    /// Mutations hold it shared for their whole duration; compaction takes it
    /// exclusively so the snapshot never races a commit.
    pub(super) compaction_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub audit: Arc<AuditHub>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) policy: Policy,
}

impl Engine {
    pub fn new(wal_path: PathBuf, audit: Arc<AuditHub>) -> io::Result<Self> {
        Self::with_options(
            wal_path,
            audit,
            Arc::new(SystemClock::new()),
            Policy::default(),
        )
    }

    /// Open with an explicit clock and policy. Replays the WAL before returning.
    pub fn with_options(
        wal_path: PathBuf,
        audit: Arc<AuditHub>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> io::Result<Self> {
        let units = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            occupants: DashMap::new(),
            allocation_index: DashMap::new(),
            room_codes: DashMap::new(),
            employee_codes: DashMap::new(),
            compaction_gate: RwLock::new(()),
            wal_tx,
            audit,
            clock,
            policy,
        };

        // Sole owner of every Arc here, so try_write never contends. Blocking
        // lock calls are off limits since this may run inside a runtime.
        let mut events = 0usize;
        for unit in &units {
            for event in unit {
                engine.replay_event(event);
                events += 1;
            }
        }
        engine.refresh_gauges();
        tracing::info!(
            "replayed {} unit(s), {events} event(s): {} room(s), {} occupant(s), {} allocation(s)",
            units.len(),
            engine.rooms.len(),
            engine.occupants.len(),
            engine.allocation_index.len()
        );

        Ok(engine)
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::RoomCreated {
                id,
                code,
                capacity,
                notes,
            } => self.insert_room(Room {
                id: *id,
                code: code.clone(),
                capacity: *capacity,
                status: RoomStatus::Empty,
                notes: notes.clone(),
                deleted_at: None,
            }),
            Event::EmployeeRegistered { employee } => {
                self.insert_occupant(Profile::Employee(employee.clone()))
            }
            Event::GuestRegistered { guest } => self.insert_occupant(Profile::Guest(guest.clone())),
            other => {
                if let Some(room_id) = other.room_id()
                    && let Some(rs) = self.get_room_handle(&room_id)
                    && let Ok(mut guard) = rs.try_write()
                {
                    self.apply_to_room(&mut guard, other);
                }
                if let Some(occupant_id) = other.occupant_id()
                    && let Some(os) = self.get_occupant_handle(&occupant_id)
                    && let Ok(mut guard) = os.try_write()
                {
                    self.apply_to_occupant(&mut guard, other);
                }
            }
        }
    }

    pub(super) fn get_room_handle(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub(super) fn get_occupant_handle(&self, id: &Ulid) -> Option<SharedOccupantState> {
        self.occupants.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of room handles ordered by id, taken without holding any map ref.
    pub(super) fn room_handles(&self) -> Vec<SharedRoomState> {
        let mut handles: Vec<(Ulid, SharedRoomState)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles.into_iter().map(|(_, rs)| rs).collect()
    }

    pub(super) fn occupant_handles(&self) -> Vec<SharedOccupantState> {
        let mut handles: Vec<(Ulid, SharedOccupantState)> = self
            .occupants
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles.into_iter().map(|(_, os)| os).collect()
    }

    pub(super) fn insert_room(&self, room: Room) {
        let (id, code) = (room.id, room.code.clone());
        self.rooms.insert(id, Arc::new(RwLock::new(RoomState::new(room))));
        self.room_codes.insert(code, id);
    }

    pub(super) fn insert_occupant(&self, profile: Profile) {
        let state = OccupantState::new(profile);
        let id = state.occupant().id();
        if let Some(e) = state.employee() {
            self.employee_codes.insert(e.code.clone(), id);
        }
        self.occupants.insert(id, Arc::new(RwLock::new(state)));
    }

    /// Apply a room-scoped event. Caller holds the room's write lock.
    pub(super) fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated {
                capacity, notes, ..
            } => {
                rs.room.capacity = *capacity;
                rs.room.notes = notes.clone();
            }
            Event::RoomDeleted { id, at } => {
                rs.room.deleted_at = Some(*at);
                self.room_codes.remove_if(&rs.room.code, |_, owner| owner == id);
            }
            Event::RoomStatusChanged { status, .. } => rs.room.status = *status,
            Event::Allocated {
                id,
                room_id,
                occupant,
                allocated_at,
                notes,
                ..
            } => {
                rs.allocations.push(Allocation {
                    id: *id,
                    room_id: *room_id,
                    occupant: *occupant,
                    allocated_at: *allocated_at,
                    released_at: None,
                    notes: notes.clone(),
                });
                self.allocation_index.insert(
                    *id,
                    AllocationRef {
                        room_id: *room_id,
                        occupant: *occupant,
                    },
                );
            }
            Event::Released {
                id,
                released_at,
                notes,
                ..
            } => {
                if let Some(a) = rs.allocation_mut(*id)
                    && a.released_at.is_none()
                {
                    a.released_at = Some(*released_at);
                    a.append_notes(notes.as_deref());
                }
            }
            _ => {}
        }
    }

    /// Apply an employee/guest-scoped event. Caller holds the occupant's write lock.
    pub(super) fn apply_to_occupant(&self, os: &mut OccupantState, event: &Event) {
        match (event, &mut os.profile) {
            (
                Event::EmployeeUpdated {
                    name, department, ..
                },
                Profile::Employee(e),
            ) => {
                e.name = name.clone();
                e.department = *department;
            }
            (Event::EmployeeStatusChanged { status, .. }, Profile::Employee(e)) => {
                e.status = *status
            }
            (Event::EmployeeDeleted { id, at }, Profile::Employee(e)) => {
                self.employee_codes.remove_if(&e.code, |_, owner| owner == id);
                os.deleted_at = Some(*at);
            }
            (Event::GuestUpdated { guest }, Profile::Guest(g)) => *g = guest.clone(),
            (Event::GuestDeleted { at, .. }, Profile::Guest(_)) => os.deleted_at = Some(*at),
            (
                Event::Allocated {
                    id,
                    room_id,
                    room_code,
                    ..
                },
                _,
            ) if os.placement.is_none() => {
                // A placement is only ever replaced through a release
                os.placement = Some(Placement {
                    allocation_id: *id,
                    room_id: *room_id,
                    room_code: room_code.clone(),
                });
            }
            (Event::Released { id, .. }, _) => {
                if os.placement.as_ref().is_some_and(|p| p.allocation_id == *id) {
                    os.placement = None;
                }
            }
            _ => {}
        }
    }

    /// Apply a committed unit to the states whose write locks the caller holds.
    /// Events are routed by room id and occupant id.
    pub(super) fn apply_locked(
        &self,
        unit: &[Event],
        rooms: &mut [&mut RoomState],
        mut occupant: Option<&mut OccupantState>,
    ) {
        for event in unit {
            if let Some(room_id) = event.room_id()
                && let Some(rs) = rooms.iter_mut().find(|rs| rs.room.id == room_id)
            {
                self.apply_to_room(rs, event);
            }
            if let Some(occupant_id) = event.occupant_id()
                && let Some(os) = occupant.as_deref_mut()
                && os.occupant().id() == occupant_id
            {
                self.apply_to_occupant(os, event);
            }
        }
        record_unit_metrics(unit);
    }

    /// Write a unit to the WAL via the group-commit writer and wait until it
    /// is durable. State must not change before this returns `Ok`.
    pub(super) async fn persist(&self, unit: &[Event]) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                unit: unit.to_vec(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| {
                tracing::warn!("unit of work aborted, nothing applied: {e}");
                EngineError::WalError(e.to_string())
            })
    }

    /// Publish a committed unit to audit subscribers. Never fails.
    pub(super) fn publish(&self, committed_at: Ms, unit: Unit) {
        self.audit.publish(&AuditEntry {
            committed_at,
            events: unit,
        });
    }

    /// Make the WAL writer fail its next group commit after the bytes were
    /// written but before they were synced.
    #[cfg(test)]
    pub(super) async fn fail_next_wal_flush(&self) {
        let _ = self.wal_tx.send(WalCommand::FailNextFlush).await;
    }

    pub async fn appends_since_compact(&self) -> Result<u64, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))
    }

    /// Rewrite the WAL as a snapshot of current state, history included.
    ///
    /// Deleted entities come first so a code reused by a live entity is
    /// indexed to the live one on replay. Each allocation is written with its
    /// final notes, followed by its release if it has one.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut units = Vec::new();

        let mut occupant_units = Vec::new();
        for os in self.occupant_handles() {
            let guard = os.read().await;
            let mut unit = vec![match &guard.profile {
                Profile::Employee(e) => Event::EmployeeRegistered {
                    employee: e.clone(),
                },
                Profile::Guest(g) => Event::GuestRegistered { guest: g.clone() },
            }];
            if let Some(at) = guard.deleted_at {
                let id = guard.occupant().id();
                unit.push(match guard.kind() {
                    OccupantKind::Employee => Event::EmployeeDeleted { id, at },
                    OccupantKind::Guest => Event::GuestDeleted { id, at },
                });
            }
            occupant_units.push((guard.is_deleted(), unit));
        }
        occupant_units.sort_by_key(|(deleted, _)| !*deleted);
        units.extend(occupant_units.into_iter().map(|(_, unit)| unit));

        let mut room_units = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            let room = &guard.room;
            let mut unit = vec![Event::RoomCreated {
                id: room.id,
                code: room.code.clone(),
                capacity: room.capacity,
                notes: room.notes.clone(),
            }];
            for a in &guard.allocations {
                unit.push(Event::Allocated {
                    id: a.id,
                    room_id: room.id,
                    room_code: room.code.clone(),
                    occupant: a.occupant,
                    allocated_at: a.allocated_at,
                    notes: a.notes.clone(),
                });
                if let Some(released_at) = a.released_at {
                    unit.push(Event::Released {
                        id: a.id,
                        room_id: room.id,
                        occupant: a.occupant,
                        released_at,
                        notes: None,
                    });
                }
            }
            if room.status != RoomStatus::Empty {
                unit.push(Event::RoomStatusChanged {
                    id: room.id,
                    status: room.status,
                });
            }
            if let Some(at) = room.deleted_at {
                unit.push(Event::RoomDeleted { id: room.id, at });
            }
            room_units.push((guard.is_deleted(), unit));
        }
        room_units.sort_by_key(|(deleted, _)| !*deleted);
        units.extend(room_units.into_iter().map(|(_, unit)| unit));

        let unit_count = units.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                units,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| {
                tracing::error!("wal: compaction failed: {e}");
                EngineError::WalError(e.to_string())
            })?;
        tracing::info!("wal: compacted to {unit_count} unit(s)");
        Ok(())
    }

    /// Recompute the occupancy gauges from scratch.
    fn refresh_gauges(&self) {
        let mut occupied = 0u32;
        let mut active = 0u32;
        for entry in self.rooms.iter() {
            if let Ok(guard) = entry.value().try_read() {
                if guard.room.status == RoomStatus::Occupied {
                    occupied += 1;
                }
                active += guard.active_count();
            }
        }
        metrics::gauge!(observability::ROOMS_OCCUPIED).set(f64::from(occupied));
        metrics::gauge!(observability::ACTIVE_ALLOCATIONS).set(f64::from(active));
    }
}

fn record_unit_metrics(unit: &[Event]) {
    for event in unit {
        match event {
            Event::Allocated { .. } => {
                metrics::gauge!(observability::ACTIVE_ALLOCATIONS).increment(1.0)
            }
            Event::Released { .. } => {
                metrics::gauge!(observability::ACTIVE_ALLOCATIONS).decrement(1.0)
            }
            Event::RoomStatusChanged { id, status } => {
                tracing::debug!("room {id} is now {status}");
                match status {
                    RoomStatus::Occupied => {
                        metrics::gauge!(observability::ROOMS_OCCUPIED).increment(1.0)
                    }
                    RoomStatus::Empty => {
                        metrics::gauge!(observability::ROOMS_OCCUPIED).decrement(1.0)
                    }
                }
            }
            _ => {}
        }
    }
}
