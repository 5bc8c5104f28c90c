use std::time::Instant;

use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::limits::MAX_BULK_RELEASE;
use crate::model::*;
use crate::observability::{self, outcome_label};

use super::projection::project;
use super::queries::allocation_info;
use super::validate::{check_capacity, normalize_notes};
use super::{Engine, EngineError, EntityKind, SharedRoomState};

type RoomGuard = OwnedRwLockWriteGuard<RoomState>;

/// Outcome of `release_many`. Already released ids are neither counted nor errors.
#[derive(Debug)]
pub struct BulkRelease {
    pub released: usize,
    pub errors: Vec<(Ulid, EngineError)>,
}

/// The allocation with `id` in this room, provided it is still active.
fn active_allocation(rs: &RoomState, id: Ulid) -> Result<&Allocation, EngineError> {
    let a = rs
        .allocation(id)
        .ok_or(EngineError::not_found(EntityKind::Allocation, id))?;
    if let Some(released_at) = a.released_at {
        return Err(EngineError::AlreadyReleased {
            allocation_id: id,
            released_at,
        });
    }
    Ok(a)
}

/// Occupant may take a new allocation: registered with the right kind, not
/// deleted, and active if an employee.
fn check_eligible(
    os: Option<&OccupantState>,
    occupant: Occupant,
) -> Result<&OccupantState, EngineError> {
    let os = os
        .filter(|os| !os.is_deleted() && os.occupant() == occupant)
        .ok_or(EngineError::not_found(occupant.kind().into(), occupant.id()))?;
    if let Some(e) = os.employee()
        && !e.is_active()
    {
        return Err(EngineError::InactiveOccupant {
            employee_id: e.id,
            code: e.code.clone(),
        });
    }
    Ok(os)
}

/// Write-lock two distinct rooms in ascending id order. Returns `(a, b)`.
async fn lock_pair(
    (a_id, a): (Ulid, SharedRoomState),
    (b_id, b): (Ulid, SharedRoomState),
) -> (RoomGuard, RoomGuard) {
    if a_id < b_id {
        let a = a.write_owned().await;
        let b = b.write_owned().await;
        (a, b)
    } else {
        let b = b.write_owned().await;
        let a = a.write_owned().await;
        (a, b)
    }
}

impl Engine {
    /// Bind an employee or a guest (exactly one) to a room.
    pub async fn allocate(
        &self,
        room_id: Ulid,
        employee_id: Option<Ulid>,
        guest_id: Option<Ulid>,
        notes: Option<String>,
    ) -> Result<AllocationInfo, EngineError> {
        let started = Instant::now();
        let result = self.allocate_inner(room_id, employee_id, guest_id, notes).await;
        metrics::counter!(observability::ALLOCATIONS_TOTAL, "outcome" => outcome_label(&result))
            .increment(1);
        metrics::histogram!(observability::MUTATION_DURATION_SECONDS, "operation" => "allocate")
            .record(started.elapsed().as_secs_f64());
        if let Err(ref e) = result {
            tracing::debug!("allocate to room {room_id} rejected: {e}");
        }
        result
    }

    async fn allocate_inner(
        &self,
        room_id: Ulid,
        employee_id: Option<Ulid>,
        guest_id: Option<Ulid>,
        notes: Option<String>,
    ) -> Result<AllocationInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;

        let room_handle = self
            .get_room_handle(&room_id)
            .ok_or(EngineError::not_found(EntityKind::Room, room_id))?;
        if room_handle.read().await.is_deleted() {
            return Err(EngineError::not_found(EntityKind::Room, room_id));
        }

        let occupant = Occupant::from_refs(employee_id, guest_id).ok_or_else(|| {
            EngineError::Validation {
                fields: vec!["employee_id", "guest_id"],
                message: "exactly one of employee or guest is required".into(),
            }
        })?;
        let notes = normalize_notes(notes)?;

        // Occupant first, then the room.
        let mut occupant_guard = match self.get_occupant_handle(&occupant.id()) {
            Some(os) => Some(os.write_owned().await),
            None => None,
        };
        let mut room = room_handle.write_owned().await;
        if room.is_deleted() {
            return Err(EngineError::not_found(EntityKind::Room, room_id));
        }
        check_capacity(&room)?;

        let os = check_eligible(occupant_guard.as_deref(), occupant)?;
        if let Some(p) = &os.placement {
            return Err(EngineError::AlreadyAllocated {
                occupant,
                room_id: p.room_id,
                room_code: p.room_code.clone(),
            });
        }

        let now = self.clock.now_ms();
        let id = Ulid::new();
        let mut unit = vec![Event::Allocated {
            id,
            room_id,
            room_code: room.room.code.clone(),
            occupant,
            allocated_at: now,
            notes,
        }];
        unit.extend(project(&room, 1));

        self.persist(&unit).await?;
        let os = occupant_guard.as_deref_mut();
        self.apply_locked(&unit, &mut [&mut *room], os);

        let name = occupant_guard
            .as_deref()
            .map(OccupantState::display_name)
            .unwrap_or_default();
        let info = room
            .allocation(id)
            .map(|a| allocation_info(a, &room.room.code, name, now))
            .ok_or(EngineError::not_found(EntityKind::Allocation, id))?;
        tracing::info!(
            "allocated {id}: {} {} -> room {} at {now}",
            occupant.kind(),
            occupant.id(),
            room.room.code
        );
        self.publish(now, unit);
        Ok(info)
    }

    /// Close an active allocation, appending `notes` to what was recorded.
    pub async fn release(
        &self,
        allocation_id: Ulid,
        notes: Option<String>,
    ) -> Result<AllocationInfo, EngineError> {
        let started = Instant::now();
        let result = self.release_inner(allocation_id, notes).await;
        metrics::counter!(observability::RELEASES_TOTAL, "outcome" => outcome_label(&result))
            .increment(1);
        metrics::histogram!(observability::MUTATION_DURATION_SECONDS, "operation" => "release")
            .record(started.elapsed().as_secs_f64());
        if let Err(ref e) = result {
            tracing::debug!("release of {allocation_id} rejected: {e}");
        }
        result
    }

    async fn release_inner(
        &self,
        allocation_id: Ulid,
        notes: Option<String>,
    ) -> Result<AllocationInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let notes = normalize_notes(notes)?;

        let aref = self
            .allocation_index
            .get(&allocation_id)
            .map(|r| *r.value())
            .ok_or(EngineError::not_found(EntityKind::Allocation, allocation_id))?;
        let mut occupant_guard = match self.get_occupant_handle(&aref.occupant.id()) {
            Some(os) => Some(os.write_owned().await),
            None => None,
        };
        let room_handle = self
            .get_room_handle(&aref.room_id)
            .ok_or(EngineError::not_found(EntityKind::Room, aref.room_id))?;
        let mut room = room_handle.write_owned().await;
        active_allocation(&room, allocation_id)?;

        let now = self.clock.now_ms();
        let mut unit = vec![Event::Released {
            id: allocation_id,
            room_id: aref.room_id,
            occupant: aref.occupant,
            released_at: now,
            notes,
        }];
        unit.extend(project(&room, -1));

        self.persist(&unit).await?;
        self.apply_locked(&unit, &mut [&mut *room], occupant_guard.as_deref_mut());

        let name = occupant_guard
            .as_deref()
            .map(OccupantState::display_name)
            .unwrap_or_default();
        let info = room
            .allocation(allocation_id)
            .map(|a| allocation_info(a, &room.room.code, name, now))
            .ok_or(EngineError::not_found(EntityKind::Allocation, allocation_id))?;
        tracing::info!(
            "released {allocation_id}: {} {} from room {} at {now}",
            aref.occupant.kind(),
            aref.occupant.id(),
            room.room.code
        );
        self.publish(now, unit);
        Ok(info)
    }

    /// Move an active allocation's occupant to another room: the old
    /// allocation is released and a new one created, in one unit of work.
    /// Returns the new allocation.
    pub async fn transfer(
        &self,
        allocation_id: Ulid,
        new_room_id: Ulid,
    ) -> Result<AllocationInfo, EngineError> {
        let started = Instant::now();
        let result = self.transfer_inner(allocation_id, new_room_id).await;
        metrics::counter!(observability::TRANSFERS_TOTAL, "outcome" => outcome_label(&result))
            .increment(1);
        metrics::histogram!(observability::MUTATION_DURATION_SECONDS, "operation" => "transfer")
            .record(started.elapsed().as_secs_f64());
        if let Err(ref e) = result {
            tracing::debug!("transfer of {allocation_id} to room {new_room_id} rejected: {e}");
        }
        result
    }

    async fn transfer_inner(
        &self,
        allocation_id: Ulid,
        new_room_id: Ulid,
    ) -> Result<AllocationInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;

        let aref = self
            .allocation_index
            .get(&allocation_id)
            .map(|r| *r.value())
            .ok_or(EngineError::not_found(EntityKind::Allocation, allocation_id))?;
        let mut occupant_guard = match self.get_occupant_handle(&aref.occupant.id()) {
            Some(os) => Some(os.write_owned().await),
            None => None,
        };
        let source_handle = self
            .get_room_handle(&aref.room_id)
            .ok_or(EngineError::not_found(EntityKind::Room, aref.room_id))?;

        if new_room_id == aref.room_id {
            let source = source_handle.read().await;
            active_allocation(&source, allocation_id)?;
            return Err(EngineError::invalid(
                "new_room_id",
                "must differ from the current room",
            ));
        }

        let (mut source, target) = match self.get_room_handle(&new_room_id) {
            Some(target_handle) => {
                let (s, t) = lock_pair(
                    (aref.room_id, source_handle),
                    (new_room_id, target_handle),
                )
                .await;
                (s, Some(t))
            }
            None => (source_handle.write_owned().await, None),
        };
        let old = active_allocation(&source, allocation_id)?.clone();
        let mut target = target
            .filter(|t| !t.is_deleted())
            .ok_or(EngineError::not_found(EntityKind::Room, new_room_id))?;
        check_capacity(&target)?;
        check_eligible(occupant_guard.as_deref(), old.occupant)?;

        let now = self.clock.now_ms();
        let new_id = Ulid::new();
        let mut unit = vec![
            Event::Released {
                id: old.id,
                room_id: source.room.id,
                occupant: old.occupant,
                released_at: now,
                notes: Some(format!("Transferred to room {}", target.room.code)),
            },
            Event::Allocated {
                id: new_id,
                room_id: new_room_id,
                room_code: target.room.code.clone(),
                occupant: old.occupant,
                allocated_at: now,
                notes: Some(format!("Transferred from room {}", source.room.code)),
            },
        ];
        unit.extend(project(&source, -1));
        unit.extend(project(&target, 1));

        self.persist(&unit).await?;
        self.apply_locked(
            &unit,
            &mut [&mut *source, &mut *target],
            occupant_guard.as_deref_mut(),
        );

        let name = occupant_guard
            .as_deref()
            .map(OccupantState::display_name)
            .unwrap_or_default();
        let info = target
            .allocation(new_id)
            .map(|a| allocation_info(a, &target.room.code, name, now))
            .ok_or(EngineError::not_found(EntityKind::Allocation, new_id))?;
        tracing::info!(
            "transferred {} {}: room {} -> {} ({allocation_id} -> {new_id}) at {now}",
            old.occupant.kind(),
            old.occupant.id(),
            source.room.code,
            target.room.code
        );
        self.publish(now, unit);
        Ok(info)
    }

    /// Release many allocations, each in its own unit of work. Already
    /// released ids are skipped; other failures are collected per id.
    pub async fn release_many(
        &self,
        allocation_ids: &[Ulid],
        notes: Option<String>,
    ) -> Result<BulkRelease, EngineError> {
        if allocation_ids.len() > MAX_BULK_RELEASE {
            return Err(EngineError::invalid(
                "allocation_ids",
                format!("at most {MAX_BULK_RELEASE} allocations per request"),
            ));
        }
        let mut ids = allocation_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut outcome = BulkRelease {
            released: 0,
            errors: Vec::new(),
        };
        for id in ids {
            match self.release(id, notes.clone()).await {
                Ok(_) => outcome.released += 1,
                Err(EngineError::AlreadyReleased { .. }) => {}
                Err(e) => outcome.errors.push((id, e)),
            }
        }
        tracing::info!(
            "bulk release: {} released, {} failed",
            outcome.released,
            outcome.errors.len()
        );
        Ok(outcome)
    }
}
