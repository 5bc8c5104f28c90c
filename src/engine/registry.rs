use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::audit::Topic;
use crate::model::*;

use super::validate::*;
use super::{Engine, EngineError, EntityKind};

/// Caller-supplied guest fields, shared by registration and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestDetails {
    pub name: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub visit_date: NaiveDate,
    pub checkout_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Reserve `code` for `id` in a code index. The claim is visible to
/// concurrent registrations immediately and must be undone if the unit fails.
fn claim_code(
    index: &DashMap<String, Ulid>,
    code: &str,
    id: Ulid,
) -> Result<(), EngineError> {
    match index.entry(code.to_string()) {
        Entry::Occupied(_) => Err(EngineError::AlreadyExists {
            field: "code",
            value: code.to_string(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(id);
            Ok(())
        }
    }
}

fn unclaim_code(index: &DashMap<String, Ulid>, code: &str, id: Ulid) {
    index.remove_if(code, |_, owner| *owner == id);
}

impl Engine {
    fn guest_from_details(&self, id: Ulid, details: GuestDetails) -> Result<Guest, EngineError> {
        let name = normalize_name(&details.name)?;
        let phone = normalize_phone(details.phone)?;
        let company = normalize_company(details.company)?;
        check_visit_window(
            details.visit_date,
            details.checkout_date,
            self.policy.max_guest_stay_days,
        )?;
        let notes = normalize_notes(details.notes)?;
        Ok(Guest {
            id,
            name,
            phone,
            company,
            visit_date: details.visit_date,
            checkout_date: details.checkout_date,
            notes,
        })
    }

    // ── Rooms ────────────────────────────────────────────

    pub async fn create_room(
        &self,
        code: &str,
        capacity: Capacity,
        notes: Option<String>,
    ) -> Result<RoomInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let code = normalize_code("code", code)?;
        let notes = normalize_notes(notes)?;

        let id = Ulid::new();
        claim_code(&self.room_codes, &code, id)?;
        let unit = vec![Event::RoomCreated {
            id,
            code: code.clone(),
            capacity,
            notes: notes.clone(),
        }];
        if let Err(e) = self.persist(&unit).await {
            unclaim_code(&self.room_codes, &code, id);
            return Err(e);
        }

        let room = Room {
            id,
            code,
            capacity,
            status: RoomStatus::Empty,
            notes,
            deleted_at: None,
        };
        let info = RoomInfo::from_state(&RoomState::new(room.clone()));
        self.insert_room(room);
        tracing::info!("room {} created: {id}, capacity {}", info.code, capacity.slots());
        self.publish(self.clock.now_ms(), unit);
        Ok(info)
    }

    /// Change capacity and notes. The code is immutable.
    pub async fn update_room(
        &self,
        id: Ulid,
        capacity: Capacity,
        notes: Option<String>,
    ) -> Result<RoomInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let notes = normalize_notes(notes)?;
        let rs = self
            .get_room_handle(&id)
            .ok_or(EngineError::not_found(EntityKind::Room, id))?;
        let mut room = rs.write().await;
        if room.is_deleted() {
            return Err(EngineError::not_found(EntityKind::Room, id));
        }
        let occupancy = room.active_count();
        if capacity.slots() < occupancy {
            return Err(EngineError::invalid(
                "capacity",
                format!("cannot be below current occupancy ({occupancy})"),
            ));
        }

        let unit = vec![Event::RoomUpdated {
            id,
            capacity,
            notes,
        }];
        self.persist(&unit).await?;
        self.apply_locked(&unit, &mut [&mut *room], None);
        tracing::info!("room {} updated: capacity {}", room.room.code, capacity.slots());
        let info = RoomInfo::from_state(&room);
        self.publish(self.clock.now_ms(), unit);
        Ok(info)
    }

    /// Soft-delete an empty room. Its history is kept and its code freed.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let rs = self
            .get_room_handle(&id)
            .ok_or(EngineError::not_found(EntityKind::Room, id))?;
        let mut room = rs.write().await;
        if room.is_deleted() {
            return Err(EngineError::not_found(EntityKind::Room, id));
        }
        let active = room.active_count();
        if active > 0 {
            return Err(EngineError::InUse {
                kind: EntityKind::Room,
                id,
                active,
            });
        }

        let now = self.clock.now_ms();
        let unit = vec![Event::RoomDeleted { id, at: now }];
        self.persist(&unit).await?;
        self.apply_locked(&unit, &mut [&mut *room], None);
        tracing::info!("room {} deleted: {id}", room.room.code);
        self.publish(now, unit);
        self.audit.remove(&Topic::Room(id));
        Ok(())
    }

    // ── Employees ────────────────────────────────────────

    pub async fn register_employee(
        &self,
        code: &str,
        name: &str,
        department: Department,
        status: EmployeeStatus,
    ) -> Result<EmployeeInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let code = normalize_code("code", code)?;
        let name = normalize_name(name)?;

        let id = Ulid::new();
        claim_code(&self.employee_codes, &code, id)?;
        let employee = Employee {
            id,
            code: code.clone(),
            name,
            department,
            status,
        };
        let unit = vec![Event::EmployeeRegistered {
            employee: employee.clone(),
        }];
        if let Err(e) = self.persist(&unit).await {
            unclaim_code(&self.employee_codes, &code, id);
            return Err(e);
        }

        self.insert_occupant(Profile::Employee(employee));
        tracing::info!("employee {code} registered: {id}, {department}");
        self.publish(self.clock.now_ms(), unit);
        self.get_employee(id).await
    }

    pub async fn update_employee(
        &self,
        id: Ulid,
        name: &str,
        department: Department,
    ) -> Result<EmployeeInfo, EngineError> {
        let name = normalize_name(name)?;
        self.mutate_employee(id, Event::EmployeeUpdated {
            id,
            name,
            department,
        })
        .await
    }

    /// Existing allocations are unaffected; only new ones are gated on status.
    pub async fn set_employee_status(
        &self,
        id: Ulid,
        status: EmployeeStatus,
    ) -> Result<EmployeeInfo, EngineError> {
        self.mutate_employee(id, Event::EmployeeStatusChanged { id, status })
            .await
    }

    async fn mutate_employee(&self, id: Ulid, event: Event) -> Result<EmployeeInfo, EngineError> {
        let gate = self.compaction_gate.read().await;
        let os = self
            .get_occupant_handle(&id)
            .ok_or(EngineError::not_found(EntityKind::Employee, id))?;
        let mut guard = os.write().await;
        if guard.is_deleted() || guard.employee().is_none() {
            return Err(EngineError::not_found(EntityKind::Employee, id));
        }

        let unit = vec![event];
        self.persist(&unit).await?;
        self.apply_locked(&unit, &mut [], Some(&mut *guard));
        tracing::info!("employee {id}: {}", unit[0].label());
        drop(guard);
        drop(gate);
        self.publish(self.clock.now_ms(), unit);
        self.get_employee(id).await
    }

    /// Soft-delete an employee who holds no room.
    pub async fn delete_employee(&self, id: Ulid) -> Result<(), EngineError> {
        self.delete_occupant(Occupant::Employee(id)).await
    }

    // ── Guests ───────────────────────────────────────────

    /// Register a visitor. The visit may not start before today.
    pub async fn register_guest(&self, details: GuestDetails) -> Result<GuestInfo, EngineError> {
        let _gate = self.compaction_gate.read().await;
        if details.visit_date < self.clock.today() {
            return Err(EngineError::invalid(
                "visit_date",
                "cannot be in the past",
            ));
        }
        let id = Ulid::new();
        let guest = self.guest_from_details(id, details)?;
        let unit = vec![Event::GuestRegistered {
            guest: guest.clone(),
        }];
        self.persist(&unit).await?;

        let shown = guest.display_name();
        self.insert_occupant(Profile::Guest(guest));
        tracing::info!("guest {shown} registered: {id}");
        self.publish(self.clock.now_ms(), unit);
        self.get_guest(id).await
    }

    pub async fn update_guest(
        &self,
        id: Ulid,
        details: GuestDetails,
    ) -> Result<GuestInfo, EngineError> {
        let gate = self.compaction_gate.read().await;
        let guest = self.guest_from_details(id, details)?;
        let os = self
            .get_occupant_handle(&id)
            .ok_or(EngineError::not_found(EntityKind::Guest, id))?;
        let mut guard = os.write().await;
        if guard.is_deleted() || guard.guest().is_none() {
            return Err(EngineError::not_found(EntityKind::Guest, id));
        }

        let unit = vec![Event::GuestUpdated { guest }];
        self.persist(&unit).await?;
        self.apply_locked(&unit, &mut [], Some(&mut *guard));
        tracing::info!("guest {id} updated");
        drop(guard);
        drop(gate);
        self.publish(self.clock.now_ms(), unit);
        self.get_guest(id).await
    }

    /// Soft-delete a guest who holds no room.
    pub async fn delete_guest(&self, id: Ulid) -> Result<(), EngineError> {
        self.delete_occupant(Occupant::Guest(id)).await
    }

    async fn delete_occupant(&self, occupant: Occupant) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let id = occupant.id();
        let kind = EntityKind::from(occupant.kind());
        let os = self
            .get_occupant_handle(&id)
            .ok_or(EngineError::not_found(kind, id))?;
        let mut guard = os.write().await;
        if guard.is_deleted() || guard.occupant() != occupant {
            return Err(EngineError::not_found(kind, id));
        }
        if guard.placement.is_some() {
            return Err(EngineError::InUse { kind, id, active: 1 });
        }

        let at = self.clock.now_ms();
        let unit = vec![match occupant {
            Occupant::Employee(id) => Event::EmployeeDeleted { id, at },
            Occupant::Guest(id) => Event::GuestDeleted { id, at },
        }];
        self.persist(&unit).await?;
        self.apply_locked(&unit, &mut [], Some(&mut *guard));
        tracing::info!("{kind} {id} deleted");
        self.publish(at, unit);
        self.audit.remove(&Topic::Occupant(id));
        Ok(())
    }
}
