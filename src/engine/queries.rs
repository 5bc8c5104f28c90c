use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, EntityKind};

/// Which allocations `list_allocations` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationState {
    Active,
    Released,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationFilter {
    pub room_id: Option<Ulid>,
    pub occupant: Option<Occupant>,
    pub state: AllocationState,
}

impl AllocationFilter {
    fn matches(&self, a: &Allocation) -> bool {
        let state_ok = match self.state {
            AllocationState::Active => a.is_active(),
            AllocationState::Released => !a.is_active(),
            AllocationState::All => true,
        };
        state_ok && self.occupant.is_none_or(|o| o == a.occupant)
    }
}

/// Guest visit windows, relative to the clock's current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuestWindow {
    Current,
    Upcoming,
    Past,
    #[default]
    All,
}

pub(super) fn allocation_info(
    a: &Allocation,
    room_code: &str,
    occupant_name: String,
    now: Ms,
) -> AllocationInfo {
    AllocationInfo {
        id: a.id,
        room_id: a.room_id,
        room_code: room_code.to_string(),
        occupant: a.occupant,
        occupant_type: a.occupant.kind(),
        occupant_name,
        allocated_at: a.allocated_at,
        released_at: a.released_at,
        notes: a.notes.clone(),
        is_active: a.is_active(),
        duration_days: a.duration_days(now),
        duration_hours: a.duration_hours(now),
    }
}

fn employee_info(e: &Employee, placement: Option<&Placement>) -> EmployeeInfo {
    EmployeeInfo {
        id: e.id,
        code: e.code.clone(),
        name: e.name.clone(),
        department: e.department,
        status: e.status,
        current_room: placement.cloned(),
    }
}

fn guest_info(g: &Guest, today: NaiveDate, placement: Option<&Placement>) -> GuestInfo {
    GuestInfo {
        id: g.id,
        name: g.name.clone(),
        phone: g.phone.clone(),
        company: g.company.clone(),
        visit_date: g.visit_date,
        checkout_date: g.checkout_date,
        notes: g.notes.clone(),
        is_current: g.is_current(today),
        visit_duration_days: g.visit_duration_days(),
        current_room: placement.cloned(),
    }
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────

    pub async fn get_room(&self, id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self
            .get_room_handle(&id)
            .ok_or(EngineError::not_found(EntityKind::Room, id))?;
        let guard = rs.read().await;
        if guard.is_deleted() {
            return Err(EngineError::not_found(EntityKind::Room, id));
        }
        Ok(RoomInfo::from_state(&guard))
    }

    /// Every non-deleted room, ordered by code.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            if !guard.is_deleted() {
                rooms.push(RoomInfo::from_state(&guard));
            }
        }
        rooms.sort_by(|a, b| a.code.cmp(&b.code));
        rooms
    }

    /// Who is in a room right now, oldest allocation first.
    pub async fn room_occupants(&self, room_id: Ulid) -> Result<Vec<OccupantSummary>, EngineError> {
        let rs = self
            .get_room_handle(&room_id)
            .ok_or(EngineError::not_found(EntityKind::Room, room_id))?;
        let active: Vec<Allocation> = {
            let guard = rs.read().await;
            if guard.is_deleted() {
                return Err(EngineError::not_found(EntityKind::Room, room_id));
            }
            guard.active().cloned().collect()
        };
        let names = self.occupant_names(active.iter().map(|a| a.occupant)).await;
        let mut summaries: Vec<OccupantSummary> = active
            .into_iter()
            .map(|a| OccupantSummary {
                allocation_id: a.id,
                occupant: a.occupant,
                occupant_type: a.occupant.kind(),
                name: names.get(&a.occupant.id()).cloned().unwrap_or_default(),
                allocated_at: a.allocated_at,
            })
            .collect();
        summaries.sort_by_key(|s| (s.allocated_at, s.allocation_id));
        Ok(summaries)
    }

    /// Rooms with a free slot, optionally of one capacity, ordered by code.
    pub async fn available_rooms(&self, capacity: Option<Capacity>) -> Vec<RoomInfo> {
        let mut rooms = self.list_rooms().await;
        rooms.retain(|r| r.is_available && capacity.is_none_or(|c| c == r.capacity));
        rooms
    }

    /// First available room of the preferred capacity, otherwise any
    /// available room, smaller capacity first.
    pub async fn suggest_room(&self, preferred: Option<Capacity>) -> Option<RoomInfo> {
        let mut available = self.available_rooms(None).await;
        available.sort_by(|a, b| {
            let a_miss = preferred.is_some_and(|p| p != a.capacity);
            let b_miss = preferred.is_some_and(|p| p != b.capacity);
            (a_miss, a.capacity, &a.code).cmp(&(b_miss, b.capacity, &b.code))
        });
        available.into_iter().next()
    }

    // ── Allocations ──────────────────────────────────────

    pub async fn get_allocation(&self, id: Ulid) -> Result<AllocationInfo, EngineError> {
        let aref = self
            .allocation_index
            .get(&id)
            .map(|r| *r.value())
            .ok_or(EngineError::not_found(EntityKind::Allocation, id))?;
        let rs = self
            .get_room_handle(&aref.room_id)
            .ok_or(EngineError::not_found(EntityKind::Allocation, id))?;
        let (allocation, room_code) = {
            let guard = rs.read().await;
            let a = guard
                .allocation(id)
                .cloned()
                .ok_or(EngineError::not_found(EntityKind::Allocation, id))?;
            (a, guard.room.code.clone())
        };
        let name = self.occupant_name(allocation.occupant).await;
        Ok(allocation_info(
            &allocation,
            &room_code,
            name,
            self.clock.now_ms(),
        ))
    }

    /// Raw allocation records matching `filter`, newest first.
    pub async fn list_allocations(&self, filter: AllocationFilter) -> Vec<AllocationInfo> {
        let handles = match filter.room_id {
            Some(room_id) => self.get_room_handle(&room_id).into_iter().collect(),
            None => self.room_handles(),
        };

        let mut found: Vec<(Allocation, String)> = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            for a in guard.allocations.iter().filter(|a| filter.matches(a)) {
                found.push((a.clone(), guard.room.code.clone()));
            }
        }
        found.sort_by(|(a, _), (b, _)| (b.allocated_at, b.id).cmp(&(a.allocated_at, a.id)));

        let names = self.occupant_names(found.iter().map(|(a, _)| a.occupant)).await;
        let now = self.clock.now_ms();
        found
            .iter()
            .map(|(a, code)| {
                let name = names.get(&a.occupant.id()).cloned().unwrap_or_default();
                allocation_info(a, code, name, now)
            })
            .collect()
    }

    /// The occupant's active allocation, if any.
    pub async fn current_allocation(
        &self,
        occupant: Occupant,
    ) -> Result<Option<AllocationInfo>, EngineError> {
        let os = self
            .get_occupant_handle(&occupant.id())
            .ok_or(EngineError::not_found(occupant.kind().into(), occupant.id()))?;
        let placement = {
            let guard = os.read().await;
            if guard.occupant() != occupant {
                return Err(EngineError::not_found(occupant.kind().into(), occupant.id()));
            }
            guard.placement.clone()
        };
        match placement {
            Some(p) => self.get_allocation(p.allocation_id).await.map(Some),
            None => Ok(None),
        }
    }

    // ── Employees & guests ───────────────────────────────

    pub async fn get_employee(&self, id: Ulid) -> Result<EmployeeInfo, EngineError> {
        let not_found = EngineError::not_found(EntityKind::Employee, id);
        let os = self.get_occupant_handle(&id).ok_or(not_found.clone())?;
        let guard = os.read().await;
        match guard.employee() {
            Some(e) if !guard.is_deleted() => Ok(employee_info(e, guard.placement.as_ref())),
            _ => Err(not_found),
        }
    }

    /// Non-deleted employees ordered by name.
    pub async fn list_employees(&self) -> Vec<EmployeeInfo> {
        let mut employees = Vec::new();
        for os in self.occupant_handles() {
            let guard = os.read().await;
            if let Some(e) = guard.employee()
                && !guard.is_deleted()
            {
                employees.push(employee_info(e, guard.placement.as_ref()));
            }
        }
        employees.sort_by(|a, b| a.name.cmp(&b.name).then(a.code.cmp(&b.code)));
        employees
    }

    /// Active employees without a room, ordered by name.
    pub async fn unallocated_employees(&self) -> Vec<EmployeeInfo> {
        let mut employees = self.list_employees().await;
        employees.retain(|e| e.status == EmployeeStatus::Active && e.current_room.is_none());
        employees
    }

    pub async fn get_guest(&self, id: Ulid) -> Result<GuestInfo, EngineError> {
        let not_found = EngineError::not_found(EntityKind::Guest, id);
        let os = self.get_occupant_handle(&id).ok_or(not_found.clone())?;
        let today = self.clock.today();
        let guard = os.read().await;
        match guard.guest() {
            Some(g) if !guard.is_deleted() => Ok(guest_info(g, today, guard.placement.as_ref())),
            _ => Err(not_found),
        }
    }

    /// Non-deleted guests in the given visit window, latest visit first.
    pub async fn list_guests(&self, window: GuestWindow) -> Vec<GuestInfo> {
        let today = self.clock.today();
        let past_window = self.policy.past_guest_window_days;
        let mut guests = Vec::new();
        for os in self.occupant_handles() {
            let guard = os.read().await;
            let Some(g) = guard.guest() else { continue };
            if guard.is_deleted() {
                continue;
            }
            let in_window = match window {
                GuestWindow::Current => g.is_current(today),
                GuestWindow::Upcoming => g.is_upcoming(today),
                GuestWindow::Past => g.is_past(today, past_window),
                GuestWindow::All => true,
            };
            if in_window {
                guests.push(guest_info(g, today, guard.placement.as_ref()));
            }
        }
        guests.sort_by(|a, b| b.visit_date.cmp(&a.visit_date).then(a.name.cmp(&b.name)));
        guests
    }

    /// Current guests without a room.
    pub async fn unallocated_guests(&self) -> Vec<GuestInfo> {
        let mut guests = self.list_guests(GuestWindow::Current).await;
        guests.retain(|g| g.current_room.is_none());
        guests
    }

    // ── Helpers ──────────────────────────────────────────

    pub(super) async fn occupant_name(&self, occupant: Occupant) -> String {
        match self.get_occupant_handle(&occupant.id()) {
            Some(os) => os.read().await.display_name(),
            None => String::new(),
        }
    }

    /// Display names keyed by occupant id. One read lock at a time; the
    /// caller must not hold any room lock.
    pub(super) async fn occupant_names(
        &self,
        occupants: impl Iterator<Item = Occupant>,
    ) -> HashMap<Ulid, String> {
        let mut names = HashMap::new();
        for occupant in occupants {
            if names.contains_key(&occupant.id()) {
                continue;
            }
            let name = self.occupant_name(occupant).await;
            names.insert(occupant.id(), name);
        }
        names
    }
}
