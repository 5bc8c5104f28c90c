use serde::Serialize;
use ulid::Ulid;

use crate::limits::MAX_RECENT_ACTIVITY;
use crate::model::*;

use super::Engine;

fn rate(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(f64::from(part) / f64::from(whole) * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationSummary {
    pub active_allocations: u32,
    pub employee_allocations: u32,
    pub guest_allocations: u32,
    pub total_capacity: u32,
    pub available_slots: u32,
    /// Active allocations over total capacity, in percent.
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomStatistics {
    pub total_rooms: u32,
    pub occupied_rooms: u32,
    pub empty_rooms: u32,
    pub single_rooms: u32,
    pub double_rooms: u32,
    pub total_capacity: u32,
    pub occupied_slots: u32,
    pub available_slots: u32,
    /// Occupied rooms over all rooms, in percent.
    pub room_occupancy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentBreakdown {
    pub department: Department,
    pub total: u32,
    pub active: u32,
    pub inactive: u32,
    pub with_allocation: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_employees: u32,
    pub active_employees: u32,
    pub inactive_employees: u32,
    pub employees_with_allocation: u32,
    /// Placed employees over active employees, in percent.
    pub employee_allocation_rate: f64,
    pub rooms: RoomStatistics,
    pub total_guests: u32,
    pub current_guests: u32,
    pub guests_with_allocation: u32,
    pub allocations: AllocationSummary,
    pub historical_allocations: u32,
    /// Departments with at least one employee, in `Department::ALL` order.
    pub departments: Vec<DepartmentBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityKind {
    Allocated,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub allocation_id: Ulid,
    pub room_code: String,
    pub occupant: Occupant,
    pub occupant_name: String,
    pub at: Ms,
    pub message: String,
}

impl Engine {
    /// Active allocation counts against the capacity of non-deleted rooms.
    pub async fn allocation_summary(&self) -> AllocationSummary {
        let mut summary = AllocationSummary {
            active_allocations: 0,
            employee_allocations: 0,
            guest_allocations: 0,
            total_capacity: 0,
            available_slots: 0,
            occupancy_rate: 0.0,
        };
        for rs in self.room_handles() {
            let guard = rs.read().await;
            if guard.is_deleted() {
                continue;
            }
            summary.total_capacity += guard.room.capacity.slots();
            for a in guard.active() {
                summary.active_allocations += 1;
                match a.occupant.kind() {
                    OccupantKind::Employee => summary.employee_allocations += 1,
                    OccupantKind::Guest => summary.guest_allocations += 1,
                }
            }
        }
        summary.available_slots = summary
            .total_capacity
            .saturating_sub(summary.active_allocations);
        summary.occupancy_rate = rate(summary.active_allocations, summary.total_capacity);
        summary
    }

    pub async fn room_statistics(&self) -> RoomStatistics {
        let mut stats = RoomStatistics {
            total_rooms: 0,
            occupied_rooms: 0,
            empty_rooms: 0,
            single_rooms: 0,
            double_rooms: 0,
            total_capacity: 0,
            occupied_slots: 0,
            available_slots: 0,
            room_occupancy_rate: 0.0,
        };
        for rs in self.room_handles() {
            let guard = rs.read().await;
            if guard.is_deleted() {
                continue;
            }
            stats.total_rooms += 1;
            match guard.room.status {
                RoomStatus::Occupied => stats.occupied_rooms += 1,
                RoomStatus::Empty => stats.empty_rooms += 1,
            }
            match guard.room.capacity {
                Capacity::One => stats.single_rooms += 1,
                Capacity::Two => stats.double_rooms += 1,
            }
            stats.total_capacity += guard.room.capacity.slots();
            stats.occupied_slots += guard.active_count();
            stats.available_slots += guard.available_slots();
        }
        stats.room_occupancy_rate = rate(stats.occupied_rooms, stats.total_rooms);
        stats
    }

    pub async fn dashboard(&self) -> Dashboard {
        let rooms = self.room_statistics().await;
        let allocations = self.allocation_summary().await;
        let today = self.clock.today();

        let mut departments: Vec<DepartmentBreakdown> = Department::ALL
            .into_iter()
            .map(|department| DepartmentBreakdown {
                department,
                total: 0,
                active: 0,
                inactive: 0,
                with_allocation: 0,
            })
            .collect();
        let (mut total_guests, mut current_guests, mut guests_with_allocation) = (0, 0, 0);

        for os in self.occupant_handles() {
            let guard = os.read().await;
            if guard.is_deleted() {
                continue;
            }
            let placed = guard.placement.is_some();
            match &guard.profile {
                Profile::Employee(e) => {
                    if let Some(d) = departments.iter_mut().find(|d| d.department == e.department) {
                        d.total += 1;
                        match e.status {
                            EmployeeStatus::Active => d.active += 1,
                            EmployeeStatus::Inactive => d.inactive += 1,
                        }
                        if placed {
                            d.with_allocation += 1;
                        }
                    }
                }
                Profile::Guest(g) => {
                    total_guests += 1;
                    if g.is_current(today) {
                        current_guests += 1;
                    }
                    if placed {
                        guests_with_allocation += 1;
                    }
                }
            }
        }

        let mut historical_allocations = 0;
        for rs in self.room_handles() {
            let guard = rs.read().await;
            historical_allocations +=
                guard.allocations.iter().filter(|a| !a.is_active()).count() as u32;
        }

        let total_employees: u32 = departments.iter().map(|d| d.total).sum();
        let active_employees: u32 = departments.iter().map(|d| d.active).sum();
        let inactive_employees: u32 = departments.iter().map(|d| d.inactive).sum();
        let employees_with_allocation: u32 = departments.iter().map(|d| d.with_allocation).sum();
        departments.retain(|d| d.total > 0);

        Dashboard {
            total_employees,
            active_employees,
            inactive_employees,
            employees_with_allocation,
            employee_allocation_rate: rate(employees_with_allocation, active_employees),
            rooms,
            total_guests,
            current_guests,
            guests_with_allocation,
            allocations,
            historical_allocations,
            departments,
        }
    }

    /// Latest allocations and releases across all rooms, newest first.
    /// `limit` is capped at `MAX_RECENT_ACTIVITY`.
    pub async fn recent_activity(&self, limit: usize) -> Vec<ActivityEntry> {
        let limit = limit.min(MAX_RECENT_ACTIVITY);
        let mut events: Vec<(ActivityKind, Ms, Allocation, String)> = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            let code = &guard.room.code;
            for a in &guard.allocations {
                events.push((ActivityKind::Allocated, a.allocated_at, a.clone(), code.clone()));
                if let Some(released_at) = a.released_at {
                    events.push((ActivityKind::Released, released_at, a.clone(), code.clone()));
                }
            }
        }
        events.sort_by(|x, y| (y.1, y.2.id).cmp(&(x.1, x.2.id)));
        events.truncate(limit);

        let names = self.occupant_names(events.iter().map(|(_, _, a, _)| a.occupant)).await;
        events
            .into_iter()
            .map(|(kind, at, a, room_code)| {
                let occupant_name = names.get(&a.occupant.id()).cloned().unwrap_or_default();
                let message = match kind {
                    ActivityKind::Allocated => {
                        format!("Room {room_code} allocated to {occupant_name}")
                    }
                    ActivityKind::Released => {
                        format!("Room {room_code} released by {occupant_name}")
                    }
                };
                ActivityEntry {
                    kind,
                    allocation_id: a.id,
                    room_code,
                    occupant: a.occupant,
                    occupant_name,
                    at,
                    message,
                }
            })
            .collect()
    }
}
