use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// UTC calendar day containing the instant `ms`.
pub fn day_of(ms: Ms) -> NaiveDate {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

/// Round to one decimal place, the precision every rate is reported with.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ── Enumerations ─────────────────────────────────────────────────

/// Number of people a room sleeps. Only single and double rooms exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capacity {
    One,
    Two,
}

impl Capacity {
    pub const ALL: [Capacity; 2] = [Capacity::One, Capacity::Two];

    pub fn from_u32(n: u32) -> Option<Self> {
        match n {
            1 => Some(Capacity::One),
            2 => Some(Capacity::Two),
            _ => None,
        }
    }

    pub fn slots(self) -> u32 {
        match self {
            Capacity::One => 1,
            Capacity::Two => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Empty,
    Occupied,
}

impl RoomStatus {
    /// The projection rule: a room is occupied iff it holds an active allocation.
    pub fn for_active_count(active: u32) -> Self {
        if active > 0 {
            RoomStatus::Occupied
        } else {
            RoomStatus::Empty
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomStatus::Empty => f.write_str("empty"),
            RoomStatus::Occupied => f.write_str("occupied"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Department {
    Hr,
    Finance,
    Production,
    Facilities,
    Safety,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Hr,
        Department::Finance,
        Department::Production,
        Department::Facilities,
        Department::Safety,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Department::Hr => "HR",
            Department::Finance => "Finance",
            Department::Production => "Production",
            Department::Facilities => "Facilities",
            Department::Safety => "Safety",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Department::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown department: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmployeeStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccupantKind {
    Employee,
    Guest,
}

impl fmt::Display for OccupantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccupantKind::Employee => f.write_str("Employee"),
            OccupantKind::Guest => f.write_str("Guest"),
        }
    }
}

/// Who holds an allocation. Exactly one of employee or guest, by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occupant {
    Employee(Ulid),
    Guest(Ulid),
}

impl Occupant {
    /// Fold the two optional references of an allocation request into an occupant.
    /// Returns `None` when both or neither are present.
    pub fn from_refs(employee_id: Option<Ulid>, guest_id: Option<Ulid>) -> Option<Self> {
        match (employee_id, guest_id) {
            (Some(id), None) => Some(Occupant::Employee(id)),
            (None, Some(id)) => Some(Occupant::Guest(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> Ulid {
        match self {
            Occupant::Employee(id) | Occupant::Guest(id) => *id,
        }
    }

    pub fn kind(&self) -> OccupantKind {
        match self {
            Occupant::Employee(_) => OccupantKind::Employee,
            Occupant::Guest(_) => OccupantKind::Guest,
        }
    }
}

impl fmt::Display for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub code: String,
    pub capacity: Capacity,
    /// Cached projection of the active allocation count.
    pub status: RoomStatus,
    pub notes: Option<String>,
    pub deleted_at: Option<Ms>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Ulid,
    pub code: String,
    pub name: String,
    pub department: Department,
    pub status: EmployeeStatus,
}

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: Ulid,
    pub name: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub visit_date: NaiveDate,
    pub checkout_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl Guest {
    /// Visiting today: arrived, and not yet past the checkout day (inclusive).
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.visit_date <= today && self.checkout_date.is_none_or(|c| c >= today)
    }

    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.visit_date > today
    }

    /// Checked out before today, or open-ended and arrived more than
    /// `window_days` ago.
    pub fn is_past(&self, today: NaiveDate, window_days: u32) -> bool {
        match self.checkout_date {
            Some(checkout) => checkout < today,
            None => today
                .checked_sub_days(Days::new(u64::from(window_days)))
                .is_some_and(|cutoff| self.visit_date < cutoff),
        }
    }

    /// Length of the visit in days, counting both the arrival and checkout day.
    pub fn visit_duration_days(&self) -> Option<i64> {
        self.checkout_date
            .map(|checkout| (checkout - self.visit_date).num_days() + 1)
    }

    pub fn display_name(&self) -> String {
        match &self.company {
            Some(company) => format!("{} - {company}", self.name),
            None => self.name.clone(),
        }
    }
}

/// One binding of a room to an occupant. Released at most once, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub occupant: Occupant,
    pub allocated_at: Ms,
    pub released_at: Option<Ms>,
    pub notes: Option<String>,
}

impl Allocation {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    /// Elapsed time up to release, or up to `now` while still active.
    pub fn duration_ms(&self, now: Ms) -> Ms {
        (self.released_at.unwrap_or(now) - self.allocated_at).max(0)
    }

    pub fn duration_days(&self, now: Ms) -> i64 {
        self.duration_ms(now) / DAY_MS
    }

    pub fn duration_hours(&self, now: Ms) -> i64 {
        self.duration_ms(now) / HOUR_MS
    }

    /// Append a note on its own line, keeping whatever was recorded before.
    pub fn append_notes(&mut self, extra: Option<&str>) {
        let Some(extra) = extra else { return };
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{extra}"),
            _ => extra.to_string(),
        });
    }
}

// ── In-memory state ──────────────────────────────────────────────

/// A room plus every allocation ever made in it, in allocation order.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    pub allocations: Vec<Allocation>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            allocations: Vec::new(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.room.deleted_at.is_some()
    }

    pub fn active(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.iter().filter(|a| a.is_active())
    }

    pub fn active_count(&self) -> u32 {
        self.active().count() as u32
    }

    pub fn available_slots(&self) -> u32 {
        self.room.capacity.slots().saturating_sub(self.active_count())
    }

    pub fn is_available(&self) -> bool {
        self.available_slots() > 0
    }

    pub fn is_full(&self) -> bool {
        self.active_count() >= self.room.capacity.slots()
    }

    pub fn occupancy_percentage(&self) -> f64 {
        round1(f64::from(self.active_count()) / f64::from(self.room.capacity.slots()) * 100.0)
    }

    /// Status derived from the allocations, as opposed to the cached `room.status`.
    pub fn derived_status(&self) -> RoomStatus {
        RoomStatus::for_active_count(self.active_count())
    }

    pub fn allocation(&self, id: Ulid) -> Option<&Allocation> {
        self.allocations.iter().rev().find(|a| a.id == id)
    }

    pub fn allocation_mut(&mut self, id: Ulid) -> Option<&mut Allocation> {
        self.allocations.iter_mut().rev().find(|a| a.id == id)
    }
}

/// Where an occupant currently sleeps. The room code is immutable, so it is
/// copied here and never needs another room's lock to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub allocation_id: Ulid,
    pub room_id: Ulid,
    pub room_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    Employee(Employee),
    Guest(Guest),
}

/// An employee or guest plus their single active placement, if any.
#[derive(Debug, Clone)]
pub struct OccupantState {
    pub profile: Profile,
    pub placement: Option<Placement>,
    pub deleted_at: Option<Ms>,
}

impl OccupantState {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            placement: None,
            deleted_at: None,
        }
    }

    pub fn occupant(&self) -> Occupant {
        match &self.profile {
            Profile::Employee(e) => Occupant::Employee(e.id),
            Profile::Guest(g) => Occupant::Guest(g.id),
        }
    }

    pub fn kind(&self) -> OccupantKind {
        self.occupant().kind()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn display_name(&self) -> String {
        match &self.profile {
            Profile::Employee(e) => e.name.clone(),
            Profile::Guest(g) => g.name.clone(),
        }
    }

    pub fn employee(&self) -> Option<&Employee> {
        match &self.profile {
            Profile::Employee(e) => Some(e),
            Profile::Guest(_) => None,
        }
    }

    pub fn guest(&self) -> Option<&Guest> {
        match &self.profile {
            Profile::Guest(g) => Some(g),
            Profile::Employee(_) => None,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Flat event types. A WAL entry holds one unit of work:
/// every event a single operation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        code: String,
        capacity: Capacity,
        notes: Option<String>,
    },
    RoomUpdated {
        id: Ulid,
        capacity: Capacity,
        notes: Option<String>,
    },
    RoomDeleted {
        id: Ulid,
        at: Ms,
    },
    RoomStatusChanged {
        id: Ulid,
        status: RoomStatus,
    },
    EmployeeRegistered {
        employee: Employee,
    },
    EmployeeUpdated {
        id: Ulid,
        name: String,
        department: Department,
    },
    EmployeeStatusChanged {
        id: Ulid,
        status: EmployeeStatus,
    },
    EmployeeDeleted {
        id: Ulid,
        at: Ms,
    },
    GuestRegistered {
        guest: Guest,
    },
    GuestUpdated {
        guest: Guest,
    },
    GuestDeleted {
        id: Ulid,
        at: Ms,
    },
    Allocated {
        id: Ulid,
        room_id: Ulid,
        room_code: String,
        occupant: Occupant,
        allocated_at: Ms,
        notes: Option<String>,
    },
    Released {
        id: Ulid,
        room_id: Ulid,
        occupant: Occupant,
        released_at: Ms,
        notes: Option<String>,
    },
}

impl Event {
    /// The room whose state this event changes, if any.
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Event::RoomCreated { id, .. }
            | Event::RoomUpdated { id, .. }
            | Event::RoomDeleted { id, .. }
            | Event::RoomStatusChanged { id, .. } => Some(*id),
            Event::Allocated { room_id, .. } | Event::Released { room_id, .. } => Some(*room_id),
            _ => None,
        }
    }

    /// The employee or guest whose state this event changes, if any.
    pub fn occupant_id(&self) -> Option<Ulid> {
        match self {
            Event::EmployeeRegistered { employee } => Some(employee.id),
            Event::GuestRegistered { guest } | Event::GuestUpdated { guest } => Some(guest.id),
            Event::EmployeeUpdated { id, .. }
            | Event::EmployeeStatusChanged { id, .. }
            | Event::EmployeeDeleted { id, .. }
            | Event::GuestDeleted { id, .. } => Some(*id),
            Event::Allocated { occupant, .. } | Event::Released { occupant, .. } => {
                Some(occupant.id())
            }
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Event::RoomCreated { .. } => "room_created",
            Event::RoomUpdated { .. } => "room_updated",
            Event::RoomDeleted { .. } => "room_deleted",
            Event::RoomStatusChanged { .. } => "room_status_changed",
            Event::EmployeeRegistered { .. } => "employee_registered",
            Event::EmployeeUpdated { .. } => "employee_updated",
            Event::EmployeeStatusChanged { .. } => "employee_status_changed",
            Event::EmployeeDeleted { .. } => "employee_deleted",
            Event::GuestRegistered { .. } => "guest_registered",
            Event::GuestUpdated { .. } => "guest_updated",
            Event::GuestDeleted { .. } => "guest_deleted",
            Event::Allocated { .. } => "allocated",
            Event::Released { .. } => "released",
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomInfo {
    pub id: Ulid,
    pub code: String,
    pub capacity: Capacity,
    pub status: RoomStatus,
    pub notes: Option<String>,
    pub current_occupancy: u32,
    pub available_slots: u32,
    pub is_available: bool,
    pub is_full: bool,
    pub occupancy_percentage: f64,
}

impl RoomInfo {
    pub fn from_state(rs: &RoomState) -> Self {
        Self {
            id: rs.room.id,
            code: rs.room.code.clone(),
            capacity: rs.room.capacity,
            status: rs.room.status,
            notes: rs.room.notes.clone(),
            current_occupancy: rs.active_count(),
            available_slots: rs.available_slots(),
            is_available: rs.is_available(),
            is_full: rs.is_full(),
            occupancy_percentage: rs.occupancy_percentage(),
        }
    }
}

/// An allocation record plus the fields derived for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub room_code: String,
    pub occupant: Occupant,
    pub occupant_type: OccupantKind,
    pub occupant_name: String,
    pub allocated_at: Ms,
    pub released_at: Option<Ms>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub duration_days: i64,
    pub duration_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupantSummary {
    pub allocation_id: Ulid,
    pub occupant: Occupant,
    pub occupant_type: OccupantKind,
    pub name: String,
    pub allocated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeInfo {
    pub id: Ulid,
    pub code: String,
    pub name: String,
    pub department: Department,
    pub status: EmployeeStatus,
    pub current_room: Option<Placement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestInfo {
    pub id: Ulid,
    pub name: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub visit_date: NaiveDate,
    pub checkout_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_current: bool,
    pub visit_duration_days: Option<i64>,
    pub current_room: Option<Placement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn guest(visit: NaiveDate, checkout: Option<NaiveDate>) -> Guest {
        Guest {
            id: Ulid::new(),
            name: "Ayu".into(),
            phone: None,
            company: None,
            visit_date: visit,
            checkout_date: checkout,
            notes: None,
        }
    }

    fn allocation(allocated_at: Ms, released_at: Option<Ms>) -> Allocation {
        Allocation {
            id: Ulid::new(),
            room_id: Ulid::new(),
            occupant: Occupant::Employee(Ulid::new()),
            allocated_at,
            released_at,
            notes: None,
        }
    }

    fn room(capacity: Capacity) -> Room {
        Room {
            id: Ulid::new(),
            code: "A-101".into(),
            capacity,
            status: RoomStatus::Empty,
            notes: None,
            deleted_at: None,
        }
    }

    #[test]
    fn capacity_only_one_or_two() {
        assert_eq!(Capacity::from_u32(1), Some(Capacity::One));
        assert_eq!(Capacity::from_u32(2), Some(Capacity::Two));
        assert_eq!(Capacity::from_u32(0), None);
        assert_eq!(Capacity::from_u32(3), None);
        assert_eq!(Capacity::Two.slots(), 2);
    }

    #[test]
    fn occupant_from_refs_exactly_one() {
        let e = Ulid::new();
        let g = Ulid::new();
        assert_eq!(Occupant::from_refs(Some(e), None), Some(Occupant::Employee(e)));
        assert_eq!(Occupant::from_refs(None, Some(g)), Some(Occupant::Guest(g)));
        assert_eq!(Occupant::from_refs(Some(e), Some(g)), None);
        assert_eq!(Occupant::from_refs(None, None), None);
    }

    #[test]
    fn department_parses_case_insensitively() {
        assert_eq!("hr".parse::<Department>(), Ok(Department::Hr));
        assert_eq!(" Safety ".parse::<Department>(), Ok(Department::Safety));
        assert!("Marketing".parse::<Department>().is_err());
    }

    #[test]
    fn status_projection_rule() {
        assert_eq!(RoomStatus::for_active_count(0), RoomStatus::Empty);
        assert_eq!(RoomStatus::for_active_count(1), RoomStatus::Occupied);
        assert_eq!(RoomStatus::for_active_count(2), RoomStatus::Occupied);
    }

    #[test]
    fn guest_current_window_inclusive() {
        let g = guest(date(2026, 3, 1), Some(date(2026, 3, 5)));
        assert!(!g.is_current(date(2026, 2, 28)));
        assert!(g.is_current(date(2026, 3, 1)));
        assert!(g.is_current(date(2026, 3, 5)));
        assert!(!g.is_current(date(2026, 3, 6)));
        assert!(g.is_upcoming(date(2026, 2, 28)));
    }

    #[test]
    fn guest_open_ended_stays_current() {
        let g = guest(date(2026, 3, 1), None);
        assert!(g.is_current(date(2026, 6, 1)));
        assert_eq!(g.visit_duration_days(), None);
    }

    #[test]
    fn guest_past_windows() {
        let checked_out = guest(date(2026, 3, 1), Some(date(2026, 3, 3)));
        assert!(checked_out.is_past(date(2026, 3, 4), 7));
        assert!(!checked_out.is_past(date(2026, 3, 3), 7));

        let open = guest(date(2026, 3, 1), None);
        assert!(!open.is_past(date(2026, 3, 8), 7)); // cutoff 03-01, not before it
        assert!(open.is_past(date(2026, 3, 9), 7));
        assert!(open.is_past(date(2026, 3, 3), 1));
    }

    #[test]
    fn guest_visit_duration_counts_both_days() {
        let g = guest(date(2026, 3, 1), Some(date(2026, 3, 3)));
        assert_eq!(g.visit_duration_days(), Some(3));
    }

    #[test]
    fn allocation_durations_use_given_now_while_active() {
        let a = allocation(0, None);
        assert_eq!(a.duration_hours(5 * HOUR_MS + 1), 5);
        assert_eq!(a.duration_days(3 * DAY_MS - 1), 2);

        let closed = allocation(0, Some(2 * DAY_MS));
        assert_eq!(closed.duration_days(100 * DAY_MS), 2);
        assert_eq!(closed.duration_hours(100 * DAY_MS), 48);
    }

    #[test]
    fn allocation_duration_never_negative() {
        let a = allocation(10 * HOUR_MS, None);
        assert_eq!(a.duration_ms(0), 0);
    }

    #[test]
    fn notes_append_newline_joined() {
        let mut a = allocation(0, None);
        a.append_notes(None);
        assert_eq!(a.notes, None);
        a.append_notes(Some("first"));
        assert_eq!(a.notes.as_deref(), Some("first"));
        a.append_notes(Some("second"));
        assert_eq!(a.notes.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn room_state_counts_only_active() {
        let mut rs = RoomState::new(room(Capacity::Two));
        assert!(rs.is_available());
        assert_eq!(rs.derived_status(), RoomStatus::Empty);

        rs.allocations.push(allocation(0, Some(10)));
        assert_eq!(rs.active_count(), 0);

        rs.allocations.push(allocation(20, None));
        assert_eq!(rs.active_count(), 1);
        assert_eq!(rs.available_slots(), 1);
        assert_eq!(rs.occupancy_percentage(), 50.0);
        assert_eq!(rs.derived_status(), RoomStatus::Occupied);

        rs.allocations.push(allocation(30, None));
        assert!(rs.is_full());
        assert!(!rs.is_available());
        assert_eq!(rs.available_slots(), 0);
    }

    #[test]
    fn round1_rounds_half_up() {
        assert_eq!(round1(33.333), 33.3);
        assert_eq!(round1(66.666), 66.7);
    }

    #[test]
    fn day_of_epoch_ms() {
        assert_eq!(day_of(0), date(1970, 1, 1));
        assert_eq!(day_of(DAY_MS + 1), date(1970, 1, 2));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::Allocated {
            id: Ulid::new(),
            room_id: Ulid::new(),
            room_code: "B-2".into(),
            occupant: Occupant::Guest(Ulid::new()),
            allocated_at: 1_000,
            notes: Some("late arrival".into()),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn event_routing_ids() {
        let occupant = Occupant::Employee(Ulid::new());
        let room_id = Ulid::new();
        let event = Event::Released {
            id: Ulid::new(),
            room_id,
            occupant,
            released_at: 5,
            notes: None,
        };
        assert_eq!(event.room_id(), Some(room_id));
        assert_eq!(event.occupant_id(), Some(occupant.id()));
        assert_eq!(event.label(), "released");
    }
}
