use std::fmt;

use ulid::Ulid;

use crate::model::{Ms, Occupant, OccupantKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Room,
    Employee,
    Guest,
    Allocation,
}

impl From<OccupantKind> for EntityKind {
    fn from(kind: OccupantKind) -> Self {
        match kind {
            OccupantKind::Employee => EntityKind::Employee,
            OccupantKind::Guest => EntityKind::Guest,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Room => "room",
            EntityKind::Employee => "employee",
            EntityKind::Guest => "guest",
            EntityKind::Allocation => "allocation",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound {
        kind: EntityKind,
        id: Ulid,
    },
    /// Malformed input. `fields` names every offending input field.
    Validation {
        fields: Vec<&'static str>,
        message: String,
    },
    CapacityExceeded {
        room_id: Ulid,
        room_code: String,
        occupancy: u32,
        capacity: u32,
    },
    InactiveOccupant {
        employee_id: Ulid,
        code: String,
    },
    AlreadyAllocated {
        occupant: Occupant,
        room_id: Ulid,
        room_code: String,
    },
    AlreadyReleased {
        allocation_id: Ulid,
        released_at: Ms,
    },
    AlreadyExists {
        field: &'static str,
        value: String,
    },
    InUse {
        kind: EntityKind,
        id: Ulid,
        active: u32,
    },
    WalError(String),
}

impl EngineError {
    pub(crate) fn not_found(kind: EntityKind, id: Ulid) -> Self {
        EngineError::NotFound { kind, id }
    }

    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            fields: vec![field],
            message: message.into(),
        }
    }

    /// Stable machine-readable identifier for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Validation { .. } => "validation",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::InactiveOccupant { .. } => "inactive_occupant",
            EngineError::AlreadyAllocated { .. } => "already_allocated",
            EngineError::AlreadyReleased { .. } => "already_released",
            EngineError::AlreadyExists { .. } => "already_exists",
            EngineError::InUse { .. } => "in_use",
            EngineError::WalError(_) => "wal_error",
        }
    }

    /// Storage faults, as opposed to requests the caller can fix.
    pub fn is_operational(&self) -> bool {
        matches!(self, EngineError::WalError(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            EngineError::Validation { fields, message } => {
                write!(f, "invalid {}: {message}", fields.join(", "))
            }
            EngineError::CapacityExceeded {
                room_code,
                occupancy,
                capacity,
                ..
            } => write!(
                f,
                "room {room_code} is at full capacity ({occupancy}/{capacity})"
            ),
            EngineError::InactiveOccupant { code, .. } => {
                write!(f, "employee {code} is inactive and cannot be allocated")
            }
            EngineError::AlreadyAllocated {
                occupant,
                room_code,
                ..
            } => write!(
                f,
                "{} already has an active allocation in room {room_code}",
                occupant.kind()
            ),
            EngineError::AlreadyReleased {
                allocation_id,
                released_at,
            } => write!(f, "allocation {allocation_id} already released at {released_at}"),
            EngineError::AlreadyExists { field, value } => {
                write!(f, "{field} already exists: {value}")
            }
            EngineError::InUse { kind, id, active } => write!(
                f,
                "cannot delete {kind} {id}: {active} active allocation(s)"
            ),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = EngineError::CapacityExceeded {
            room_id: Ulid::new(),
            room_code: "A-101".into(),
            occupancy: 1,
            capacity: 1,
        };
        assert_eq!(err.to_string(), "room A-101 is at full capacity (1/1)");

        let err = EngineError::Validation {
            fields: vec!["employee_id", "guest_id"],
            message: "exactly one occupant is required".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid employee_id, guest_id: exactly one occupant is required"
        );
    }

    #[test]
    fn only_wal_errors_are_operational() {
        assert!(EngineError::WalError("disk full".into()).is_operational());
        assert!(!EngineError::not_found(EntityKind::Room, Ulid::new()).is_operational());
        assert_eq!(EngineError::invalid("notes", "too long").code(), "validation");
    }
}
