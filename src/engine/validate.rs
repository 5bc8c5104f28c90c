use chrono::NaiveDate;

use crate::limits::*;
use crate::model::RoomState;

use super::EngineError;

/// Normalize a room or employee code (trimmed, upper-cased) and check its shape.
pub(super) fn normalize_code(field: &'static str, raw: &str) -> Result<String, EngineError> {
    let code = raw.trim().to_ascii_uppercase();
    let len = code.chars().count();
    if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
        return Err(EngineError::invalid(
            field,
            format!("must be {MIN_CODE_LEN} to {MAX_CODE_LEN} characters"),
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(EngineError::invalid(
            field,
            "may only contain A-Z, 0-9, hyphens and underscores",
        ));
    }
    Ok(code)
}

/// Trim a person's name and check its length.
pub(super) fn normalize_name(raw: &str) -> Result<String, EngineError> {
    let name = raw.trim().to_string();
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(EngineError::invalid(
            "name",
            format!("must be {MIN_NAME_LEN} to {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name)
}

/// Empty or blank notes collapse to `None`.
pub(super) fn normalize_notes(notes: Option<String>) -> Result<Option<String>, EngineError> {
    let notes = notes.filter(|n| !n.trim().is_empty());
    if let Some(ref n) = notes
        && n.chars().count() > MAX_NOTES_LEN
    {
        return Err(EngineError::invalid(
            "notes",
            format!("cannot exceed {MAX_NOTES_LEN} characters"),
        ));
    }
    Ok(notes)
}

pub(super) fn normalize_phone(phone: Option<String>) -> Result<Option<String>, EngineError> {
    let Some(phone) = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    if phone.chars().count() > MAX_PHONE_LEN {
        return Err(EngineError::invalid(
            "phone",
            format!("cannot exceed {MAX_PHONE_LEN} characters"),
        ));
    }
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
    {
        return Err(EngineError::invalid(
            "phone",
            "only digits, spaces, +, -, and parentheses are allowed",
        ));
    }
    Ok(Some(phone))
}

pub(super) fn normalize_company(company: Option<String>) -> Result<Option<String>, EngineError> {
    let company = company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(ref c) = company
        && c.chars().count() > MAX_COMPANY_LEN
    {
        return Err(EngineError::invalid(
            "company",
            format!("cannot exceed {MAX_COMPANY_LEN} characters"),
        ));
    }
    Ok(company)
}

/// Checkout must fall strictly after the visit, within `max_stay_days`.
pub(super) fn check_visit_window(
    visit: NaiveDate,
    checkout: Option<NaiveDate>,
    max_stay_days: u32,
) -> Result<(), EngineError> {
    let Some(checkout) = checkout else {
        return Ok(());
    };
    if checkout <= visit {
        return Err(EngineError::invalid(
            "checkout_date",
            "must be after the visit date",
        ));
    }
    if (checkout - visit).num_days() > i64::from(max_stay_days) {
        return Err(EngineError::invalid(
            "checkout_date",
            format!("stay cannot exceed {max_stay_days} days"),
        ));
    }
    Ok(())
}

/// Room must have at least one free slot.
pub(super) fn check_capacity(rs: &RoomState) -> Result<(), EngineError> {
    if rs.is_full() {
        return Err(EngineError::CapacityExceeded {
            room_id: rs.room.id,
            room_code: rs.room.code.clone(),
            occupancy: rs.active_count(),
            capacity: rs.room.capacity.slots(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Allocation, Capacity, Occupant, Room, RoomStatus};
    use ulid::Ulid;

    fn field_of(err: EngineError) -> &'static str {
        match err {
            EngineError::Validation { fields, .. } => fields[0],
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn codes_are_upper_cased_and_checked() {
        assert_eq!(normalize_code("code", " a-101 ").unwrap(), "A-101");
        assert_eq!(normalize_code("code", "emp_7").unwrap(), "EMP_7");
        assert_eq!(field_of(normalize_code("code", "A").unwrap_err()), "code");
        assert!(normalize_code("code", "A 101").is_err());
        assert!(normalize_code("code", &"X".repeat(51)).is_err());
    }

    #[test]
    fn names_are_trimmed() {
        assert_eq!(normalize_name("  Rina Sari ").unwrap(), "Rina Sari");
        assert!(normalize_name(" R ").is_err());
        assert!(normalize_name(&"n".repeat(256)).is_err());
    }

    #[test]
    fn blank_notes_become_none() {
        assert_eq!(normalize_notes(Some("   ".into())).unwrap(), None);
        assert_eq!(
            normalize_notes(Some("late".into())).unwrap().as_deref(),
            Some("late")
        );
        assert_eq!(
            field_of(normalize_notes(Some("x".repeat(1001))).unwrap_err()),
            "notes"
        );
    }

    #[test]
    fn phone_charset() {
        assert_eq!(
            normalize_phone(Some("+62 (21) 555-0100".into())).unwrap().as_deref(),
            Some("+62 (21) 555-0100")
        );
        assert!(normalize_phone(Some("call me".into())).is_err());
        assert!(normalize_phone(Some("1".repeat(21))).is_err());
        assert_eq!(normalize_phone(Some(" ".into())).unwrap(), None);
    }

    #[test]
    fn visit_window_rules() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 5, day).unwrap();
        assert!(check_visit_window(d(1), None, 30).is_ok());
        assert!(check_visit_window(d(1), Some(d(2)), 30).is_ok());
        assert!(check_visit_window(d(1), Some(d(1)), 30).is_err());
        assert!(check_visit_window(d(1), Some(d(31)), 30).is_ok());
        assert_eq!(
            field_of(check_visit_window(d(1), Some(d(12)), 10).unwrap_err()),
            "checkout_date"
        );
    }

    #[test]
    fn capacity_check_reports_room() {
        let room = Room {
            id: Ulid::new(),
            code: "B-2".into(),
            capacity: Capacity::One,
            status: RoomStatus::Occupied,
            notes: None,
            deleted_at: None,
        };
        let mut rs = RoomState::new(room);
        assert!(check_capacity(&rs).is_ok());
        rs.allocations.push(Allocation {
            id: Ulid::new(),
            room_id: rs.room.id,
            occupant: Occupant::Guest(Ulid::new()),
            allocated_at: 0,
            released_at: None,
            notes: None,
        });
        match check_capacity(&rs) {
            Err(EngineError::CapacityExceeded {
                room_code,
                occupancy,
                capacity,
                ..
            }) => {
                assert_eq!(room_code, "B-2");
                assert_eq!((occupancy, capacity), (1, 1));
            }
            other => panic!("expected capacity error, got {other:?}"),
        }
    }
}
