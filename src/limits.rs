// Field bounds enforced by the registry and the allocation engine.

pub const MIN_CODE_LEN: usize = 2;
pub const MAX_CODE_LEN: usize = 50;

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 255;

pub const MAX_COMPANY_LEN: usize = 255;
pub const MAX_PHONE_LEN: usize = 20;
pub const MAX_NOTES_LEN: usize = 1000;

/// Longest guest stay, in days between visit and checkout.
pub const DEFAULT_MAX_GUEST_STAY_DAYS: u32 = 30;

/// An open-ended guest visit older than this many days counts as past.
pub const DEFAULT_PAST_GUEST_WINDOW_DAYS: u32 = 7;

pub const MAX_BULK_RELEASE: usize = 500;
pub const MAX_RECENT_ACTIVITY: usize = 100;
