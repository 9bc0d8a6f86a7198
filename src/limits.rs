//! Hard caps on request inputs and in-memory state.

pub const MAX_RESERVATIONS_PER_DAY: usize = 500;
pub const MAX_REQUESTER_NAME_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_SEARCH_LEN: usize = 200;
pub const MAX_ATTENDEES: u32 = 10_000;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
