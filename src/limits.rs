/// Longest accepted customer name, in characters.
pub const MAX_NAME_LEN: usize = 64;

/// Open booking dialogues held in memory at once.
pub const MAX_ACTIVE_SESSIONS: usize = 10_000;

/// Pending cancellation prompts held in memory at once.
pub const MAX_PENDING_CANCELLATIONS: usize = 10_000;

/// Total appointments the store will hold.
pub const MAX_APPOINTMENTS: usize = 1_000_000;

/// Bookings one user may hold within one ISO week.
pub const WEEKLY_BOOKING_LIMIT: usize = 2;

/// Bounded capacity of the WAL writer channel.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
