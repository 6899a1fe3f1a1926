//! Protocol status and error bytes.
//!
//! Every command resolves to exactly one status byte in the response
//! header. Values are fixed by the wire protocol and shared by all 25
//! servers.

/// Response status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    NoError = 0,

    // Batch outcomes
    AllPass = 241,
    AllFail = 242,
    Mixed = 243,
    Success = 250,

    // Find outcomes
    FindNeither = 208,
    FindAllAn = 209,
    FindAllPan = 210,
    FindMixed = 211,

    // Request validation
    InvalidRaidaId = 3,
    InvalidCommand = 6,
    InvalidPacketLength = 16,
    InvalidEof = 33,
    InvalidEncryption = 34,
    InvalidCrc = 37,
    AdminAuth = 38,
    InvalidSnOrDenomination = 40,

    // Resource exhaustion
    NoTicketSlot = 42,
    NoTicketFound = 43,
    TicketClaimedAlready = 44,
    PageIsNotReserved = 45,

    NotImplemented = 89,

    // Server-side failures
    Internal = 252,
    Network = 253,
    MemoryAlloc = 254,
}

impl Status {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Collapse a batch result into its status byte
    pub fn from_batch(passed: usize, total: usize) -> Status {
        if total > 0 && passed == total {
            Status::AllPass
        } else if passed == 0 {
            Status::AllFail
        } else {
            Status::Mixed
        }
    }

    /// True for the statuses that carry a per-coin bitmap body
    pub fn is_mixed(self) -> bool {
        matches!(self, Status::Mixed | Status::FindMixed)
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        status as u8
    }
}
