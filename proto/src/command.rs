//! The command table.
//!
//! A request names its handler with two header bytes: command group and
//! command index. Unknown pairs are rejected before the body is touched.

/// Command group byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandGroup {
    Admin = 0,
    Auth = 1,
    Heal = 2,
    Change = 3,
    Locker = 8,
}

/// Every command this server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Echo,
    ShowStats,

    Detect,
    DetectSum,
    Pown,
    PownSum,

    GetTicket,
    ValidateTicket,
    Find,
    Fix,
    MerkleRoot,
    MerkleNode,
    PageBytes,

    AvailableSns,
    Break,
    Join,

    StoreSum,
    RemoveLocker,
    PeekLocker,
    MultiStoreSum,
    PutForSale,
    ListForSale,
    Buy,
    RemoveTrade,
    PeekTrade,
}

impl Command {
    /// Resolve the (group, index) header bytes
    pub fn from_wire(group: u8, index: u8) -> Option<Command> {
        use Command::*;
        let cmd = match (group, index) {
            (0, 0) => Echo,
            (0, 1) => ShowStats,
            (1, 0) => Detect,
            (1, 1) => DetectSum,
            (1, 2) => Pown,
            (1, 3) => PownSum,
            (2, 0) => GetTicket,
            (2, 1) => ValidateTicket,
            (2, 2) => Find,
            (2, 3) => Fix,
            (2, 4) => MerkleRoot,
            (2, 5) => MerkleNode,
            (2, 6) => PageBytes,
            (3, 0) => AvailableSns,
            (3, 1) => Break,
            (3, 2) => Join,
            (8, 0) => StoreSum,
            (8, 1) => RemoveLocker,
            (8, 2) => PeekLocker,
            (8, 3) => MultiStoreSum,
            (8, 4) => PutForSale,
            (8, 5) => ListForSale,
            (8, 6) => Buy,
            (8, 7) => RemoveTrade,
            (8, 8) => PeekTrade,
            _ => return None,
        };
        Some(cmd)
    }

    pub fn group(&self) -> CommandGroup {
        use Command::*;
        match self {
            Echo | ShowStats => CommandGroup::Admin,
            Detect | DetectSum | Pown | PownSum => CommandGroup::Auth,
            GetTicket | ValidateTicket | Find | Fix | MerkleRoot | MerkleNode | PageBytes => {
                CommandGroup::Heal
            }
            AvailableSns | Break | Join => CommandGroup::Change,
            _ => CommandGroup::Locker,
        }
    }

    pub fn wire(&self) -> (u8, u8) {
        use Command::*;
        match self {
            Echo => (0, 0),
            ShowStats => (0, 1),
            Detect => (1, 0),
            DetectSum => (1, 1),
            Pown => (1, 2),
            PownSum => (1, 3),
            GetTicket => (2, 0),
            ValidateTicket => (2, 1),
            Find => (2, 2),
            Fix => (2, 3),
            MerkleRoot => (2, 4),
            MerkleNode => (2, 5),
            PageBytes => (2, 6),
            AvailableSns => (3, 0),
            Break => (3, 1),
            Join => (3, 2),
            StoreSum => (8, 0),
            RemoveLocker => (8, 1),
            PeekLocker => (8, 2),
            MultiStoreSum => (8, 3),
            PutForSale => (8, 4),
            ListForSale => (8, 5),
            Buy => (8, 6),
            RemoveTrade => (8, 7),
            PeekTrade => (8, 8),
        }
    }
}
