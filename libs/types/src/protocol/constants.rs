//! Protocol constants and basic enumerations
//!
//! These are the fundamental wire enumerations. They live in the types crate so
//! that every layer agrees on the numeric values; encoding rules live in codec.

use num_enum::TryFromPrimitive;
use std::fmt;

/// Message class carried in every message header
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum MsgClass {
    Request = 1,
    Refresh = 2,
    Status = 3,
    Update = 4,
    Close = 5,
    Ack = 6,
    Generic = 7,
    Post = 8,
}

/// Self-describing data type tags
///
/// Primitive types occupy 0-127, container types 128-255.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum DataType {
    Int = 3,
    UInt = 4,
    Float = 5,
    Double = 6,
    Real = 8,
    Date = 9,
    Time = 10,
    DateTime = 11,
    Qos = 12,
    State = 13,
    Enum = 14,
    Array = 15,
    Buffer = 16,
    AsciiString = 17,
    Utf8String = 18,
    RmtesString = 19,
    NoData = 128,
    Opaque = 130,
    Xml = 131,
    FieldList = 132,
    ElementList = 133,
    FilterList = 135,
    Map = 137,
    Series = 138,
    Msg = 141,
}

impl DataType {
    /// Primitive types can be map keys, array items and entry values
    pub fn is_primitive(self) -> bool {
        (self as u8) < 128
    }

    /// Container types hold entries and may nest
    pub fn is_container(self) -> bool {
        matches!(
            self,
            DataType::FieldList
                | DataType::ElementList
                | DataType::FilterList
                | DataType::Map
                | DataType::Series
                | DataType::Msg
        )
    }

    /// Types that can be used as a map key
    pub fn is_valid_map_key(self) -> bool {
        self.is_primitive() && !matches!(self, DataType::Array)
    }
}

/// Stream state half of a [`crate::State`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum StreamState {
    Unspecified = 0,
    Open = 1,
    NonStreaming = 2,
    ClosedRecover = 3,
    Closed = 4,
    Redirected = 5,
}

impl Default for StreamState {
    fn default() -> Self {
        StreamState::Unspecified
    }
}

impl Default for DataState {
    fn default() -> Self {
        DataState::NoChange
    }
}

impl StreamState {
    /// The stream no longer delivers messages after this state
    pub fn is_final(self) -> bool {
        matches!(
            self,
            StreamState::Closed | StreamState::ClosedRecover | StreamState::Redirected
        )
    }
}

/// Data state half of a [`crate::State`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum DataState {
    NoChange = 0,
    Ok = 1,
    Suspect = 2,
}

/// Additional status code carried with a state
///
/// Kept open-ended: providers may send codes newer than this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(pub u8);

impl StatusCode {
    pub const NONE: StatusCode = StatusCode(0);
    pub const NOT_FOUND: StatusCode = StatusCode(1);
    pub const TIMEOUT: StatusCode = StatusCode(2);
    pub const NOT_AUTHORIZED: StatusCode = StatusCode(3);
    pub const INVALID_ARGUMENT: StatusCode = StatusCode(4);
    pub const USAGE_ERROR: StatusCode = StatusCode(5);
    pub const PREEMPTED: StatusCode = StatusCode(6);
    pub const JIT_CONFLATION_STARTED: StatusCode = StatusCode(7);
    pub const REALTIME_RESUMED: StatusCode = StatusCode(8);
    pub const FAILOVER_STARTED: StatusCode = StatusCode(9);
    pub const FAILOVER_COMPLETED: StatusCode = StatusCode(10);
    pub const GAP_DETECTED: StatusCode = StatusCode(11);
    pub const NO_RESOURCES: StatusCode = StatusCode(12);
    pub const TOO_MANY_ITEMS: StatusCode = StatusCode(13);
    pub const ALREADY_OPEN: StatusCode = StatusCode(14);
    pub const SOURCE_UNKNOWN: StatusCode = StatusCode(15);
    pub const NOT_OPEN: StatusCode = StatusCode(16);
    pub const NON_UPDATING_ITEM: StatusCode = StatusCode(19);
    pub const UNSUPPORTED_VIEW_TYPE: StatusCode = StatusCode(20);
    pub const INVALID_VIEW: StatusCode = StatusCode(21);
    pub const FULL_VIEW_PROVIDED: StatusCode = StatusCode(22);
    pub const UNABLE_TO_REQUEST_AS_BATCH: StatusCode = StatusCode(23);
    pub const NO_BATCH_VIEW_SUPPORT_IN_REQ: StatusCode = StatusCode(26);
    pub const EXCEEDED_MAX_MOUNTS_PER_USER: StatusCode = StatusCode(27);
    pub const ERROR: StatusCode = StatusCode(28);
    pub const DACS_DOWN: StatusCode = StatusCode(29);
    pub const USER_UNKNOWN_TO_PERM_SYS: StatusCode = StatusCode(30);

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "None",
            1 => "NotFound",
            2 => "Timeout",
            3 => "NotAuthorized",
            4 => "InvalidArgument",
            5 => "UsageError",
            6 => "Preempted",
            7 => "JustInTimeConflationStarted",
            8 => "RealTimeResumed",
            9 => "FailoverStarted",
            10 => "FailoverCompleted",
            11 => "GapDetected",
            12 => "NoResources",
            13 => "TooManyItems",
            14 => "AlreadyOpen",
            15 => "SourceUnknown",
            16 => "NotOpen",
            19 => "NonUpdatingItem",
            20 => "UnsupportedViewType",
            21 => "InvalidView",
            22 => "FullViewProvided",
            23 => "UnableToRequestAsBatch",
            26 => "NoBatchViewSupportInReq",
            27 => "ExceededMaxMountsPerUser",
            28 => "Error",
            29 => "DacsDown",
            30 => "UserUnknownToPermSys",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a map entry mutates receiver-side state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum MapAction {
    /// Merge the payload into the existing entry
    Update = 1,
    /// Create or replace the entry
    Add = 2,
    /// Remove the entry; carries no payload
    Delete = 3,
}

/// How a filter entry mutates receiver-side state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum FilterAction {
    /// Merge the payload into the existing filter entry
    Update = 1,
    /// Replace the filter entry entirely
    Set = 2,
    /// Remove the filter entry; carries no payload
    Clear = 3,
}

/// Negative acknowledgement reason
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum NackCode {
    None = 0,
    AccessDenied = 1,
    DeniedBySource = 2,
    SourceDown = 3,
    SourceUnknown = 4,
    NoResources = 5,
    NoResponse = 6,
    GatewayDown = 7,
    SymbolUnknown = 10,
    NotOpen = 11,
    InvalidContent = 12,
}
