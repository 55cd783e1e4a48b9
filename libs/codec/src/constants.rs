//! Wire layout constants
//!
//! Lengths are written with a compact prefix: values below [`LEN_U16_MARKER`]
//! take one byte, larger values are introduced by a marker byte followed by a
//! big-endian `u16` or `u32`.

/// Protocol version carried in the connection handshake
pub const PROTOCOL_VERSION: u16 = 1;

/// One-byte lengths are strictly below this value
pub const LEN_U16_MARKER: u8 = 0xFE;
pub const LEN_U32_MARKER: u8 = 0xFF;

/// Largest entry count a container can carry
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// Default maximum container nesting accepted by the decoder
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Real hint byte: low six bits hold the hint
pub const REAL_HINT_MASK: u8 = 0x3F;

/// Map and filter entry action byte: permission data present
pub const ENTRY_HAS_PERMISSION: u8 = 0x10;
pub const ENTRY_ACTION_MASK: u8 = 0x0F;

/// Container header flag bits
pub mod container_flags {
    pub const FIELD_LIST_HAS_INFO: u8 = 0x01;
    pub const ELEMENT_LIST_HAS_NUM: u8 = 0x01;
    pub const MAP_HAS_KEY_FID: u8 = 0x01;
    pub const MAP_HAS_SUMMARY: u8 = 0x02;
    pub const MAP_HAS_COUNT_HINT: u8 = 0x04;
    pub const FILTER_HAS_COUNT_HINT: u8 = 0x01;
    pub const SERIES_HAS_SUMMARY: u8 = 0x01;
    pub const SERIES_HAS_COUNT_HINT: u8 = 0x02;
}

/// Message key presence bits
pub mod key_flags {
    pub const NAME: u8 = 0x01;
    pub const NAME_TYPE: u8 = 0x02;
    pub const SERVICE_ID: u8 = 0x04;
    pub const SERVICE_NAME: u8 = 0x08;
    pub const FILTER: u8 = 0x10;
    pub const IDENTIFIER: u8 = 0x20;
    pub const ATTRIB: u8 = 0x40;
}

/// Message header flag bits, shared across classes where the meaning is common
pub mod msg_flags {
    pub const HAS_KEY: u32 = 1 << 0;
    pub const HAS_EXTENDED_HEADER: u32 = 1 << 1;
    pub const HAS_PERM_DATA: u32 = 1 << 2;
    pub const HAS_SEQ_NUM: u32 = 1 << 3;
    pub const HAS_PART_NUM: u32 = 1 << 4;
    pub const HAS_QOS: u32 = 1 << 5;
    pub const HAS_POST_USER_INFO: u32 = 1 << 6;
    pub const PRIVATE_STREAM: u32 = 1 << 7;
    pub const QUALIFIED_STREAM: u32 = 1 << 8;
    pub const COMPLETE: u32 = 1 << 9;
    pub const CLEAR_CACHE: u32 = 1 << 10;
    pub const DO_NOT_CACHE: u32 = 1 << 11;
    pub const ACK_REQUESTED: u32 = 1 << 12;

    // Request
    pub const STREAMING: u32 = 1 << 13;
    pub const NO_REFRESH: u32 = 1 << 14;
    pub const PAUSE: u32 = 1 << 15;
    pub const CONF_INFO_IN_UPDATES: u32 = 1 << 16;
    pub const HAS_VIEW: u32 = 1 << 17;
    pub const HAS_BATCH: u32 = 1 << 18;
    pub const HAS_PRIORITY: u32 = 1 << 19;
    pub const HAS_WORST_QOS: u32 = 1 << 20;

    // Refresh / Status
    pub const SOLICITED: u32 = 1 << 13;
    pub const HAS_STATE: u32 = 1 << 14;
    pub const HAS_GROUP_ID: u32 = 1 << 15;

    // Update
    pub const HAS_CONFLATION: u32 = 1 << 13;
    pub const DO_NOT_CONFLATE: u32 = 1 << 14;
    pub const DO_NOT_RIPPLE: u32 = 1 << 15;

    // Generic
    pub const HAS_SECONDARY_SEQ_NUM: u32 = 1 << 13;

    // Ack
    pub const HAS_NACK_CODE: u32 = 1 << 13;
    pub const HAS_TEXT: u32 = 1 << 14;

    // Post
    pub const HAS_POST_ID: u32 = 1 << 13;
    pub const HAS_POST_USER_RIGHTS: u32 = 1 << 14;
}
