//! Reuters Domain Model helpers
//!
//! Well-known element names and typed views over the control-plane payloads:
//! login attributes, directory service maps, view and batch request payloads.
//! The dictionary payload lives in `codec` next to the dictionary it describes.

pub mod batch;
pub mod directory;
pub mod login;
pub mod names;
pub mod view;

/// Name type carried in a [`crate::MsgKey`]
pub mod name_type {
    pub const RIC: u8 = 1;
    pub const USER_NAME: u8 = 1;
    pub const EMAIL_ADDRESS: u8 = 2;
    pub const USER_TOKEN: u8 = 3;
    pub const COOKIE: u8 = 4;
    pub const AUTHN_TOKEN: u8 = 5;
}
