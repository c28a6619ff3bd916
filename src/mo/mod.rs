//! Module for reading and writing Mobile-Originated (MO) SBD messages.
//!
//! Mobile originated messages are sent *from* an Iridium device, and are delivered by the
//! Iridium Gateway over `DirectIP` or stored as `.sbd` files on a filesystem.

mod location;
mod message;

pub use self::{
    location::LocationInformation,
    message::{Header, Message, SessionStatus},
};
