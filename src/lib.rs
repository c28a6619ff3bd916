//! Send and receive Iridium Short Burst Data (SBD) messages through DirectIP.
//!
//! # Background
//!
//! Iridium is both a
//! [satellite constellation](https://en.wikipedia.org/wiki/Iridium_satellite_constellation)
//! and a [company](https://en.wikipedia.org/wiki/Iridium_Communications) that provides satellite
//! communications. The Iridium network is used by phones, modems, and other communication devices.
//!
//! One mode of transmitting data over the Iridium network is via Short Burst Data (SBD) messages.
//! These messages carry a payload of some small number of bytes, usually less than one thousand.
//! Messages can be Mobile-Originated (MO), meaning that they are sent *from* an Iridium modem, or
//! Mobile-Terminated (MT), meaning that they are sent *to* an Iridium modem. Both directions are
//! available over TCP through Iridium's `DirectIP` service: the Iridium Gateway delivers MO
//! messages to a configured IP address, and accepts MT messages on its own submission endpoint.
//!
//! # Usage
//!
//! This library speaks both sides of the `DirectIP` protocol and drives an attached Iridium
//! transceiver over its serial AT interface.
//!
//! MO messages can be read from a byte stream:
//!
//! ```
//! let mut file = std::fs::File::open("data/0-mo.sbd").unwrap();
//! let message = sbd_directip::mo::Message::read_from(file).unwrap();
//! ```
//!
//! To receive MO messages via `DirectIP`, a server is provided. The server will listen for
//! incoming messages forever, handing each one to its subscribers:
//!
//! ```no_run
//! let mut server = sbd_directip::directip::Server::new("0.0.0.0:32606");
//! server.on_message(|message| println!("{} byte payload", message.payload().len()));
//! server.bind().unwrap();
//! server.serve_forever();
//! ```
//!
//! To send MT messages, build them with the factory and post them to a transmitter, which
//! delivers them to the Iridium Gateway in FIFO order with retry and backoff:
//!
//! ```no_run
//! use sbd_directip::{directip::Transmitter, mt};
//! let message = mt::Message::new(1, "300125061511830", b"Hi", Default::default(), 5).unwrap();
//! let mut transmitter = Transmitter::new("12.47.179.12", 10800);
//! transmitter.start();
//! transmitter.post(message);
//! ```
//!
//! Most of the functionality of this library is exposed by a single executable, named
//! `sbd-directip`. Use the executable to inspect raw sbd files stored on a filesystem, run the
//! forever-running server to receive MO messages, or submit an MT message to the gateway.

#![deny(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications
)]

use quick_error::quick_error;

pub mod directip;
pub mod information_element;
pub mod message;
pub mod mo;
pub mod modem;
pub mod mt;
pub mod queue;
pub mod storage;

/// Crate-specific `Result`.
pub type Result<T> = std::result::Result<T, Error>;

quick_error! {
    /// Crate-specific errors
    #[derive(Debug)]
    pub enum Error {
        /// A wrapper around a `std::io::Error`.
        Io(err: std::io::Error) {
            from()
            cause(err)
            display("io error: {}", err)
        }
        /// Invalid IMEI number.
        InvalidImei {
            display("invalid IMEI number")
        }
        /// Invalid protocol revision number.
        InvalidProtocolRevisionNumber(n: u8) {
            display("invalid protocol number {}", n)
        }
        /// An information element identifier this library does not recognize.
        InvalidInformationElementIdentifier(n: u8) {
            display("invalid information element identifier: 0x{:02x}", n)
        }
        /// A fixed-length information element carried the wrong length on the wire.
        InvalidInformationElementLength(id: u8, length: u16) {
            display("information element 0x{:02x} has invalid length {}", id, length)
        }
        /// A variable-length payload was outside its allowed range.
        PayloadLengthOutOfRange(length: u16) {
            display("payload length {} is out of range", length)
        }
        /// A payload was expected, but none was given.
        EmptyPayload {
            display("payload expected, but none given")
        }
        /// An oversized payload, with its size.
        PayloadTooLong(size: usize) {
            display("the payload is too long: {} bytes", size)
        }
        /// Missing mobile originated header.
        MissingMobileOriginatedHeader {
            display("the mobile originated header is missing")
        }
        /// Missing mobile originated payload.
        MissingMobileOriginatedPayload {
            display("the mobile originated payload is missing")
        }
        /// Missing mobile terminated header.
        MissingMobileTerminatedHeader {
            display("the mobile terminated header is missing")
        }
        /// Missing mobile terminated payload.
        MissingMobileTerminatedPayload {
            display("the mobile terminated payload is missing")
        }
        /// Missing mobile terminated priority.
        MissingMobileTerminatedPriority {
            display("the mobile terminated priority is missing")
        }
        /// Missing mobile terminated confirmation.
        MissingMobileTerminatedConfirmation {
            display("the mobile terminated confirmation is missing")
        }
        /// The same information element appeared twice in one message.
        DuplicateInformationElement(id: u8) {
            display("duplicate information element 0x{:02x}", id)
        }
        /// An information element that does not belong in this message.
        UnexpectedInformationElement(id: u8) {
            display("unexpected information element 0x{:02x}", id)
        }
        /// Unknown session status code.
        UnknownSessionStatus(n: u8) {
            display("unknown session status: {}", n)
        }
        /// The time of session could not be converted to a timestamp.
        InvalidTimeOfSession {
            display("invalid time of session")
        }
        /// Negative timestamps cannot be written as session times.
        NegativeTimestamp(timestamp: i64) {
            display("negative timestamp: {}", timestamp)
        }
        /// The overall message length is too big to express on the wire.
        OverallMessageLength(length: usize) {
            display("the overall message length is too long: {}", length)
        }
        /// We expected a directory, but this isn't one.
        NotADirectory(s: std::ffi::OsString) {
            display("this os string is not a directory: {}", s.to_string_lossy())
        }
        /// The modem rejected a command or returned an unparseable response.
        ModemCommand(s: String) {
            display("modem command error: {}", s)
        }
        /// A modem command did not complete within its timeout.
        ModemTimeout {
            display("modem command timed out")
        }
        /// The checksum of a binary modem transfer did not match.
        ChecksumMismatch {
            display("checksum mismatch")
        }
        /// Wrapper around `std::num::ParseIntError`.
        ParseInt(err: std::num::ParseIntError) {
            from()
            cause(err)
            display("parse int error: {}", err)
        }
        /// Wrapper around `serialport::Error`.
        Serial(err: serialport::Error) {
            from()
            cause(err)
            display("serial port error: {}", err)
        }
        /// Wrapper around `walkdir::Error`.
        WalkDir(err: walkdir::Error) {
            from()
            cause(err)
            display("walkdir error: {}", err)
        }
    }
}
