//! Mobile terminated confirmation.
//!
//! The Iridium Gateway answers every mobile terminated message submission with a confirmation
//! message, which contains a single confirmation information element (IEI 0x44). A nonnegative
//! message status is the position of the payload in the destination IMEI's queue; a negative
//! status is an error code.

use std::fmt;
use std::io::Cursor;

use crate::{information_element::InformationElement, Error, Result};

/// A mobile-terminated confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Confirmation {
    /// The client-chosen id from the submitted message (not the MTMSN).
    pub unique_client_msg_id: u32,
    /// The device id of the message destination.
    pub imei: [u8; 15],
    /// A unique reference for identifying the MT payload within the SBD database.
    ///
    /// Zero when there was an error in processing the message.
    pub auto_id_reference: u32,
    /// Order of the message in the destination queue, or an error code.
    pub message_status: i16,
}

/// A confirmation message, as parsed off the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmMessage {
    confirmation: Confirmation,
}

impl ConfirmMessage {
    /// Parses a confirmation message from a run of information element bytes.
    ///
    /// The message header should already have been consumed. The byte run must contain exactly
    /// one confirmation information element.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mt::ConfirmMessage;
    /// let bytes = [
    ///     0x44, 0x00, 0x19, 0x00, 0x00, 0x00, 0x01, 0x33, 0x30, 0x30, 0x31, 0x32, 0x35, 0x30,
    ///     0x36, 0x31, 0x35, 0x31, 0x31, 0x38, 0x33, 0x30, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00,
    /// ];
    /// let message = ConfirmMessage::parse(&bytes).unwrap();
    /// assert_eq!(0, message.status());
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<ConfirmMessage> {
        let mut cursor = Cursor::new(bytes);
        let mut confirmation = None;
        while (cursor.position() as usize) < bytes.len() {
            match InformationElement::read_from(&mut cursor)? {
                InformationElement::MtConfirmation(c) => {
                    if confirmation.is_some() {
                        return Err(Error::DuplicateInformationElement(0x44));
                    }
                    confirmation = Some(c);
                }
                ie => return Err(Error::UnexpectedInformationElement(ie.id())),
            }
        }
        Ok(ConfirmMessage {
            confirmation: confirmation.ok_or(Error::MissingMobileTerminatedConfirmation)?,
        })
    }

    /// Returns the confirmation's client message id.
    pub fn client_msg_id(&self) -> u32 {
        self.confirmation.unique_client_msg_id
    }

    /// Returns this confirmation's imei as a string.
    ///
    /// # Panics
    ///
    /// Panics if the IMEI number is not valid utf8. The specification says that IMEIs should be
    /// ascii numbers.
    pub fn imei(&self) -> &str {
        std::str::from_utf8(&self.confirmation.imei)
            .expect("IMEI numbers are specified to be ascii number")
    }

    /// Returns the auto id reference assigned by the gateway.
    pub fn auto_id_reference(&self) -> u32 {
        self.confirmation.auto_id_reference
    }

    /// Returns the message status.
    pub fn status(&self) -> i16 {
        self.confirmation.message_status
    }
}

impl fmt::Display for ConfirmMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MT message confirmation: imei = {}, client message id = {}, auto id reference = {}, status = {}",
            self.imei(),
            self.client_msg_id(),
            self.auto_id_reference(),
            describe_status(self.status()),
        )
    }
}

/// Describes a message status code, using the descriptions from the `DirectIP` documentation.
pub fn describe_status(status: i16) -> &'static str {
    match status {
        s if s > 0 => "Successful, order of message in the MT queue",
        0 => "Successful, no payload in message",
        -1 => "Invalid IMEI - too few characters, non-numeric characters",
        -2 => "Unknown IMEI - not provisioned on the Iridium Gateway",
        -3 => "Payload size exceeded maximum allowed",
        -4 => "Payload expected, but none received",
        -5 => "MT message queue full (max of 50)",
        -6 => "MT resources unavailable",
        -7 => "Violation of MT DirectIP protocol error",
        -8 => "Ring alerts to the given IMEI are disabled",
        -9 => "The given IMEI is not attached (not set to receive ring alerts)",
        -10 => "Source IP address rejected by MT filter",
        -11 => "MTMSN value is out of range (valid range is 1 - 65535)",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation_bytes() -> Vec<u8> {
        let mut bytes = vec![0x44, 0x00, 0x19, 0x00, 0x00, 0x00, 0x01];
        bytes.extend_from_slice(b"300125061511830");
        bytes.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes
    }

    #[test]
    fn parse() {
        let message = ConfirmMessage::parse(&confirmation_bytes()).unwrap();
        assert_eq!(1, message.client_msg_id());
        assert_eq!("300125061511830", message.imei());
        assert_eq!(0x12345678, message.auto_id_reference());
        assert_eq!(0, message.status());
    }

    #[test]
    fn parse_negative_status() {
        let mut bytes = confirmation_bytes();
        let len = bytes.len();
        bytes[len - 2..].copy_from_slice(&(-5i16).to_be_bytes());
        let message = ConfirmMessage::parse(&bytes).unwrap();
        assert_eq!(-5, message.status());
    }

    #[test]
    fn parse_empty() {
        assert!(matches!(
            ConfirmMessage::parse(&[]),
            Err(Error::MissingMobileTerminatedConfirmation)
        ));
    }

    #[test]
    fn parse_duplicate() {
        let mut bytes = confirmation_bytes();
        bytes.extend_from_slice(&confirmation_bytes());
        assert!(matches!(
            ConfirmMessage::parse(&bytes),
            Err(Error::DuplicateInformationElement(0x44))
        ));
    }

    #[test]
    fn parse_wrong_element() {
        let bytes = [0x46, 0x00, 0x02, 0x00, 0x05];
        assert!(matches!(
            ConfirmMessage::parse(&bytes),
            Err(Error::UnexpectedInformationElement(0x46))
        ));
    }

    #[test]
    fn describe() {
        assert_eq!("Successful, no payload in message", describe_status(0));
        assert_eq!(
            "MTMSN value is out of range (valid range is 1 - 65535)",
            describe_status(-11)
        );
        assert_eq!("Unknown error", describe_status(-32767));
    }
}
