use std::io::{Cursor, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::{
    information_element::{InformationElement, MAX_MT_PAYLOAD_LENGTH},
    message::PROTOCOL_REVISION_NUMBER,
    mt::{DispositionFlags, Header, LOWEST_PRIORITY},
    Error, Result,
};

/// A mobile-terminated Iridium SBD message.
///
/// Every mobile terminated message carries exactly three information elements: a header, a
/// payload, and a priority, serialized in that order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    header: Header,
    payload: Vec<u8>,
    priority: u16,
}

impl Message {
    /// Creates a new mobile terminated message.
    ///
    /// The IMEI must be exactly fifteen ascii digits, and the payload must be between one and
    /// 1890 bytes. Priorities run from one (highest) to five (lowest); out-of-range priorities
    /// are clamped to five when the message is serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mt::Message;
    /// let message = Message::new(1, "300125061511830", b"Hi", Default::default(), 5).unwrap();
    /// assert!(Message::new(1, "not an imei", b"Hi", Default::default(), 5).is_err());
    /// ```
    pub fn new(
        unique_client_msg_id: u32,
        imei: &str,
        payload: &[u8],
        disposition_flags: DispositionFlags,
        priority: u16,
    ) -> Result<Message> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if payload.len() > MAX_MT_PAYLOAD_LENGTH {
            return Err(Error::PayloadTooLong(payload.len()));
        }
        Ok(Message {
            header: Header {
                unique_client_msg_id,
                imei: imei_from_str(imei)?,
                disposition_flags,
            },
            payload: payload.to_vec(),
            priority,
        })
    }

    /// Parses a mobile terminated message from a run of information element bytes.
    ///
    /// The message header should already have been consumed. The byte run must contain exactly
    /// one header, one payload, and one priority element.
    pub fn parse(bytes: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(bytes);
        let mut header = None;
        let mut payload = None;
        let mut priority = None;
        while (cursor.position() as usize) < bytes.len() {
            let information_element = InformationElement::read_from(&mut cursor)?;
            match information_element {
                InformationElement::MtHeader(h) => {
                    if header.is_some() {
                        return Err(Error::DuplicateInformationElement(0x41));
                    }
                    header = Some(h);
                }
                InformationElement::MtPayload(p) => {
                    if payload.is_some() {
                        return Err(Error::DuplicateInformationElement(0x42));
                    }
                    payload = Some(p);
                }
                InformationElement::MtPriority(p) => {
                    if priority.is_some() {
                        return Err(Error::DuplicateInformationElement(0x46));
                    }
                    priority = Some(p);
                }
                ie => return Err(Error::UnexpectedInformationElement(ie.id())),
            }
        }
        Ok(Message {
            header: header.ok_or(Error::MissingMobileTerminatedHeader)?,
            payload: payload.ok_or(Error::MissingMobileTerminatedPayload)?,
            priority: priority.ok_or(Error::MissingMobileTerminatedPriority)?,
        })
    }

    /// Returns this message's client message id.
    pub fn client_msg_id(&self) -> u32 {
        self.header.unique_client_msg_id
    }

    /// Returns this message's imei as a string.
    ///
    /// # Panics
    ///
    /// Panics if the IMEI number is not valid utf8. The specification says that IMEIs should be
    /// ascii numbers.
    pub fn imei(&self) -> &str {
        std::str::from_utf8(&self.header.imei)
            .expect("IMEI numbers are specified to be ascii number")
    }

    /// Returns this message's disposition flags.
    pub fn disposition_flags(&self) -> DispositionFlags {
        self.header.disposition_flags
    }

    /// Returns this message's payload.
    pub fn payload(&self) -> &Vec<u8> {
        &self.payload
    }

    /// Returns this message's priority.
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// Writes this message to an object that can `Write`, message header included.
    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        let elements = [
            InformationElement::MtHeader(self.header),
            InformationElement::MtPayload(self.payload.clone()),
            InformationElement::MtPriority(self.priority),
        ];
        let overall_message_length = elements.iter().map(|ie| ie.len()).sum::<usize>();
        if overall_message_length > usize::from(u16::MAX) {
            return Err(Error::OverallMessageLength(overall_message_length));
        }
        write.write_u8(PROTOCOL_REVISION_NUMBER)?;
        write.write_u16::<BigEndian>(overall_message_length as u16)?;
        for information_element in &elements {
            information_element.write_to(&mut write)?;
        }
        Ok(())
    }

    /// Serializes this message into the bytes sent to the gateway.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mt::Message;
    /// let message = Message::new(1, "300125061511830", b"Hi", Default::default(), 5).unwrap();
    /// let bytes = message.serialize().unwrap();
    /// assert_eq!(1, bytes[0]);
    /// ```
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }
}

fn imei_from_str(imei: &str) -> Result<[u8; 15]> {
    if imei.len() != 15 || !imei.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidImei);
    }
    let mut bytes = [0; 15];
    bytes.copy_from_slice(imei.as_bytes());
    Ok(bytes)
}
