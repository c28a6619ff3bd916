use std::cmp::Ordering;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    information_element::InformationElement, message::PROTOCOL_REVISION_NUMBER,
    mo::LocationInformation, Error, Result,
};

/// The status of a mobile-originated session, from the message's header.
///
/// Codes zero through two all mean the MO payload transfer, if any, succeeded; the remaining
/// codes describe how the session failed. The descriptions are taken from the `DirectIP`
/// documentation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum SessionStatus {
    /// The SBD session completed successfully.
    Ok = 0,
    /// The MT message queued at the GSS is too large to be transferred within a single SBD
    /// session.
    OkMobileTerminatedTooLarge = 1,
    /// The reported location was determined to be of unacceptable quality. This value is only
    /// applicable to IMEIs using SBD protocol revision 1.
    OkLocationUnacceptableQuality = 2,
    /// The SBD session timed out before session completion.
    Timeout = 10,
    /// The MO message being transferred is too large to be transferred within a single SBD
    /// session.
    MobileOriginatedTooLarge = 12,
    /// An RF link loss ocurred during the SBD session.
    RFLinkLoss = 13,
    /// An IMEI protocol anomaly occurred during the SBD session.
    IMEIProtocolAnomaly = 14,
    /// The IMEI is prohibited from accessing the GSS.
    Prohibited = 15,
}

impl SessionStatus {
    /// Creates a new session status from a code.
    ///
    /// Returns an error if the code is unknown.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::SessionStatus;
    /// assert!(SessionStatus::new(0).is_ok());
    /// assert!(SessionStatus::new(3).is_err());
    /// ```
    pub fn new(n: u8) -> Result<SessionStatus> {
        match n {
            0 => Ok(SessionStatus::Ok),
            1 => Ok(SessionStatus::OkMobileTerminatedTooLarge),
            2 => Ok(SessionStatus::OkLocationUnacceptableQuality),
            10 => Ok(SessionStatus::Timeout),
            12 => Ok(SessionStatus::MobileOriginatedTooLarge),
            13 => Ok(SessionStatus::RFLinkLoss),
            14 => Ok(SessionStatus::IMEIProtocolAnomaly),
            15 => Ok(SessionStatus::Prohibited),
            _ => Err(Error::UnknownSessionStatus(n)),
        }
    }

    /// Returns true if the mobile originated transfer made it to the gateway.
    ///
    /// The first three codes all carry a delivered payload, even when the session had other
    /// problems (an oversized queued MT message, a poor location fix).
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::SessionStatus;
    /// assert!(SessionStatus::OkLocationUnacceptableQuality.transfer_completed());
    /// assert!(!SessionStatus::Timeout.transfer_completed());
    /// ```
    pub fn transfer_completed(&self) -> bool {
        matches!(
            self,
            SessionStatus::Ok
                | SessionStatus::OkMobileTerminatedTooLarge
                | SessionStatus::OkLocationUnacceptableQuality
        )
    }
}

/// A mobile-originated header.
///
/// One arrives with every message the gateway delivers, identifying the device, the session,
/// and the gateway's own record of the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// The call detail record reference, the Iridium Gateway's id for this message.
    pub cdr_ref: u32,
    /// The device id.
    pub imei: [u8; 15],
    /// The session status.
    pub session_status: SessionStatus,
    /// The mobile originated message sequence number.
    pub momsn: u16,
    /// The mobile terminated message sequence number.
    pub mtmsn: u16,
    /// The time of iridium session.
    pub time_of_session: DateTime<Utc>,
}

impl Header {
    /// Returns this header's imei as a string.
    ///
    /// # Panics
    ///
    /// Panics if the IMEI number is not valid utf8. The specification says that IMEIs should be
    /// ascii numbers.
    pub fn imei(&self) -> &str {
        std::str::from_utf8(&self.imei).expect("IMEI numbers are specified to be ascii number")
    }
}

/// A mobile-originated Iridium SBD message.
///
/// `Message`s can be ordered by time of session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    header: Header,
    payload: Vec<u8>,
    location: Option<LocationInformation>,
}

impl Message {
    /// Reads in a message from a file path.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Message> {
        use std::fs::File;
        let file = File::open(path)?;
        Message::read_from(file)
    }

    /// Reads in a message from an object that implements `Read`.
    ///
    /// The stream starts with the three-byte message header. Per the specification, undersized
    /// messages and bad protocol revision numbers result in an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::fs::File;
    /// use sbd_directip::mo::Message;
    /// let mut file = File::open("data/0-mo.sbd").unwrap();
    /// let message = Message::read_from(file).unwrap();
    /// ```
    pub fn read_from<R: Read>(mut read: R) -> Result<Message> {
        let protocol_revision_number = read.read_u8()?;
        if protocol_revision_number != PROTOCOL_REVISION_NUMBER {
            return Err(Error::InvalidProtocolRevisionNumber(
                protocol_revision_number,
            ));
        }
        let overall_message_length = read.read_u16::<BigEndian>()?;
        let mut message = vec![0; usize::from(overall_message_length)];
        read.read_exact(&mut message)?;
        Message::parse(&message)
    }

    /// Parses a message from a run of information element bytes.
    ///
    /// The message header should already have been consumed.
    pub fn parse(bytes: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(bytes);
        let mut information_elements = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            information_elements.push(InformationElement::read_from(&mut cursor)?);
        }
        Message::new(information_elements)
    }

    /// Creates a new message from information elements.
    ///
    /// The elements must contain exactly one mobile originated header and exactly one payload,
    /// and may contain one location information element. Anything else is an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Utc, TimeZone};
    /// use sbd_directip::information_element::InformationElement;
    /// use sbd_directip::mo::{Header, SessionStatus, Message};
    /// let header = InformationElement::MoHeader(Header {
    ///     cdr_ref: 1,
    ///     imei: *b"300125061511830",
    ///     session_status: SessionStatus::Ok,
    ///     momsn: 1,
    ///     mtmsn: 0,
    ///     time_of_session: Utc.with_ymd_and_hms(2017, 10, 1, 0, 0, 0).single().unwrap(),
    /// });
    /// let payload = InformationElement::MoPayload(vec![1]);
    /// let message = Message::new(vec![header, payload]).unwrap();
    /// ```
    pub fn new<I: IntoIterator<Item = InformationElement>>(iter: I) -> Result<Message> {
        let mut header = None;
        let mut payload = None;
        let mut location = None;
        for information_element in iter {
            match information_element {
                InformationElement::MoHeader(h) => {
                    if header.is_some() {
                        return Err(Error::DuplicateInformationElement(0x01));
                    }
                    header = Some(h);
                }
                InformationElement::MoPayload(p) => {
                    if payload.is_some() {
                        return Err(Error::DuplicateInformationElement(0x02));
                    }
                    payload = Some(p);
                }
                InformationElement::MoLocationInformation(l) => {
                    if location.is_some() {
                        return Err(Error::DuplicateInformationElement(0x03));
                    }
                    location = Some(l);
                }
                ie => return Err(Error::UnexpectedInformationElement(ie.id())),
            }
        }
        Ok(Message {
            header: header.ok_or(Error::MissingMobileOriginatedHeader)?,
            payload: payload.ok_or(Error::MissingMobileOriginatedPayload)?,
            location,
        })
    }

    /// Returns this message's call detail record reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let cdr_ref = message.cdr_ref();
    /// ```
    pub fn cdr_ref(&self) -> u32 {
        self.header.cdr_ref
    }

    /// Returns this message's imei as a string.
    ///
    /// # Panics
    ///
    /// Panics if the IMEI number is not valid utf8. The specification says that IMEIs should be
    /// ascii numbers.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let imei = message.imei();
    /// ```
    pub fn imei(&self) -> &str {
        self.header.imei()
    }

    /// Returns this message's session status.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let session_status = message.session_status();
    /// ```
    pub fn session_status(&self) -> SessionStatus {
        self.header.session_status
    }

    /// Returns this message's mobile originated message sequence number.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let momsn = message.momsn();
    /// ```
    pub fn momsn(&self) -> u16 {
        self.header.momsn
    }

    /// Returns this message's mobile terminated message sequence number.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let mtmsn = message.mtmsn();
    /// ```
    pub fn mtmsn(&self) -> u16 {
        self.header.mtmsn
    }

    /// Returns this message's time of session.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let time_of_session = message.time_of_session();
    /// ```
    pub fn time_of_session(&self) -> DateTime<Utc> {
        self.header.time_of_session
    }

    /// Returns this message's payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let payload = message.payload();
    /// ```
    pub fn payload(&self) -> &Vec<u8> {
        &self.payload
    }

    /// Returns this message's location information, if the gateway reported one.
    pub fn location(&self) -> Option<LocationInformation> {
        self.location
    }

    /// Write this message back to a object that can `Write`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Cursor;
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let mut cursor = Cursor::new(Vec::new());
    /// message.write_to(&mut cursor);
    /// ```
    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        let mut elements = vec![
            InformationElement::MoHeader(self.header),
            InformationElement::MoPayload(self.payload.clone()),
        ];
        if let Some(location) = self.location {
            elements.push(InformationElement::MoLocationInformation(location));
        }
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
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time_of_session().cmp(&other.time_of_session())
    }
}
