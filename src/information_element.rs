//! An information element is a portion of a SBD message.
//!
//! Information elements come after the SBD message header. They come in many types, including
//! more header-type information and the actual data payload. Each one is laid out on the wire as
//! a one-byte identifier, a two-byte big-endian content length, and the content itself.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{TimeZone, Utc};

use crate::{
    mo::{self, LocationInformation, SessionStatus},
    mt::{self, DispositionFlags, LOWEST_PRIORITY},
    Error, Result,
};

/// The length of an information element header: identifier plus content length.
pub const HEADER_LENGTH: usize = 3;

/// The maximum length of a mobile originated payload.
pub const MAX_MO_PAYLOAD_LENGTH: usize = 1960;

/// The maximum length of a mobile terminated payload.
pub const MAX_MT_PAYLOAD_LENGTH: usize = 1890;

const MO_HEADER_LENGTH: u16 = 28;
const MO_LOCATION_INFORMATION_LENGTH: u16 = 11;
const MO_CONFIRMATION_LENGTH: u16 = 1;
const MT_HEADER_LENGTH: u16 = 21;
const MT_CONFIRMATION_LENGTH: u16 = 25;
const MT_PRIORITY_LENGTH: u16 = 2;

/// An information element, or IE.
///
/// These are the building blocks of a SBD message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InformationElement {
    /// Information element holding the mobile originated header.
    MoHeader(mo::Header),
    /// The mobile originated payload.
    MoPayload(Vec<u8>),
    /// The mobile originated location information.
    MoLocationInformation(LocationInformation),
    /// The mobile originated confirmation status.
    MoConfirmation(u8),
    /// Information element holding the mobile terminated header.
    MtHeader(mt::Header),
    /// The mobile terminated payload.
    MtPayload(Vec<u8>),
    /// The mobile terminated confirmation.
    MtConfirmation(mt::Confirmation),
    /// The mobile terminated message priority.
    MtPriority(u16),
}

impl InformationElement {
    /// Reads an information element from a `Read`.
    ///
    /// Fixed-length elements must carry exactly their declared length on the wire; payloads must
    /// carry a length between one and their maximum.
    pub fn read_from<R: Read>(mut read: R) -> Result<InformationElement> {
        let iei = read.read_u8()?;
        let length = read.read_u16::<BigEndian>()?;
        match iei {
            0x01 => {
                if length != MO_HEADER_LENGTH {
                    return Err(Error::InvalidInformationElementLength(iei, length));
                }
                let cdr_ref = read.read_u32::<BigEndian>()?;
                let mut imei = [0; 15];
                read.read_exact(&mut imei)?;
                let session_status = SessionStatus::new(read.read_u8()?)?;
                let momsn = read.read_u16::<BigEndian>()?;
                let mtmsn = read.read_u16::<BigEndian>()?;
                let time_of_session =
                    read.read_u32::<BigEndian>()
                        .map_err(Error::from)
                        .and_then(|n| {
                            Utc.timestamp_opt(i64::from(n), 0)
                                .single()
                                .ok_or(Error::InvalidTimeOfSession)
                        })?;
                Ok(InformationElement::MoHeader(mo::Header {
                    cdr_ref,
                    imei,
                    session_status,
                    momsn,
                    mtmsn,
                    time_of_session,
                }))
            }
            0x02 => {
                if length < 1 || usize::from(length) > MAX_MO_PAYLOAD_LENGTH {
                    return Err(Error::PayloadLengthOutOfRange(length));
                }
                let mut payload = vec![0; usize::from(length)];
                read.read_exact(&mut payload)?;
                Ok(InformationElement::MoPayload(payload))
            }
            0x03 => {
                if length != MO_LOCATION_INFORMATION_LENGTH {
                    return Err(Error::InvalidInformationElementLength(iei, length));
                }
                let mut bytes = [0; 11];
                read.read_exact(&mut bytes)?;
                Ok(InformationElement::MoLocationInformation(
                    LocationInformation::from_bytes(bytes),
                ))
            }
            0x05 => {
                if length != MO_CONFIRMATION_LENGTH {
                    return Err(Error::InvalidInformationElementLength(iei, length));
                }
                Ok(InformationElement::MoConfirmation(read.read_u8()?))
            }
            0x41 => {
                if length != MT_HEADER_LENGTH {
                    return Err(Error::InvalidInformationElementLength(iei, length));
                }
                let unique_client_msg_id = read.read_u32::<BigEndian>()?;
                let mut imei = [0; 15];
                read.read_exact(&mut imei)?;
                let disposition_flags = DispositionFlags::decode(read.read_u16::<BigEndian>()?);
                Ok(InformationElement::MtHeader(mt::Header {
                    unique_client_msg_id,
                    imei,
                    disposition_flags,
                }))
            }
            0x42 => {
                if length < 1 || usize::from(length) > MAX_MT_PAYLOAD_LENGTH {
                    return Err(Error::PayloadLengthOutOfRange(length));
                }
                let mut payload = vec![0; usize::from(length)];
                read.read_exact(&mut payload)?;
                Ok(InformationElement::MtPayload(payload))
            }
            0x44 => {
                if length != MT_CONFIRMATION_LENGTH {
                    return Err(Error::InvalidInformationElementLength(iei, length));
                }
                let unique_client_msg_id = read.read_u32::<BigEndian>()?;
                let mut imei = [0; 15];
                read.read_exact(&mut imei)?;
                let auto_id_reference = read.read_u32::<BigEndian>()?;
                let message_status = read.read_i16::<BigEndian>()?;
                Ok(InformationElement::MtConfirmation(mt::Confirmation {
                    unique_client_msg_id,
                    imei,
                    auto_id_reference,
                    message_status,
                }))
            }
            0x46 => {
                if length != MT_PRIORITY_LENGTH {
                    return Err(Error::InvalidInformationElementLength(iei, length));
                }
                Ok(InformationElement::MtPriority(read.read_u16::<BigEndian>()?))
            }
            _ => Err(Error::InvalidInformationElementIdentifier(iei)),
        }
    }

    /// Returns the length of this information element, including the information element header.
    ///
    /// This matches what `write_to` produces, so oversized payloads count at their truncated
    /// length.
    pub fn len(&self) -> usize {
        match *self {
            InformationElement::MoHeader(_) => HEADER_LENGTH + usize::from(MO_HEADER_LENGTH),
            InformationElement::MoPayload(ref payload) => {
                HEADER_LENGTH + payload.len().min(MAX_MO_PAYLOAD_LENGTH)
            }
            InformationElement::MoLocationInformation(_) => {
                HEADER_LENGTH + usize::from(MO_LOCATION_INFORMATION_LENGTH)
            }
            InformationElement::MoConfirmation(_) => {
                HEADER_LENGTH + usize::from(MO_CONFIRMATION_LENGTH)
            }
            InformationElement::MtHeader(_) => HEADER_LENGTH + usize::from(MT_HEADER_LENGTH),
            InformationElement::MtPayload(ref payload) => {
                HEADER_LENGTH + payload.len().min(MAX_MT_PAYLOAD_LENGTH)
            }
            InformationElement::MtConfirmation(_) => {
                HEADER_LENGTH + usize::from(MT_CONFIRMATION_LENGTH)
            }
            InformationElement::MtPriority(_) => HEADER_LENGTH + usize::from(MT_PRIORITY_LENGTH),
        }
    }

    /// Returns true if this information element is empty.
    ///
    /// At this point, only can be true if a payload is empty.
    pub fn is_empty(&self) -> bool {
        match *self {
            InformationElement::MoPayload(ref payload)
            | InformationElement::MtPayload(ref payload) => payload.is_empty(),
            _ => false,
        }
    }

    /// Returns the identifier of this information element.
    pub fn id(&self) -> u8 {
        match *self {
            InformationElement::MoHeader(_) => 0x01,
            InformationElement::MoPayload(_) => 0x02,
            InformationElement::MoLocationInformation(_) => 0x03,
            InformationElement::MoConfirmation(_) => 0x05,
            InformationElement::MtHeader(_) => 0x41,
            InformationElement::MtPayload(_) => 0x42,
            InformationElement::MtConfirmation(_) => 0x44,
            InformationElement::MtPriority(_) => 0x46,
        }
    }

    /// Writes this information element to a `Write`.
    ///
    /// Oversized payloads are truncated to their maximum length, and out-of-range priorities are
    /// clamped to the lowest priority.
    pub fn write_to<W: Write>(&self, mut write: W) -> Result<()> {
        match *self {
            InformationElement::MoHeader(ref header) => {
                write.write_u8(0x01)?;
                write.write_u16::<BigEndian>(MO_HEADER_LENGTH)?;
                write.write_u32::<BigEndian>(header.cdr_ref)?;
                write.write_all(&header.imei)?;
                write.write_u8(header.session_status as u8)?;
                write.write_u16::<BigEndian>(header.momsn)?;
                write.write_u16::<BigEndian>(header.mtmsn)?;
                let timestamp = header.time_of_session.timestamp();
                if timestamp < 0 {
                    return Err(Error::NegativeTimestamp(timestamp));
                }
                write.write_u32::<BigEndian>(timestamp as u32)?;
            }
            InformationElement::MoPayload(ref payload) => {
                let length = payload.len().min(MAX_MO_PAYLOAD_LENGTH);
                write.write_u8(0x02)?;
                write.write_u16::<BigEndian>(length as u16)?;
                write.write_all(&payload[..length])?;
            }
            InformationElement::MoLocationInformation(ref location) => {
                write.write_u8(0x03)?;
                write.write_u16::<BigEndian>(MO_LOCATION_INFORMATION_LENGTH)?;
                write.write_all(&location.to_bytes())?;
            }
            InformationElement::MoConfirmation(status) => {
                write.write_u8(0x05)?;
                write.write_u16::<BigEndian>(MO_CONFIRMATION_LENGTH)?;
                write.write_u8(status)?;
            }
            InformationElement::MtHeader(ref header) => {
                write.write_u8(0x41)?;
                write.write_u16::<BigEndian>(MT_HEADER_LENGTH)?;
                write.write_u32::<BigEndian>(header.unique_client_msg_id)?;
                write.write_all(&header.imei)?;
                write.write_u16::<BigEndian>(header.disposition_flags.encode())?;
            }
            InformationElement::MtPayload(ref payload) => {
                let length = payload.len().min(MAX_MT_PAYLOAD_LENGTH);
                write.write_u8(0x42)?;
                write.write_u16::<BigEndian>(length as u16)?;
                write.write_all(&payload[..length])?;
            }
            InformationElement::MtConfirmation(ref confirmation) => {
                write.write_u8(0x44)?;
                write.write_u16::<BigEndian>(MT_CONFIRMATION_LENGTH)?;
                write.write_u32::<BigEndian>(confirmation.unique_client_msg_id)?;
                write.write_all(&confirmation.imei)?;
                write.write_u32::<BigEndian>(confirmation.auto_id_reference)?;
                write.write_i16::<BigEndian>(confirmation.message_status)?;
            }
            InformationElement::MtPriority(priority) => {
                let priority = if (mt::HIGHEST_PRIORITY..=LOWEST_PRIORITY).contains(&priority) {
                    priority
                } else {
                    LOWEST_PRIORITY
                };
                write.write_u8(0x46)?;
                write.write_u16::<BigEndian>(MT_PRIORITY_LENGTH)?;
                write.write_u16::<BigEndian>(priority)?;
            }
        }
        Ok(())
    }
}

impl From<mo::Header> for InformationElement {
    fn from(header: mo::Header) -> InformationElement {
        InformationElement::MoHeader(header)
    }
}

impl From<mt::Header> for InformationElement {
    fn from(header: mt::Header) -> InformationElement {
        InformationElement::MtHeader(header)
    }
}

/// Returns true if this identifier belongs to the mobile originated family.
pub fn is_mobile_originated(id: u8) -> bool {
    matches!(id, 0x01 | 0x02 | 0x03 | 0x05)
}

/// Returns true if this identifier belongs to the mobile terminated family.
pub fn is_mobile_terminated(id: u8) -> bool {
    matches!(id, 0x41 | 0x42 | 0x44 | 0x46)
}

/// Returns true if this identifier is the mobile terminated confirmation.
pub fn is_mobile_terminated_confirmation(id: u8) -> bool {
    id == 0x44
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn imei() -> [u8; 15] {
        let mut imei = [0; 15];
        imei.copy_from_slice(b"300125061511830");
        imei
    }

    fn mo_header() -> mo::Header {
        mo::Header {
            cdr_ref: 1894516585,
            imei: imei(),
            session_status: SessionStatus::Ok,
            momsn: 75,
            mtmsn: 0,
            time_of_session: Utc
                .with_ymd_and_hms(2015, 7, 9, 18, 15, 8)
                .single()
                .unwrap(),
        }
    }

    fn roundtrip(ie: InformationElement) {
        let mut cursor = Cursor::new(Vec::new());
        ie.write_to(&mut cursor).unwrap();
        assert_eq!(ie.len() as u64, cursor.position());
        cursor.set_position(0);
        assert_eq!(ie, InformationElement::read_from(cursor).unwrap());
    }

    #[test]
    fn roundtrip_mo_header() {
        roundtrip(InformationElement::MoHeader(mo_header()));
    }

    #[test]
    fn roundtrip_mo_payload() {
        roundtrip(InformationElement::MoPayload(vec![1, 2, 3]));
        roundtrip(InformationElement::MoPayload(vec![0; MAX_MO_PAYLOAD_LENGTH]));
    }

    #[test]
    fn roundtrip_mo_location_information() {
        let location = LocationInformation::from_bytes([0, 37, 0x75, 0x30, 122, 0x3A, 0x98, 0, 0, 0, 5]);
        roundtrip(InformationElement::MoLocationInformation(location));
    }

    #[test]
    fn roundtrip_mo_confirmation() {
        roundtrip(InformationElement::MoConfirmation(1));
    }

    #[test]
    fn roundtrip_mt_header() {
        roundtrip(InformationElement::MtHeader(mt::Header {
            unique_client_msg_id: 9999,
            imei: imei(),
            disposition_flags: DispositionFlags::decode(59),
        }));
    }

    #[test]
    fn roundtrip_mt_payload() {
        roundtrip(InformationElement::MtPayload(vec![4, 5, 6]));
        roundtrip(InformationElement::MtPayload(vec![0; MAX_MT_PAYLOAD_LENGTH]));
    }

    #[test]
    fn roundtrip_mt_confirmation() {
        roundtrip(InformationElement::MtConfirmation(mt::Confirmation {
            unique_client_msg_id: 9999,
            imei: imei(),
            auto_id_reference: 4294967295,
            message_status: -11,
        }));
    }

    #[test]
    fn roundtrip_mt_priority() {
        roundtrip(InformationElement::MtPriority(1));
        roundtrip(InformationElement::MtPriority(5));
    }

    #[test]
    fn mt_header_bytes() {
        let ie = InformationElement::MtHeader(mt::Header {
            unique_client_msg_id: 9999,
            imei: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
            disposition_flags: DispositionFlags::decode(59),
        });
        let mut bytes = Vec::new();
        ie.write_to(&mut bytes).unwrap();
        assert_eq!(
            vec![
                0x41, 0x00, 0x15, 0x00, 0x00, 0x27, 0x0f, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
                0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x00, 0x3b
            ],
            bytes
        );
    }

    #[test]
    fn mt_confirmation_bytes() {
        let ie = InformationElement::MtConfirmation(mt::Confirmation {
            unique_client_msg_id: 9999,
            imei: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
            auto_id_reference: 4294967295,
            message_status: -11,
        });
        let mut bytes = Vec::new();
        ie.write_to(&mut bytes).unwrap();
        assert_eq!(
            vec![
                0x44, 0x00, 0x19, 0x00, 0x00, 0x27, 0x0f, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
                0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0xff, 0xff, 0xff, 0xff,
                0xff, 0xf5
            ],
            bytes
        );
    }

    #[test]
    fn unknown_identifier() {
        let bytes = [0x45, 0x00, 0x01, 0x00];
        assert!(matches!(
            InformationElement::read_from(Cursor::new(&bytes)),
            Err(Error::InvalidInformationElementIdentifier(0x45))
        ));
    }

    #[test]
    fn fixed_length_mismatch() {
        let mut bytes = Vec::new();
        InformationElement::MoHeader(mo_header())
            .write_to(&mut bytes)
            .unwrap();
        bytes[2] = 29;
        assert!(matches!(
            InformationElement::read_from(Cursor::new(&bytes)),
            Err(Error::InvalidInformationElementLength(0x01, 29))
        ));
    }

    #[test]
    fn priority_length_mismatch() {
        let bytes = [0x46, 0x00, 0x01, 0x05];
        assert!(matches!(
            InformationElement::read_from(Cursor::new(&bytes)),
            Err(Error::InvalidInformationElementLength(0x46, 1))
        ));
    }

    #[test]
    fn undersized() {
        let mut bytes = Vec::new();
        InformationElement::MoHeader(mo_header())
            .write_to(&mut bytes)
            .unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(InformationElement::read_from(Cursor::new(&bytes)).is_err());
    }

    #[test]
    fn zero_length_payload() {
        let bytes = [0x02, 0x00, 0x00];
        assert!(matches!(
            InformationElement::read_from(Cursor::new(&bytes)),
            Err(Error::PayloadLengthOutOfRange(0))
        ));
    }

    #[test]
    fn oversized_mo_payload_length() {
        let mut bytes = vec![0x02];
        bytes.extend_from_slice(&1961u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 1961]);
        assert!(matches!(
            InformationElement::read_from(Cursor::new(&bytes)),
            Err(Error::PayloadLengthOutOfRange(1961))
        ));
    }

    #[test]
    fn oversized_mt_payload_length() {
        let mut bytes = vec![0x42];
        bytes.extend_from_slice(&1891u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 1891]);
        assert!(matches!(
            InformationElement::read_from(Cursor::new(&bytes)),
            Err(Error::PayloadLengthOutOfRange(1891))
        ));
    }

    #[test]
    fn truncates_oversized_mo_payload() {
        let ie = InformationElement::MoPayload(vec![1; MAX_MO_PAYLOAD_LENGTH + 10]);
        let mut bytes = Vec::new();
        ie.write_to(&mut bytes).unwrap();
        assert_eq!(HEADER_LENGTH + MAX_MO_PAYLOAD_LENGTH, bytes.len());
        match InformationElement::read_from(Cursor::new(&bytes)).unwrap() {
            InformationElement::MoPayload(payload) => {
                assert_eq!(vec![1; MAX_MO_PAYLOAD_LENGTH], payload)
            }
            _ => panic!("Unexpected information element"),
        }
    }

    #[test]
    fn truncates_oversized_mt_payload() {
        let ie = InformationElement::MtPayload(vec![2; MAX_MT_PAYLOAD_LENGTH + 1]);
        let mut bytes = Vec::new();
        ie.write_to(&mut bytes).unwrap();
        assert_eq!(HEADER_LENGTH + MAX_MT_PAYLOAD_LENGTH, bytes.len());
    }

    #[test]
    fn clamps_out_of_range_priorities() {
        for priority in [0, 6, 99, u16::MAX] {
            let mut bytes = Vec::new();
            InformationElement::MtPriority(priority)
                .write_to(&mut bytes)
                .unwrap();
            assert_eq!(vec![0x46, 0x00, 0x02, 0x00, 0x05], bytes);
        }
    }

    #[test]
    fn families() {
        for id in [0x01, 0x02, 0x03, 0x05] {
            assert!(is_mobile_originated(id));
            assert!(!is_mobile_terminated(id));
        }
        for id in [0x41, 0x42, 0x44, 0x46] {
            assert!(is_mobile_terminated(id));
            assert!(!is_mobile_originated(id));
        }
        assert!(is_mobile_terminated_confirmation(0x44));
        assert!(!is_mobile_terminated_confirmation(0x41));
        assert!(!is_mobile_originated(0x04));
        assert!(!is_mobile_terminated(0x45));
    }
}
