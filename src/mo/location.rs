//! An estimate of the originating IMEI's location, reported by the Iridium Gateway.

const NSI_MASK: u8 = 0x40;
const EWI_MASK: u8 = 0x80;

/// The location information carried by a mobile-originated message.
///
/// Eleven bytes on the wire: a flags byte (bits 0-3 reserved, bits 4-5 format code, bit 6 the
/// north/south indicator, bit 7 the east/west indicator), then degrees and thousandths of a
/// minute for latitude and longitude, then the CEP radius.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationInformation {
    /// True if the latitude is north of the equator (NSI = 0).
    pub north: bool,
    /// True if the longitude is east of the prime meridian (EWI = 0).
    pub east: bool,
    /// Latitude degrees, 0 to 90.
    pub lat_deg: u8,
    /// Latitude thousandths of a minute, 0 to 59999.
    pub lat_thousandths_min: u16,
    /// Longitude degrees, 0 to 180.
    pub lon_deg: u8,
    /// Longitude thousandths of a minute, 0 to 59999.
    pub lon_thousandths_min: u16,
    /// Circular Error Probable radius in kilometers (80% probability), 1 to 2000.
    pub cep_radius_km: u32,
}

impl LocationInformation {
    /// Extracts location information from its eleven wire bytes.
    pub fn from_bytes(bytes: [u8; 11]) -> LocationInformation {
        LocationInformation {
            north: bytes[0] & NSI_MASK == 0,
            east: bytes[0] & EWI_MASK == 0,
            lat_deg: bytes[1],
            lat_thousandths_min: u16::from_be_bytes([bytes[2], bytes[3]]),
            lon_deg: bytes[4],
            lon_thousandths_min: u16::from_be_bytes([bytes[5], bytes[6]]),
            cep_radius_km: u32::from_be_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
        }
    }

    /// Packs this location information into its eleven wire bytes.
    pub fn to_bytes(self) -> [u8; 11] {
        let mut bytes = [0; 11];
        if !self.north {
            bytes[0] |= NSI_MASK;
        }
        if !self.east {
            bytes[0] |= EWI_MASK;
        }
        bytes[1] = self.lat_deg;
        bytes[2..4].copy_from_slice(&self.lat_thousandths_min.to_be_bytes());
        bytes[4] = self.lon_deg;
        bytes[5..7].copy_from_slice(&self.lon_thousandths_min.to_be_bytes());
        bytes[7..11].copy_from_slice(&self.cep_radius_km.to_be_bytes());
        bytes
    }

    /// Decimal degrees, positive north, negative south.
    pub fn latitude(&self) -> f64 {
        let minutes = f64::from(self.lat_thousandths_min) / 1000.0;
        let dd = f64::from(self.lat_deg) + minutes / 60.0;
        if self.north {
            dd
        } else {
            -dd
        }
    }

    /// Decimal degrees, positive east, negative west.
    pub fn longitude(&self) -> f64 {
        let minutes = f64::from(self.lon_thousandths_min) / 1000.0;
        let dd = f64::from(self.lon_deg) + minutes / 60.0;
        if self.east {
            dd
        } else {
            -dd
        }
    }
}
