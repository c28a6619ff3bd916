//! Mobile terminated header.
//!
//! A mobile terminated header is one of the information element types that compose a mobile
//! terminated message. It is defined by an information element identifier (IEI) with value 0x41.

const FLUSH_MT_QUEUE_MASK: u16 = 0b0000_0000_0000_0001;
const SEND_RING_ALERT_MASK: u16 = 0b0000_0000_0000_0010;
const UPDATE_SSD_LOCATION_MASK: u16 = 0b0000_0000_0000_1000;
const HIGH_PRIORITY_MASK: u16 = 0b0000_0000_0001_0000;
const ASSIGN_MTMSN_MASK: u16 = 0b0000_0000_0010_0000;

/// Disposition flags.
///
/// A set of flags available to the client to trigger specific actions on the Iridium Gateway:
///
/// * Flush MT queue: delete all MT payloads in the SSD's MT queue.
/// * Send ring alert: send a ring alert with no associated MT payload (normal ring alert rules
///   apply).
/// * Update SSD location: update the SSD location with the given lat/lon values.
/// * High priority message: place the associated MT payload in the queue based on priority level.
/// * Assign MTMSN: use the value in the unique client message id field as the MTMSN.
///
/// Bit 2 of the flag word is unused, so all flags on is 0b0000_0000_0011_1011.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispositionFlags {
    /// Delete all MT payloads in the SSD's MT queue.
    pub flush_mt_queue: bool,
    /// Send a ring alert with no associated MT payload.
    pub send_ring_alert: bool,
    /// Update the SSD location with the given lat/lon values.
    pub update_ssd_location: bool,
    /// Place the associated MT payload in the queue based on priority level.
    pub high_priority: bool,
    /// Use the value in the unique client message id field as the MTMSN.
    pub assign_mtmsn: bool,
}

impl DispositionFlags {
    /// Decodes a big-endian flag word into a `DispositionFlags`.
    ///
    /// Each flag is a bit in a specific position: flush MT queue is 1, send ring alert is 2,
    /// update SSD location is 8, high priority is 16, and assign MTMSN is 32. All other bits
    /// are ignored.
    pub fn decode(code: u16) -> DispositionFlags {
        DispositionFlags {
            flush_mt_queue: code & FLUSH_MT_QUEUE_MASK != 0,
            send_ring_alert: code & SEND_RING_ALERT_MASK != 0,
            update_ssd_location: code & UPDATE_SSD_LOCATION_MASK != 0,
            high_priority: code & HIGH_PRIORITY_MASK != 0,
            assign_mtmsn: code & ASSIGN_MTMSN_MASK != 0,
        }
    }

    /// Encodes this `DispositionFlags` into a flag word.
    pub fn encode(&self) -> u16 {
        let mut code = 0;
        if self.flush_mt_queue {
            code |= FLUSH_MT_QUEUE_MASK;
        }
        if self.send_ring_alert {
            code |= SEND_RING_ALERT_MASK;
        }
        if self.update_ssd_location {
            code |= UPDATE_SSD_LOCATION_MASK;
        }
        if self.high_priority {
            code |= HIGH_PRIORITY_MASK;
        }
        if self.assign_mtmsn {
            code |= ASSIGN_MTMSN_MASK;
        }
        code
    }
}

/// A mobile-terminated header.
///
/// The unique client message id is echoed back in the confirmation message the gateway sends for
/// each submission, and becomes the MTMSN when the assign MTMSN disposition flag is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// The client-chosen id for this message (not the MTMSN).
    pub unique_client_msg_id: u32,
    /// The device id of the message destination.
    pub imei: [u8; 15],
    /// The disposition flags.
    pub disposition_flags: DispositionFlags,
}
