//! Drive an Iridium transceiver over its serial AT interface.
//!
//! The modem speaks an AT command dialect at 19200 bps, 8 data bits, no parity, one stop bit.
//! Commands are terminated by a carriage return; responses are terminated by `\r\n` and usually
//! concluded by `OK\r\n`. Mobile originated payloads are written into the modem's buffer with
//! `SBDWB`, mobile terminated payloads are read out with `SBDRB`, and an SBD session between the
//! modem and the Iridium Gateway is initiated with `SBDIX` (or `SBDIXA` when answering a ring
//! alert).
//!
//! The driver is a synchronous wrapper: each command writes, reads to a terminator under a
//! deadline, and parses the response lines. Commands serialize through an internal mutex, so a
//! shared `Modem` can be used from several threads.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;
use serialport::SerialPort;

use crate::{information_element::MAX_MO_PAYLOAD_LENGTH, Error, Result};

const BAUD_RATE: u32 = 19200;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const READY_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_TIMEOUT: Duration = Duration::from_secs(50);
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// The transport a modem driver talks through.
///
/// Implemented for boxed serial ports; tests use an in-memory implementation.
pub trait ModemPort: Read + Write {
    /// Sets the timeout for individual reads from the port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
}

impl ModemPort for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        SerialPort::set_timeout(self.as_mut(), timeout).map_err(Error::from)
    }
}

/// Which modem message buffers to clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearBuffers {
    /// Clear the mobile originated buffer.
    MobileOriginated,
    /// Clear the mobile terminated buffer.
    MobileTerminated,
    /// Clear both buffers.
    Both,
}

/// The result of writing a mobile originated message into the modem buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// SBD message successfully written to the modem.
    Ok = 0,
    /// SBD message write timeout: an insufficient number of bytes were transferred to the modem
    /// during the transfer period of 60 seconds.
    Timeout = 1,
    /// SBD message checksum sent from the DTE does not match the checksum calculated at the
    /// modem.
    ChecksumMismatch = 2,
    /// SBD message size is not correct: the maximum mobile originated SBD message length is 1960
    /// bytes, the minimum is 1 byte.
    WrongSize = 3,
}

impl WriteStatus {
    /// Creates a write status from a result code.
    ///
    /// Returns an error if the code is unknown.
    pub fn new(n: u8) -> Result<WriteStatus> {
        match n {
            0 => Ok(WriteStatus::Ok),
            1 => Ok(WriteStatus::Timeout),
            2 => Ok(WriteStatus::ChecksumMismatch),
            3 => Ok(WriteStatus::WrongSize),
            _ => Err(Error::ModemCommand(format!("unknown write status {}", n))),
        }
    }
}

/// The modem's buffer and sequence number status, from `AT+SBDSX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SbdStatus {
    /// True if there is a message in the mobile originated buffer.
    pub mo_flag: bool,
    /// The sequence number that will be used during the next mobile originated SBD session.
    pub momsn: u16,
    /// True if there is a message in the mobile terminated buffer.
    pub mt_flag: bool,
    /// The sequence number that was used in the most recent mobile terminated SBD session.
    ///
    /// This value is -1 if there is nothing in the mobile terminated buffer.
    pub mtmsn: i32,
    /// True if an SBD ring alert has been received and not answered.
    pub ra_flag: bool,
    /// How many SBD mobile terminated messages are currently queued at the gateway, up to 50.
    pub mt_queued: u8,
}

/// The outcome of an SBD session, from `AT+SBDIX` or `AT+SBDIXA`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SbdSessionStatus {
    /// An indication of the disposition of the mobile originated transaction.
    pub mo_status: u8,
    /// The sequence number the modem assigned to the last mobile originated message sent to the
    /// gateway.
    pub momsn: u16,
    /// An indication of the disposition of the mobile terminated transaction.
    pub mt_status: u8,
    /// Assigned by the gateway when forwarding a message to the modem.
    ///
    /// Indeterminate when `mt_status` is zero.
    pub mtmsn: u16,
    /// The length in bytes of the mobile terminated SBD message received from the gateway.
    ///
    /// Zero if no message was received.
    pub mt_message_length: u16,
    /// A count of mobile terminated SBD messages waiting at the gateway.
    pub mt_queued: u8,
}

/// An Iridium transceiver on the end of a serial line.
pub struct Modem<P: ModemPort> {
    port: Mutex<P>,
}

impl Modem<Box<dyn SerialPort>> {
    /// Opens the modem on a serial device and verifies it responds.
    ///
    /// The port is configured to 19200 bps, 8 data bits, no parity, one stop bit, and the modem
    /// is put in verbose mode with `ATQ0V1`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let modem = sbd_directip::modem::Modem::open("/dev/ttyUSB0").unwrap();
    /// ```
    pub fn open(device: &str) -> Result<Modem<Box<dyn SerialPort>>> {
        let port = serialport::new(device, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(POLL_TIMEOUT)
            .open()?;
        Modem::from_port(port)
    }
}

impl<P: ModemPort> Modem<P> {
    /// Wraps an already-open port, verifying the modem responds to `ATQ0V1`.
    pub fn from_port(port: P) -> Result<Modem<P>> {
        let modem = Modem {
            port: Mutex::new(port),
        };
        {
            let mut port = modem.port.lock().unwrap();
            write_command(&mut *port, "ATQ0V1")?;
            read_until(&mut *port, b"OK\r\n", COMMAND_TIMEOUT)?;
        }
        Ok(modem)
    }

    /// Queries the network registration status with `AT+CREG?`.
    pub fn registration_status(&self) -> Result<u8> {
        let response = self.command("AT+CREG?", COMMAND_TIMEOUT)?;
        // +CREG:002,004
        let fields = field_after(&response, "+CREG:")?;
        let status = fields
            .rsplit(',')
            .next()
            .ok_or_else(|| Error::ModemCommand("malformed +CREG response".to_string()))?;
        Ok(status.trim().parse()?)
    }

    /// Queries the signal quality, 0 to 5 bars.
    ///
    /// `AT+CSQ?` forces a fresh measurement, which can take tens of seconds; pass `last_known`
    /// to use `AT+CSQF?` and get the last known value immediately.
    pub fn signal_quality(&self, last_known: bool) -> Result<u8> {
        let (command, prefix, timeout) = if last_known {
            ("AT+CSQF?", "+CSQF:", COMMAND_TIMEOUT)
        } else {
            ("AT+CSQ?", "+CSQ:", SESSION_TIMEOUT)
        };
        let response = self.command(command, timeout)?;
        Ok(field_after(&response, prefix)?.parse()?)
    }

    /// Detaches the modem from the gateway with `AT+SBDDET`, returning the detach error code.
    pub fn detach(&self) -> Result<u8> {
        let response = self.command("AT+SBDDET", COMMAND_TIMEOUT)?;
        // +SBDDET:1,18
        let fields = field_after(&response, "+SBDDET:")?;
        let error = fields
            .rsplit(',')
            .next()
            .ok_or_else(|| Error::ModemCommand("malformed +SBDDET response".to_string()))?;
        Ok(error.trim().parse()?)
    }

    /// Queries the modem's buffer status with `AT+SBDSX`.
    pub fn status(&self) -> Result<SbdStatus> {
        let response = self.command("AT+SBDSX", COMMAND_TIMEOUT)?;
        // +SBDSX: 0, 13, 0, -1, 0, 0
        let fields: Vec<&str> = field_after(&response, "+SBDSX:")?
            .split(',')
            .map(str::trim)
            .collect();
        if fields.len() != 6 {
            return Err(Error::ModemCommand("malformed +SBDSX response".to_string()));
        }
        Ok(SbdStatus {
            mo_flag: fields[0] == "1",
            momsn: fields[1].parse()?,
            mt_flag: fields[2] == "1",
            mtmsn: fields[3].parse()?,
            ra_flag: fields[4] == "1",
            mt_queued: fields[5].parse()?,
        })
    }

    /// Clears one or both of the modem's message buffers with `AT+SBDD`.
    pub fn clear_buffers(&self, clear: ClearBuffers) -> Result<()> {
        let command = match clear {
            ClearBuffers::MobileOriginated => "AT+SBDD0",
            ClearBuffers::MobileTerminated => "AT+SBDD1",
            ClearBuffers::Both => "AT+SBDD2",
        };
        let response = self.command(command, COMMAND_TIMEOUT)?;
        match numeric_line(&response) {
            Some(0) => Ok(()),
            _ => Err(Error::ModemCommand("buffer clear failed".to_string())),
        }
    }

    /// Resets the mobile originated message sequence number with `AT+SBDC`.
    pub fn reset_momsn(&self) -> Result<()> {
        let response = self.command("AT+SBDC", COMMAND_TIMEOUT)?;
        match numeric_line(&response) {
            Some(0) => Ok(()),
            _ => Err(Error::ModemCommand("MOMSN reset failed".to_string())),
        }
    }

    /// Writes a mobile originated message into the modem buffer with `AT+SBDWB`.
    ///
    /// The payload must be between one and 1960 bytes. After the length command the modem
    /// answers `READY`, then takes the payload followed by a two-byte big-endian checksum: the
    /// low sixteen bits of the sum of the payload bytes.
    pub fn write_message(&self, payload: &[u8]) -> Result<WriteStatus> {
        if payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if payload.len() > MAX_MO_PAYLOAD_LENGTH {
            return Err(Error::PayloadTooLong(payload.len()));
        }
        let mut port = self.port.lock().unwrap();
        write_command(&mut *port, &format!("AT+SBDWB={}", payload.len()))?;
        read_until(&mut *port, b"READY\r\n", READY_TIMEOUT)?;
        port.write_all(payload)?;
        port.write_all(&checksum(payload).to_be_bytes())?;
        port.flush()?;
        let response = read_until(&mut *port, b"OK\r\n", COMMAND_TIMEOUT)?;
        let response = String::from_utf8_lossy(&response).into_owned();
        match numeric_line(&response) {
            Some(n) => WriteStatus::new(n),
            None => Err(Error::ModemCommand(
                "no status code in +SBDWB response".to_string(),
            )),
        }
    }

    /// Reads the mobile terminated message out of the modem buffer with `AT+SBDRB`.
    ///
    /// The transfer is a two-byte big-endian length, the payload, and a two-byte big-endian
    /// checksum. Returns an empty payload if there is no message waiting.
    pub fn read_message(&self) -> Result<Vec<u8>> {
        let mut port = self.port.lock().unwrap();
        write_command(&mut *port, "AT+SBDRB")?;
        // command echo, or an empty line
        read_until(&mut *port, b"\r", COMMAND_TIMEOUT)?;
        let mut length = [0; 2];
        read_exact_deadline(&mut *port, &mut length, COMMAND_TIMEOUT)?;
        let length = u16::from_be_bytes(length);
        let mut payload = vec![0; usize::from(length)];
        if length > 0 {
            read_exact_deadline(&mut *port, &mut payload, COMMAND_TIMEOUT)?;
        }
        let mut expected = [0; 2];
        read_exact_deadline(&mut *port, &mut expected, COMMAND_TIMEOUT)?;
        if !payload.is_empty() && checksum(&payload) != u16::from_be_bytes(expected) {
            return Err(Error::ChecksumMismatch);
        }
        let _ = read_until(&mut *port, b"OK\r\n", COMMAND_TIMEOUT);
        Ok(payload)
    }

    /// Initiates an SBD session between the modem and the gateway.
    ///
    /// Pass `answer` if the session is in response to an SBD ring alert. Sessions can take a
    /// long time; the command timeout is 50 seconds.
    pub fn initiate_session(&self, answer: bool) -> Result<SbdSessionStatus> {
        let command = if answer { "AT+SBDIXA" } else { "AT+SBDIX" };
        let response = self.command(command, SESSION_TIMEOUT)?;
        // +SBDIX: 32, 13, 2, 0, 0, 0
        let fields = field_after(&response, "+SBDIX")?;
        let fields: Vec<&str> = fields
            .trim_start_matches('A')
            .trim_start_matches(':')
            .split(',')
            .map(str::trim)
            .collect();
        if fields.len() != 6 {
            return Err(Error::ModemCommand("malformed +SBDIX response".to_string()));
        }
        Ok(SbdSessionStatus {
            mo_status: fields[0].parse()?,
            momsn: fields[1].parse()?,
            mt_status: fields[2].parse()?,
            mtmsn: fields[3].parse()?,
            mt_message_length: fields[4].parse()?,
            mt_queued: fields[5].parse()?,
        })
    }

    fn command(&self, command: &str, timeout: Duration) -> Result<String> {
        let mut port = self.port.lock().unwrap();
        write_command(&mut *port, command)?;
        let response = read_until(&mut *port, b"OK\r\n", timeout)?;
        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

impl<P: ModemPort> fmt::Debug for Modem<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Modem").finish_non_exhaustive()
    }
}

fn write_command<P: ModemPort + ?Sized>(port: &mut P, command: &str) -> Result<()> {
    debug!("modem <- {}", command);
    port.write_all(command.as_bytes())?;
    port.write_all(b"\r")?;
    port.flush()?;
    Ok(())
}

/// Reads from the port until the buffer ends with `delimiter`, or the deadline passes.
fn read_until<P: ModemPort + ?Sized>(
    port: &mut P,
    delimiter: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>> {
    port.set_timeout(POLL_TIMEOUT)?;
    let deadline = Instant::now() + timeout;
    let mut buffer = Vec::new();
    let mut byte = [0; 1];
    loop {
        match port.read(&mut byte) {
            Ok(0) => {}
            Ok(_) => {
                buffer.push(byte[0]);
                if buffer.ends_with(delimiter) {
                    return Ok(buffer);
                }
                continue;
            }
            Err(ref err)
                if err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(Error::Io(err)),
        }
        if Instant::now() >= deadline {
            return Err(Error::ModemTimeout);
        }
    }
}

fn read_exact_deadline<P: ModemPort + ?Sized>(
    port: &mut P,
    buffer: &mut [u8],
    timeout: Duration,
) -> Result<()> {
    port.set_timeout(POLL_TIMEOUT)?;
    let deadline = Instant::now() + timeout;
    let mut position = 0;
    while position < buffer.len() {
        match port.read(&mut buffer[position..]) {
            Ok(0) => {}
            Ok(n) => {
                position += n;
                continue;
            }
            Err(ref err)
                if err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(Error::Io(err)),
        }
        if Instant::now() >= deadline {
            return Err(Error::ModemTimeout);
        }
    }
    Ok(())
}

/// The low sixteen bits of the sum of the payload bytes.
fn checksum(payload: &[u8]) -> u16 {
    payload.iter().map(|&b| u32::from(b)).sum::<u32>() as u16
}

fn field_after<'a>(response: &'a str, prefix: &str) -> Result<&'a str> {
    response
        .lines()
        .find_map(|line| {
            line.find(prefix)
                .map(|index| line[index + prefix.len()..].trim())
        })
        .ok_or_else(|| Error::ModemCommand(format!("missing {} in response", prefix)))
}

fn numeric_line(response: &str) -> Option<u8> {
    response
        .lines()
        .find_map(|line| line.trim().parse::<u8>().ok())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct FakePort {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakePort {
        fn new(input: &[u8]) -> FakePort {
            let mut script = b"\r\nOK\r\n".to_vec();
            script.extend_from_slice(input);
            FakePort {
                input: Cursor::new(script),
                output: Vec::new(),
            }
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            match self.input.read(buffer) {
                Ok(0) => Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "script exhausted",
                )),
                other => other,
            }
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
            self.output.write(buffer)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ModemPort for FakePort {
        fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    fn written(modem: &Modem<FakePort>) -> Vec<u8> {
        modem.port.lock().unwrap().output.clone()
    }

    #[test]
    fn from_port_handshakes() {
        let modem = Modem::from_port(FakePort::new(b"")).unwrap();
        assert_eq!(b"ATQ0V1\r".to_vec(), written(&modem));
    }

    #[test]
    fn from_port_without_a_modem() {
        let port = FakePort {
            input: Cursor::new(Vec::new()),
            output: Vec::new(),
        };
        assert!(Modem::from_port(port).is_err());
    }

    #[test]
    fn registration_status() {
        let modem =
            Modem::from_port(FakePort::new(b"AT+CREG?\r\n+CREG:002,004\r\n\r\nOK\r\n")).unwrap();
        assert_eq!(4, modem.registration_status().unwrap());
        assert!(written(&modem).ends_with(b"AT+CREG?\r"));
    }

    #[test]
    fn signal_quality() {
        let modem = Modem::from_port(FakePort::new(b"\r\n+CSQ:4\r\n\r\nOK\r\n")).unwrap();
        assert_eq!(4, modem.signal_quality(false).unwrap());
    }

    #[test]
    fn signal_quality_last_known() {
        let modem = Modem::from_port(FakePort::new(b"\r\n+CSQF:3\r\n\r\nOK\r\n")).unwrap();
        assert_eq!(3, modem.signal_quality(true).unwrap());
        assert!(written(&modem).ends_with(b"AT+CSQF?\r"));
    }

    #[test]
    fn detach() {
        let modem = Modem::from_port(FakePort::new(b"\r\n+SBDDET:1,18\r\n\r\nOK\r\n")).unwrap();
        assert_eq!(18, modem.detach().unwrap());
    }

    #[test]
    fn status() {
        let modem =
            Modem::from_port(FakePort::new(b"\r\n+SBDSX: 1, 13, 1, -1, 0, 4\r\n\r\nOK\r\n"))
                .unwrap();
        let status = modem.status().unwrap();
        assert!(status.mo_flag);
        assert_eq!(13, status.momsn);
        assert!(status.mt_flag);
        assert_eq!(-1, status.mtmsn);
        assert!(!status.ra_flag);
        assert_eq!(4, status.mt_queued);
    }

    #[test]
    fn clear_buffers() {
        let modem = Modem::from_port(FakePort::new(b"\r\n0\r\n\r\nOK\r\n")).unwrap();
        modem.clear_buffers(ClearBuffers::MobileTerminated).unwrap();
        assert!(written(&modem).ends_with(b"AT+SBDD1\r"));
    }

    #[test]
    fn clear_buffers_failure() {
        let modem = Modem::from_port(FakePort::new(b"\r\n1\r\n\r\nOK\r\n")).unwrap();
        assert!(modem.clear_buffers(ClearBuffers::Both).is_err());
    }

    #[test]
    fn reset_momsn() {
        let modem = Modem::from_port(FakePort::new(b"\r\n0\r\n\r\nOK\r\n")).unwrap();
        modem.reset_momsn().unwrap();
        assert!(written(&modem).ends_with(b"AT+SBDC\r"));
    }

    #[test]
    fn write_message() {
        let modem =
            Modem::from_port(FakePort::new(b"READY\r\n0\r\n\r\nOK\r\n")).unwrap();
        assert_eq!(WriteStatus::Ok, modem.write_message(b"hello").unwrap());
        let output = written(&modem);
        // "hello" sums to 532 = 0x0214
        assert!(output.ends_with(b"AT+SBDWB=5\rhello\x02\x14"));
    }

    #[test]
    fn write_message_rejected_checksum() {
        let modem =
            Modem::from_port(FakePort::new(b"READY\r\n2\r\n\r\nOK\r\n")).unwrap();
        assert_eq!(
            WriteStatus::ChecksumMismatch,
            modem.write_message(b"hello").unwrap()
        );
    }

    #[test]
    fn write_message_validates_payload() {
        let modem = Modem::from_port(FakePort::new(b"")).unwrap();
        assert!(matches!(modem.write_message(b""), Err(Error::EmptyPayload)));
        assert!(matches!(
            modem.write_message(&vec![0; MAX_MO_PAYLOAD_LENGTH + 1]),
            Err(Error::PayloadTooLong(1961))
        ));
    }

    #[test]
    fn read_message() {
        // "ABC" sums to 198 = 0x00C6
        let modem =
            Modem::from_port(FakePort::new(b"\r\x00\x03ABC\x00\xC6\r\nOK\r\n")).unwrap();
        assert_eq!(b"ABC".to_vec(), modem.read_message().unwrap());
    }

    #[test]
    fn read_message_empty() {
        let modem = Modem::from_port(FakePort::new(b"\r\x00\x00\x00\x00\r\nOK\r\n")).unwrap();
        assert!(modem.read_message().unwrap().is_empty());
    }

    #[test]
    fn read_message_bad_checksum() {
        let modem =
            Modem::from_port(FakePort::new(b"\r\x00\x03ABC\xFF\xFF\r\nOK\r\n")).unwrap();
        assert!(matches!(
            modem.read_message(),
            Err(Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn initiate_session() {
        let modem =
            Modem::from_port(FakePort::new(b"\r\n+SBDIX: 32, 13, 2, 8, 40, 1\r\n\r\nOK\r\n"))
                .unwrap();
        let status = modem.initiate_session(false).unwrap();
        assert_eq!(32, status.mo_status);
        assert_eq!(13, status.momsn);
        assert_eq!(2, status.mt_status);
        assert_eq!(8, status.mtmsn);
        assert_eq!(40, status.mt_message_length);
        assert_eq!(1, status.mt_queued);
        assert!(written(&modem).ends_with(b"AT+SBDIX\r"));
    }

    #[test]
    fn initiate_session_answer() {
        let modem =
            Modem::from_port(FakePort::new(b"\r\n+SBDIXA: 0, 14, 0, 0, 0, 0\r\n\r\nOK\r\n"))
                .unwrap();
        let status = modem.initiate_session(true).unwrap();
        assert_eq!(0, status.mo_status);
        assert!(written(&modem).ends_with(b"AT+SBDIXA\r"));
    }
}
