//! Transmit mobile terminated messages to the Iridium Gateway.

use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::{
    message::{Category, MESSAGE_HEADER_LENGTH, PROTOCOL_REVISION_NUMBER},
    mt,
    queue::MessageQueue,
};

/// The polling tick of the worker thread, also the unit of backoff.
const HEARTBEAT: Duration = Duration::from_millis(100);

/// Backoff cap, in heartbeats.
const MAX_DELAY: u32 = 64;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;
type ResultCallback = Box<dyn Fn(i16) + Send + Sync>;

/// A transmitter of SBD messages through `DirectIP`.
///
/// Messages are sent asynchronously on a dedicated worker thread, in the order they were posted.
/// The transmitter is started with `start`, which spawns the worker, and stopped with `stop`; a
/// transmitter can be started and stopped without restriction.
///
/// Use `post` to place a message on the send queue; use `mt::Message::new` to build messages.
/// When a send fails, the message is returned to the head of the queue and retried after an
/// exponentially growing delay, so delivery is at-least-once: use the unique client message id
/// to deduplicate on the far side. The status of each confirmation the gateway returns is
/// reported to the on-transmit-result subscribers, negative (rejection) statuses included.
pub struct Transmitter {
    host: String,
    port: u16,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    queue: MessageQueue<mt::Message>,
    shutdown: ShutdownFlag,
    on_error: Mutex<Vec<ErrorCallback>>,
    on_transmit_result: Mutex<Vec<ResultCallback>>,
}

#[derive(Default)]
struct ShutdownFlag {
    flag: Mutex<bool>,
    condvar: Condvar,
}

/// The states of the send state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum State {
    NotConnected,
    Resolving,
    Connecting,
    Sending,
    ReceivingHeader,
    ReceivingConfirmation,
    ProcessingConfirmation,
    Error,
    Success,
}

impl Transmitter {
    /// Creates a new transmitter that will submit messages to `host:port`.
    ///
    /// The transmitter does nothing until it is started.
    ///
    /// # Examples
    ///
    /// ```
    /// let transmitter = sbd_directip::directip::Transmitter::new("12.47.179.12", 10800);
    /// ```
    pub fn new(host: &str, port: u16) -> Transmitter {
        Transmitter {
            host: host.to_string(),
            port,
            shared: Arc::new(Shared {
                queue: MessageQueue::new(),
                shutdown: ShutdownFlag::default(),
                on_error: Mutex::new(Vec::new()),
                on_transmit_result: Mutex::new(Vec::new()),
            }),
            worker: None,
        }
    }

    /// Subscribes to transmit errors.
    pub fn on_error<F: Fn(&str) + Send + Sync + 'static>(&mut self, callback: F) {
        self.shared.on_error.lock().unwrap().push(Box::new(callback));
    }

    /// Subscribes to transmit results.
    ///
    /// Each subscriber is called with the message status from every confirmation the gateway
    /// returns, including negative statuses, which are also retried as errors.
    pub fn on_transmit_result<F: Fn(i16) + Send + Sync + 'static>(&mut self, callback: F) {
        self.shared
            .on_transmit_result
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Places a message at the tail of the send queue.
    pub fn post(&self, message: mt::Message) {
        self.shared.queue.put(message);
    }

    /// Removes every queued message.
    pub fn drop_messages(&self) {
        self.shared.queue.clear();
    }

    /// Returns the number of messages waiting to be sent.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Starts the worker thread.
    ///
    /// A no-op if the transmitter is already running.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        self.shared.shutdown.clear();
        let shared = self.shared.clone();
        let host = self.host.clone();
        let port = self.port;
        self.worker = Some(thread::spawn(move || worker(shared, host, port)));
    }

    /// Stops the worker thread, joining it.
    ///
    /// Any in-flight send is abandoned; queued messages stay queued.
    pub fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.shared.shutdown.set();
            let _ = handle.join();
        }
    }
}

impl fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transmitter")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("pending", &self.pending())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn emit_error(&self, error: &str) {
        for callback in self.on_error.lock().unwrap().iter() {
            callback(error);
        }
    }

    fn emit_transmit_result(&self, status: i16) {
        for callback in self.on_transmit_result.lock().unwrap().iter() {
            callback(status);
        }
    }
}

impl ShutdownFlag {
    fn set(&self) {
        *self.flag.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock().unwrap() = false;
    }

    fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Waits up to `timeout` for the flag to be set. Returns true if it was.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock().unwrap();
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self.condvar.wait_timeout(flag, deadline - now).unwrap();
            flag = guard;
        }
        *flag
    }
}

fn worker(shared: Arc<Shared>, host: String, port: u16) {
    let mut machine = StateMachine::new(shared, host, port);
    while !machine.shared.shutdown.is_set() {
        if !machine.shared.queue.wait_for(HEARTBEAT) {
            continue;
        }
        machine.run();
    }
}

struct StateMachine {
    shared: Arc<Shared>,
    host: String,
    port: u16,
    state: State,
    prev_state: State,
    err_delay: u32,
    in_flight: Option<mt::Message>,
}

impl StateMachine {
    fn new(shared: Arc<Shared>, host: String, port: u16) -> StateMachine {
        StateMachine {
            shared,
            host,
            port,
            state: State::NotConnected,
            prev_state: State::NotConnected,
            err_delay: 1,
            in_flight: None,
        }
    }

    fn transition(&mut self, state: State) {
        self.prev_state = self.state;
        self.state = state;
    }

    fn fail(&mut self, error: &str) {
        error!("{}", error);
        self.shared.emit_error(error);
        self.transition(State::Error);
    }

    /// Drives one message send from `Resolving` back to `NotConnected`.
    fn run(&mut self) {
        debug!("starting a send, {} messages queued", self.shared.queue.len());
        self.transition(State::Resolving);
        let mut addresses: Vec<SocketAddr> = Vec::new();
        let mut socket: Option<TcpStream> = None;
        let mut buffer: Vec<u8> = Vec::new();
        let mut confirmation_length = 0;
        loop {
            match self.state {
                State::NotConnected => break,
                State::Resolving => match (self.host.as_str(), self.port).to_socket_addrs() {
                    Ok(resolved) => {
                        addresses = resolved.collect();
                        if addresses.is_empty() {
                            self.fail(&format!("failed to resolve {}:{}", self.host, self.port));
                        } else {
                            self.transition(State::Connecting);
                        }
                    }
                    Err(err) => {
                        self.fail(&format!(
                            "failed to resolve {}:{}: {}",
                            self.host, self.port, err
                        ));
                    }
                },
                State::Connecting => {
                    socket = None;
                    for address in &addresses {
                        match TcpStream::connect_timeout(address, CONNECT_TIMEOUT) {
                            Ok(stream) => {
                                socket = Some(stream);
                                break;
                            }
                            Err(err) => debug!("connection to {} failed: {}", address, err),
                        }
                    }
                    match socket {
                        Some(ref stream) => {
                            let _ = stream.set_read_timeout(Some(IO_TIMEOUT));
                            let _ = stream.set_write_timeout(Some(IO_TIMEOUT));
                            self.transition(State::Sending);
                        }
                        None => {
                            self.fail(&format!(
                                "connection error: no endpoint of {}:{} accepted the connection",
                                self.host, self.port
                            ));
                        }
                    }
                }
                State::Sending => match self.shared.queue.get() {
                    Some(message) => {
                        let serialized = message.serialize();
                        self.in_flight = Some(message);
                        match serialized {
                            Ok(bytes) => match socket.as_mut() {
                                Some(stream) => match stream.write_all(&bytes) {
                                    Ok(()) => self.transition(State::ReceivingHeader),
                                    Err(err) => self.fail(&format!("transmit error: {}", err)),
                                },
                                None => self.fail("transmit error: not connected"),
                            },
                            Err(err) => self.fail(&format!("serialize error: {}", err)),
                        }
                    }
                    None => {
                        close_socket(&mut socket);
                        self.transition(State::NotConnected);
                    }
                },
                State::ReceivingHeader => {
                    let mut header = [0; MESSAGE_HEADER_LENGTH];
                    let result = match socket.as_mut() {
                        Some(stream) => stream.read_exact(&mut header).map_err(|err| {
                            format!("receive confirmation error: {}", err)
                        }),
                        None => Err("receive confirmation error: not connected".to_string()),
                    };
                    match result {
                        Ok(()) => {
                            if header[0] != PROTOCOL_REVISION_NUMBER {
                                self.fail(&format!("invalid protocol number {}", header[0]));
                            } else {
                                confirmation_length =
                                    usize::from(u16::from_be_bytes([header[1], header[2]]));
                                self.transition(State::ReceivingConfirmation);
                            }
                        }
                        Err(err) => self.fail(&err),
                    }
                }
                State::ReceivingConfirmation => {
                    buffer.resize(confirmation_length, 0);
                    let result = match socket.as_mut() {
                        Some(stream) => stream.read_exact(&mut buffer).map_err(|err| {
                            format!("receive confirmation error: {}", err)
                        }),
                        None => Err("receive confirmation error: not connected".to_string()),
                    };
                    match result {
                        Ok(()) => self.transition(State::ProcessingConfirmation),
                        Err(err) => self.fail(&err),
                    }
                }
                State::ProcessingConfirmation => {
                    let category = Category::of(&buffer);
                    if category != Category::MobileTerminatedConfirmation {
                        if category == Category::Unknown {
                            self.fail(&format!("receive confirmation error: {}", category));
                        } else {
                            self.fail(&format!(
                                "receive confirmation error: unexpected {}",
                                category
                            ));
                        }
                        continue;
                    }
                    match mt::ConfirmMessage::parse(&buffer) {
                        Ok(confirmation) => {
                            info!("{}", confirmation);
                            self.shared.emit_transmit_result(confirmation.status());
                            if confirmation.status() < 0 {
                                self.fail(&format!(
                                    "message rejected by the gateway: {}",
                                    mt::describe_status(confirmation.status())
                                ));
                            } else {
                                self.in_flight = None;
                                self.err_delay = 1;
                                self.transition(State::Success);
                            }
                        }
                        Err(err) => {
                            self.fail(&format!("confirmation parse error: {}", err));
                        }
                    }
                }
                State::Error => {
                    if self.prev_state >= State::Sending {
                        if let Some(message) = self.in_flight.take() {
                            self.shared.queue.unget(message);
                        }
                    }
                    if self.prev_state > State::Connecting {
                        close_socket(&mut socket);
                    } else {
                        socket = None;
                    }
                    if self
                        .shared
                        .shutdown
                        .wait_timeout(HEARTBEAT * self.err_delay)
                    {
                        return;
                    }
                    self.err_delay = next_delay(self.err_delay);
                    self.transition(State::NotConnected);
                }
                State::Success => {
                    close_socket(&mut socket);
                    self.transition(State::NotConnected);
                }
            }
            if self.shared.shutdown.is_set() {
                return;
            }
        }
    }
}

/// Doubles the backoff delay, in heartbeats, up to the cap.
fn next_delay(err_delay: u32) -> u32 {
    if err_delay < MAX_DELAY {
        err_delay * 2
    } else {
        err_delay
    }
}

fn close_socket(socket: &mut Option<TcpStream>) {
    if let Some(stream) = socket.take() {
        // if the connection was closed by the other side, the descriptor may already be dead
        let _ = stream.shutdown(Shutdown::Both);
    }
}
