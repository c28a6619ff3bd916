//! Receive incoming Iridium messages through their Direct IP service.

use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};

use crate::{
    message::{Category, MESSAGE_HEADER_LENGTH, PROTOCOL_REVISION_NUMBER},
    mo,
};

const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(30);

type MessageCallback = Box<dyn Fn(&mo::Message) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A Iridium `DirectIP` server.
///
/// The server will listen on a socket address for incoming Iridium SBD Mobile Originated
/// messages. Each incoming message is handed to the on-message subscribers; malformed messages
/// and session failures are reported to the on-error subscribers and logged using the logging
/// framework.
pub struct Server<A: ToSocketAddrs + Sync> {
    addr: A,
    listener: Option<TcpListener>,
    subscribers: Arc<Subscribers>,
    accept_thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Subscribers {
    on_message: Mutex<Vec<MessageCallback>>,
    on_error: Mutex<Vec<ErrorCallback>>,
    shutdown: AtomicBool,
}

impl<A: ToSocketAddrs + Sync> Server<A> {
    /// Creates a new server that will listen on `addr`.
    ///
    /// This method does not actually bind to the socket address or accept connections. Use
    /// `bind` and `serve_forever` to actually do stuff.
    ///
    /// # Examples
    ///
    /// ```
    /// let server = sbd_directip::directip::Server::new("0.0.0.0:32606");
    /// ```
    pub fn new(addr: A) -> Server<A> {
        Server {
            addr,
            listener: None,
            subscribers: Arc::new(Subscribers::default()),
            accept_thread: None,
        }
    }

    /// Subscribes to incoming messages.
    ///
    /// Every subscriber is called with a reference to each message the server receives.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut server = sbd_directip::directip::Server::new("0.0.0.0:32606");
    /// server.on_message(|message| println!("{}", message.imei()));
    /// ```
    pub fn on_message<F: Fn(&mo::Message) + Send + Sync + 'static>(&mut self, callback: F) {
        self.subscribers
            .on_message
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Subscribes to session errors.
    ///
    /// Session errors terminate their session, not the server.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut server = sbd_directip::directip::Server::new("0.0.0.0:32606");
    /// server.on_error(|error| eprintln!("{}", error));
    /// ```
    pub fn on_error<F: Fn(&str) + Send + Sync + 'static>(&mut self, callback: F) {
        self.subscribers
            .on_error
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Binds this server to its tcp socket.
    ///
    /// This is a seperate operation from `serve_forever` so that we can capture any errors
    /// associated with the underlying `TcpListener::bind`.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut server = sbd_directip::directip::Server::new("127.0.0.1:0");
    /// server.bind().unwrap();
    /// ```
    pub fn bind(&mut self) -> io::Result<()> {
        self.listener = Some(TcpListener::bind(&self.addr)?);
        Ok(())
    }

    /// Returns the local address this server is bound to, if it is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Starts the `DirectIP` server and serves forever.
    ///
    /// # Panics
    ///
    /// This method panics if it has a problem binding to the tcp socket address. To avoid a
    /// panic, use `Server::bind` before calling `Server::serve_forever`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let mut server = sbd_directip::directip::Server::new("0.0.0.0:32606");
    /// server.bind().unwrap();
    /// server.serve_forever();
    /// ```
    pub fn serve_forever(&mut self) {
        if self.listener.is_none() {
            self.listener = Some(TcpListener::bind(&self.addr).unwrap());
        }
        let listener = self
            .listener
            .as_ref()
            .unwrap()
            .try_clone()
            .expect("unable to clone the bound listener");
        accept_loop(listener, self.subscribers.clone());
    }

    /// Starts accepting connections on a background thread.
    ///
    /// Binds first if `bind` has not been called. Use `stop` to shut the accept loop down.
    pub fn start(&mut self) -> io::Result<()> {
        if self.accept_thread.is_some() {
            return Ok(());
        }
        if self.listener.is_none() {
            self.bind()?;
        }
        let listener = self.listener.as_ref().unwrap().try_clone()?;
        let subscribers = self.subscribers.clone();
        self.subscribers.shutdown.store(false, Ordering::SeqCst);
        self.accept_thread = Some(thread::spawn(move || accept_loop(listener, subscribers)));
        Ok(())
    }

    /// Stops a server started with `start` and closes its listener.
    ///
    /// A no-op if the server is not running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.accept_thread.take() {
            self.subscribers.shutdown.store(true, Ordering::SeqCst);
            if let Some(addr) = self.local_addr() {
                // wake the accept loop so it can observe the shutdown flag
                if TcpStream::connect(addr).is_err() {
                    let _ = TcpStream::connect(("127.0.0.1", addr.port()));
                }
            }
            let _ = handle.join();
        }
        self.listener = None;
    }
}

impl<A: ToSocketAddrs + Sync> fmt::Debug for Server<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("running", &self.accept_thread.is_some())
            .finish()
    }
}

impl<A: ToSocketAddrs + Sync> Drop for Server<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, subscribers: Arc<Subscribers>) {
    for stream in listener.incoming() {
        if subscribers.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let session = IncomingSession::new(stream, Arc::downgrade(&subscribers));
                thread::spawn(move || session.run());
            }
            Err(err) => {
                error!("Error when receiving tcp communication: {:?}", err);
            }
        }
    }
}

/// One incoming `DirectIP` connection.
///
/// The session holds only a weak reference to the server's subscribers, so a session that
/// outlives its server quietly drops its results.
struct IncomingSession {
    stream: TcpStream,
    receiver: Weak<Subscribers>,
    buffer: Vec<u8>,
    message_length: Option<usize>,
}

impl IncomingSession {
    fn new(stream: TcpStream, receiver: Weak<Subscribers>) -> IncomingSession {
        IncomingSession {
            stream,
            receiver,
            buffer: Vec::new(),
            message_length: None,
        }
    }

    fn run(mut self) {
        match self.stream.peer_addr() {
            Ok(addr) => debug!("Handling TcpStream from {}", addr),
            Err(err) => debug!("Handling TcpStream from an unknown peer: {:?}", err),
        }
        if let Err(err) = self.stream.set_read_timeout(Some(SESSION_READ_TIMEOUT)) {
            self.emit_error(&format!("session setup error: {}", err));
            return;
        }
        let mut chunk = [0; 1024];
        loop {
            let bytes = match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.emit_error("connection closed before a complete message was received");
                    return;
                }
                Ok(bytes) => bytes,
                Err(err) => {
                    self.emit_error(&format!("session read error: {}", err));
                    return;
                }
            };
            self.buffer.extend_from_slice(&chunk[..bytes]);
            if self.message_length.is_none() && self.buffer.len() >= MESSAGE_HEADER_LENGTH {
                let protocol_revision_number = self.buffer[0];
                if protocol_revision_number != PROTOCOL_REVISION_NUMBER {
                    self.emit_error(&format!(
                        "invalid protocol number {}",
                        protocol_revision_number
                    ));
                    return;
                }
                let length = u16::from_be_bytes([self.buffer[1], self.buffer[2]]);
                self.buffer.drain(..MESSAGE_HEADER_LENGTH);
                self.message_length = Some(usize::from(length));
            }
            if let Some(length) = self.message_length {
                if self.buffer.len() >= length {
                    self.finish(length);
                    return;
                }
            }
        }
    }

    fn finish(&self, length: usize) {
        let bytes = &self.buffer[..length];
        let category = Category::of(bytes);
        if category != Category::MobileOriginated {
            if category == Category::Unknown {
                self.emit_error(&category.to_string());
            } else {
                self.emit_error(&format!("unexpected {}", category));
            }
            return;
        }
        let message = match mo::Message::parse(bytes) {
            Ok(message) => message,
            Err(err) => {
                self.emit_error(&format!("message parse error: {}", err));
                return;
            }
        };
        info!(
            "Received message from {} with {} byte payload",
            message.imei(),
            message.payload().len()
        );
        if let Some(receiver) = self.receiver.upgrade() {
            for callback in receiver.on_message.lock().unwrap().iter() {
                callback(&message);
            }
        }
        let residual = self.buffer.len() - length;
        if residual > 0 {
            // the gateway opens a fresh session for every delivery
            self.emit_error(&format!("unexpected {} bytes received", residual));
        }
    }

    fn emit_error(&self, error: &str) {
        error!("{}", error);
        if let Some(receiver) = self.receiver.upgrade() {
            for callback in receiver.on_error.lock().unwrap().iter() {
                callback(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use super::*;

    fn message_bytes() -> Vec<u8> {
        let message = mo::Message::from_path("data/0-mo.sbd").unwrap();
        let mut bytes = Vec::new();
        message.write_to(&mut bytes).unwrap();
        bytes
    }

    fn server_with_channels() -> (
        Server<&'static str>,
        SocketAddr,
        mpsc::Receiver<mo::Message>,
        mpsc::Receiver<String>,
    ) {
        let mut server = Server::new("127.0.0.1:0");
        let (message_tx, message_rx) = mpsc::channel();
        let message_tx = Mutex::new(message_tx);
        server.on_message(move |message| {
            message_tx.lock().unwrap().send(message.clone()).unwrap();
        });
        let (error_tx, error_rx) = mpsc::channel();
        let error_tx = Mutex::new(error_tx);
        server.on_error(move |error| {
            error_tx.lock().unwrap().send(error.to_string()).unwrap();
        });
        server.start().unwrap();
        let addr = server.local_addr().unwrap();
        (server, addr, message_rx, error_rx)
    }

    #[test]
    fn receives_a_message() {
        let (mut server, addr, message_rx, _error_rx) = server_with_channels();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&message_bytes()).unwrap();
        let message = message_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!("300125061511830", message.imei());
        assert_eq!(b"ABC".to_vec(), *message.payload());
        server.stop();
    }

    #[test]
    fn reassembles_a_fragmented_message() {
        let (mut server, addr, message_rx, _error_rx) = server_with_channels();
        let bytes = message_bytes();
        let mut stream = TcpStream::connect(addr).unwrap();
        for chunk in bytes.chunks(15) {
            stream.write_all(chunk).unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(50));
        }
        let message = message_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(b"ABC".to_vec(), *message.payload());
        server.stop();
    }

    #[test]
    fn rejects_bad_protocol_revision_number() {
        let (mut server, addr, message_rx, error_rx) = server_with_channels();
        let mut bytes = message_bytes();
        bytes[0] = 2;
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&bytes).unwrap();
        let error = error_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!("invalid protocol number 2", error);
        assert!(message_rx.try_recv().is_err());
        server.stop();
    }

    #[test]
    fn rejects_mobile_terminated_messages() {
        let (mut server, addr, _message_rx, error_rx) = server_with_channels();
        let message =
            crate::mt::Message::new(1, "300125061511830", b"Hi", Default::default(), 5).unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&message.serialize().unwrap()).unwrap();
        let error = error_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!("unexpected mobile terminated message", error);
        server.stop();
    }

    #[test]
    fn reports_residual_bytes() {
        let (mut server, addr, message_rx, error_rx) = server_with_channels();
        let mut bytes = message_bytes();
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&bytes).unwrap();
        message_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        let error = error_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!("unexpected 3 bytes received", error);
        server.stop();
    }

    #[test]
    fn keeps_accepting_after_a_bad_session() {
        let (mut server, addr, message_rx, error_rx) = server_with_channels();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&[2, 0, 0]).unwrap();
        error_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&message_bytes()).unwrap();
        message_rx.recv_timeout(Duration::from_secs(10)).unwrap();
        server.stop();
    }

    #[test]
    fn stop_is_quick() {
        let (mut server, _addr, _message_rx, _error_rx) = server_with_channels();
        let start = Instant::now();
        server.stop();
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
