//! Command line utility for the Iridium SBD `DirectIP` gateway.

mod logger;

use std::process;
use std::sync::{mpsc, Mutex};

use docopt::Docopt;
use log::{error, info};
use serde::Deserialize;

use sbd_directip::directip::{Server, Transmitter};
use sbd_directip::mo::Message;
use sbd_directip::modem::Modem;
use sbd_directip::mt;
use sbd_directip::storage::{FilesystemStorage, Storage};

const USAGE: &str = "
Iridium Short Burst Data (SBD) DirectIP gateway utility.

Usage:
    sbd-directip read <file> [--json]
    sbd-directip serve <addr> <directory> [--logfile=<logfile>]
    sbd-directip send <host> <port> <imei> <message>
    sbd-directip modem-status <device>
    sbd-directip (-h | --help)
    sbd-directip --version

Options:
    -h --help               Show this information
    --version               Show version
    --json                  Print the message as JSON
    --logfile=<logfile>     Logfile [default: /var/log/iridiumd.log]
";

#[derive(Debug, Deserialize)]
struct Args {
    cmd_read: bool,
    cmd_serve: bool,
    cmd_send: bool,
    cmd_modem_status: bool,
    arg_file: String,
    arg_addr: String,
    arg_directory: String,
    arg_host: String,
    arg_port: String,
    arg_imei: String,
    arg_message: String,
    arg_device: String,
    flag_json: bool,
    flag_logfile: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| {
            d.version(Some(env!("CARGO_PKG_VERSION").to_string()))
                .deserialize()
        })
        .unwrap_or_else(|e| e.exit());

    if args.cmd_read {
        read(&args);
    }
    if args.cmd_serve {
        serve(&args);
    }
    if args.cmd_send {
        send(&args);
    }
    if args.cmd_modem_status {
        modem_status(&args);
    }
}

fn read(args: &Args) {
    let message = Message::from_path(&args.arg_file).unwrap_or_else(|e| {
        println!("ERROR: {}", e);
        process::exit(1);
    });
    if args.flag_json {
        let json = serde_json::json!({
            "imei": message.imei(),
            "cdr_ref": message.cdr_ref(),
            "session_status": message.session_status(),
            "momsn": message.momsn(),
            "mtmsn": message.mtmsn(),
            "time_of_session": message.time_of_session().to_rfc3339(),
            "payload": message.payload(),
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        println!("{}", String::from_utf8_lossy(message.payload()));
    }
}

fn serve(args: &Args) {
    if let Err(err) = logger::init(args.flag_logfile.clone()) {
        println!("Error when creating logger: {:?}", err);
        process::exit(1);
    }
    let storage = FilesystemStorage::open(args.arg_directory.clone()).unwrap_or_else(|e| {
        println!("Error when opening filesystem storage: {}", e);
        process::exit(1);
    });
    let storage = Mutex::new(storage);
    let mut server = Server::new(&args.arg_addr[..]);
    server.on_message(move |message| {
        match storage.lock().unwrap().store(message) {
            Ok(()) => info!("Stored message from {}", message.imei()),
            Err(err) => error!("Problem storing message: {}", err),
        }
    });
    server.on_error(|error| error!("Session error: {}", error));
    match server.bind() {
        Ok(()) => server.serve_forever(),
        Err(err) => {
            println!("Error when trying to bind to socket: {:?}", err);
            process::exit(1);
        }
    }
}

fn send(args: &Args) {
    let port: u16 = args.arg_port.parse().unwrap_or_else(|_| {
        println!("Invalid port: {}", args.arg_port);
        process::exit(1);
    });
    let flags = mt::DispositionFlags {
        assign_mtmsn: true,
        ..Default::default()
    };
    let message = mt::Message::new(
        1,
        &args.arg_imei,
        args.arg_message.as_bytes(),
        flags,
        mt::LOWEST_PRIORITY,
    )
    .unwrap_or_else(|e| {
        println!("Error when building the message: {}", e);
        process::exit(1);
    });
    let mut transmitter = Transmitter::new(&args.arg_host, port);
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    transmitter.on_transmit_result(move |status| {
        let _ = tx.lock().unwrap().send(status);
    });
    transmitter.on_error(|error| eprintln!("Transmit error: {}", error));
    transmitter.start();
    transmitter.post(message);
    let status = rx.recv().expect("the transmitter went away");
    println!("Transmit status: {}", mt::describe_status(status));
    transmitter.stop();
    if status < 0 {
        process::exit(1);
    }
}

fn modem_status(args: &Args) {
    let modem = Modem::open(&args.arg_device).unwrap_or_else(|e| {
        println!("Error when opening modem: {}", e);
        process::exit(1);
    });
    let status = modem.status().unwrap_or_else(|e| {
        println!("ERROR: {}", e);
        process::exit(1);
    });
    println!(
        "MO buffer: {}",
        if status.mo_flag { "message waiting" } else { "empty" }
    );
    println!("MOMSN: {}", status.momsn);
    println!(
        "MT buffer: {}",
        if status.mt_flag { "message waiting" } else { "empty" }
    );
    println!("MTMSN: {}", status.mtmsn);
    println!(
        "Ring alert: {}",
        if status.ra_flag { "unanswered" } else { "none" }
    );
    println!("MT messages queued at the gateway: {}", status.mt_queued);
}
