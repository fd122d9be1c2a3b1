//! `caskyd` serves a single Casky database over a line-oriented TCP
//! protocol on the loopback interface.
//!
//! Configuration comes from the environment:
//!
//! - `CASKYD_DB`        log file path (default `caskyd.db`)
//! - `CASKYD_PORT`      listen port on 127.0.0.1 (default 5050)
//! - `CASKYD_LOG_LEVEL` DEBUG | INFO | WARN | ERROR (default INFO)
//!
//! On SIGINT/SIGTERM the daemon stops accepting connections, waits up to
//! five seconds for active clients to finish, then closes the database.

use std::env;
use std::io;
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use env_logger::Env;
use log::{error, info, warn};

use casky::server::serve_connection;
use casky::Casky;

const DEFAULT_PORT: u16 = 5050;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const ACCEPT_POLL: Duration = Duration::from_millis(50);

fn main() {
    env_logger::Builder::from_env(Env::new().filter_or("CASKYD_LOG_LEVEL", "info")).init();

    let db_path = env::var("CASKYD_DB").unwrap_or_else(|_| "caskyd.db".to_string());
    let port = match env::var("CASKYD_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                error!("CASKYD_PORT is not a port number: {:?}", raw);
                process::exit(1);
            }
        },
        Err(_) => DEFAULT_PORT,
    };

    let db = match Casky::open(&db_path) {
        Ok(db) => db,
        Err(err) => {
            error!("failed to open database {:?}: {}", db_path, err);
            process::exit(1);
        }
    };
    if db.corrupted() {
        warn!("database {:?} has a corrupt log tail; compaction advised", db_path);
    }

    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind 127.0.0.1:{}: {}", port, err);
            process::exit(1);
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        error!("failed to configure listener: {}", err);
        process::exit(1);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            error!("failed to install signal handler: {}", err);
            process::exit(1);
        }
    }

    info!(
        "caskyd {} listening on 127.0.0.1:{} (db: {:?}{})",
        casky::version(),
        port,
        db_path,
        if Casky::is_thread_safe() {
            ", thread-safe"
        } else {
            ""
        }
    );

    let active = Arc::new(AtomicUsize::new(0));

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("client connected: {}", peer);
                serve(stream, &db, &active);
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => warn!("accept failed: {}", err),
        }
    }

    info!("shutting down");
    drop(listener);

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while active.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
        thread::sleep(ACCEPT_POLL);
    }
    let remaining = active.load(Ordering::SeqCst);
    if remaining > 0 {
        warn!("{} clients still active after the grace period", remaining);
    }

    if let Err(err) = db.close() {
        error!("failed to close database: {}", err);
    }
    info!("bye");
}

#[cfg(feature = "thread-safe")]
fn serve(stream: TcpStream, db: &Casky, active: &Arc<AtomicUsize>) {
    let db = db.clone();
    let active = Arc::clone(active);
    active.fetch_add(1, Ordering::SeqCst);
    thread::spawn(move || {
        if let Err(err) = handle(stream, &db) {
            warn!("client error: {}", err);
        }
        active.fetch_sub(1, Ordering::SeqCst);
    });
}

// Without internal locking the engine cannot leave this thread, so clients
// are served one at a time.
#[cfg(not(feature = "thread-safe"))]
fn serve(stream: TcpStream, db: &Casky, _active: &Arc<AtomicUsize>) {
    if let Err(err) = handle(stream, db) {
        warn!("client error: {}", err);
    }
}

fn handle(stream: TcpStream, db: &Casky) -> io::Result<()> {
    // Accepted sockets can inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    let reader = BufReader::new(stream.try_clone()?);
    serve_connection(reader, stream, db)
}
