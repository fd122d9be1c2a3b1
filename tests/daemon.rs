//! Protocol sessions over a real loopback socket. The engine lives inside
//! the server thread, which also covers the default build where handles
//! cannot cross threads.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use casky::server::serve_connection;
use casky::Casky;
use tempfile::TempDir;

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(port: u16) -> Client {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        Client {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    fn roundtrip(&mut self, command: &str) -> String {
        writeln!(self.writer, "{}", command).unwrap();
        self.read_line()
    }
}

/// Binds an ephemeral port and serves `connections` clients, one at a time,
/// against a fresh database.
fn start_server(connections: usize) -> (u16, thread::JoinHandle<()>) {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let db = Casky::open(dir.path().join("daemon.db")).unwrap();
        for _ in 0..connections {
            let (stream, _) = listener.accept().unwrap();
            let reader = BufReader::new(stream.try_clone().unwrap());
            serve_connection(reader, stream, &db).unwrap();
        }
        db.close().unwrap();
    });

    (port, handle)
}

#[test]
fn protocol_session() {
    let (port, server) = start_server(1);
    let mut client = Client::connect(port);

    let banner = client.read_line();
    assert!(banner.starts_with("CASKY"), "bad banner: {}", banner);
    assert!(banner.contains("READY"));

    assert_eq!(client.roundtrip("PUT foo bar"), "OK");
    assert_eq!(client.roundtrip("GET foo"), "VALUE bar");
    assert_eq!(client.roundtrip("GET unknown"), "NOT_FOUND");
    assert_eq!(client.roundtrip("DEL foo"), "OK");
    assert_eq!(client.roundtrip("DEL foo"), "NOT_FOUND");
    assert_eq!(client.roundtrip("FOO bar"), "ERROR unknown command");
    assert!(client.roundtrip("PUT keyonly").starts_with("ERROR usage"));
    assert_eq!(client.roundtrip("QUIT"), "BYE");

    server.join().unwrap();
}

#[test]
fn state_is_shared_between_connections() {
    let (port, server) = start_server(2);

    let mut first = Client::connect(port);
    first.read_line();
    assert_eq!(first.roundtrip("PUT shared value"), "OK");
    assert_eq!(first.roundtrip("QUIT"), "BYE");

    let mut second = Client::connect(port);
    second.read_line();
    assert_eq!(second.roundtrip("GET shared"), "VALUE value");
    assert_eq!(second.roundtrip("QUIT"), "BYE");

    server.join().unwrap();
}

#[test]
fn ver_and_stats_report() {
    let (port, server) = start_server(1);
    let mut client = Client::connect(port);
    client.read_line();

    assert_eq!(client.roundtrip("PUT a 1"), "OK");

    let ver = client.roundtrip("VER");
    assert!(ver.starts_with(casky::version()), "bad VER reply: {}", ver);
    if Casky::is_thread_safe() {
        assert!(ver.ends_with("(thread-safe)"));
    }

    assert_eq!(client.roundtrip("STATS"), "STATS");
    assert_eq!(client.read_line(), " total keys=1");
    assert_eq!(client.read_line(), " memory bytes=2");
    assert_eq!(client.read_line(), " puts=1");
    assert_eq!(client.read_line(), " gets=0");
    assert_eq!(client.read_line(), " deletes=0");

    assert_eq!(client.roundtrip("QUIT"), "BYE");
    server.join().unwrap();
}

#[cfg(feature = "thread-safe")]
mod stress {
    use super::*;

    /// N concurrent clients on disjoint keyspaces against one shared,
    /// thread-safe engine; the server spawns a thread per connection.
    #[test]
    fn concurrent_clients_disjoint_keyspaces() {
        const CLIENTS: usize = 8;
        const OPS: usize = 50;

        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let db = Casky::open(dir.path().join("stress.db")).unwrap();
        let server_db = db.clone();
        let server = thread::spawn(move || {
            let mut sessions = Vec::new();
            for _ in 0..CLIENTS {
                let (stream, _) = listener.accept().unwrap();
                let db = server_db.clone();
                sessions.push(thread::spawn(move || {
                    let reader = BufReader::new(stream.try_clone().unwrap());
                    serve_connection(reader, stream, &db).unwrap();
                }));
            }
            for session in sessions {
                session.join().unwrap();
            }
        });

        let clients: Vec<_> = (0..CLIENTS)
            .map(|c| {
                thread::spawn(move || {
                    let mut client = Client::connect(port);
                    client.read_line();
                    for i in 0..OPS {
                        let key = format!("c{}-k{}", c, i);
                        assert_eq!(client.roundtrip(&format!("PUT {} v{}", key, i)), "OK");
                        assert_eq!(
                            client.roundtrip(&format!("GET {}", key)),
                            format!("VALUE v{}", i)
                        );
                    }
                    for i in OPS / 2..OPS {
                        assert_eq!(client.roundtrip(&format!("DEL c{}-k{}", c, i)), "OK");
                    }
                    assert_eq!(client.roundtrip("QUIT"), "BYE");
                })
            })
            .collect();
        for client in clients {
            client.join().unwrap();
        }

        server.join().unwrap();
        assert_eq!(db.len(), CLIENTS * OPS / 2);
    }
}
