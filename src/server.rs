//! The `caskyd` wire protocol: one line per command, `\n`-terminated with
//! `\r` tolerated, case-insensitive verbs. The handler is generic over the
//! byte streams so the socket plumbing stays in the binary and the protocol
//! can be exercised against in-memory buffers.

use std::io;
use std::io::prelude::*;

use log::debug;

use crate::casky::Casky;
use crate::errors::Error;
use crate::version;

/// Serves one connection until `QUIT` or end of stream. Every response is
/// flushed before the next command is read.
pub fn serve_connection<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    db: &Casky,
) -> io::Result<()> {
    writeln!(writer, "CASKY {} READY{}", version(), mode_suffix())?;
    writer.flush()?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }

        let command = line.trim_end_matches(|c| c == '\n' || c == '\r');
        debug!("command: {:?}", command);

        let keep_going = dispatch(command, db, &mut writer)?;
        writer.flush()?;
        if !keep_going {
            break;
        }
    }

    Ok(())
}

fn dispatch<W: Write>(line: &str, db: &Casky, writer: &mut W) -> io::Result<bool> {
    let line = line.trim();
    if line.is_empty() {
        writeln!(writer, "ERROR invalid command")?;
        return Ok(true);
    }

    let (verb, rest) = split_token(line);
    match verb.to_ascii_uppercase().as_str() {
        "PUT" => {
            let (key, value) = split_token(rest);
            if key.is_empty() || value.is_empty() {
                writeln!(writer, "ERROR usage: PUT <key> <value>")?;
            } else {
                match db.put(key, value, 0) {
                    Ok(()) => writeln!(writer, "OK")?,
                    Err(err) => writeln!(writer, "ERROR {}", err.code() as u32)?,
                }
            }
        }
        "GET" => {
            let (key, _) = split_token(rest);
            if key.is_empty() {
                writeln!(writer, "ERROR usage: GET <key>")?;
            } else {
                match db.get(key) {
                    Ok(Some(value)) => {
                        writeln!(writer, "VALUE {}", String::from_utf8_lossy(&value))?
                    }
                    Ok(None) => writeln!(writer, "NOT_FOUND")?,
                    Err(err) => writeln!(writer, "ERROR {}", err.code() as u32)?,
                }
            }
        }
        "DEL" => {
            let (key, _) = split_token(rest);
            if key.is_empty() {
                writeln!(writer, "ERROR usage: DEL <key>")?;
            } else {
                match db.delete(key) {
                    Ok(()) => writeln!(writer, "OK")?,
                    Err(Error::KeyNotFound) => writeln!(writer, "NOT_FOUND")?,
                    Err(err) => writeln!(writer, "ERROR {}", err.code() as u32)?,
                }
            }
        }
        "COMPACT" => {
            if Casky::is_thread_safe() {
                match db.compact() {
                    Ok(()) => writeln!(writer, "OK")?,
                    Err(err) => writeln!(writer, "ERROR {}", err.code() as u32)?,
                }
            } else {
                writeln!(writer, "ERROR not supported")?;
            }
        }
        "STATS" => {
            let stats = db.stats();
            writeln!(writer, "STATS")?;
            writeln!(writer, " total keys={}", stats.total_keys)?;
            writeln!(writer, " memory bytes={}", stats.memory_bytes)?;
            writeln!(writer, " puts={}", stats.num_puts)?;
            writeln!(writer, " gets={}", stats.num_gets)?;
            writeln!(writer, " deletes={}", stats.num_deletes)?;
        }
        "VER" => writeln!(writer, "{}{}", version(), mode_suffix())?,
        "QUIT" => {
            writeln!(writer, "BYE")?;
            return Ok(false);
        }
        _ => writeln!(writer, "ERROR unknown command")?,
    }

    Ok(true)
}

/// Splits off the first whitespace-delimited token; the remainder keeps its
/// internal spaces so `PUT <key> <value…>` values may contain them.
fn split_token(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim_start()),
        None => (s, ""),
    }
}

fn mode_suffix() -> &'static str {
    if Casky::is_thread_safe() {
        " (thread-safe)"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::serve_connection;
    use crate::casky::Casky;

    fn session(commands: &str) -> Vec<String> {
        let dir = TempDir::new().unwrap();
        let db = Casky::open(dir.path().join("server.db")).unwrap();

        let mut output = Vec::new();
        serve_connection(Cursor::new(commands.as_bytes()), &mut output, &db).unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    #[test]
    fn test_protocol_session() {
        let lines = session(
            "PUT foo bar\nGET foo\nGET unknown\nDEL foo\nDEL foo\nFOO bar\nPUT keyonly\nQUIT\n",
        );

        assert!(lines[0].starts_with("CASKY"));
        assert!(lines[0].contains("READY"));
        assert_eq!(
            &lines[1..],
            [
                "OK",
                "VALUE bar",
                "NOT_FOUND",
                "OK",
                "NOT_FOUND",
                "ERROR unknown command",
                "ERROR usage: PUT <key> <value>",
                "BYE",
            ]
        );
    }

    #[test]
    fn test_values_keep_their_spaces() {
        let lines = session("PUT greeting hello world again\nGET greeting\nQUIT\n");
        assert_eq!(lines[2], "VALUE hello world again");
    }

    #[test]
    fn test_carriage_returns_and_case() {
        let lines = session("put a b\r\nGeT a\r\nquit\r\n");
        assert_eq!(&lines[1..], ["OK", "VALUE b", "BYE"]);
    }

    #[test]
    fn test_stats_and_ver() {
        let lines = session("PUT a 1\nGET a\nSTATS\nVER\nQUIT\n");

        assert_eq!(lines[3], "STATS");
        assert_eq!(lines[4], " total keys=1");
        assert_eq!(lines[5], " memory bytes=2");
        assert_eq!(lines[6], " puts=1");
        assert_eq!(lines[7], " gets=1");
        assert_eq!(lines[8], " deletes=0");
        assert!(lines[9].starts_with(crate::version()));
    }

    #[test]
    fn test_usage_errors() {
        let lines = session("GET\nDEL\nPUT\nPUT onlykey\n  \nQUIT\n");
        assert_eq!(
            &lines[1..],
            [
                "ERROR usage: GET <key>",
                "ERROR usage: DEL <key>",
                "ERROR usage: PUT <key> <value>",
                "ERROR usage: PUT <key> <value>",
                "ERROR invalid command",
                "BYE",
            ]
        );
    }

    #[test]
    fn test_end_of_stream_without_quit() {
        // Disconnect without QUIT must not error out.
        let lines = session("PUT a 1\n");
        assert_eq!(lines.last().unwrap(), "OK");
    }
}
