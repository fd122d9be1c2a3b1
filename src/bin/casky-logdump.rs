//! `casky-logdump` prints every record in a Casky log file, stopping at
//! the first record that fails to decode.

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::process;

use casky::{read_record, Decoded, DEFAULT_MAX_FIELD_BYTES};

fn main() {
    let mut args = env::args().skip(1);
    let path = match (args.next(), args.next()) {
        (Some(path), None) => path,
        _ => {
            eprintln!("usage: casky-logdump <logfile>");
            process::exit(1);
        }
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open {}: {}", path, err);
            process::exit(1);
        }
    };
    let mut reader = BufReader::new(file);

    println!("log file: {}", path);

    let mut index = 0usize;
    loop {
        match read_record(&mut reader, DEFAULT_MAX_FIELD_BYTES, DEFAULT_MAX_FIELD_BYTES) {
            Ok(Decoded::Entry(record)) => {
                let kind = if record.is_tombstone() { "DEL" } else { "PUT" };
                println!(
                    "#{} {} ts={} expires={} key={:?} value={:?}",
                    index,
                    kind,
                    record.timestamp,
                    record.expires_at,
                    String::from_utf8_lossy(&record.key),
                    String::from_utf8_lossy(&record.value),
                );
            }
            Ok(Decoded::Eof) => break,
            Ok(Decoded::Truncated) => {
                println!("#{} truncated record: write frontier or partial write", index);
                break;
            }
            Ok(Decoded::BadCrc) => {
                println!("#{} bad record: checksum mismatch or invalid header", index);
                break;
            }
            Err(err) => {
                eprintln!("read error: {}", err);
                process::exit(1);
            }
        }
        index += 1;
    }
}
