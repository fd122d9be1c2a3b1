use std::fmt;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Failure modes of the public API.
///
/// Every variant maps onto a stable numeric code (see [`ErrorCode`]); the
/// daemon reports that code on the wire as `ERROR <errno>`.
#[derive(Debug)]
pub enum Error {
    /// The path is empty or its parent directory does not exist.
    InvalidPath,
    /// A handle was missing where one was required. Kept for code-space
    /// parity with the C ABI; safe Rust call paths never produce it.
    InvalidPointer,
    /// An underlying read, write, flush, sync or rename failed.
    Io(io::Error),
    /// Allocation failure. Kept for code-space parity; Rust aborts on OOM.
    Memory,
    /// Recovery halted on a bad record. The engine stays usable and a
    /// compaction is advisable.
    Corrupt,
    /// The key (or value) is missing or malformed for the operation.
    InvalidKey,
    /// The key is not live in the directory.
    KeyNotFound,
}

pub type Result<T> = result::Result<T, Error>;

/// Numeric error codes, matching the on-wire values spoken by `caskyd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidPath = 1,
    InvalidPointer = 2,
    Io = 3,
    Memory = 4,
    Corrupt = 5,
    InvalidKey = 6,
    KeyNotFound = 7,
}

impl ErrorCode {
    /// Inverse of `code as u32`. Values outside the table are never stored
    /// by the engine; they decode as `Ok`.
    pub fn from_u32(code: u32) -> ErrorCode {
        match code {
            1 => ErrorCode::InvalidPath,
            2 => ErrorCode::InvalidPointer,
            3 => ErrorCode::Io,
            4 => ErrorCode::Memory,
            5 => ErrorCode::Corrupt,
            6 => ErrorCode::InvalidKey,
            7 => ErrorCode::KeyNotFound,
            _ => ErrorCode::Ok,
        }
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match *self {
            Error::InvalidPath => ErrorCode::InvalidPath,
            Error::InvalidPointer => ErrorCode::InvalidPointer,
            Error::Io(_) => ErrorCode::Io,
            Error::Memory => ErrorCode::Memory,
            Error::Corrupt => ErrorCode::Corrupt,
            Error::InvalidKey => ErrorCode::InvalidKey,
            Error::KeyNotFound => ErrorCode::KeyNotFound,
        }
    }
}

/// Human-readable message for an error code, for logging or display.
pub fn strerror(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Ok => "OK",
        ErrorCode::InvalidPath => "Invalid path",
        ErrorCode::InvalidPointer => "Invalid pointer",
        ErrorCode::Io => "I/O error",
        ErrorCode::Memory => "Out of memory",
        ErrorCode::Corrupt => "Data corrupt",
        ErrorCode::InvalidKey => "Invalid key",
        ErrorCode::KeyNotFound => "Key not found",
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            ref other => f.write_str(strerror(other.code())),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}
