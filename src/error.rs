/// Error types for the seismo-mmdb library
use std::fmt;
use std::io;

/// Result type alias for MMDB operations
pub type Result<T> = std::result::Result<T, MmdbError>;

/// Main error type for opening and querying MaxMind DB files
///
/// Variants fall into four families: I/O failures from opening or mapping
/// the file, structural problems with the file contents ("bad database"),
/// bounds violations, and caller precondition errors. Use
/// [`MmdbError::is_structural`] and [`MmdbError::is_precondition`] to
/// classify an error without matching every variant.
#[derive(Debug)]
pub enum MmdbError {
    /// Opening or mapping the file failed
    Io(io::Error),

    /// The metadata start marker is missing from the file tail
    MetadataNotFound {
        /// Name of the database (file path or `<memory>`)
        source: String,
    },

    /// A metadata field is missing or holds an illegal value
    InvalidMetadata(String),

    /// Corrupt search tree or data section
    InvalidFormat(String),

    /// A string in the data section is not valid UTF-8
    DecodeError(String),

    /// A read would extend past the mapped region plus the overread margin
    OutOfBounds {
        /// Offset of the read
        offset: usize,
        /// Width of the read in bytes
        width: usize,
        /// Logical size of the database
        size: usize,
    },

    /// The database has been closed
    Closed {
        /// Offset of the rejected read
        offset: usize,
    },

    /// The lookup address could not be normalized
    InvalidIpAddress(String),

    /// An IPv6 address was looked up in an IPv4-only database
    Ipv6InIpv4Database(String),
}

impl MmdbError {
    /// True for "bad database" errors: the file itself is malformed
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MmdbError::MetadataNotFound { .. }
                | MmdbError::InvalidMetadata(_)
                | MmdbError::InvalidFormat(_)
                | MmdbError::DecodeError(_)
                | MmdbError::OutOfBounds { .. }
        )
    }

    /// True for errors caused by the caller rather than the file
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MmdbError::Closed { .. }
                | MmdbError::InvalidIpAddress(_)
                | MmdbError::Ipv6InIpv4Database(_)
        )
    }

    /// True when the underlying open/map call failed
    pub fn is_io(&self) -> bool {
        matches!(self, MmdbError::Io(_))
    }
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::Io(e) => write!(f, "I/O error: {}", e),
            MmdbError::MetadataNotFound { source } => {
                write!(f, "Cannot find metadata start marker at {}", source)
            }
            MmdbError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
            MmdbError::InvalidFormat(msg) => write!(f, "Invalid MMDB format: {}", msg),
            MmdbError::DecodeError(msg) => write!(f, "Data decode error: {}", msg),
            MmdbError::OutOfBounds {
                offset,
                width,
                size,
            } => write!(
                f,
                "Read of {} bytes at offset {} extends beyond end of database (size={})",
                width, offset, size
            ),
            MmdbError::Closed { offset } => {
                write!(f, "Read at offset {} from a closed database", offset)
            }
            MmdbError::InvalidIpAddress(msg) => write!(f, "Invalid IP address: {}", msg),
            MmdbError::Ipv6InIpv4Database(addr) => write!(
                f,
                "Cannot search the IPv6 address {} in an IPv4 database",
                addr
            ),
        }
    }
}

impl std::error::Error for MmdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MmdbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MmdbError {
    fn from(err: io::Error) -> Self {
        MmdbError::Io(err)
    }
}
