use thiserror::Error;

/// Result type alias for image reading
pub type Result<T> = std::result::Result<T, ReadError>;

/// Errors raised while resolving the physical layout of a container
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Buffer is shorter than the smallest layout the container allows
    #[error("Geometry: truncated buffer ({actual} bytes, expected {expected})")]
    TruncatedBuffer {
        /// Bytes required by the container
        expected: usize,
        /// Bytes actually supplied
        actual: usize,
    },

    /// Length or header matches none of the known variants
    #[error("Geometry: unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// Container name or extension is not recognised
    #[error("Geometry: unknown container kind '{0}'")]
    UnknownContainerKind(String),

    /// Track table does not add up to the declared capacity
    #[error("Geometry: inconsistent layout: {0}")]
    Inconsistent(String),
}

/// Errors raised when translating logical addresses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Track or sector outside the geometry
    #[error("Address: track {track} sector {sector} is out of range")]
    OutOfRange {
        /// Track number
        track: u8,
        /// Sector index within the track
        sector: u8,
    },

    /// Byte offset outside every sector
    #[error("Address: offset {0} does not fall inside a sector")]
    OffsetOutOfRange(usize),
}

/// Errors raised while walking a container's directory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Chain pointer loops, overruns the iteration cap or points nowhere
    #[error("Catalog: corrupt directory chain at track {track} sector {sector}: {reason}")]
    CorruptChain {
        /// Track of the offending directory sector
        track: u8,
        /// Sector of the offending directory sector
        sector: u8,
        /// What went wrong
        reason: String,
    },

    /// Fixed directory table extends past the end of the buffer
    #[error("Catalog: directory table overruns buffer ({needed} bytes needed, {available} available)")]
    TableOverrun {
        /// Bytes the table requires
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Directory sector cannot be read or failed verification
    #[error("Catalog: unreadable sector: {0}")]
    UnreadableSector(String),

    /// Container signature or header is not what the kind requires
    #[error("Catalog: invalid header: {0}")]
    InvalidHeader(String),
}

impl From<AddressError> for CatalogError {
    fn from(err: AddressError) -> Self {
        CatalogError::UnreadableSector(err.to_string())
    }
}

/// Errors raised while decoding a single file body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Type tag is not known for the platform
    #[error("Decode: unknown file type 0x{0:02X}")]
    UnknownType(u8),

    /// A header field holds an illegal value
    #[error("Decode: invalid field {name} = {value:#X}")]
    InvalidField {
        /// Field name
        name: &'static str,
        /// Offending raw value
        value: u32,
    },

    /// Payload shorter than its header declares
    #[error("Decode: truncated payload ({available} bytes, {needed} needed)")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// File data could not be gathered from the container
    #[error("Decode: unreadable file data: {0}")]
    Unreadable(String),

    /// Image has not been read successfully
    #[error("Decode: image is not ready")]
    NotReady,

    /// Decoding was cancelled before this entry started
    #[error("Decode: cancelled")]
    Cancelled,
}

impl DecodeError {
    /// Create an invalid field error
    pub fn invalid(name: &'static str, value: impl Into<u32>) -> Self {
        DecodeError::InvalidField {
            name,
            value: value.into(),
        }
    }

    /// Create an unreadable data error
    pub fn unreadable<S: Into<String>>(message: S) -> Self {
        DecodeError::Unreadable(message.into())
    }

    /// Fail with `Truncated` unless `data` holds at least `needed` bytes
    pub fn require(data: &[u8], needed: usize) -> std::result::Result<(), DecodeError> {
        if data.len() < needed {
            Err(DecodeError::Truncated {
                needed,
                available: data.len(),
            })
        } else {
            Ok(())
        }
    }
}

impl From<AddressError> for DecodeError {
    fn from(err: AddressError) -> Self {
        DecodeError::Unreadable(err.to_string())
    }
}

/// Aggregate error for `Image::read`, wrapping the first fatal failure
#[derive(Debug, Error)]
pub enum ReadError {
    /// I/O error while draining the source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Geometry stage failed
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Catalog stage failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Image was already read or has failed
    #[error("Image has already been read")]
    AlreadyLoaded,
}

impl CatalogError {
    /// Create a corrupt chain error
    pub fn chain<S: Into<String>>(track: u8, sector: u8, reason: S) -> Self {
        CatalogError::CorruptChain {
            track,
            sector,
            reason: reason.into(),
        }
    }

    /// Create an invalid header error
    pub fn header<S: Into<String>>(message: S) -> Self {
        CatalogError::InvalidHeader(message.into())
    }
}

impl GeometryError {
    /// Create an unsupported variant error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        GeometryError::UnsupportedVariant(message.into())
    }
}
