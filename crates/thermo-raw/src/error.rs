use thiserror::Error;

#[derive(Error, Debug)]
pub enum RawError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a valid Thermo RAW file (OLE2 magic mismatch)")]
    NotRawFile,

    #[error("Unsupported RAW file version: {0}")]
    UnsupportedVersion(u32),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Scan {0} out of range")]
    ScanOutOfRange(u32),

    #[error("Failed to decode scan data at offset {offset}: {reason}")]
    ScanDecodeError { offset: usize, reason: String },

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("OLE2/CFBF error: {0}")]
    CfbError(String),

    /// A read would cross past the declared end of the addressable region.
    /// `offset`/`length` describe the attempted read; `available` is what the
    /// backing region actually has left from `offset`.
    #[error("out of bounds read: {length} bytes at offset {offset}, {available} available")]
    OutOfBounds {
        offset: u64,
        length: usize,
        available: u64,
    },

    /// A fixed-size record (scan index entry, packet header, reaction) was cut
    /// short by the declared stream length.
    #[error("truncated record: expected {expected} bytes, found {found}")]
    TruncatedRecord { expected: usize, found: usize },

    /// `file_revision` fell outside every threshold table this crate knows about.
    #[error("unsupported file revision: {0}")]
    UnsupportedRevision(u32),

    /// FT profile calibration requires at least 4 coefficients; fewer than
    /// that makes frequency-to-mass conversion impossible.
    #[error("insufficient calibrators: need at least {needed}, found {found}")]
    InsufficientCalibrators { needed: usize, found: usize },

    /// Extended (debug) data framing was malformed. Non-fatal by policy: C12
    /// truncates the remaining sub-segments and the caller gets whatever was
    /// decoded before the bad frame, never this variant directly.
    #[error("invalid extended data framing at offset {offset}: {reason}")]
    InvalidExtendedData { offset: u64, reason: String },

    /// Scan filter string failed to parse.
    #[error("bad filter string: {0}")]
    BadFilter(String),

    /// A token category that may appear at most once in a filter string
    /// (e.g. a mass-range or activation phrase) appeared twice. Counted as
    /// a `BadFilter` case by the filter grammar, kept as its own variant so
    /// callers can distinguish "malformed" from "duplicated".
    #[error("duplicate token in filter string: {0}")]
    DuplicateToken(String),
}
