//! Error types for `d64kit`.
//!
//! One variant per failure mode named in the specification; every public
//! operation returns `Result<_, Error>` rather than panicking on caller
//! input. Panics are reserved for conditions that would mean an in-memory
//! invariant the library itself established has been violated.

/// Errors produced by `d64kit` operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Track or sector coordinate outside the geometry table.
    #[error("track/sector out of range for this disk's geometry")]
    InvalidGeometry,
    /// Wrong image size on load, or BAM structure unrecognizable.
    #[error("image size or structure is not a valid D64/D71 image")]
    InvalidImage,
    /// No free sector was available to satisfy an allocation.
    #[error("disk full")]
    DiskFull,
    /// Filename not present in the directory.
    #[error("file not found")]
    NotFound,
    /// `add_file` for a name already present in the directory.
    #[error("file already exists")]
    AlreadyExists,
    /// A REL file would need more than 6 side sectors.
    #[error("relative file too large, exceeds 6 side sectors")]
    RelTooLarge,
    /// Record length outside `[1, 254]`, or missing/inconsistent side sectors.
    #[error("invalid relative file record length or side sector chain")]
    InvalidRel,
    /// Host file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Empty name/payload, or another caller-supplied argument was invalid.
    #[error("invalid argument: {0}")]
    Argument(String),
}
