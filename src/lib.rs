//! # `d64kit`
//!
//! A library for reading, writing, and manipulating Commodore
//! 1541/1571-compatible disk images ("D64 images") as in-memory byte
//! arrays with an exact on-disk byte layout.
//!
//! ## Architecture
//!
//! The crate is a single-owner, synchronous engine over one contiguous byte
//! buffer. Components, leaves first:
//!
//! * [`geometry`] maps `(track, sector)` to byte offsets and validates disk
//!   geometry (classic 35-track and DolphinDOS 40-track).
//! * [`bam`] maintains the Block Availability Map's per-track free bitmap,
//!   allocating and freeing sectors by the interleaved track-priority
//!   search policy.
//! * [`chain`] reads and writes files as linked sector chains.
//! * [`rel`] builds and parses the side-sector index used by relative (REL)
//!   files.
//! * [`directory`] walks and mutates the directory as a chain of
//!   fixed-layout slotted sectors: add/remove/rename/lock/compact/reorder.
//! * [`verify`] cross-checks the BAM against what the directory actually
//!   reaches, and can repair mismatches.
//! * [`image`] is the public façade, [`image::DiskImage`], binding every
//!   operation above to one stable surface: format, load, save, and every
//!   file/directory/BAM operation.
//!
//! All state lives in the byte buffer owned by a `DiskImage`; the only
//! process-local state kept outside it is the per-track allocation cursor
//! (spec's "per-track last-sector cursor"), which is never persisted to the
//! image itself.
//!
//! ## Disk Kinds
//!
//! * Classic 1541: 35 tracks, 683 sectors, 174,848 bytes.
//! * DolphinDOS extension: 40 tracks, 768 sectors, 196,608 bytes.
//!
//! ## Non-goals
//!
//! This crate does not emulate DOS error channels, preserve GEOS block
//! layouts, handle 1571/1581 side-b or partition semantics, track
//! read-only media, or support concurrent access to one image from
//! multiple writers. There is no CLI here; `DiskImage` is a library surface
//! only.

pub mod bam;
pub mod chain;
pub mod directory;
pub mod error;
pub mod geometry;
pub mod image;
pub mod rel;
pub mod verify;

pub use directory::{DirectoryEntry, FileKind};
pub use error::Error;
pub use geometry::DiskKind;
pub use image::DiskImage;
pub use verify::VerifyReport;
