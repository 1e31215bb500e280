//! Public API façade: `DiskImage` ties the Geometry & Buffer, BAM Manager,
//! Sector-Chain Codec, Side-Sector Codec, Directory Manager, and Integrity
//! Verifier together behind a single stable surface, the way the teacher's
//! `fs::dos3x::Disk` owns its storage and exposes one method surface over it.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use log::{error, info};

use crate::bam::{self, Cursors};
use crate::chain;
use crate::directory::{self, DirectoryEntry, FileKind};
use crate::error::Error;
use crate::geometry::{self, DiskKind, SECTOR_SIZE};
use crate::verify::{self, VerifyReport};

/// Default disk name used by `format` when no name is given, and by `load`
/// when post-load validation fails and the image is reformatted.
pub const DEFAULT_DISK_NAME: &str = "NEW DISK";

/// The disk-image engine: owns the raw byte buffer and the process-local
/// per-track allocation cursor, and exposes every operation named in
/// spec.md §4.8. One `DiskImage` owns its buffer exclusively for its
/// lifetime (spec.md §5); nothing here is safe to share across threads
/// without external synchronization.
pub struct DiskImage {
    buf: Vec<u8>,
    kind: DiskKind,
    cursors: Cursors,
}

impl DiskImage {
    /// Format a fresh image of `kind`, with `name` (defaulting to
    /// `"NEW DISK"`) as the disk name. Fills the buffer with the 0x01
    /// format-fill byte, then initializes the BAM (spec.md §4.7).
    pub fn format(kind: DiskKind, name: Option<&str>) -> Self {
        let mut buf = vec![0x01u8; kind.byte_len()];
        bam::format(&mut buf, kind, name.unwrap_or(DEFAULT_DISK_NAME), [0xA0, 0xA0]);
        info!("formatted {:?} disk {:?}", kind, name.unwrap_or(DEFAULT_DISK_NAME));
        Self { buf, kind, cursors: Cursors::new(kind) }
    }

    /// Load an image from `path`. The file's byte length alone selects disk
    /// type (spec.md §4.7); any other size is `InvalidImage`. The loaded
    /// buffer is then structurally validated, and reformatted with the
    /// default name on failure. Never leaves a partially-loaded engine on
    /// an I/O error (spec.md §7).
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        let kind = DiskKind::from_size(data.len())?;
        let mut image = Self { buf: data, kind, cursors: Cursors::new(kind) };
        if !image.structurally_valid() {
            info!("image failed structural validation, reformatting as default disk");
            image = Self::format(kind, None);
        } else {
            info!("loaded {:?} image from {}", kind, path.display());
        }
        Ok(image)
    }

    /// BAM's dir-start must be (18,1); the first directory sector's link
    /// header must be either `(18, _)` or the terminal `(0, 0xFF)`.
    fn structurally_valid(&self) -> bool {
        let Some(bam_sector) = geometry::read_sector(&self.buf, self.kind, bam::BAM_TRACK, bam::BAM_SECTOR) else {
            return false;
        };
        if (bam_sector[0], bam_sector[1]) != (bam::DIR_START_TRACK, bam::DIR_START_SECTOR) {
            return false;
        }
        let Some(dir_sector) = geometry::read_sector(&self.buf, self.kind, bam::DIR_START_TRACK, bam::DIR_START_SECTOR) else {
            return false;
        };
        dir_sector[0] == bam::DIR_START_TRACK || (dir_sector[0], dir_sector[1]) == (0, 0xFF)
    }

    /// Write the buffer to `path`, replacing any existing content.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        fs::write(path, &self.buf)?;
        info!("saved {:?} image to {}", self.kind, path.display());
        Ok(())
    }

    /// This image's geometry.
    pub fn kind(&self) -> DiskKind {
        self.kind
    }

    /// The disk name from the BAM header, trimmed at the first 0xA0 pad byte.
    pub fn disk_name(&self) -> String {
        bam::disk_name(&self.buf, self.kind)
    }

    /// Overwrite the disk name, 0xA0-padded to 16 bytes.
    pub fn set_disk_name(&mut self, name: &str) {
        bam::set_disk_name(&mut self.buf, self.kind, name);
    }

    /// The disk id recorded in the BAM, as an upper-case hex string.
    pub fn disk_id_hex(&self) -> String {
        bam::disk_id_hex(&self.buf, self.kind)
    }

    /// Add a file. See [`crate::directory::add_file`].
    pub fn add_file(&mut self, name: &str, kind: FileKind, data: &[u8]) -> Result<(), Error> {
        directory::add_file(&mut self.buf, self.kind, &mut self.cursors, name, kind, data)
    }

    /// Read a file's decoded payload by name.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, Error> {
        let (_, entry) = directory::find(&self.buf, self.kind, name).ok_or_else(|| {
            error!("file '{name}' not found");
            Error::NotFound
        })?;
        chain::read_file(&self.buf, self.kind, entry.start)
    }

    /// Decode a file and write its bytes to a host path, per spec.md §6's
    /// extraction naming rule: `<disk name>` plus a type-derived suffix.
    /// Unknown types (there are none beyond the five named kinds) are
    /// refused with `Argument`.
    pub fn extract_file(&self, name: &str, host_dir: &Path) -> Result<(), Error> {
        let (_, entry) = directory::find(&self.buf, self.kind, name).ok_or_else(|| {
            error!("file '{name}' not found");
            Error::NotFound
        })?;
        let suffix = match entry.kind {
            FileKind::Prg => "prg",
            FileKind::Seq => "seq",
            FileKind::Usr => "usr",
            FileKind::Rel { .. } => "rel",
            FileKind::Del => return Err(Error::Argument("cannot extract a deleted-type entry".into())),
        };
        let data = chain::read_file(&self.buf, self.kind, entry.start)?;
        let file_name = format!("{}.{}", self.disk_name(), suffix);
        fs::write(host_dir.join(file_name), data)?;
        Ok(())
    }

    /// Remove a file, freeing its data chain. REL side sectors are *not*
    /// freed (the documented open question in spec.md §9); see
    /// [`Self::remove_file_full`] for the corrected behavior.
    pub fn remove_file(&mut self, name: &str) -> Result<(), Error> {
        directory::remove_file(&mut self.buf, self.kind, name)
    }

    /// Remove a file, also freeing REL side sectors.
    pub fn remove_file_full(&mut self, name: &str) -> Result<(), Error> {
        directory::remove_file_full(&mut self.buf, self.kind, name)
    }

    /// Rename a file in place.
    pub fn rename_file(&mut self, old: &str, new: &str) -> Result<(), Error> {
        directory::rename_file(&mut self.buf, self.kind, old, new)
    }

    /// Directory listing, in traversal order.
    pub fn list(&self) -> Vec<DirectoryEntry> {
        directory::list(&self.buf, self.kind)
    }

    /// Lock a file (set the write-protect bit in its directory entry).
    pub fn lock_file(&mut self, name: &str) -> Result<(), Error> {
        directory::set_locked(&mut self.buf, self.kind, name, true)
    }

    /// Unlock a file.
    pub fn unlock_file(&mut self, name: &str) -> Result<(), Error> {
        directory::set_locked(&mut self.buf, self.kind, name, false)
    }

    /// Move a file to the first directory slot.
    pub fn move_to_front(&mut self, name: &str) -> Result<(), Error> {
        directory::move_to_front(&mut self.buf, self.kind, name)
    }

    /// Reorder: named files first in the given order, then the rest
    /// unchanged. Returns `Ok(false)` ("no change") if the result matches
    /// the current order.
    pub fn reorder_by_names(&mut self, names: &[&str]) -> Result<bool, Error> {
        directory::reorder_by_names(&mut self.buf, self.kind, names)
    }

    /// Reorder with a stable comparator.
    pub fn reorder_by<F>(&mut self, cmp: F) -> Result<bool, Error>
    where
        F: FnMut(&DirectoryEntry, &DirectoryEntry) -> Ordering,
    {
        directory::reorder_by(&mut self.buf, self.kind, cmp)
    }

    /// Reorder to an explicit entry list.
    pub fn reorder_to(&mut self, order: &[DirectoryEntry]) -> Result<bool, Error> {
        directory::reorder_to(&mut self.buf, self.kind, order)
    }

    /// Compact the directory: pack live entries into the minimal chain,
    /// freeing sectors that become empty (except the first). Returns
    /// `Ok(false)` ("no change") if the chain was already minimal, matching
    /// the `reorder_*` family's contract.
    pub fn compact_directory(&mut self) -> Result<bool, Error> {
        directory::compact(&mut self.buf, self.kind)
    }

    /// Cross-check the BAM against reachability from the directory. When
    /// `fix` is set, mismatches are corrected in place.
    pub fn verify_bam(&mut self, fix: bool) -> Result<VerifyReport, Error> {
        verify::verify_bam(&mut self.buf, self.kind, fix)
    }

    /// Sum of per-track free counts, excluding the directory track.
    pub fn free_sector_count(&self) -> u16 {
        bam::free_count(&self.buf, self.kind)
    }

    /// Raw sector read, bounds-checked.
    pub fn read_sector(&self, track: u8, sector: u8) -> Result<[u8; SECTOR_SIZE], Error> {
        geometry::read_sector(&self.buf, self.kind, track, sector).ok_or(Error::InvalidGeometry)
    }

    /// Raw sector write, bounds-checked.
    pub fn write_sector(&mut self, track: u8, sector: u8, data: &[u8; SECTOR_SIZE]) -> Result<(), Error> {
        geometry::write_sector(&mut self.buf, self.kind, track, sector, data)
    }

    /// Allocate and return any free sector, following the track-priority
    /// search order and interleave policy.
    pub fn find_and_allocate_free_sector(&mut self) -> Result<(u8, u8), Error> {
        bam::find_and_allocate(&mut self.buf, self.kind, &mut self.cursors)
    }

    /// Raw access to the underlying bytes, e.g. for a host application that
    /// wants to embed the image elsewhere. Out of scope operations (host
    /// extraction formats beyond `extract_file`, CLI plumbing) are expected
    /// to be built on top of this, per spec.md §1.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
