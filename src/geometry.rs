//! Geometry & Buffer: byte-accurate (track, sector) -> offset mapping and
//! bounds-checked raw access into the disk image buffer.
//!
//! Tracks are 1-based, sectors are 0-based, matching the physical disk
//! convention the rest of the crate follows. Byte offsets are cross-checked
//! against the classic 1541 geometry table (verified independently against
//! a minimal real-world D64 reader in the retrieval pack).

use log::error;

use crate::error::Error;

/// Sector size is fixed for every Commodore 1541/1571-compatible disk.
pub const SECTOR_SIZE: usize = 256;

/// Interleave used by the BAM allocator's free-sector search.
pub const INTERLEAVE: u8 = 10;

/// Byte size of a classic 35-track image.
pub const D35_SIZE: usize = 174_848;
/// Byte size of a 40-track DolphinDOS image.
pub const D40_SIZE: usize = 196_608;

/// The two disk geometries this crate understands.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DiskKind {
    /// Classic 35-track, 683-sector 1541 geometry.
    D35,
    /// DolphinDOS 40-track, 768-sector extension.
    D40,
}

/// Sectors per track for tracks 1..=40 (1541/1571 zone layout). Index 0 is
/// track 1.
const SECTORS_PER_TRACK: [u8; 40] = [
    21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, // 1-17
    19, 19, 19, 19, 19, 19, 19, // 18-24
    18, 18, 18, 18, 18, 18, // 25-30
    17, 17, 17, 17, 17, 17, 17, 17, 17, 17, // 31-40
];

impl DiskKind {
    /// Number of tracks for this disk kind.
    pub fn track_count(&self) -> u8 {
        match self {
            DiskKind::D35 => 35,
            DiskKind::D40 => 40,
        }
    }

    /// Total image size in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            DiskKind::D35 => D35_SIZE,
            DiskKind::D40 => D40_SIZE,
        }
    }

    /// Determine disk type from an image's byte length. Size alone decides
    /// disk type, per the specification's load procedure.
    pub fn from_size(len: usize) -> Result<Self, Error> {
        match len {
            D35_SIZE => Ok(DiskKind::D35),
            D40_SIZE => Ok(DiskKind::D40),
            other => {
                error!("image size {other} matches neither 35-track nor 40-track geometry");
                Err(Error::InvalidImage)
            }
        }
    }

    /// Sectors on `track` (1-based). `InvalidGeometry` if out of range for
    /// this disk kind.
    pub fn sectors_per_track(&self, track: u8) -> Result<u8, Error> {
        if track < 1 || track > self.track_count() {
            error!("track {track} out of range for {self:?} ({} tracks)", self.track_count());
            return Err(Error::InvalidGeometry);
        }
        Ok(SECTORS_PER_TRACK[track as usize - 1])
    }

    /// Total sector count across the whole disk.
    pub fn total_sectors(&self) -> usize {
        (1..=self.track_count())
            .map(|t| self.sectors_per_track(t).unwrap() as usize)
            .sum()
    }

    /// Byte offset of the first byte of (track, sector), or
    /// `InvalidGeometry` if the coordinate is out of range.
    pub fn offset(&self, track: u8, sector: u8) -> Result<usize, Error> {
        let sectors = self.sectors_per_track(track)?;
        if sector >= sectors {
            error!("sector {sector} out of range for track {track} ({sectors} sectors)");
            return Err(Error::InvalidGeometry);
        }
        let mut byte_offset = 0usize;
        for t in 1..track {
            byte_offset += self.sectors_per_track(t).unwrap() as usize * SECTOR_SIZE;
        }
        byte_offset += sector as usize * SECTOR_SIZE;
        Ok(byte_offset)
    }
}

/// Read a single byte at (track, sector, byte_in_sector). Returns `None`
/// rather than an error when the coordinate is out of bounds, per the
/// specification's bounds-check contract for raw reads.
pub fn read_byte(buf: &[u8], kind: DiskKind, track: u8, sector: u8, byte: u8) -> Option<u8> {
    let offset = kind.offset(track, sector).ok()?;
    buf.get(offset + byte as usize).copied()
}

/// Write a single byte at (track, sector, byte_in_sector). Fails with
/// `InvalidGeometry` when the coordinate is out of bounds.
pub fn write_byte(
    buf: &mut [u8],
    kind: DiskKind,
    track: u8,
    sector: u8,
    byte: u8,
    value: u8,
) -> Result<(), Error> {
    let offset = kind.offset(track, sector)?;
    let idx = offset + byte as usize;
    if idx >= offset + SECTOR_SIZE {
        error!("byte {byte} out of range within a {SECTOR_SIZE}-byte sector");
        return Err(Error::InvalidGeometry);
    }
    buf[idx] = value;
    Ok(())
}

/// Read a whole 256-byte sector. Returns `None` rather than an error when
/// the coordinate is out of bounds.
pub fn read_sector(buf: &[u8], kind: DiskKind, track: u8, sector: u8) -> Option<[u8; SECTOR_SIZE]> {
    let offset = kind.offset(track, sector).ok()?;
    let mut out = [0u8; SECTOR_SIZE];
    out.copy_from_slice(&buf[offset..offset + SECTOR_SIZE]);
    Some(out)
}

/// Write a whole 256-byte sector. Fails with `InvalidGeometry` when the
/// coordinate is out of bounds.
pub fn write_sector(
    buf: &mut [u8],
    kind: DiskKind,
    track: u8,
    sector: u8,
    data: &[u8; SECTOR_SIZE],
) -> Result<(), Error> {
    let offset = kind.offset(track, sector)?;
    buf[offset..offset + SECTOR_SIZE].copy_from_slice(data);
    Ok(())
}
