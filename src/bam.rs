//! BAM (Block Availability Map) manager.
//!
//! The bitmap lives inside the disk image buffer itself at (track 18,
//! sector 0); this module only ever mediates access to those bytes through
//! explicit offset arithmetic, per the "shared byte buffer as source of
//! truth" design note — there is no shadow copy of the bitmap kept
//! in-memory, matching the way `fs::dos3x` re-derives its track map
//! straight from the VTOC sector rather than keeping a detached replica.

use log::{debug, error, warn};

use crate::error::Error;
use crate::geometry::{self, DiskKind, INTERLEAVE};

/// (track, sector) of the BAM sector itself.
pub const BAM_TRACK: u8 = 18;
pub const BAM_SECTOR: u8 = 0;
/// (track, sector) of the first directory sector.
pub const DIR_START_TRACK: u8 = 18;
pub const DIR_START_SECTOR: u8 = 1;

/// Byte offset within the BAM sector of the dir-start track field.
const OFF_DIR_TRACK: usize = 0x00;
const OFF_DIR_SECTOR: usize = 0x01;
const OFF_DOS_VERSION: usize = 0x02;
const OFF_PER_TRACK: usize = 0x04;
const OFF_DISK_NAME: usize = 0x90;
const OFF_DISK_ID: usize = 0xA2;
const OFF_DOS_TYPE: usize = 0xA5;
const OFF_EXT_PER_TRACK: usize = 0xAC;
const DISK_NAME_LEN: usize = 16;

/// Per-track-entry offset within the BAM sector, or `None` if `track` has no
/// BAM entry on this disk kind (i.e. beyond the 40-track extension, or a
/// 36-40 track requested on a 35-track disk).
fn entry_offset(kind: DiskKind, track: u8) -> Option<usize> {
    match track {
        1..=35 => Some(OFF_PER_TRACK + (track as usize - 1) * 4),
        36..=40 if kind == DiskKind::D40 => Some(OFF_EXT_PER_TRACK + (track as usize - 36) * 4),
        _ => None,
    }
}

fn bam_sector_offset(kind: DiskKind) -> usize {
    kind.offset(BAM_TRACK, BAM_SECTOR).expect("BAM sector is always in range")
}

/// Per-track last-allocated-sector cursor, process-local and never
/// persisted to the image (spec.md §3, "Per-track last-sector cursor").
pub struct Cursors {
    /// Indexed by `track - 1`.
    last: Vec<i16>,
}

impl Cursors {
    /// Create a fresh cursor table for `kind`, initialized per spec.md §3.
    pub fn new(kind: DiskKind) -> Self {
        Self {
            last: vec![-1; kind.track_count() as usize],
        }
    }

    fn get(&self, track: u8) -> i16 {
        self.last[track as usize - 1]
    }

    fn set(&mut self, track: u8, sector: u8) {
        self.last[track as usize - 1] = sector as i16;
    }
}

/// Is (track, sector) free according to the BAM bitmap?
pub fn is_free(buf: &[u8], kind: DiskKind, track: u8, sector: u8) -> Result<bool, Error> {
    kind.offset(track, sector)?; // validates range
    let entry = entry_offset(kind, track).ok_or(Error::InvalidGeometry)?;
    let bam = bam_sector_offset(kind);
    let byte = entry + 1 + (sector as usize / 8);
    let bit = sector % 8;
    Ok((buf[bam + byte] >> bit) & 1 == 1)
}

/// Allocate (track, sector). Returns `false` (no error) if it was already
/// allocated, matching the specification's "fails (returns false)" wording.
pub fn allocate(buf: &mut [u8], kind: DiskKind, track: u8, sector: u8) -> Result<bool, Error> {
    if !is_free(buf, kind, track, sector)? {
        return Ok(false);
    }
    let entry = entry_offset(kind, track).ok_or(Error::InvalidGeometry)?;
    let bam = bam_sector_offset(kind);
    let byte = entry + 1 + (sector as usize / 8);
    let bit = sector % 8;
    buf[bam + byte] &= !(1 << bit);
    buf[bam + entry] -= 1;
    debug!("allocated track {track} sector {sector}, {} free remain on track", buf[bam + entry]);
    Ok(true)
}

/// Free (track, sector). Returns `false` if it was already free. Freeing
/// the BAM sector or first directory sector is refused as a non-fatal
/// no-op, logging a warning, per spec.md §4.2/§7.
pub fn free(buf: &mut [u8], kind: DiskKind, track: u8, sector: u8) -> Result<bool, Error> {
    if (track, sector) == (BAM_TRACK, BAM_SECTOR) || (track, sector) == (DIR_START_TRACK, DIR_START_SECTOR) {
        warn!("refusing to free BAM/first-directory sector ({track},{sector})");
        return Ok(false);
    }
    if is_free(buf, kind, track, sector)? {
        return Ok(false);
    }
    let entry = entry_offset(kind, track).ok_or(Error::InvalidGeometry)?;
    let bam = bam_sector_offset(kind);
    let byte = entry + 1 + (sector as usize / 8);
    let bit = sector % 8;
    buf[bam + byte] |= 1 << bit;
    buf[bam + entry] += 1;
    debug!("freed track {track} sector {sector}, {} free remain on track", buf[bam + entry]);
    Ok(true)
}

/// Sum of per-track free counts, excluding the directory track (matches the
/// classic 1541 "BLOCKS FREE" convention of never counting track 18).
pub fn free_count(buf: &[u8], kind: DiskKind) -> u16 {
    let bam = bam_sector_offset(kind);
    let mut total = 0u16;
    for track in 1..=kind.track_count() {
        if track == BAM_TRACK {
            continue;
        }
        if let Some(entry) = entry_offset(kind, track) {
            total += buf[bam + entry] as u16;
        }
    }
    total
}

/// Recompute the free count for a single track from its bitmap, restricted
/// to that track's valid sector range (bits beyond it are don't-care).
pub fn recompute_track_free_count(buf: &[u8], kind: DiskKind, track: u8) -> Result<u8, Error> {
    let sectors = kind.sectors_per_track(track)?;
    let mut count = 0u8;
    for sector in 0..sectors {
        if is_free(buf, kind, track, sector)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Read the recorded free-sector count byte for `track`, as stored in the
/// BAM (not recomputed from the bitmap — see [`recompute_track_free_count`]).
pub fn track_free_count(buf: &[u8], kind: DiskKind, track: u8) -> Result<u8, Error> {
    let entry = entry_offset(kind, track).ok_or(Error::InvalidGeometry)?;
    let bam = bam_sector_offset(kind);
    Ok(buf[bam + entry])
}

/// Overwrite the recorded free-sector count byte for `track`, used by the
/// integrity verifier's fix mode to repair a stale count.
pub fn set_track_free_count(buf: &mut [u8], kind: DiskKind, track: u8, count: u8) -> Result<(), Error> {
    let entry = entry_offset(kind, track).ok_or(Error::InvalidGeometry)?;
    let bam = bam_sector_offset(kind);
    buf[bam + entry] = count;
    Ok(())
}

/// Track-priority search order radiating from the directory track,
/// alternating above/below, per spec.md §4.2.
fn search_order(kind: DiskKind) -> Vec<u8> {
    let dir = BAM_TRACK as i16;
    let mut order = vec![dir as u8];
    let mut lo = dir - 1;
    let mut hi = dir + 1;
    loop {
        let mut added = false;
        if lo >= 1 {
            order.push(lo as u8);
            lo -= 1;
            added = true;
        }
        if hi <= 35 {
            order.push(hi as u8);
            hi += 1;
            added = true;
        }
        if !added {
            break;
        }
    }
    if kind == DiskKind::D40 {
        for t in 36..=40u8 {
            order.push(t);
        }
    }
    order
}

/// Allocate a free sector on `track` using the interleave cursor, starting
/// the scan at `(cursor + INTERLEAVE) mod sectors_per_track` and wrapping
/// once.
pub fn find_and_allocate_on_track(
    buf: &mut [u8],
    kind: DiskKind,
    cursors: &mut Cursors,
    track: u8,
) -> Result<(u8, u8), Error> {
    let n = kind.sectors_per_track(track)? as i16;
    let start = (cursors.get(track) + INTERLEAVE as i16).rem_euclid(n);
    for i in 0..n {
        let sector = ((start + i).rem_euclid(n)) as u8;
        if is_free(buf, kind, track, sector)? {
            allocate(buf, kind, track, sector)?;
            cursors.set(track, sector);
            return Ok((track, sector));
        }
    }
    error!("track {track} has no free sector ({n} checked)");
    Err(Error::DiskFull)
}

/// Allocate any free sector, following the track-priority search order,
/// then the interleave cursor within each candidate track.
pub fn find_and_allocate(
    buf: &mut [u8],
    kind: DiskKind,
    cursors: &mut Cursors,
) -> Result<(u8, u8), Error> {
    for track in search_order(kind) {
        match find_and_allocate_on_track(buf, kind, cursors, track) {
            Ok(ts) => return Ok(ts),
            Err(Error::DiskFull) => continue,
            Err(e) => return Err(e),
        }
    }
    error!("disk full: no free sector on any track");
    Err(Error::DiskFull)
}

/// Read the BAM's 2-byte disk id, as recorded at format time (spec.md §9:
/// the id is fixed to `0xA0 0xA0` unless the public API is extended to
/// accept a caller-supplied one).
pub fn disk_id(buf: &[u8], kind: DiskKind) -> [u8; 2] {
    let bam = bam_sector_offset(kind);
    [buf[bam + OFF_DISK_ID], buf[bam + OFF_DISK_ID + 1]]
}

/// Render the disk id as an upper-case hex string, matching the teacher's
/// `fs::prodos::directory` use of `hex::encode_upper` for metadata display.
pub fn disk_id_hex(buf: &[u8], kind: DiskKind) -> String {
    hex::encode_upper(disk_id(buf, kind))
}

/// Read the BAM's disk-name field (trimmed at the first 0xA0 pad byte).
pub fn disk_name(buf: &[u8], kind: DiskKind) -> String {
    let bam = bam_sector_offset(kind);
    let raw = &buf[bam + OFF_DISK_NAME..bam + OFF_DISK_NAME + DISK_NAME_LEN];
    let end = raw.iter().position(|&b| b == 0xA0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Write the BAM's disk-name field, 0xA0-padded to 16 bytes. Names longer
/// than 16 bytes are truncated.
pub fn set_disk_name(buf: &mut [u8], kind: DiskKind, name: &str) {
    let bam = bam_sector_offset(kind);
    let mut field = [0xA0u8; DISK_NAME_LEN];
    for (i, b) in name.as_bytes().iter().take(DISK_NAME_LEN).enumerate() {
        field[i] = *b;
    }
    buf[bam + OFF_DISK_NAME..bam + OFF_DISK_NAME + DISK_NAME_LEN].copy_from_slice(&field);
}

/// Initialize a fresh BAM sector: all sectors marked free, header fields
/// set, then (18,0) and (18,1) allocated. Called once by the image
/// lifecycle's `format` operation.
pub fn format(buf: &mut [u8], kind: DiskKind, name: &str, disk_id: [u8; 2]) {
    let bam = bam_sector_offset(kind);
    // zero the whole BAM sector first
    buf[bam..bam + geometry::SECTOR_SIZE].fill(0);
    buf[bam + OFF_DIR_TRACK] = DIR_START_TRACK;
    buf[bam + OFF_DIR_SECTOR] = DIR_START_SECTOR;
    buf[bam + OFF_DOS_VERSION] = b'A';
    buf[bam + OFF_DISK_ID] = disk_id[0];
    buf[bam + OFF_DISK_ID + 1] = disk_id[1];
    buf[bam + 0xA0] = 0xA0;
    buf[bam + 0xA1] = 0xA0;
    buf[bam + 0xA4] = 0xA0;
    buf[bam + OFF_DOS_TYPE] = b'2';
    buf[bam + OFF_DOS_TYPE + 1] = b'A';
    set_disk_name(buf, kind, name);
    for track in 1..=kind.track_count() {
        if let Some(entry) = entry_offset(kind, track) {
            let sectors = kind.sectors_per_track(track).unwrap();
            // mark every bit in the 24-bit field set, "don't care" bits
            // beyond the track's sector count stay set too, matching
            // authentic images (spec.md §3/§9).
            buf[bam + entry + 1] = 0xFF;
            buf[bam + entry + 2] = 0xFF;
            buf[bam + entry + 3] = 0xFF;
            buf[bam + entry] = sectors;
        }
    }
    allocate(buf, kind, BAM_TRACK, BAM_SECTOR).expect("fresh BAM sector always free");
    allocate(buf, kind, DIR_START_TRACK, DIR_START_SECTOR).expect("fresh directory sector always free");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(kind: DiskKind) -> Vec<u8> {
        let mut buf = vec![0x01u8; kind.byte_len()];
        format(&mut buf, kind, "NEW DISK", [0xA0, 0xA0]);
        buf
    }

    #[test]
    fn fresh_35_track_free_count() {
        let buf = fresh(DiskKind::D35);
        assert_eq!(free_count(&buf, DiskKind::D35), 664);
    }

    #[test]
    fn fresh_40_track_free_count() {
        let buf = fresh(DiskKind::D40);
        assert_eq!(free_count(&buf, DiskKind::D40), 749);
    }

    #[test]
    fn bam_and_first_dir_sector_allocated() {
        let buf = fresh(DiskKind::D35);
        assert!(!is_free(&buf, DiskKind::D35, 18, 0).unwrap());
        assert!(!is_free(&buf, DiskKind::D35, 18, 1).unwrap());
    }

    #[test]
    fn allocate_then_free_round_trips() {
        let mut buf = fresh(DiskKind::D35);
        assert!(allocate(&mut buf, DiskKind::D35, 1, 0).unwrap());
        assert!(!is_free(&buf, DiskKind::D35, 1, 0).unwrap());
        assert!(!allocate(&mut buf, DiskKind::D35, 1, 0).unwrap());
        assert!(free(&mut buf, DiskKind::D35, 1, 0).unwrap());
        assert!(is_free(&buf, DiskKind::D35, 1, 0).unwrap());
        assert!(!free(&mut buf, DiskKind::D35, 1, 0).unwrap());
    }

    #[test]
    fn freeing_bam_sector_is_refused() {
        let mut buf = fresh(DiskKind::D35);
        assert!(!free(&mut buf, DiskKind::D35, 18, 0).unwrap());
        assert!(!is_free(&buf, DiskKind::D35, 18, 0).unwrap());
    }

    #[test]
    fn exhausting_free_sectors_allocates_each_exactly_once() {
        let mut buf = fresh(DiskKind::D35);
        let mut cursors = Cursors::new(DiskKind::D35);
        let total_free = free_count(&buf, DiskKind::D35);
        let mut seen = std::collections::HashSet::new();
        let mut count = 0;
        loop {
            match find_and_allocate(&mut buf, DiskKind::D35, &mut cursors) {
                Ok(ts) => {
                    assert!(seen.insert(ts), "sector {:?} allocated twice", ts);
                    count += 1;
                }
                Err(Error::DiskFull) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(count, total_free as usize);
    }

    #[test]
    fn search_order_radiates_from_directory_track() {
        let order = search_order(DiskKind::D35);
        assert_eq!(&order[0..7], &[18, 17, 19, 16, 20, 15, 21]);
        assert_eq!(order[order.len() - 2], 1);
        assert_eq!(order[order.len() - 1], 35);
    }

    #[test]
    fn disk_name_round_trips() {
        let mut buf = fresh(DiskKind::D35);
        set_disk_name(&mut buf, DiskKind::D35, "MY DISK");
        assert_eq!(disk_name(&buf, DiskKind::D35), "MY DISK");
    }
}
