//! Side-Sector Codec: builds and parses the side-sector index that maps a
//! relative (REL) file's record space to its data-sector chains.

use log::{debug, error};

use crate::bam::{self, Cursors};
use crate::error::Error;
use crate::geometry::{self, DiskKind, SECTOR_SIZE};

/// At most 6 side sectors per REL file.
pub const MAX_SIDE_SECTORS: usize = 6;
/// At most 120 data-sector entries indexed per side sector.
pub const MAX_CHAIN_PER_SIDE: usize = 120;
/// At most 6 side-sector (track, sector) pairs in the shared group table.
const SHARED_TABLE_ENTRIES: usize = 6;
const OFF_BLOCK_NUM: usize = 2;
const OFF_RECORD_SIZE: usize = 3;
const OFF_SHARED_TABLE: usize = 4;
const OFF_CHAIN: usize = 16;

/// Build a side-sector group indexing `data_sectors`, allocating new side
/// sectors as needed. Returns the ordered list of side-sector
/// `(track, sector)` pairs. Fails with `RelTooLarge` if more than
/// [`MAX_SIDE_SECTORS`] would be required.
pub fn build(
    buf: &mut [u8],
    kind: DiskKind,
    cursors: &mut Cursors,
    data_sectors: &[(u8, u8)],
    record_size: u8,
) -> Result<Vec<(u8, u8)>, Error> {
    let mut blocks: Vec<&[(u8, u8)]> = data_sectors.chunks(MAX_CHAIN_PER_SIDE).collect();
    if blocks.is_empty() {
        blocks.push(&[]);
    }
    if blocks.len() > MAX_SIDE_SECTORS {
        error!(
            "REL file needs {} side sectors, exceeds the limit of {MAX_SIDE_SECTORS}",
            blocks.len()
        );
        return Err(Error::RelTooLarge);
    }

    let mut side_ts = Vec::with_capacity(blocks.len());
    for _ in 0..blocks.len() {
        side_ts.push(bam::find_and_allocate(buf, kind, cursors)?);
    }

    for (i, ts) in side_ts.iter().enumerate() {
        let mut sector = [0u8; SECTOR_SIZE];
        if i + 1 < side_ts.len() {
            sector[0] = side_ts[i + 1].0;
            sector[1] = side_ts[i + 1].1;
        } else {
            sector[0] = 0;
            sector[1] = (OFF_CHAIN + 2 * blocks[i].len()) as u8;
        }
        sector[OFF_BLOCK_NUM] = i as u8;
        sector[OFF_RECORD_SIZE] = record_size;
        for (j, (t, s)) in side_ts.iter().enumerate().take(SHARED_TABLE_ENTRIES) {
            sector[OFF_SHARED_TABLE + j * 2] = *t;
            sector[OFF_SHARED_TABLE + j * 2 + 1] = *s;
        }
        for (j, (t, s)) in blocks[i].iter().enumerate() {
            sector[OFF_CHAIN + j * 2] = *t;
            sector[OFF_CHAIN + j * 2 + 1] = *s;
        }
        geometry::write_sector(buf, kind, ts.0, ts.1, &sector)?;
    }
    debug!("built REL side-sector group of {} sector(s)", side_ts.len());
    Ok(side_ts)
}

/// Walk the side-sector chain starting at `first_side`, concatenating each
/// block's ordered data-sector entries. `record_size` must match every side
/// sector's recorded record size, else `InvalidRel`.
pub fn parse(
    buf: &[u8],
    kind: DiskKind,
    first_side: (u8, u8),
    record_size: u8,
) -> Result<Vec<(u8, u8)>, Error> {
    let mut out = Vec::new();
    let mut cur = Some(first_side);
    while let Some(ts) = cur {
        let sector = geometry::read_sector(buf, kind, ts.0, ts.1).ok_or(Error::InvalidRel)?;
        if sector[OFF_RECORD_SIZE] != record_size {
            return Err(Error::InvalidRel);
        }
        for j in 0..MAX_CHAIN_PER_SIDE {
            let t = sector[OFF_CHAIN + j * 2];
            let s = sector[OFF_CHAIN + j * 2 + 1];
            if t == 0 {
                break;
            }
            out.push((t, s));
        }
        cur = match sector[0] {
            0 => None,
            next_track => Some((next_track, sector[1])),
        };
    }
    Ok(out)
}

/// Collect the `(track, sector)` pairs of every side sector in the group,
/// without following into the data-sector chains.
pub(crate) fn side_sector_chain(buf: &[u8], kind: DiskKind, first_side: (u8, u8)) -> Result<Vec<(u8, u8)>, Error> {
    let mut out = Vec::new();
    let mut cur = Some(first_side);
    while let Some(ts) = cur {
        let sector = geometry::read_sector(buf, kind, ts.0, ts.1).ok_or(Error::InvalidRel)?;
        out.push(ts);
        cur = match sector[0] {
            0 => None,
            next_track => Some((next_track, sector[1])),
        };
    }
    Ok(out)
}

/// Free every side sector in the group (not the data sectors they index).
pub fn free_side_sectors(buf: &mut [u8], kind: DiskKind, first_side: (u8, u8)) -> Result<(), Error> {
    for ts in side_sector_chain(buf, kind, first_side)? {
        bam::free(buf, kind, ts.0, ts.1)?;
    }
    Ok(())
}
