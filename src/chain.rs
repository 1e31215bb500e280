//! Sector-Chain Codec: reads/writes files as linked sector chains, where
//! each sector's first two bytes are either a (next-track, next-sector)
//! link, or, on the terminal sector, `(0, used_bytes + 1)`.

use log::debug;

use crate::bam::{self, Cursors};
use crate::error::Error;
use crate::geometry::{self, DiskKind, SECTOR_SIZE};

const PAYLOAD_LEN: usize = SECTOR_SIZE - 2;

/// Lazily walks a file's sector chain, yielding `(track, sector)` pairs in
/// order. Terminates when a sector's link-header track byte is 0.
pub struct ChainSectors<'a> {
    buf: &'a [u8],
    kind: DiskKind,
    next: Option<(u8, u8)>,
}

impl<'a> ChainSectors<'a> {
    pub fn new(buf: &'a [u8], kind: DiskKind, start: (u8, u8)) -> Self {
        Self {
            buf,
            kind,
            next: Some(start),
        }
    }
}

impl<'a> Iterator for ChainSectors<'a> {
    type Item = (u8, u8);

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        let sector = geometry::read_sector(self.buf, self.kind, cur.0, cur.1)?;
        self.next = match sector[0] {
            0 => None,
            next_track => Some((next_track, sector[1])),
        };
        Some(cur)
    }
}

/// Number of sectors in the chain starting at `start`.
pub fn chain_len(buf: &[u8], kind: DiskKind, start: (u8, u8)) -> usize {
    ChainSectors::new(buf, kind, start).count()
}

/// Materialize a whole file's payload by walking its sector chain.
pub fn read_file(buf: &[u8], kind: DiskKind, start: (u8, u8)) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut cur = start;
    loop {
        let sector = geometry::read_sector(buf, kind, cur.0, cur.1).ok_or(Error::InvalidGeometry)?;
        let next_track = sector[0];
        let next_sector = sector[1];
        if next_track == 0 {
            let used = (next_sector as usize).saturating_sub(1).min(PAYLOAD_LEN);
            out.extend_from_slice(&sector[2..2 + used]);
            return Ok(out);
        }
        out.extend_from_slice(&sector[2..SECTOR_SIZE]);
        cur = (next_track, next_sector);
    }
}

/// Write `payload` as a sector chain starting at `first`, which the caller
/// has already allocated. Allocates additional sectors as needed via the
/// BAM manager and returns the ordered list of `(track, sector)` pairs used.
///
/// Non-transactional: if allocation fails partway through, sectors already
/// allocated for this chain remain allocated (spec.md §4.3/§7/§9).
pub fn write_file(
    buf: &mut [u8],
    kind: DiskKind,
    cursors: &mut Cursors,
    first: (u8, u8),
    payload: &[u8],
) -> Result<Vec<(u8, u8)>, Error> {
    let mut chain = vec![first];
    let mut cur = first;
    let mut offset = 0usize;
    loop {
        let remaining = payload.len() - offset;
        let take = remaining.min(PAYLOAD_LEN);
        let mut sector = [0u8; SECTOR_SIZE];
        sector[2..2 + take].copy_from_slice(&payload[offset..offset + take]);
        offset += take;
        if remaining <= PAYLOAD_LEN {
            sector[0] = 0;
            sector[1] = (take + 1) as u8;
            geometry::write_sector(buf, kind, cur.0, cur.1, &sector)?;
            debug!("terminal sector {:?}, {take} bytes used", cur);
            return Ok(chain);
        }
        let next = bam::find_and_allocate(buf, kind, cursors)?;
        sector[0] = next.0;
        sector[1] = next.1;
        geometry::write_sector(buf, kind, cur.0, cur.1, &sector)?;
        chain.push(next);
        cur = next;
    }
}

/// Free every sector in the chain starting at `start`.
pub fn free_chain(buf: &mut [u8], kind: DiskKind, start: (u8, u8)) -> Result<(), Error> {
    let sectors: Vec<(u8, u8)> = ChainSectors::new(buf, kind, start).collect();
    for (t, s) in sectors {
        bam::free(buf, kind, t, s)?;
    }
    Ok(())
}
