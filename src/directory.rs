//! Directory Manager: walks and mutates the directory as a chain of
//! fixed-layout slotted sectors.

use log::{debug, error};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::bam::{self, Cursors};
use crate::chain;
use crate::error::Error;
use crate::geometry::{self, DiskKind};
use crate::rel;

/// Maximum directory sectors to traverse before assuming a cyclical/corrupt
/// chain (mirrors the teacher's `MAX_DIRECTORY_REPS` guard).
const MAX_DIR_SECTORS: usize = 100;

const SLOT_BASE: usize = 2;
const SLOT_LEN: usize = 30;
const SLOTS_PER_SECTOR: usize = 8;

const OFF_FILE_TYPE: usize = 0;
const OFF_START_TRACK: usize = 1;
const OFF_START_SECTOR: usize = 2;
const OFF_NAME: usize = 3;
const NAME_LEN: usize = 16;
const OFF_SIDE_TRACK: usize = 19;
const OFF_SIDE_SECTOR: usize = 20;
const OFF_RECORD_LEN: usize = 21;
const OFF_REPLACE_TRACK: usize = 26;
const OFF_REPLACE_SECTOR: usize = 27;
const OFF_SIZE: usize = 28;

const BIT_CLOSED: u8 = 0x80;
const BIT_LOCKED: u8 = 0x40;
const BIT_REPLACE: u8 = 0x20;
const TYPE_MASK: u8 = 0x0F;

/// The raw type-code nibble, decoded via `FromPrimitive` in the teacher's
/// `fs::dos3x::types::FileType` style.
#[derive(FromPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
enum TypeCode {
    Del = 0,
    Seq = 1,
    Prg = 2,
    Usr = 3,
    Rel = 4,
}

/// (directory-sector track, directory-sector sector, slot index 0..8): a
/// portable handle into a directory slot, per spec.md §9's recommendation
/// of addressing slots by coordinate rather than by raw pointer.
pub type DirHandle = (u8, u8, u8);

/// The five Commodore file types, carrying only the fields that are
/// semantically meaningful for that type (spec.md §9, "tagged union for
/// file flavors").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileKind {
    Del,
    Seq,
    Prg,
    Usr,
    /// `side_start` is populated by `add_file`; pass `(0, 0)` when
    /// constructing a request via [`FileKind::rel`].
    Rel { side_start: (u8, u8), record_length: u8 },
}

impl FileKind {
    /// Construct a REL request for `add_file`; `side_start` is filled in by
    /// the directory manager once the side-sector group is built.
    pub fn rel(record_length: u8) -> Self {
        FileKind::Rel { side_start: (0, 0), record_length }
    }

    fn type_code(&self) -> u8 {
        match self {
            FileKind::Del => 0,
            FileKind::Seq => 1,
            FileKind::Prg => 2,
            FileKind::Usr => 3,
            FileKind::Rel { .. } => 4,
        }
    }
}

/// A materialized directory entry.
#[derive(Clone, PartialEq, Debug)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: FileKind,
    pub start: (u8, u8),
    pub locked: bool,
    /// File size in allocated data sectors (not bytes); excludes side
    /// sectors for REL files.
    pub size_sectors: u16,
}

fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0xA0u8; NAME_LEN];
    for (i, b) in name.as_bytes().iter().take(NAME_LEN).enumerate() {
        field[i] = *b;
    }
    field
}

fn decode_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0xA0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn decode_slot(bytes: &[u8]) -> Option<DirectoryEntry> {
    let file_type = bytes[OFF_FILE_TYPE];
    if file_type & BIT_CLOSED == 0 {
        return None;
    }
    let locked = file_type & BIT_LOCKED != 0;
    let start = (bytes[OFF_START_TRACK], bytes[OFF_START_SECTOR]);
    let name = decode_name(&bytes[OFF_NAME..OFF_NAME + NAME_LEN]);
    let side = (bytes[OFF_SIDE_TRACK], bytes[OFF_SIDE_SECTOR]);
    let record_length = bytes[OFF_RECORD_LEN];
    let size_sectors = u16::from_le_bytes([bytes[OFF_SIZE], bytes[OFF_SIZE + 1]]);
    let kind = match TypeCode::from_u8(file_type & TYPE_MASK) {
        Some(TypeCode::Del) | None => FileKind::Del,
        Some(TypeCode::Seq) => FileKind::Seq,
        Some(TypeCode::Prg) => FileKind::Prg,
        Some(TypeCode::Usr) => FileKind::Usr,
        Some(TypeCode::Rel) => FileKind::Rel { side_start: side, record_length },
    };
    Some(DirectoryEntry { name, kind, start, locked, size_sectors })
}

fn encode_slot(entry: &DirectoryEntry) -> [u8; SLOT_LEN] {
    let mut bytes = [0u8; SLOT_LEN];
    let mut file_type = BIT_CLOSED | entry.kind.type_code();
    if entry.locked {
        file_type |= BIT_LOCKED;
    }
    bytes[OFF_FILE_TYPE] = file_type;
    bytes[OFF_START_TRACK] = entry.start.0;
    bytes[OFF_START_SECTOR] = entry.start.1;
    bytes[OFF_NAME..OFF_NAME + NAME_LEN].copy_from_slice(&encode_name(&entry.name));
    if let FileKind::Rel { side_start, record_length } = entry.kind {
        bytes[OFF_SIDE_TRACK] = side_start.0;
        bytes[OFF_SIDE_SECTOR] = side_start.1;
        bytes[OFF_RECORD_LEN] = record_length;
    }
    // replace = start, per spec.md §4.5's add-file procedure
    bytes[OFF_REPLACE_TRACK] = entry.start.0;
    bytes[OFF_REPLACE_SECTOR] = entry.start.1;
    bytes[OFF_SIZE..OFF_SIZE + 2].copy_from_slice(&entry.size_sectors.to_le_bytes());
    bytes
}

fn read_slot_bytes(buf: &[u8], kind: DiskKind, handle: DirHandle) -> [u8; SLOT_LEN] {
    let sector = geometry::read_sector(buf, kind, handle.0, handle.1).expect("directory sector in range");
    let base = SLOT_BASE + handle.2 as usize * SLOT_LEN;
    let mut out = [0u8; SLOT_LEN];
    out.copy_from_slice(&sector[base..base + SLOT_LEN]);
    out
}

fn write_slot_bytes(buf: &mut [u8], kind: DiskKind, handle: DirHandle, bytes: &[u8; SLOT_LEN]) {
    let mut sector = geometry::read_sector(buf, kind, handle.0, handle.1).expect("directory sector in range");
    let base = SLOT_BASE + handle.2 as usize * SLOT_LEN;
    sector[base..base + SLOT_LEN].copy_from_slice(bytes);
    geometry::write_sector(buf, kind, handle.0, handle.1, &sector).expect("directory sector in range");
}

/// All directory sectors in chain order.
pub(crate) fn dir_sectors(buf: &[u8], kind: DiskKind) -> Vec<(u8, u8)> {
    let mut out = Vec::new();
    let mut cur = Some((bam::DIR_START_TRACK, bam::DIR_START_SECTOR));
    for _ in 0..MAX_DIR_SECTORS {
        let Some((t, s)) = cur else { break };
        let Some(sector) = geometry::read_sector(buf, kind, t, s) else { break };
        out.push((t, s));
        cur = match sector[0] {
            0 => None,
            nt => Some((nt, sector[1])),
        };
    }
    out
}

/// Every slot handle across the whole directory chain, live or empty.
fn all_handles(buf: &[u8], kind: DiskKind) -> Vec<DirHandle> {
    dir_sectors(buf, kind)
        .into_iter()
        .flat_map(|(t, s)| (0..SLOTS_PER_SECTOR as u8).map(move |slot| (t, s, slot)))
        .collect()
}

/// Directory listing in traversal order.
pub fn list(buf: &[u8], kind: DiskKind) -> Vec<DirectoryEntry> {
    all_handles(buf, kind)
        .into_iter()
        .filter_map(|h| decode_slot(&read_slot_bytes(buf, kind, h)))
        .collect()
}

/// Resolve a handle and its decoded entry by trimmed filename comparison.
pub fn find(buf: &[u8], kind: DiskKind, name: &str) -> Option<(DirHandle, DirectoryEntry)> {
    for h in all_handles(buf, kind) {
        if let Some(entry) = decode_slot(&read_slot_bytes(buf, kind, h)) {
            if entry.name == name {
                return Some((h, entry));
            }
        }
    }
    None
}

/// Find an empty slot, allocating and linking a new directory sector if the
/// chain is full.
fn find_or_create_empty_slot(buf: &mut [u8], kind: DiskKind, cursors: &mut Cursors) -> Result<DirHandle, Error> {
    for h in all_handles(buf, kind) {
        let bytes = read_slot_bytes(buf, kind, h);
        if bytes[OFF_FILE_TYPE] & BIT_CLOSED == 0 {
            return Ok(h);
        }
    }
    let last = *dir_sectors(buf, kind).last().expect("directory always has at least one sector");
    let new_ts = bam::find_and_allocate(buf, kind, cursors)?;
    let mut new_sector = [0u8; geometry::SECTOR_SIZE];
    new_sector[0] = 0;
    new_sector[1] = 0xFF;
    geometry::write_sector(buf, kind, new_ts.0, new_ts.1, &new_sector)?;
    let mut prev_sector = geometry::read_sector(buf, kind, last.0, last.1).expect("directory sector in range");
    prev_sector[0] = new_ts.0;
    prev_sector[1] = new_ts.1;
    geometry::write_sector(buf, kind, last.0, last.1, &prev_sector)?;
    debug!("extended directory chain with new sector {:?}", new_ts);
    Ok((new_ts.0, new_ts.1, 0))
}

/// Add a file. `kind` for REL carries the desired `record_length`; its
/// `side_start` is ignored on input and populated from the built side
/// sectors.
pub fn add_file(
    buf: &mut [u8],
    disk_kind: DiskKind,
    cursors: &mut Cursors,
    name: &str,
    kind: FileKind,
    data: &[u8],
) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::Argument("file name must not be empty".into()));
    }
    if data.is_empty() {
        return Err(Error::Argument("file payload must not be empty".into()));
    }
    if let FileKind::Rel { record_length, .. } = kind {
        if record_length == 0 || record_length > 254 {
            return Err(Error::InvalidRel);
        }
    }
    if find(buf, disk_kind, name).is_some() {
        error!("file '{name}' already exists");
        return Err(Error::AlreadyExists);
    }

    let first = bam::find_and_allocate(buf, disk_kind, cursors)?;
    let data_chain = chain::write_file(buf, disk_kind, cursors, first, data)?;

    let final_kind = if let FileKind::Rel { record_length, .. } = kind {
        let side_chain = rel::build(buf, disk_kind, cursors, &data_chain, record_length)?;
        FileKind::Rel { side_start: side_chain[0], record_length }
    } else {
        kind
    };

    let handle = find_or_create_empty_slot(buf, disk_kind, cursors)?;
    let entry = DirectoryEntry {
        name: name.to_string(),
        kind: final_kind,
        start: first,
        locked: false,
        size_sectors: data_chain.len() as u16,
    };
    write_slot_bytes(buf, disk_kind, handle, &encode_slot(&entry));
    debug!("added file '{name}' ({} sectors)", data_chain.len());
    Ok(())
}

/// Remove a file, freeing its data-sector chain. Per the documented source
/// behavior (spec.md §9, an open question, not silently "fixed"), REL side
/// sectors are **not** freed by this function; use
/// [`remove_file_full`] for the corrected behavior.
pub fn remove_file(buf: &mut [u8], disk_kind: DiskKind, name: &str) -> Result<(), Error> {
    let (handle, entry) = find(buf, disk_kind, name).ok_or_else(|| {
        error!("file '{name}' not found");
        Error::NotFound
    })?;
    chain::free_chain(buf, disk_kind, entry.start)?;
    write_slot_bytes(buf, disk_kind, handle, &[0u8; SLOT_LEN]);
    Ok(())
}

/// Remove a file, additionally freeing REL side sectors (the corrected
/// behavior noted in spec.md §9).
pub fn remove_file_full(buf: &mut [u8], disk_kind: DiskKind, name: &str) -> Result<(), Error> {
    let (handle, entry) = find(buf, disk_kind, name).ok_or_else(|| {
        error!("file '{name}' not found");
        Error::NotFound
    })?;
    if let FileKind::Rel { side_start, .. } = entry.kind {
        rel::free_side_sectors(buf, disk_kind, side_start)?;
    }
    chain::free_chain(buf, disk_kind, entry.start)?;
    write_slot_bytes(buf, disk_kind, handle, &[0u8; SLOT_LEN]);
    Ok(())
}

/// Rename a file in place.
pub fn rename_file(buf: &mut [u8], disk_kind: DiskKind, old: &str, new: &str) -> Result<(), Error> {
    if new.is_empty() {
        return Err(Error::Argument("new file name must not be empty".into()));
    }
    let (handle, mut entry) = find(buf, disk_kind, old).ok_or_else(|| {
        error!("file '{old}' not found");
        Error::NotFound
    })?;
    entry.name = new.to_string();
    write_slot_bytes(buf, disk_kind, handle, &encode_slot(&entry));
    Ok(())
}

/// Toggle the locked bit.
pub fn set_locked(buf: &mut [u8], disk_kind: DiskKind, name: &str, locked: bool) -> Result<(), Error> {
    let (handle, _) = find(buf, disk_kind, name).ok_or_else(|| {
        error!("file '{name}' not found");
        Error::NotFound
    })?;
    let mut bytes = read_slot_bytes(buf, disk_kind, handle);
    if locked {
        bytes[OFF_FILE_TYPE] |= BIT_LOCKED;
    } else {
        bytes[OFF_FILE_TYPE] &= !BIT_LOCKED;
    }
    write_slot_bytes(buf, disk_kind, handle, &bytes);
    Ok(())
}

/// Rewrite the directory chain to hold exactly `entries`, packing 8 per
/// sector starting at (18,1). When `allow_shrink` is set, sectors beyond
/// what `entries` needs are freed (except the first directory sector);
/// otherwise the existing chain length is preserved (spec.md §4.5,
/// "do not shrink the chain").
fn rewrite(buf: &mut [u8], disk_kind: DiskKind, entries: &[DirectoryEntry], allow_shrink: bool) -> Result<(), Error> {
    let existing = dir_sectors(buf, disk_kind);
    let min_needed = ((entries.len() + SLOTS_PER_SECTOR - 1) / SLOTS_PER_SECTOR).max(1);
    let keep_len = if allow_shrink { min_needed.min(existing.len()) } else { existing.len() };
    let keep = &existing[..keep_len];

    for (i, ts) in keep.iter().enumerate() {
        let mut sector = [0u8; geometry::SECTOR_SIZE];
        if i + 1 < keep.len() {
            sector[0] = keep[i + 1].0;
            sector[1] = keep[i + 1].1;
        } else {
            sector[0] = 0;
            sector[1] = 0xFF;
        }
        for slot in 0..SLOTS_PER_SECTOR {
            let idx = i * SLOTS_PER_SECTOR + slot;
            if idx < entries.len() {
                let bytes = encode_slot(&entries[idx]);
                sector[SLOT_BASE + slot * SLOT_LEN..SLOT_BASE + (slot + 1) * SLOT_LEN].copy_from_slice(&bytes);
            }
        }
        geometry::write_sector(buf, disk_kind, ts.0, ts.1, &sector)?;
    }

    if allow_shrink {
        for ts in &existing[keep_len..] {
            if *ts != (bam::DIR_START_TRACK, bam::DIR_START_SECTOR) {
                bam::free(buf, disk_kind, ts.0, ts.1)?;
            }
        }
    }
    Ok(())
}

/// Pack all live entries into the minimal directory chain, freeing sectors
/// that become empty (except the first directory sector). Returns `true` if
/// compaction freed any sectors, `false` if the chain was already minimal.
pub fn compact(buf: &mut [u8], disk_kind: DiskKind) -> Result<bool, Error> {
    let existing_len = dir_sectors(buf, disk_kind).len();
    let entries = list(buf, disk_kind);
    let min_needed = ((entries.len() + SLOTS_PER_SECTOR - 1) / SLOTS_PER_SECTOR).max(1);
    rewrite(buf, disk_kind, &entries, true)?;
    Ok(min_needed < existing_len)
}

/// Reorder so `names` come first (in the given order), followed by the
/// remaining live entries in their existing order. Returns `false` and
/// makes no change if the resulting order is identical to the current one.
pub fn reorder_by_names(buf: &mut [u8], disk_kind: DiskKind, names: &[&str]) -> Result<bool, Error> {
    let current = list(buf, disk_kind);
    let mut rest = current.clone();
    let mut ordered = Vec::with_capacity(current.len());
    for name in names {
        if let Some(pos) = rest.iter().position(|e| e.name == *name) {
            ordered.push(rest.remove(pos));
        }
    }
    ordered.extend(rest);
    if ordered == current {
        return Ok(false);
    }
    rewrite(buf, disk_kind, &ordered, false)?;
    Ok(true)
}

/// Reorder with a stable comparator. Returns `false` and makes no change if
/// the resulting order matches the current one.
pub fn reorder_by<F>(buf: &mut [u8], disk_kind: DiskKind, mut cmp: F) -> Result<bool, Error>
where
    F: FnMut(&DirectoryEntry, &DirectoryEntry) -> std::cmp::Ordering,
{
    let current = list(buf, disk_kind);
    let mut ordered = current.clone();
    ordered.sort_by(|a, b| cmp(a, b));
    if ordered == current {
        return Ok(false);
    }
    rewrite(buf, disk_kind, &ordered, false)?;
    Ok(true)
}

/// Reorder to an explicit entry list. Returns `false` and makes no change
/// if it matches the current order.
pub fn reorder_to(buf: &mut [u8], disk_kind: DiskKind, order: &[DirectoryEntry]) -> Result<bool, Error> {
    let current = list(buf, disk_kind);
    if order == current.as_slice() {
        return Ok(false);
    }
    rewrite(buf, disk_kind, order, false)?;
    Ok(true)
}

/// Move the named entry to the first directory slot, leaving every other
/// entry's relative order unchanged.
pub fn move_to_front(buf: &mut [u8], disk_kind: DiskKind, name: &str) -> Result<(), Error> {
    let mut current = list(buf, disk_kind);
    let pos = current.iter().position(|e| e.name == name).ok_or_else(|| {
        error!("file '{name}' not found");
        Error::NotFound
    })?;
    if pos != 0 {
        current.swap(0, pos);
        rewrite(buf, disk_kind, &current, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(disk_kind: DiskKind) -> Vec<u8> {
        let mut buf = vec![0x01u8; disk_kind.byte_len()];
        bam::format(&mut buf, disk_kind, "NEW DISK", [0xA0, 0xA0]);
        buf
    }

    #[test]
    fn fresh_disk_has_empty_directory() {
        let buf = fresh(DiskKind::D35);
        assert!(list(&buf, DiskKind::D35).is_empty());
    }

    #[test]
    fn add_then_read_prg_file() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        let payload = vec![0xAAu8; 66];
        add_file(&mut buf, disk_kind, &mut cursors, "FILE1", FileKind::Prg, &payload).unwrap();
        let entries = list(&buf, disk_kind);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "FILE1");
        assert_eq!(entries[0].size_sectors, 1);
        let (_, entry) = find(&buf, disk_kind, "FILE1").unwrap();
        assert_eq!(chain::read_file(&buf, disk_kind, entry.start).unwrap(), payload);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "FILE1", FileKind::Prg, &[1, 2, 3]).unwrap();
        assert!(matches!(
            add_file(&mut buf, disk_kind, &mut cursors, "FILE1", FileKind::Seq, &[4, 5]),
            Err(Error::AlreadyExists)
        ));
    }

    #[test]
    fn remove_file_frees_its_chain() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        let before = bam::free_count(&buf, disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "FILE1", FileKind::Prg, &vec![0u8; 1000]).unwrap();
        assert!(bam::free_count(&buf, disk_kind) < before);
        remove_file(&mut buf, disk_kind, "FILE1").unwrap();
        assert_eq!(bam::free_count(&buf, disk_kind), before);
        assert!(list(&buf, disk_kind).is_empty());
    }

    #[test]
    fn rename_and_lock_round_trip() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "OLD", FileKind::Usr, &[9, 9]).unwrap();
        rename_file(&mut buf, disk_kind, "OLD", "NEW").unwrap();
        assert!(find(&buf, disk_kind, "OLD").is_none());
        assert!(find(&buf, disk_kind, "NEW").is_some());
        set_locked(&mut buf, disk_kind, "NEW", true).unwrap();
        assert!(find(&buf, disk_kind, "NEW").unwrap().1.locked);
        set_locked(&mut buf, disk_kind, "NEW", false).unwrap();
        assert!(!find(&buf, disk_kind, "NEW").unwrap().1.locked);
    }

    #[test]
    fn reorder_to_same_order_reports_no_change() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "A", FileKind::Prg, &[1]).unwrap();
        add_file(&mut buf, disk_kind, &mut cursors, "B", FileKind::Prg, &[2]).unwrap();
        let before = buf.clone();
        let changed = reorder_by_names(&mut buf, disk_kind, &["A", "B"]).unwrap();
        assert!(!changed);
        assert_eq!(buf, before);
    }

    #[test]
    fn reorder_by_names_moves_named_file_first() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "A", FileKind::Prg, &[1]).unwrap();
        add_file(&mut buf, disk_kind, &mut cursors, "B", FileKind::Prg, &[2]).unwrap();
        let changed = reorder_by_names(&mut buf, disk_kind, &["B"]).unwrap();
        assert!(changed);
        let names: Vec<String> = list(&buf, disk_kind).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn move_to_front_swaps_position() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "A", FileKind::Prg, &[1]).unwrap();
        add_file(&mut buf, disk_kind, &mut cursors, "B", FileKind::Prg, &[2]).unwrap();
        add_file(&mut buf, disk_kind, &mut cursors, "C", FileKind::Prg, &[3]).unwrap();
        move_to_front(&mut buf, disk_kind, "C").unwrap();
        let names: Vec<String> = list(&buf, disk_kind).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["C".to_string(), "B".to_string(), "A".to_string()]);
    }

    #[test]
    fn directory_overflows_into_new_sector() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        for i in 0..20 {
            add_file(&mut buf, disk_kind, &mut cursors, &format!("F{i}"), FileKind::Prg, &[i as u8]).unwrap();
        }
        assert_eq!(list(&buf, disk_kind).len(), 20);
        assert!(dir_sectors(&buf, disk_kind).len() >= 3);
    }

    #[test]
    fn compact_is_idempotent() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        for i in 0..17 {
            add_file(&mut buf, disk_kind, &mut cursors, &format!("F{i}"), FileKind::Prg, &[i as u8]).unwrap();
        }
        for i in 0..10 {
            remove_file(&mut buf, disk_kind, &format!("F{i}")).unwrap();
        }
        assert!(compact(&mut buf, disk_kind).unwrap());
        let once = buf.clone();
        assert!(!compact(&mut buf, disk_kind).unwrap());
        assert_eq!(buf, once);
    }

    #[test]
    fn rel_file_round_trips_and_remove_leaves_side_sectors() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        let payload = vec![0x55u8; 200 * 64];
        add_file(&mut buf, disk_kind, &mut cursors, "RELFILE", FileKind::rel(64), &payload).unwrap();
        let (_, entry) = find(&buf, disk_kind, "RELFILE").unwrap();
        let FileKind::Rel { side_start, record_length } = entry.kind else { panic!("expected REL") };
        assert_eq!(record_length, 64);
        assert_ne!(side_start, (0, 0));
        assert_eq!(chain::read_file(&buf, disk_kind, entry.start).unwrap(), payload);

        let before_free = bam::free_count(&buf, disk_kind);
        remove_file(&mut buf, disk_kind, "RELFILE").unwrap();
        // documented behavior: side sectors are leaked by plain remove_file
        assert!(bam::free_count(&buf, disk_kind) > before_free);
        assert!(!bam::is_free(&buf, disk_kind, side_start.0, side_start.1).unwrap());
    }

    #[test]
    fn remove_file_full_frees_side_sectors_too() {
        let disk_kind = DiskKind::D35;
        let mut buf = fresh(disk_kind);
        let mut cursors = Cursors::new(disk_kind);
        let payload = vec![0x55u8; 200 * 64];
        add_file(&mut buf, disk_kind, &mut cursors, "RELFILE", FileKind::rel(64), &payload).unwrap();
        let before = bam::free_count(&buf, disk_kind);
        add_file(&mut buf, disk_kind, &mut cursors, "OTHER", FileKind::Prg, &[1]).unwrap();
        remove_file(&mut buf, disk_kind, "OTHER").unwrap();
        remove_file_full(&mut buf, disk_kind, "RELFILE").unwrap();
        assert_eq!(bam::free_count(&buf, disk_kind), before);
    }
}
