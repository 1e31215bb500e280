// End-to-end integrity verification through the public facade.
use d64kit::{DiskImage, DiskKind, FileKind};

#[test]
fn fresh_and_populated_disks_verify_clean() {
    let mut image = DiskImage::format(DiskKind::D35, None);
    assert!(image.verify_bam(false).unwrap().is_ok());

    image.add_file("A", FileKind::Prg, &vec![1u8; 1000]).unwrap();
    image.add_file("B", FileKind::rel(64), &vec![2u8; 64 * 150]).unwrap();
    assert!(image.verify_bam(false).unwrap().is_ok());
}

#[test]
fn verify_detects_and_fixes_a_leaked_allocation() {
    let mut image = DiskImage::format(DiskKind::D35, None);
    // allocate a sector directly, outside any file's chain, to simulate drift
    // between the BAM and what the directory actually reaches.
    image.find_and_allocate_free_sector().unwrap();

    let report = image.verify_bam(false).unwrap();
    assert!(!report.is_ok());
    assert!(!report.to_lines().is_empty());

    let fixed = image.verify_bam(true).unwrap();
    assert!(!fixed.fixes.is_empty());
    assert!(image.verify_bam(false).unwrap().is_ok());
}

#[test]
fn removing_a_rel_file_leaks_side_sectors_by_default() {
    let mut image = DiskImage::format(DiskKind::D35, None);
    image.add_file("R", FileKind::rel(32), &vec![3u8; 32 * 40]).unwrap();
    image.remove_file("R").unwrap();
    // documented open question (spec's "do not fix silently"): plain
    // remove_file does not free REL side sectors, so the verifier should
    // flag them as marked-used-but-unreachable.
    assert!(!image.verify_bam(false).unwrap().is_ok());
}

#[test]
fn remove_file_full_leaves_no_leaked_side_sectors() {
    let mut image = DiskImage::format(DiskKind::D35, None);
    image.add_file("R", FileKind::rel(32), &vec![3u8; 32 * 40]).unwrap();
    image.remove_file_full("R").unwrap();
    assert!(image.verify_bam(false).unwrap().is_ok());
}
