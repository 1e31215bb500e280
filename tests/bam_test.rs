// End-to-end geometry and BAM allocation behavior through the public facade.
use d64kit::{DiskImage, DiskKind, Error};

#[test]
fn exhausting_free_sectors_allocates_each_exactly_once() {
    let mut image = DiskImage::format(DiskKind::D35, None);
    let total = image.free_sector_count();
    let mut seen = std::collections::HashSet::new();
    let mut count = 0usize;
    loop {
        match image.find_and_allocate_free_sector() {
            Ok(ts) => {
                assert!(seen.insert(ts), "sector {ts:?} allocated twice");
                count += 1;
            }
            Err(Error::DiskFull) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(count, total as usize);
    assert!(image.verify_bam(false).unwrap().is_ok());
}

#[test]
fn raw_sector_io_is_bounds_checked() {
    let mut image = DiskImage::format(DiskKind::D35, None);
    assert!(image.read_sector(1, 0).is_ok());
    assert!(matches!(image.read_sector(1, 21), Err(Error::InvalidGeometry)));
    assert!(matches!(image.read_sector(36, 0), Err(Error::InvalidGeometry)));

    let data = [0x5Au8; 256];
    image.write_sector(5, 3, &data).unwrap();
    assert_eq!(image.read_sector(5, 3).unwrap(), data);
    assert!(matches!(image.write_sector(41, 0, &data), Err(Error::InvalidGeometry)));
}

#[test]
fn forty_track_disk_reaches_into_dolphin_dos_extension() {
    let mut image = DiskImage::format(DiskKind::D40, None);
    assert!(image.read_sector(40, 0).is_ok());
    assert!(matches!(image.read_sector(41, 0), Err(Error::InvalidGeometry)));
}
