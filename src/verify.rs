//! Integrity Verifier: cross-checks the BAM against what is actually
//! reachable from the directory, and optionally repairs mismatches.

use std::fmt;

use log::warn;

use crate::bam;
use crate::directory::{self, FileKind};
use crate::error::Error;
use crate::geometry::DiskKind;
use crate::rel;

/// One finding from a verification pass, carrying enough to render the
/// plain-text verifier log line spec.md §6 describes (`ERROR:`, `WARNING:`,
/// `FIXING:`) and to be inspected programmatically by callers that don't
/// want to scrape text.
#[derive(Clone, Debug)]
pub enum Finding {
    /// BAM marked (track, sector) used, but nothing in the directory reaches it.
    IncorrectlyMarkedUsed { track: u8, sector: u8 },
    /// BAM marked (track, sector) free, but a live file reaches it.
    IncorrectlyMarkedFree { track: u8, sector: u8 },
    /// A track's recorded free count disagrees with its bitmap population count.
    FreeCountMismatch { track: u8, recorded: u8, actual: u8 },
    /// A fix was applied for a prior finding at the same index.
    Fixed(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::IncorrectlyMarkedUsed { track, sector } => {
                write!(f, "ERROR: ({track},{sector}) incorrectly marked used")
            }
            Finding::IncorrectlyMarkedFree { track, sector } => {
                write!(f, "ERROR: ({track},{sector}) incorrectly marked free")
            }
            Finding::FreeCountMismatch { track, recorded, actual } => {
                write!(
                    f,
                    "ERROR: track {track} free count {recorded} disagrees with bitmap count {actual}"
                )
            }
            Finding::Fixed(detail) => write!(f, "FIXING: {detail}"),
        }
    }
}

/// Summary of a verification pass. `errors` are the mismatches found
/// (before any fix); `fixes` record what was corrected when `fix` was
/// requested; `warnings` covers non-fatal oddities noticed along the way.
#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    pub errors: Vec<Finding>,
    pub fixes: Vec<Finding>,
    pub warnings: Vec<String>,
}

impl VerifyReport {
    /// True iff no errors were found, matching spec.md §4.6's boolean contract.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Render every finding as plain-text lines, in the order spec.md §6
    /// describes (`ERROR:`/`WARNING:`/`FIXING:` prefixed).
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for w in &self.warnings {
            lines.push(format!("WARNING: {w}"));
        }
        for e in &self.errors {
            lines.push(e.to_string());
        }
        for fix in &self.fixes {
            lines.push(fix.to_string());
        }
        lines
    }
}

/// Mark every sector reachable from the directory: the BAM sector, every
/// directory sector, every live file's data chain, and (for REL files)
/// every side sector plus every data sector each side sector indexes.
fn reachable(buf: &[u8], kind: DiskKind) -> Result<Vec<bool>, Error> {
    let mut used = vec![false; kind.total_sectors()];
    let mut mark = |t: u8, s: u8| -> Result<(), Error> {
        let off = kind.offset(t, s)?;
        used[off / crate::geometry::SECTOR_SIZE] = true;
        Ok(())
    };

    mark(bam::BAM_TRACK, bam::BAM_SECTOR)?;
    for (t, s) in directory::dir_sectors(buf, kind) {
        mark(t, s)?;
    }

    for entry in directory::list(buf, kind) {
        if entry.start.0 == 0 {
            continue;
        }
        for (t, s) in crate::chain::ChainSectors::new(buf, kind, entry.start) {
            mark(t, s)?;
        }
        if let FileKind::Rel { side_start, record_length } = entry.kind {
            if side_start.0 != 0 {
                if let Ok(sides) = rel::side_sector_chain(buf, kind, side_start) {
                    for (t, s) in &sides {
                        mark(*t, *s)?;
                    }
                }
                if let Ok(data) = rel::parse(buf, kind, side_start, record_length) {
                    for (t, s) in data {
                        mark(t, s)?;
                    }
                }
            }
        }
    }

    Ok(used)
}

/// Cross-check the BAM against reachability from the directory. When `fix`
/// is set, mismatches are corrected in `buf` and recorded in the returned
/// report's `fixes`; otherwise `buf` is left untouched.
pub fn verify_bam(buf: &mut [u8], kind: DiskKind, fix: bool) -> Result<VerifyReport, Error> {
    let used = reachable(buf, kind)?;
    let mut report = VerifyReport::default();

    for track in 1..=kind.track_count() {
        let sectors = kind.sectors_per_track(track)?;
        for sector in 0..sectors {
            let off = kind.offset(track, sector)?;
            let is_used = used[off / crate::geometry::SECTOR_SIZE];
            let bam_free = bam::is_free(buf, kind, track, sector)?;
            if !bam_free && !is_used {
                report.errors.push(Finding::IncorrectlyMarkedUsed { track, sector });
                if fix {
                    bam::free(buf, kind, track, sector)?;
                    report.fixes.push(Finding::Fixed(format!(
                        "freed ({track},{sector}), was marked used but unreachable"
                    )));
                }
            } else if bam_free && is_used {
                report.errors.push(Finding::IncorrectlyMarkedFree { track, sector });
                if fix {
                    bam::allocate(buf, kind, track, sector)?;
                    report.fixes.push(Finding::Fixed(format!(
                        "allocated ({track},{sector}), was marked free but reachable"
                    )));
                }
            }
        }

        let recorded = bam::track_free_count(buf, kind, track)?;
        let actual = bam::recompute_track_free_count(buf, kind, track)?;
        if recorded != actual {
            report.errors.push(Finding::FreeCountMismatch { track, recorded, actual });
            if fix {
                bam::set_track_free_count(buf, kind, track, actual)?;
                report.fixes.push(Finding::Fixed(format!(
                    "track {track} free count corrected {recorded} -> {actual}"
                )));
            }
        }
    }

    if !report.errors.is_empty() && !fix {
        warn!("verify_bam found {} mismatch(es)", report.errors.len());
    }

    Ok(report)
}
