//! Promoter overlap with public H3K4me3 peak sets.
//!
//! Promoters of significant genes and of all tested genes are intersected
//! with peaks of each [`EpigenomeCategory`]; the DEG overlap fraction is
//! reported next to the background fraction.

pub mod catalog;
pub mod overlap;
pub mod peaks;
pub mod promoter;

pub use catalog::{default_cache_dir, fetch_peaks, resolve_peaks, EpigenomeCategory, MARK};
pub use overlap::{overlap_fraction, write_overlap_tsv, CategoryOverlap, OverlapSummary};
pub use peaks::{parse_bed_line, read_peaks};
pub use promoter::{promoter_window, promoters, PromoterWindow};
