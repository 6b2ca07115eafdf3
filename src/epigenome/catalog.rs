//! Roadmap Epigenomics H3K4me3 peak sets and their local cache.
//!
//! The three reference categories map to consolidated Roadmap epigenomes:
//! - fetal brain: E081 (fetal brain, male)
//! - adult brain: E073 (dorsolateral prefrontal cortex)
//! - adult liver: E066
//!
//! Peaks are downloaded once into a cache directory and read from there on
//! later runs.

use crate::epigenome::peaks::read_peaks;
use crate::error::{DgeError, Result};
use crate::genomic::IntervalSet;
use log::info;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const ROADMAP_BASE_URL: &str =
    "https://egg2.wustl.edu/roadmap/data/byFileType/peaks/consolidated/narrowPeak";

/// Histone mark queried for every Roadmap category.
pub const MARK: &str = "H3K4me3";

/// A peak set to intersect promoters with.
///
/// In YAML a reference category is its name (`fetal_brain`) and a custom
/// one a `{name, source}` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CategoryRepr", into = "CategoryRepr")]
pub enum EpigenomeCategory {
    FetalBrain,
    AdultBrain,
    AdultLiver,
    /// Any BED / narrowPeak file, by local path or http(s) URL.
    Custom { name: String, source: String },
}

impl EpigenomeCategory {
    /// The three reference categories.
    pub fn roadmap() -> Vec<Self> {
        vec![Self::FetalBrain, Self::AdultBrain, Self::AdultLiver]
    }

    pub fn name(&self) -> &str {
        match self {
            Self::FetalBrain => "FetalBrain",
            Self::AdultBrain => "AdultBrain",
            Self::AdultLiver => "AdultLiver",
            Self::Custom { name, .. } => name,
        }
    }

    /// Roadmap epigenome identifier.
    pub fn epigenome_id(&self) -> Option<&'static str> {
        match self {
            Self::FetalBrain => Some("E081"),
            Self::AdultBrain => Some("E073"),
            Self::AdultLiver => Some("E066"),
            Self::Custom { .. } => None,
        }
    }

    /// Path or URL the peaks are read from.
    pub fn source(&self) -> String {
        match self {
            Self::Custom { source, .. } => source.clone(),
            _ => format!(
                "{}/{}",
                ROADMAP_BASE_URL,
                roadmap_file_name(self.epigenome_id().unwrap_or_default())
            ),
        }
    }

    /// Parse a category from a CLI-style name (`fetal_brain`, `E073`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fetal_brain" | "fetalbrain" | "e081" => Some(Self::FetalBrain),
            "adult_brain" | "adultbrain" | "e073" => Some(Self::AdultBrain),
            "adult_liver" | "adultliver" | "e066" => Some(Self::AdultLiver),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CategoryRepr {
    Named(String),
    Custom { name: String, source: String },
}

impl TryFrom<CategoryRepr> for EpigenomeCategory {
    type Error = String;

    fn try_from(repr: CategoryRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            CategoryRepr::Named(name) => {
                Self::parse(&name).ok_or_else(|| format!("unknown epigenome category '{}'", name))
            }
            CategoryRepr::Custom { name, source } => Ok(Self::Custom { name, source }),
        }
    }
}

impl From<EpigenomeCategory> for CategoryRepr {
    fn from(category: EpigenomeCategory) -> Self {
        match category {
            EpigenomeCategory::Custom { name, source } => CategoryRepr::Custom { name, source },
            EpigenomeCategory::FetalBrain => CategoryRepr::Named("fetal_brain".to_string()),
            EpigenomeCategory::AdultBrain => CategoryRepr::Named("adult_brain".to_string()),
            EpigenomeCategory::AdultLiver => CategoryRepr::Named("adult_liver".to_string()),
        }
    }
}

impl fmt::Display for EpigenomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epigenome_id() {
            Some(eid) => write!(f, "{} ({} {})", self.name(), eid, MARK),
            None => write!(f, "{}", self.name()),
        }
    }
}

fn roadmap_file_name(eid: &str) -> String {
    format!("{}-{}.narrowPeak.gz", eid, MARK)
}

fn is_http_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Default cache location for downloaded peak files.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("neurodev-dge")
        .join("peaks")
}

/// Local file a remote source is cached under.
fn cached_path(source: &str, cache_dir: &Path) -> PathBuf {
    let file_name = source
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("peaks.bed");
    cache_dir.join(file_name)
}

/// Download `url` to `dest` through a `.part` file renamed on success.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    let download_err = |reason: String| DgeError::Download {
        url: url.to_string(),
        reason,
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_os: OsString = dest.as_os_str().to_os_string();
    tmp_os.push(".part");
    let tmp_path = PathBuf::from(tmp_os);

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| download_err(e.to_string()))?;

    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    if let Err(e) = std::io::copy(&mut response, &mut writer) {
        let _ = fs::remove_file(&tmp_path);
        return Err(download_err(e.to_string()));
    }
    writer.flush()?;
    drop(writer);

    if fs::metadata(&tmp_path)?.len() == 0 {
        let _ = fs::remove_file(&tmp_path);
        return Err(download_err("downloaded file is empty".to_string()));
    }
    fs::rename(&tmp_path, dest)?;
    Ok(())
}

/// Local path of a category's peaks, downloading into `cache_dir` when the
/// source is remote and not cached yet.
pub fn resolve_peaks(category: &EpigenomeCategory, cache_dir: Option<&Path>) -> Result<PathBuf> {
    let source = category.source();
    if !is_http_source(&source) {
        let path = PathBuf::from(source.strip_prefix("file://").unwrap_or(&source));
        if !path.exists() {
            return Err(DgeError::InvalidParameter(format!(
                "Peak file for {} not found: {}",
                category.name(),
                path.display()
            )));
        }
        return Ok(path);
    }

    let cache = cache_dir.map(PathBuf::from).unwrap_or_else(default_cache_dir);
    let dest = cached_path(&source, &cache);
    if dest.exists() {
        info!("Using cached peaks for {}: {}", category, dest.display());
    } else {
        info!("Downloading peaks for {} from {}", category, source);
        download_file(&source, &dest)?;
    }
    Ok(dest)
}

/// Peaks of a category, fetched once and cached.
pub fn fetch_peaks(category: &EpigenomeCategory, cache_dir: Option<&Path>) -> Result<IntervalSet> {
    let path = resolve_peaks(category, cache_dir)?;
    read_peaks(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_roadmap_sources() {
        assert_eq!(
            EpigenomeCategory::FetalBrain.source(),
            "https://egg2.wustl.edu/roadmap/data/byFileType/peaks/consolidated/narrowPeak/E081-H3K4me3.narrowPeak.gz"
        );
        assert_eq!(EpigenomeCategory::AdultBrain.epigenome_id(), Some("E073"));
        assert_eq!(EpigenomeCategory::AdultLiver.epigenome_id(), Some("E066"));
        assert_eq!(EpigenomeCategory::roadmap().len(), 3);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(EpigenomeCategory::parse("fetal-brain"), Some(EpigenomeCategory::FetalBrain));
        assert_eq!(EpigenomeCategory::parse("E066"), Some(EpigenomeCategory::AdultLiver));
        assert_eq!(EpigenomeCategory::parse("kidney"), None);
    }

    #[test]
    fn test_yaml_representation() {
        let yaml = "- fetal_brain\n- E073\n- name: Cortex\n  source: /data/cortex.bed\n";
        let parsed: Vec<EpigenomeCategory> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed[0], EpigenomeCategory::FetalBrain);
        assert_eq!(parsed[1], EpigenomeCategory::AdultBrain);
        assert_eq!(parsed[2].name(), "Cortex");
        assert_eq!(parsed[2].source(), "/data/cortex.bed");

        let written = serde_yaml::to_string(&parsed).unwrap();
        let reparsed: Vec<EpigenomeCategory> = serde_yaml::from_str(&written).unwrap();
        assert_eq!(reparsed, parsed);
        assert!(serde_yaml::from_str::<EpigenomeCategory>("kidney").is_err());
    }

    #[test]
    fn test_cached_file_reused() {
        let cache = TempDir::new().unwrap();
        // pre-populate the cache so that no download is attempted
        let cached = cache.path().join("E081-H3K4me3.narrowPeak.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&cached).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"chr1\t100\t200\tp1\t0\t.\t1\t-1\t1\t50\n").unwrap();
        encoder.finish().unwrap();

        let peaks = fetch_peaks(&EpigenomeCategory::FetalBrain, Some(cache.path())).unwrap();
        assert_eq!(peaks.len(), 1);
    }

    #[test]
    fn test_custom_local_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.bed");
        fs::write(&path, "chr2\t10\t50\n").unwrap();
        let category = EpigenomeCategory::Custom {
            name: "Mine".into(),
            source: path.display().to_string(),
        };
        assert_eq!(fetch_peaks(&category, None).unwrap().len(), 1);

        let missing = EpigenomeCategory::Custom {
            name: "Gone".into(),
            source: dir.path().join("nope.bed").display().to_string(),
        };
        assert!(fetch_peaks(&missing, None).is_err());
    }
}
