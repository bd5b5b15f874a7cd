//! The collection request assembled from user options

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::region::Region;

/// Which dataset a job collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// National Bathymetric Source BlueTopo tiles (the reference data).
    Nbs,
    /// DCDB crowdsourced bathymetry point files.
    Dcdb,
}

impl DataSource {
    /// Directory and file-name stem used on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Nbs => "nbs",
            DataSource::Dcdb => "dcdb",
        }
    }

    pub fn other(&self) -> DataSource {
        match self {
            DataSource::Nbs => DataSource::Dcdb,
            DataSource::Dcdb => DataSource::Nbs,
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Nbs => write!(f, "NBS"),
            DataSource::Dcdb => write!(f, "DCDB"),
        }
    }
}

impl std::str::FromStr for DataSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nbs" | "bluetopo" => Ok(DataSource::Nbs),
            "dcdb" | "csb" => Ok(DataSource::Dcdb),
            _ => Err(Error::InvalidParameter {
                name: "source",
                value: s.to_string(),
                reason: "expected 'nbs' or 'dcdb'".to_string(),
            }),
        }
    }
}

/// Whether files are downloaded or only referenced by URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Compile `s3://` URLs without downloading.
    Cloud,
    /// Download into the output root.
    Local,
}

impl ProcessingMode {
    pub fn is_local(&self) -> bool {
        matches!(self, ProcessingMode::Local)
    }
}

/// How the primary dataset is located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchMethod {
    /// ENC chart cell names, e.g. `US5MA1AM`.
    Charts(Vec<String>),
    /// CSB platform (vessel) names.
    Vessels(Vec<String>),
    /// One or more geographic regions.
    Area(Vec<Region>),
}

impl SearchMethod {
    pub fn is_empty(&self) -> bool {
        match self {
            SearchMethod::Charts(v) | SearchMethod::Vessels(v) => v.is_empty(),
            SearchMethod::Area(r) => r.is_empty(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SearchMethod::Charts(_) => "chart",
            SearchMethod::Vessels(_) => "vessel",
            SearchMethod::Area(_) => "area",
        }
    }
}

/// Everything one collection job needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub primary: DataSource,
    pub search: SearchMethod,
    /// Also collect the other dataset over the same ground.
    pub secondary: bool,
    pub mode: ProcessingMode,
    pub output_root: PathBuf,
    /// Execute the generated reputation script once it is written.
    pub run_reputation: bool,
}

impl CollectionRequest {
    /// Check the request, collecting every problem rather than stopping at
    /// the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.search.is_empty() {
            problems.push(match &self.search {
                SearchMethod::Charts(_) => "Chart search selected but no charts were given".to_string(),
                SearchMethod::Vessels(_) => "Vessel search selected but no vessels were given".to_string(),
                SearchMethod::Area(_) => "Area search selected but no search area was given".to_string(),
            });
        }

        match (&self.search, self.primary) {
            (SearchMethod::Charts(_), DataSource::Dcdb) => {
                problems.push("Chart search is only available with NBS as the primary source".to_string())
            }
            (SearchMethod::Vessels(_), DataSource::Nbs) => {
                problems.push("Vessel search is only available with DCDB as the primary source".to_string())
            }
            _ => {}
        }

        if let SearchMethod::Charts(charts) = &self.search {
            for chart in charts {
                if chart_band(chart).is_none() {
                    problems.push(format!(
                        "Chart '{chart}' has no usage band digit as its third character"
                    ));
                }
            }
        }

        if self.output_root.as_os_str().is_empty() {
            problems.push("An output folder must be selected".to_string());
        } else if self.output_root.to_string_lossy().contains(' ') {
            problems.push(format!(
                "Output folder '{}' contains spaces; choose a path without spaces",
                self.output_root.display()
            ));
        }

        if self.run_reputation && !self.secondary {
            problems.push(
                "The reputation calculation needs both datasets; enable secondary data".to_string(),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidRequest(problems))
        }
    }

    /// Copy of the request with chart and vessel names trimmed, upper-cased
    /// and de-duplicated (first occurrence wins), regions crossing the
    /// antimeridian split in two, and the output root made absolute against
    /// the working directory.
    pub fn normalized(&self) -> Self {
        let clean = |names: &[String]| {
            let mut out: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                let n = name.trim().to_uppercase();
                if !n.is_empty() && !out.contains(&n) {
                    out.push(n);
                }
            }
            out
        };

        let search = match &self.search {
            SearchMethod::Charts(c) => SearchMethod::Charts(clean(c)),
            SearchMethod::Vessels(v) => SearchMethod::Vessels(clean(v)),
            SearchMethod::Area(r) => SearchMethod::Area(r.iter().flat_map(Region::split_at_antimeridian).collect()),
        };

        let output_root = if self.output_root.as_os_str().is_empty() {
            PathBuf::new()
        } else {
            absolute_path(&self.output_root)
        };

        Self {
            search,
            output_root,
            ..self.clone()
        }
    }

    /// Whether both datasets end up collected.
    pub fn wants_both(&self) -> bool {
        self.secondary
    }
}

/// `path` joined onto the working directory when relative.
///
/// Scripts run from their own run directory, so every path written into them
/// has to be absolute. Falls back to `path` unchanged when the working
/// directory cannot be read.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Usage band of an ENC cell name (its third character, `1`-`6`).
pub fn chart_band(cell_name: &str) -> Option<u8> {
    cell_name
        .chars()
        .nth(2)
        .and_then(|c| c.to_digit(10))
        .filter(|d| (1..=6).contains(d))
        .map(|d| d as u8)
}
