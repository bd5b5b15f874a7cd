//! Collector configuration
//!
//! Loaded from a TOML file named by `--config` or `$VBICOMPARE_CONFIG`.
//! Every field has a built-in default, so an empty (or absent) file gives a
//! working setup against the public NOAA endpoints.
//!
//! ```toml
//! [sources]
//! endpoint = "http://localhost:9000"
//!
//! [http]
//! timeout_secs = 60
//!
//! [reputation]
//! flavor = "sh"
//! activation_script = "/opt/csb/activate.sh"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use vbicompare_cloud::bucket::DEFAULT_REGION;
use vbicompare_core::request::absolute_path;
use vbicompare_cloud::{Paging, DCDB_BUCKET, DEFAULT_CHART_SERVICE_URL, DEFAULT_CSB_SERVICE_URL, NBS_BUCKET};

use crate::error::{CollectError, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "VBICOMPARE_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sources: SourceSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub reputation: ReputationSettings,
}

/// Where the data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default = "default_nbs_bucket")]
    pub nbs_bucket: String,

    #[serde(default = "default_dcdb_bucket")]
    pub dcdb_bucket: String,

    #[serde(default = "default_region")]
    pub bucket_region: String,

    /// ENC chart status `MapServer` root
    #[serde(default = "default_chart_service")]
    pub chart_service_url: String,

    /// CSB `MapServer` root
    #[serde(default = "default_csb_service")]
    pub csb_service_url: String,

    /// S3-compatible endpoint to use instead of AWS
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// HTTP behaviour for the ArcGIS services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Features requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Cap on features collected from one query
    #[serde(default = "default_max_features")]
    pub max_features: usize,
}

/// Kind of script the batch builder writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptFlavor {
    /// Windows batch file
    Bat,
    /// POSIX shell script
    Sh,
}

impl ScriptFlavor {
    pub fn extension(&self) -> &'static str {
        match self {
            ScriptFlavor::Bat => "bat",
            ScriptFlavor::Sh => "sh",
        }
    }
}

impl Default for ScriptFlavor {
    fn default() -> Self {
        if cfg!(windows) {
            ScriptFlavor::Bat
        } else {
            ScriptFlavor::Sh
        }
    }
}

/// Inputs of the generated reputation script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationSettings {
    #[serde(default)]
    pub flavor: ScriptFlavor,

    /// Script sourced (or `call`ed) before the first `csb` step
    #[serde(default)]
    pub activation_script: Option<PathBuf>,

    /// Platform description JSON passed to `loadplatf` and `detbiases`
    #[serde(default = "default_platforms_file")]
    pub platforms_file: PathBuf,

    /// Water-level file passed to `detbiases`
    #[serde(default = "default_water_levels_file")]
    pub water_levels_file: PathBuf,

    #[serde(default = "default_required_depth_range")]
    pub required_depth_range: f64,

    /// Emit the `repplot` step enabled
    #[serde(default)]
    pub include_plot: bool,
}

fn default_nbs_bucket() -> String {
    NBS_BUCKET.to_string()
}

fn default_dcdb_bucket() -> String {
    DCDB_BUCKET.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_chart_service() -> String {
    DEFAULT_CHART_SERVICE_URL.to_string()
}

fn default_csb_service() -> String {
    DEFAULT_CSB_SERVICE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_page_size() -> usize {
    1000
}

fn default_max_features() -> usize {
    10_000
}

fn default_platforms_file() -> PathBuf {
    PathBuf::from("platforms.json")
}

fn default_water_levels_file() -> PathBuf {
    PathBuf::from("waterlevels.txt")
}

fn default_required_depth_range() -> f64 {
    1.0
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            nbs_bucket: default_nbs_bucket(),
            dcdb_bucket: default_dcdb_bucket(),
            bucket_region: default_region(),
            chart_service_url: default_chart_service(),
            csb_service_url: default_csb_service(),
            endpoint: None,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            max_features: default_max_features(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn paging(&self) -> Paging {
        Paging {
            page_size: self.page_size,
            max_features: self.max_features,
        }
    }
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            flavor: ScriptFlavor::default(),
            activation_script: None,
            platforms_file: default_platforms_file(),
            water_levels_file: default_water_levels_file(),
            required_depth_range: default_required_depth_range(),
            include_plot: false,
        }
    }
}

impl ReputationSettings {
    /// Join relative file paths onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.platforms_file);
        resolve(&mut self.water_levels_file);
        if let Some(script) = self.activation_script.as_mut() {
            resolve(script);
        }
    }
}

impl Settings {
    /// Load settings from `path`, else from `$VBICOMPARE_CONFIG`, else defaults.
    ///
    /// A named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Read a config file. Relative reputation paths in it are taken relative
    /// to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CollectError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut settings = Self::from_toml_str(&text).map_err(|reason| CollectError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        if let Some(dir) = absolute_path(path).parent() {
            settings.reputation.resolve_paths(dir);
        }
        debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    /// Parse TOML text; the error is the parser's message.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let s = Settings::from_toml_str("").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.sources.nbs_bucket, "noaa-ocs-nationalbathymetry-pds");
        assert_eq!(s.sources.dcdb_bucket, "noaa-dcdb-bathymetry-pds");
        assert_eq!(s.http.timeout(), Duration::from_secs(30));
        assert_eq!(s.reputation.required_depth_range, 1.0);
        assert!(!s.reputation.include_plot);
    }

    #[test]
    fn partial_sections() {
        let s = Settings::from_toml_str(
            r#"
            [sources]
            endpoint = "http://localhost:9000"

            [http]
            page_size = 250

            [reputation]
            flavor = "bat"
            include_plot = true
            "#,
        )
        .unwrap();

        assert_eq!(s.sources.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(s.sources.bucket_region, "us-east-1");
        assert_eq!(s.http.paging().page_size, 250);
        assert_eq!(s.http.max_retries, 3);
        assert_eq!(s.reputation.flavor, ScriptFlavor::Bat);
        assert!(s.reputation.include_plot);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Settings::from_toml_str("[http]\ntimeout_secs = \"soon\"").is_err());
        assert!(Settings::from_toml_str("[reputation]\nflavor = \"ps1\"").is_err());
    }

    #[test]
    fn missing_named_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = Settings::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(res, Err(CollectError::Config { .. })));
    }

    #[test]
    fn loads_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vbicompare.toml");
        std::fs::write(&path, "[http]\nmax_retries = 0\n").unwrap();
        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.http.max_retries, 0);
    }

    #[test]
    fn reputation_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vbicompare.toml");
        std::fs::write(
            &path,
            "[reputation]\nactivation_script = \"env/activate.sh\"\nwater_levels_file = \"/srv/csb/wl.txt\"\n",
        )
        .unwrap();

        let s = Settings::from_file(&path).unwrap();
        assert_eq!(s.reputation.platforms_file, dir.path().join("platforms.json"));
        assert_eq!(s.reputation.water_levels_file, PathBuf::from("/srv/csb/wl.txt"));
        assert_eq!(
            s.reputation.activation_script,
            Some(dir.path().join("env/activate.sh"))
        );
    }
}
