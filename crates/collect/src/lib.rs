//! # VBI Compare Collect
//!
//! Collection jobs: find the BlueTopo tiles and CSB files matching a request,
//! fetch them (or list their `s3://` URLs), and build the reputation
//! calculation script over the two resulting lists.
//!
//! ```no_run
//! use vbicompare_collect::{worker, Settings, Sources};
//! use vbicompare_core::{CollectionRequest, DataSource, ProcessingMode, Region, SearchMethod};
//!
//! let settings = Settings::default();
//! let sources = Sources::from_settings(&settings).unwrap();
//! let request = CollectionRequest {
//!     primary: DataSource::Nbs,
//!     search: SearchMethod::Area(vec![Region::from_corners("43.10, -70.80", "43.00, -70.60").unwrap()]),
//!     secondary: true,
//!     mode: ProcessingMode::Cloud,
//!     output_root: "/data/vbi".into(),
//!     run_reputation: false,
//! };
//!
//! let (handle, events) = worker::spawn(request, settings, sources);
//! for event in events {
//!     println!("{event:?}");
//! }
//! let outcome = handle.join();
//! ```

pub mod batch;
mod dcdb;
pub mod downloader;
pub mod error;
pub mod layout;
mod nbs;
pub mod plan;
pub mod reporter;
pub mod settings;
pub mod worker;

pub use batch::{BatchBuilder, BatchInputs, PreparedRun};
pub use downloader::{DownloadSummary, Downloader, Sources};
pub use error::{CollectError, Result};
pub use layout::Layout;
pub use reporter::Reporter;
pub use settings::Settings;
pub use worker::{spawn, JobOutcome};
