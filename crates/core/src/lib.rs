//! # VBI Compare Core
//!
//! Shared types for collecting volunteered (DCDB CSB) and authoritative
//! (NBS BlueTopo) bathymetry.
//!
//! This crate provides:
//! - `Region` / `BBox`: search areas and their validation
//! - `CollectionRequest`: the options of one collection job
//! - `naming`: object-key and file-name conventions of the remote holdings
//! - `StatusEvent`: the protocol between a running job and its monitor

pub mod error;
pub mod events;
pub mod naming;
pub mod region;
pub mod request;

pub use error::{Error, Result};
pub use events::{Severity, StatusEvent, StatusLine};
pub use region::{BBox, GeoPoint, Region};
pub use request::{CollectionRequest, DataSource, ProcessingMode, SearchMethod};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{Severity, StatusEvent, StatusLine};
    pub use crate::region::{BBox, GeoPoint, Region};
    pub use crate::request::{CollectionRequest, DataSource, ProcessingMode, SearchMethod};
}
