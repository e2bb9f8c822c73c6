//! Database access for forge-models
//!
//! Tables are created by `forge_common::db::init_database`; this module only
//! reads and writes rows.

pub mod assets;
pub mod conversions;

pub use assets::{is_local_path, AssetUpdate, LOCAL_PREFIX};
