//! Domain models for 3D generation

pub mod asset;
pub mod conversion;

pub use asset::{AssetRecord, AssetStatus, ModelFormat, NewAsset, ProviderKind};
pub use conversion::ConversionRecord;
