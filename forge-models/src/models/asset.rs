//! Asset records and the enums they are built from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Provider
// ============================================================================

/// External 3D generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Meshy,
    Tripo,
    Rodin,
    Replicate,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Meshy,
        ProviderKind::Tripo,
        ProviderKind::Rodin,
        ProviderKind::Replicate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Meshy => "meshy",
            ProviderKind::Tripo => "tripo",
            ProviderKind::Rodin => "rodin",
            ProviderKind::Replicate => "replicate",
        }
    }

    /// Formats the provider can hand back without conversion
    ///
    /// Static table; nothing queries the provider at runtime.
    pub fn native_formats(self) -> &'static [ModelFormat] {
        match self {
            ProviderKind::Rodin => &[ModelFormat::Glb, ModelFormat::Fbx, ModelFormat::Obj],
            ProviderKind::Meshy | ProviderKind::Tripo | ProviderKind::Replicate => {
                &[ModelFormat::Glb]
            }
        }
    }

    /// True when `format` must be produced by the converter for this provider
    pub fn needs_conversion(self, format: ModelFormat) -> bool {
        format != ModelFormat::Glb && !self.native_formats().contains(&format)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meshy" => Ok(ProviderKind::Meshy),
            "tripo" => Ok(ProviderKind::Tripo),
            "rodin" => Ok(ProviderKind::Rodin),
            "replicate" => Ok(ProviderKind::Replicate),
            other => Err(format!(
                "unknown provider: {}. use meshy, tripo, rodin, or replicate",
                other
            )),
        }
    }
}

// ============================================================================
// Format
// ============================================================================

/// 3D model file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Glb,
    Fbx,
    Obj,
}

impl ModelFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Glb => "glb",
            ModelFormat::Fbx => "fbx",
            ModelFormat::Obj => "obj",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ModelFormat::Glb => "model/gltf-binary",
            ModelFormat::Fbx => "application/octet-stream",
            ModelFormat::Obj => "model/obj",
        }
    }

    /// Detect format from a file name or URL path
    pub fn from_file_name(name: &str) -> Option<Self> {
        let path = name.split(['?', '#']).next().unwrap_or(name);
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        ext.parse().ok()
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "glb" => Ok(ModelFormat::Glb),
            "fbx" => Ok(ModelFormat::Fbx),
            "obj" => Ok(ModelFormat::Obj),
            other => Err(format!("unsupported format: {}. use glb, fbx, or obj", other)),
        }
    }
}

// ============================================================================
// Asset record
// ============================================================================

/// Lifecycle of a stored generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Generating,
    Ready,
    Error,
}

impl AssetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetStatus::Pending => "pending",
            AssetStatus::Generating => "generating",
            AssetStatus::Ready => "ready",
            AssetStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AssetStatus::Ready | AssetStatus::Error)
    }
}

impl FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssetStatus::Pending),
            "generating" => Ok(AssetStatus::Generating),
            "ready" => Ok(AssetStatus::Ready),
            "error" => Ok(AssetStatus::Error),
            other => Err(format!("unknown asset status: {}", other)),
        }
    }
}

/// Durable record of one generation task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRecord {
    pub id: Uuid,
    pub name: String,
    pub prompt: String,
    pub enhanced_prompt: String,
    pub provider: ProviderKind,
    /// Join key between provider polling and local state
    pub provider_task_id: String,
    pub status: AssetStatus,
    pub format: ModelFormat,
    /// Local `/storage/...` path once materialized, otherwise empty or a provider URL
    pub file_path: String,
    pub thumbnail_path: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a generation is submitted
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub name: String,
    pub prompt: String,
    pub enhanced_prompt: Option<String>,
    pub provider: ProviderKind,
    pub provider_task_id: String,
    pub tags: Vec<String>,
}

/// Longest name stored for an asset
const MAX_NAME_CHARS: usize = 60;

impl NewAsset {
    /// Derive the display name from a prompt or file name
    pub fn name_from(source: &str) -> String {
        source.chars().take(MAX_NAME_CHARS).collect()
    }
}

impl AssetRecord {
    /// Build a freshly submitted record (`status = generating`)
    pub fn from_new(new: NewAsset) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            prompt: new.prompt,
            enhanced_prompt: new.enhanced_prompt.unwrap_or_default(),
            provider: new.provider,
            provider_task_id: new.provider_task_id,
            status: AssetStatus::Generating,
            format: ModelFormat::Glb,
            file_path: String::new(),
            thumbnail_path: String::new(),
            tags: new.tags,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_message() {
        let err = "unknown".parse::<ProviderKind>().unwrap_err();
        assert!(err.starts_with("unknown provider: unknown"));
    }

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in ProviderKind::ALL {
            assert_eq!(provider.as_str().parse::<ProviderKind>().unwrap(), provider);
        }
    }

    #[test]
    fn test_glb_only_providers_need_conversion() {
        for provider in [ProviderKind::Meshy, ProviderKind::Tripo, ProviderKind::Replicate] {
            assert!(provider.needs_conversion(ModelFormat::Fbx));
            assert!(provider.needs_conversion(ModelFormat::Obj));
            assert!(!provider.needs_conversion(ModelFormat::Glb));
        }
    }

    #[test]
    fn test_rodin_never_needs_conversion() {
        for format in [ModelFormat::Glb, ModelFormat::Fbx, ModelFormat::Obj] {
            assert!(!ProviderKind::Rodin.needs_conversion(format));
        }
    }

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(ModelFormat::from_file_name("chair.GLB"), Some(ModelFormat::Glb));
        assert_eq!(
            ModelFormat::from_file_name("https://cdn.example.com/out/model.fbx?sig=abc"),
            Some(ModelFormat::Fbx)
        );
        assert_eq!(ModelFormat::from_file_name("texture.png"), None);
        assert_eq!(ModelFormat::from_file_name("noext"), None);
    }

    #[test]
    fn test_name_is_truncated_on_char_boundary() {
        let long = "é".repeat(80);
        assert_eq!(NewAsset::name_from(&long).chars().count(), 60);
        assert_eq!(NewAsset::name_from("a robot"), "a robot");
    }

    #[test]
    fn test_new_record_starts_generating() {
        let record = AssetRecord::from_new(NewAsset {
            name: "robot".into(),
            prompt: "a robot".into(),
            enhanced_prompt: None,
            provider: ProviderKind::Meshy,
            provider_task_id: "task-1".into(),
            tags: vec!["provider:meshy".into()],
        });
        assert_eq!(record.status, AssetStatus::Generating);
        assert_eq!(record.format, ModelFormat::Glb);
        assert!(record.file_path.is_empty());
        assert!(!record.status.is_terminal());
    }
}
