//! Model format conversion through the `assimp` command-line tool
//!
//! Every conversion gets its own scratch directory (`model-convert-<uuid>`)
//! holding `input.<from>` and `output.<to>`. The directory is removed on every
//! exit path, including timeouts, where the child process is killed first.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::ModelFormat;
use forge_common::config::ConverterConfig;

/// Formats the converter can produce
pub const OUTPUT_FORMATS: [ModelFormat; 2] = [ModelFormat::Fbx, ModelFormat::Obj];

/// Budget for the `assimp version` availability check
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Converter errors
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Requested output format is not one the converter produces (400)
    #[error("{0}")]
    Validation(String),

    /// Conversion tool is not installed (503)
    #[error("assimp is not installed - cannot convert model formats. install with: sudo apt-get install assimp-utils")]
    Unavailable,

    /// Tool exceeded its time budget and was killed (500)
    #[error("model conversion timed out")]
    TimedOut,

    /// Tool exited unsuccessfully or scratch I/O failed (500)
    #[error("model conversion failed: {0}")]
    Failed(String),
}

impl From<std::io::Error> for ConversionError {
    fn from(err: std::io::Error) -> Self {
        ConversionError::Failed(err.to_string())
    }
}

fn unsupported_output(requested: &str) -> ConversionError {
    let supported: Vec<&str> = OUTPUT_FORMATS.iter().map(|f| f.extension()).collect();
    ConversionError::Validation(format!(
        "unsupported output format: {}. supported: {}",
        requested,
        supported.join(", ")
    ))
}

/// Parse a requested output format, accepting only converter outputs
pub fn parse_output_format(requested: &str) -> Result<ModelFormat, ConversionError> {
    let normalized = requested.trim().to_ascii_lowercase();
    match normalized.parse::<ModelFormat>() {
        Ok(format) if OUTPUT_FORMATS.contains(&format) => Ok(format),
        _ => Err(unsupported_output(requested.trim())),
    }
}

/// Byte-in, byte-out format conversion
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Whether the underlying tool can be run
    async fn is_available(&self) -> bool;

    /// Convert `input` (encoded as `from`) into `to`
    async fn convert(
        &self,
        input: &[u8],
        from: ModelFormat,
        to: ModelFormat,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// Converter backed by `assimp export <in> <out>`
pub struct AssimpConverter {
    binary: String,
    timeout: Duration,
    temp_root: PathBuf,
    available: OnceCell<bool>,
}

impl AssimpConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self::with_temp_root(config, std::env::temp_dir())
    }

    /// Place scratch directories under `temp_root` instead of the OS temp dir
    pub fn with_temp_root(config: &ConverterConfig, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: config.timeout,
            temp_root: temp_root.into(),
            available: OnceCell::new(),
        }
    }

    /// Run `assimp version` once; the answer is cached for the process lifetime
    pub async fn check_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let available = self.run_version_check().await;
                if available {
                    info!(binary = %self.binary, "Model converter available");
                } else {
                    warn!(
                        binary = %self.binary,
                        "assimp cli not found - model format conversion unavailable. install with: sudo apt-get install assimp-utils"
                    );
                }
                available
            })
            .await
    }

    async fn run_version_check(&self) -> bool {
        let mut command = Command::new(&self.binary);
        command
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(VERSION_CHECK_TIMEOUT, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(binary = %self.binary, error = %e, "Converter version check failed to start");
                false
            }
            Err(_) => {
                debug!(binary = %self.binary, "Converter version check timed out");
                false
            }
        }
    }

    async fn run_export(
        &self,
        scratch: &Path,
        input: &[u8],
        from: ModelFormat,
        to: ModelFormat,
    ) -> Result<Vec<u8>, ConversionError> {
        let input_path = scratch.join(format!("input.{}", from.extension()));
        let output_path = scratch.join(format!("output.{}", to.extension()));

        tokio::fs::create_dir_all(scratch).await?;
        tokio::fs::write(&input_path, input).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg("export")
            .arg(&input_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConversionError::TimedOut),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                format!("exit code {:?}", output.status.code())
            } else {
                stderr
            };
            return Err(ConversionError::Failed(detail));
        }

        Ok(tokio::fs::read(&output_path).await?)
    }
}

#[async_trait]
impl FormatConverter for AssimpConverter {
    async fn is_available(&self) -> bool {
        self.check_available().await
    }

    async fn convert(
        &self,
        input: &[u8],
        from: ModelFormat,
        to: ModelFormat,
    ) -> Result<Vec<u8>, ConversionError> {
        // Validation never spawns anything
        if !OUTPUT_FORMATS.contains(&to) {
            return Err(unsupported_output(to.extension()));
        }

        if !self.check_available().await {
            return Err(ConversionError::Unavailable);
        }

        let scratch = self
            .temp_root
            .join(format!("model-convert-{}", Uuid::new_v4()));

        debug!(
            from = %from,
            to = %to,
            input_bytes = input.len(),
            scratch = %scratch.display(),
            "Converting model"
        );

        let result = self.run_export(&scratch, input, from, to).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(scratch = %scratch.display(), error = %e, "Failed to remove conversion scratch directory");
            }
        }

        match &result {
            Ok(output) => info!(from = %from, to = %to, output_bytes = output.len(), "Model converted"),
            Err(e) => warn!(from = %from, to = %to, error = %e, "Model conversion failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_format() {
        assert_eq!(parse_output_format("fbx").unwrap(), ModelFormat::Fbx);
        assert_eq!(parse_output_format(" OBJ ").unwrap(), ModelFormat::Obj);

        let err = parse_output_format("glb").unwrap_err();
        assert_eq!(err.to_string(), "unsupported output format: glb. supported: fbx, obj");
        assert!(matches!(parse_output_format("stl"), Err(ConversionError::Validation(_))));
    }

    #[tokio::test]
    async fn test_glb_output_rejected_before_version_check() {
        let converter = AssimpConverter::new(&ConverterConfig {
            binary: "/nonexistent/assimp".to_string(),
            timeout: Duration::from_secs(1),
        });

        let err = converter
            .convert(b"glTF", ModelFormat::Obj, ModelFormat::Glb)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Validation(_)));
        // Validation short-circuits, so the version check never ran
        assert!(converter.available.get().is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let converter = AssimpConverter::new(&ConverterConfig {
            binary: "/nonexistent/assimp".to_string(),
            timeout: Duration::from_secs(1),
        });

        assert!(!converter.is_available().await);
        let err = converter
            .convert(b"glTF", ModelFormat::Glb, ModelFormat::Fbx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Unavailable));
        assert!(err.to_string().contains("assimp-utils"));
    }
}
