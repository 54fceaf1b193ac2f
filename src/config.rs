use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the video redactor
///
/// Every section has defaults, so an empty TOML file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External binaries
    pub tools: ToolsConfig,

    /// Codecs for the intermediate and final streams
    pub encoding: EncodingConfig,

    /// Where run-scoped scratch files live
    pub workspace: WorkspaceConfig,

    /// Pixel-processing settings
    pub render: RenderConfig,

    /// Detection table parsing
    pub table: TableConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tools.validate()?;
        self.encoding.validate()?;
        self.render.validate()?;
        self.table.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl ToolsConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg.as_os_str().is_empty() {
            return Err(invalid("tools.ffmpeg", "").into());
        }
        if self.ffprobe.as_os_str().is_empty() {
            return Err(invalid("tools.ffprobe", "").into());
        }
        Ok(())
    }
}

/// Encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Codec of the video-only intermediate stream
    pub intermediate_codec: String,

    /// `-q:v` quality for the intermediate stream (1 = best, 31 = worst)
    pub intermediate_quality: u8,

    /// Codec of the final container's video stream
    pub video_codec: String,

    /// Codec of the final container's audio stream
    pub audio_codec: String,

    /// Pixel format handed to the encoders
    pub pixel_format: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            intermediate_codec: "mpeg4".to_string(),
            intermediate_quality: 2,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl EncodingConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("encoding.intermediate_codec", &self.intermediate_codec),
            ("encoding.video_codec", &self.video_codec),
            ("encoding.audio_codec", &self.audio_codec),
            ("encoding.pixel_format", &self.pixel_format),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(key, value).into());
            }
        }

        if !(1..=31).contains(&self.intermediate_quality) {
            return Err(invalid("encoding.intermediate_quality", self.intermediate_quality).into());
        }

        Ok(())
    }
}

/// Scratch-space settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory for run-scoped temp directories (OS temp dir when unset)
    pub temp_dir: Option<PathBuf>,

    /// Leave the intermediate files on disk after the run
    pub keep_temp: bool,
}

impl WorkspaceConfig {
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Pixel-processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Worker threads for the blur convolution
    pub threads: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(invalid("render.threads", self.threads).into());
        }
        Ok(())
    }
}

/// Detection table parsing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Field delimiter; sniffed from the header line when unset
    pub delimiter: Option<char>,
}

impl TableConfig {
    fn validate(&self) -> Result<()> {
        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' {
                return Err(invalid("table.delimiter", delimiter).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("redactor.toml");

        let mut original = Config::default();
        original.encoding.video_codec = "mpeg4".to_string();
        original.workspace.keep_temp = true;
        original.table.delimiter = Some('\t');

        original.save_to_file(&file_path).unwrap();
        let loaded = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded.encoding.video_codec, "mpeg4");
        assert!(loaded.workspace.keep_temp);
        assert_eq!(loaded.table.delimiter, Some('\t'));
        assert_eq!(loaded.render.threads, original.render.threads);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[encoding]\naudio_codec = \"libopus\"\n").unwrap();

        let loaded = Config::from_file(&file_path).unwrap();
        assert_eq!(loaded.encoding.audio_codec, "libopus");
        assert_eq!(loaded.encoding.video_codec, "libx264");
        assert_eq!(loaded.tools.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::error::RedactorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.render.threads = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.encoding.intermediate_quality = 40;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.encoding.audio_codec = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
