//! Pager configuration.
//!
//! Settings are layered: built-in defaults, then `~/.chunk-pager/config.toml`,
//! then environment and command line (clap fills both into the same layer).

use clap::ValueEnum;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SEGMENT_COUNT: usize = 999;
pub const DEFAULT_SETTLE_MS: u64 = 20;
pub const DEFAULT_TEMPLATE: &str = "doc_list_chunk_{index}.pdx";
pub const DEFAULT_DEMO_RECORDS: usize = 40;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to determine home directory")]
    NoHome,
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("choose exactly one data source (--url, --dir or --demo)")]
    AmbiguousSource,
    #[error("no data source configured; pass --url, --dir or --demo")]
    MissingSource,
    #[error("segment count must be at least 1")]
    NoSegments,
    #[error("placeholder extent must be greater than zero")]
    ZeroPlaceholder,
    #[error(
        "{segments} segments of {placeholder} units exceed the {profile:?} profile limit of {max} units"
    )]
    ExtentTooLarge {
        segments: usize,
        placeholder: u64,
        profile: RenderProfile,
        max: u64,
    },
}

/// Size tiers for unloaded segments. A surface can only lay out a bounded
/// total extent, so the placeholder reserved per segment has to shrink as
/// that bound gets tighter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderProfile {
    Compact,
    Standard,
    #[default]
    Wide,
}

impl RenderProfile {
    pub fn placeholder_extent(self) -> u64 {
        match self {
            RenderProfile::Compact => 4_500,
            RenderProfile::Standard => 15_000,
            RenderProfile::Wide => 22_000,
        }
    }

    pub fn max_document_extent(self) -> u64 {
        match self {
            RenderProfile::Compact => 5_000_037,
            RenderProfile::Standard => 17_660_130,
            RenderProfile::Wide => 33_554_400,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceConfig {
    Http { template: String },
    Dir { root: PathBuf, template: String },
    Demo { records_per_segment: usize },
}

/// One layer of optional settings. The file layer and the command line layer
/// share this shape; [`ConfigLayer::merge`] lets the later layer win.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub url: Option<String>,
    pub dir: Option<PathBuf>,
    pub template: Option<String>,
    pub demo: Option<bool>,
    pub demo_records: Option<usize>,
    pub segments: Option<usize>,
    pub profile: Option<RenderProfile>,
    pub placeholder_extent: Option<u64>,
    pub settle_ms: Option<u64>,
}

impl ConfigLayer {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = BaseDirs::new().ok_or(ConfigError::NoHome)?;
        Ok(base.home_dir().join(".chunk-pager").join("config.toml"))
    }

    /// Reads a config file; a missing file is an empty layer.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            url: over.url.or(self.url),
            dir: over.dir.or(self.dir),
            template: over.template.or(self.template),
            demo: over.demo.or(self.demo),
            demo_records: over.demo_records.or(self.demo_records),
            segments: over.segments.or(self.segments),
            profile: over.profile.or(self.profile),
            placeholder_extent: over.placeholder_extent.or(self.placeholder_extent),
            settle_ms: over.settle_ms.or(self.settle_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagerConfig {
    pub source: SourceConfig,
    pub segment_count: usize,
    pub profile: RenderProfile,
    pub placeholder_extent: u64,
    pub settle_quiet: Duration,
}

impl PagerConfig {
    pub fn resolve(layer: ConfigLayer) -> Result<Self, ConfigError> {
        let template = layer
            .template
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        let demo = layer.demo.unwrap_or(false);
        let source = match (layer.url, layer.dir, demo) {
            (Some(url), None, false) => {
                let template = if url.contains(crate::source::INDEX_PLACEHOLDER) {
                    url
                } else {
                    format!("{}/{template}", url.trim_end_matches('/'))
                };
                SourceConfig::Http { template }
            }
            (None, Some(root), false) => SourceConfig::Dir { root, template },
            (None, None, true) => SourceConfig::Demo {
                records_per_segment: layer.demo_records.unwrap_or(DEFAULT_DEMO_RECORDS),
            },
            (None, None, false) => return Err(ConfigError::MissingSource),
            _ => return Err(ConfigError::AmbiguousSource),
        };
        let profile = layer.profile.unwrap_or_default();
        let config = Self {
            source,
            segment_count: layer.segments.unwrap_or(DEFAULT_SEGMENT_COUNT),
            profile,
            placeholder_extent: layer
                .placeholder_extent
                .unwrap_or_else(|| profile.placeholder_extent()),
            settle_quiet: Duration::from_millis(layer.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_count == 0 {
            return Err(ConfigError::NoSegments);
        }
        if self.placeholder_extent == 0 {
            return Err(ConfigError::ZeroPlaceholder);
        }
        let max = self.profile.max_document_extent();
        let total = self.placeholder_extent.saturating_mul(self.segment_count as u64);
        if total > max {
            return Err(ConfigError::ExtentTooLarge {
                segments: self.segment_count,
                placeholder: self.placeholder_extent,
                profile: self.profile,
                max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> ConfigLayer {
        ConfigLayer {
            demo: Some(true),
            ..ConfigLayer::default()
        }
    }

    #[test]
    fn defaults_follow_the_wide_profile() {
        let config = PagerConfig::resolve(demo()).unwrap();
        assert_eq!(config.segment_count, 999);
        assert_eq!(config.profile, RenderProfile::Wide);
        assert_eq!(config.placeholder_extent, 22_000);
        assert_eq!(config.settle_quiet, Duration::from_millis(20));
        assert_eq!(
            config.source,
            SourceConfig::Demo {
                records_per_segment: DEFAULT_DEMO_RECORDS
            }
        );
    }

    #[test]
    fn every_profile_fits_the_default_segment_count() {
        for profile in [
            RenderProfile::Compact,
            RenderProfile::Standard,
            RenderProfile::Wide,
        ] {
            let layer = ConfigLayer {
                profile: Some(profile),
                ..demo()
            };
            let config = PagerConfig::resolve(layer).unwrap();
            assert_eq!(config.placeholder_extent, profile.placeholder_extent());
        }
    }

    #[test]
    fn rejects_extents_beyond_the_profile_limit() {
        let layer = ConfigLayer {
            profile: Some(RenderProfile::Compact),
            placeholder_extent: Some(22_000),
            ..demo()
        };
        assert!(matches!(
            PagerConfig::resolve(layer),
            Err(ConfigError::ExtentTooLarge { max: 5_000_037, .. })
        ));
        let layer = ConfigLayer {
            segments: Some(0),
            ..demo()
        };
        assert!(matches!(PagerConfig::resolve(layer), Err(ConfigError::NoSegments)));
    }

    #[test]
    fn source_selection_is_exclusive() {
        assert!(matches!(
            PagerConfig::resolve(ConfigLayer::default()),
            Err(ConfigError::MissingSource)
        ));
        let both = ConfigLayer {
            url: Some("http://host".into()),
            dir: Some(PathBuf::from("/data")),
            ..ConfigLayer::default()
        };
        assert!(matches!(
            PagerConfig::resolve(both),
            Err(ConfigError::AmbiguousSource)
        ));
    }

    #[test]
    fn base_urls_get_the_segment_template() {
        let layer = ConfigLayer {
            url: Some("http://host/shared/".into()),
            ..ConfigLayer::default()
        };
        assert_eq!(
            PagerConfig::resolve(layer).unwrap().source,
            SourceConfig::Http {
                template: "http://host/shared/doc_list_chunk_{index}.pdx".into()
            }
        );
        let layer = ConfigLayer {
            url: Some("http://host/c{index}.txt".into()),
            template: Some("ignored_{index}".into()),
            ..ConfigLayer::default()
        };
        assert_eq!(
            PagerConfig::resolve(layer).unwrap().source,
            SourceConfig::Http {
                template: "http://host/c{index}.txt".into()
            }
        );
    }

    #[test]
    fn file_layer_is_overridden_by_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "dir = \"/srv/chunks\"\nsegments = 12\nprofile = \"standard\"\nsettle_ms = 50\n",
        )
        .unwrap();
        let file = ConfigLayer::load(&path).unwrap();
        assert_eq!(file.segments, Some(12));

        let cli = ConfigLayer {
            settle_ms: Some(5),
            ..ConfigLayer::default()
        };
        let config = PagerConfig::resolve(file.merge(cli)).unwrap();
        assert_eq!(config.segment_count, 12);
        assert_eq!(config.profile, RenderProfile::Standard);
        assert_eq!(config.placeholder_extent, 15_000);
        assert_eq!(config.settle_quiet, Duration::from_millis(5));
        assert_eq!(
            config.source,
            SourceConfig::Dir {
                root: PathBuf::from("/srv/chunks"),
                template: DEFAULT_TEMPLATE.into()
            }
        );
    }

    #[test]
    fn missing_file_is_empty_and_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ConfigLayer::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing, ConfigLayer::default());

        let path = dir.path().join("bad.toml");
        fs::write(&path, "colour = \"blue\"\n").unwrap();
        assert!(matches!(
            ConfigLayer::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
