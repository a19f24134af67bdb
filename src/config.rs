use crate::timestamp;
use crate::transit::TransitWindow;
use chrono::Duration;
use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

/// Everything a pipeline run needs, resolved up front and passed in
/// explicitly. An optional `Config.toml` beside the binary overrides the
/// defaults; there are no CLI arguments.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Camera roll root. Must exist; checked before any work begins.
    pub root_dir: PathBuf,
    /// Google Photos Takeout root ("Takeout/Google Photos"). Optional.
    pub takeout_dir: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub extensions: Vec<String>,
    /// City-level precision for the heatmap buckets.
    pub heat_decimals: u32,
    /// Precision for the per-file reports and transit-point logs.
    pub report_decimals: u32,
    pub transit_buffer_hours: i64,
    /// Retain excluded transit points in the companion route structures
    /// instead of discarding them.
    pub keep_transit_points: bool,
    pub transit_windows: Vec<TransitWindowConfig>,
    pub landmark: LandmarkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitWindowConfig {
    pub name: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    pub enabled: bool,
    /// Detector command line: program followed by its arguments.
    pub command: Vec<String>,
    pub max_results: usize,
    pub max_qps: f64,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            root_dir: PathBuf::from("photos"),
            takeout_dir: None,
            out_dir: PathBuf::from("out"),
            extensions: ["jpg", "jpeg", "png", "heic", "tif", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            heat_decimals: 2,
            report_decimals: 7,
            transit_buffer_hours: 6,
            keep_transit_points: false,
            transit_windows: Vec::new(),
            landmark: LandmarkConfig::default(),
        }
    }
}

impl Default for LandmarkConfig {
    fn default() -> LandmarkConfig {
        LandmarkConfig {
            enabled: false,
            command: Vec::new(),
            max_results: 3,
            max_qps: 3.0,
        }
    }
}

impl PipelineConfig {
    pub fn load() -> Result<PipelineConfig, ConfigError> {
        Config::builder()
            .add_source(ConfigFile::with_name("Config").required(false))
            .build()?
            .try_deserialize()
    }

    pub fn index_path(&self) -> PathBuf {
        self.out_dir.join("scan_index.json")
    }

    pub fn located_path(&self) -> PathBuf {
        self.out_dir.join("photos_with.json")
    }

    pub fn unlocated_path(&self) -> PathBuf {
        self.out_dir.join("photos_without.json")
    }

    pub fn csv_path(&self) -> PathBuf {
        self.out_dir.join("exif_scan_report.csv")
    }

    pub fn heat_path(&self) -> PathBuf {
        self.out_dir.join("heat_data.js")
    }

    pub fn heat_backup_path(&self) -> PathBuf {
        self.out_dir.join("heat_data_backup.js")
    }

    pub fn transit_routes_path(&self) -> PathBuf {
        self.out_dir.join("transit_routes.js")
    }

    pub fn transit_buffer(&self) -> Duration {
        Duration::hours(self.transit_buffer_hours)
    }

    /// Parse the configured windows, in order. A window with an unparsable
    /// bound is warned about and skipped, not fatal.
    pub fn windows(&self) -> Vec<TransitWindow> {
        let mut windows = Vec::with_capacity(self.transit_windows.len());
        for window in &self.transit_windows {
            match (
                timestamp::normalize(&window.start),
                timestamp::normalize(&window.end),
            ) {
                (Some(start), Some(end)) => windows.push(TransitWindow {
                    name: window.name.clone(),
                    start,
                    end,
                }),
                _ => println!(
                    "⚠ transit window \"{}\" has unparsable bounds, skipping",
                    window.name
                ),
            }
        }
        windows
    }
}

impl LandmarkConfig {
    /// Minimum delay between detector calls for the configured QPS ceiling.
    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.max_qps.max(0.01))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = PipelineConfig::default();
        assert_eq!(config.heat_decimals, 2);
        assert_eq!(config.report_decimals, 7);
        assert_eq!(config.transit_buffer_hours, 6);
        assert!(config.extensions.contains(&"jpg".to_string()));
        assert!(!config.landmark.enabled);
        assert_eq!(config.index_path(), PathBuf::from("out/scan_index.json"));
    }

    #[test]
    fn windows_parse_in_configuration_order() {
        let config = PipelineConfig {
            transit_windows: vec![
                TransitWindowConfig {
                    name: "outbound".to_string(),
                    start: "2025-09-28 10:00:00".to_string(),
                    end: "2025-09-28 20:00:00".to_string(),
                },
                TransitWindowConfig {
                    name: "return".to_string(),
                    start: "2025-10-08 12:00:00".to_string(),
                    end: "2025-10-09 18:00:00".to_string(),
                },
            ],
            ..PipelineConfig::default()
        };

        let windows = config.windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].name, "outbound");
        assert_eq!(windows[1].name, "return");
        assert!(windows[0].start < windows[0].end);
    }

    #[test]
    fn unparsable_window_is_skipped() {
        let config = PipelineConfig {
            transit_windows: vec![
                TransitWindowConfig {
                    name: "broken".to_string(),
                    start: "whenever".to_string(),
                    end: "2025-10-09 18:00:00".to_string(),
                },
                TransitWindowConfig {
                    name: "good".to_string(),
                    start: "2025-10-08 12:00:00".to_string(),
                    end: "2025-10-09 18:00:00".to_string(),
                },
            ],
            ..PipelineConfig::default()
        };

        let windows = config.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].name, "good");
    }

    #[test]
    fn qps_ceiling_sets_the_pause() {
        let landmark = LandmarkConfig {
            max_qps: 4.0,
            ..LandmarkConfig::default()
        };
        assert_eq!(landmark.pause(), std::time::Duration::from_millis(250));
    }
}
