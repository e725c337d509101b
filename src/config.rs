// src/config.rs

use std::fs::File;
use std::io::{BufReader, BufWriter};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::metronome::DEFAULT_BPM;
use crate::region::DEFAULT_LABEL;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PracticeConfig {
    /// Region store root, e.g. `https://example.com`. `None` runs local-only.
    pub api_base_url: Option<String>,
    pub default_bpm: u16,
    /// How often the engine reports the playhead while playing.
    pub tick_interval_ms: u64,
    /// New regions span this far either side of the playhead.
    pub region_half_width_secs: f64,
    pub default_label: String,
    pub log_level: String,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            default_bpm: DEFAULT_BPM,
            tick_interval_ms: 30,
            region_half_width_secs: 2.0,
            default_label: DEFAULT_LABEL.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl PracticeConfig {
    pub fn save_to_disk(&self, path: &str) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {path}"))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_from_disk(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {path}"))?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader).with_context(|| format!("parsing {path}"))?;
        Ok(config)
    }

    /// Overrides from the process environment (and `.env`, if present).
    pub fn apply_env(&mut self) {
        let _ = dotenv::dotenv();
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("PRACTICE_API_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            self.api_base_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(raw) = var("PRACTICE_BPM") {
            match raw.trim().parse::<u16>() {
                Ok(bpm) => self.default_bpm = bpm,
                Err(_) => log::warn!("ignoring PRACTICE_BPM={raw:?}: not a number"),
            }
        }
        if let Some(raw) = var("PRACTICE_TICK_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.tick_interval_ms = ms,
                _ => log::warn!("ignoring PRACTICE_TICK_MS={raw:?}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("practice.json");
        let path = path.to_str().unwrap();

        let config = PracticeConfig {
            api_base_url: Some("http://localhost:3000".into()),
            default_bpm: 88,
            ..PracticeConfig::default()
        };
        config.save_to_disk(path).unwrap();
        assert_eq!(PracticeConfig::load_from_disk(path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: PracticeConfig = serde_json::from_str(r#"{ "default_bpm": 72 }"#).unwrap();
        assert_eq!(config.default_bpm, 72);
        assert_eq!(config.tick_interval_ms, 30);
        assert_eq!(config.default_label, "Region");
        assert_eq!(config.api_base_url, None);
    }

    #[test]
    fn env_overrides_and_bad_numbers() {
        let vars: HashMap<&str, &str> = [
            ("PRACTICE_API_URL", "https://practice.test/"),
            ("PRACTICE_BPM", "fast"),
            ("PRACTICE_TICK_MS", "15"),
        ]
        .into_iter()
        .collect();

        let mut config = PracticeConfig::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_base_url.as_deref(), Some("https://practice.test"));
        assert_eq!(config.default_bpm, DEFAULT_BPM);
        assert_eq!(config.tick_interval_ms, 15);
    }
}
