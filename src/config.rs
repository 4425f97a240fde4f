// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Engine configuration

use crate::geometry::{BvhConfig, IntersectionParams};
use crate::pipeline::PipelineConfig;
use crate::registry::RegistryConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read by [`EngineConfig::load`] when present
pub const CONFIG_FILE: &str = "overlap.toml";

/// Top-level configuration for estimators and the silhouette pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// BVH build limits
    pub bvh: BvhConfig,
    /// Monte Carlo intersection parameters
    pub intersection: IntersectionParams,
    /// Silhouette job defaults
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `overlap.toml` if present, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `OVERLAP_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(samples) = lookup("OVERLAP_SAMPLES") {
            self.intersection.samples = parse_var("OVERLAP_SAMPLES", &samples)?;
        }

        if let Some(directions) = lookup("OVERLAP_DIRECTIONS") {
            self.intersection.directions = parse_var("OVERLAP_DIRECTIONS", &directions)?;
        }

        if let Some(seed) = lookup("OVERLAP_SEED") {
            self.intersection.seed = parse_var("OVERLAP_SEED", &seed)?;
        }

        if let Some(budget) = lookup("OVERLAP_TIME_BUDGET_MS") {
            self.pipeline.time_budget_ms = parse_var("OVERLAP_TIME_BUDGET_MS", &budget)?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Settings handed to a [`crate::registry::ShapeRegistry`]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            bvh: self.bvh,
            intersection: self.intersection,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SamplingRegion;
    use crate::pipeline::OutputMode;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = EngineConfig::default();
        config.intersection.region = SamplingRegion::BoundsUnion;
        config.pipeline.output_mode = OutputMode::Edges;
        config.bvh.max_leaf_size = 2;
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[intersection]\nsamples = 250\n").unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.intersection.samples, 250);
        assert_eq!(loaded.intersection.directions, 8);
        assert_eq!(loaded.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OVERLAP_SAMPLES", "1234"),
            ("OVERLAP_SEED", " 42 "),
            ("OVERLAP_TIME_BUDGET_MS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.intersection.samples, 1234);
        assert_eq!(config.intersection.seed, 42);
        assert_eq!(config.intersection.directions, 8);
        assert_eq!(config.pipeline.time_budget_ms, 5);

        let err = config
            .apply_env_overrides(|key| (key == "OVERLAP_DIRECTIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(format!("{err}").contains("OVERLAP_DIRECTIONS"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(EngineConfig::from_file(dir.path().join("absent.toml")).is_err());
    }
}
