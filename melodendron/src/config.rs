// Generator configuration.
//
// `GeneratorConfig` gathers every knob of a train-then-generate run: which
// viewpoints the model predicts on, how much context it learns and uses, how
// long the output is, which selection policy fuses the viewpoints, the seed,
// and which MIDI tracks to read. It loads from JSON; any field left out takes
// its default, unknown fields are rejected. The CLI applies its flags on top
// of whatever was loaded.

use crate::error::{Error, Result};
use crate::selector::Policy;
use crate::viewpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Viewpoints the model predicts on, in order.
    pub viewpoints: Vec<String>,
    /// Longest context recorded during training.
    pub max_order: usize,
    /// Context length used during generation; also the seed length.
    pub order: usize,
    /// Number of states to generate, seed included.
    pub length: usize,
    pub policy: Policy,
    /// PRNG seed. `None` seeds from the clock.
    pub seed: Option<u64>,
    /// MIDI tracks to merge. `None` reads every track.
    pub tracks: Option<Vec<usize>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            viewpoints: viewpoint::CORE.iter().map(|v| v.to_string()).collect(),
            max_order: 8,
            order: 5,
            length: 200,
            policy: Policy::default(),
            seed: None,
            tracks: None,
        }
    }
}

impl GeneratorConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let config: GeneratorConfig = serde_json::from_str(data)?;
        Ok(config)
    }

    /// Reject settings no run could satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.viewpoints.is_empty() {
            return Err(Error::NoViewpoints);
        }
        if self.max_order == 0 {
            return Err(Error::InvalidConfig("max_order must be at least 1".into()));
        }
        if self.order == 0 {
            return Err(Error::InvalidConfig("order must be at least 1".into()));
        }
        if self.order > self.length {
            return Err(Error::InvalidConfig(format!(
                "order ({}) cannot exceed length ({})",
                self.order, self.length
            )));
        }
        match self.policy {
            Policy::ExponentialWeighted { factor } if !factor.is_finite() || factor <= 0.0 => {
                Err(Error::InvalidConfig(format!(
                    "exponential factor must be positive, got {factor}"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GeneratorConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.viewpoints,
            vec!["pitches", "on_duration", "off_duration", "total_duration"]
        );
        assert_eq!(config.policy, Policy::ExponentialWeighted { factor: 1.0 });
    }

    #[test]
    fn default_config_serializes() {
        let config = GeneratorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored = GeneratorConfig::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = GeneratorConfig::from_json(
            r#"{
                "viewpoints": ["pitches", "dynamic"],
                "order": 1,
                "policy": { "kind": "strict_intersection" },
                "tracks": [1, 2]
            }"#,
        )
        .unwrap();
        assert_eq!(config.viewpoints, vec!["pitches", "dynamic"]);
        assert_eq!(config.order, 1);
        assert_eq!(config.max_order, 8);
        assert_eq!(config.length, 200);
        assert_eq!(config.policy, Policy::StrictIntersection);
        assert_eq!(config.tracks, Some(vec![1, 2]));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "ordr": 3 }"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn large_exponential_factor_is_valid() {
        let config = GeneratorConfig {
            policy: Policy::ExponentialWeighted { factor: 1000.0 },
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn validation_catches_bad_values() {
        let bad = [
            GeneratorConfig {
                viewpoints: vec![],
                ..Default::default()
            },
            GeneratorConfig {
                max_order: 0,
                ..Default::default()
            },
            GeneratorConfig {
                order: 0,
                ..Default::default()
            },
            GeneratorConfig {
                order: 10,
                length: 5,
                ..Default::default()
            },
            GeneratorConfig {
                policy: Policy::ExponentialWeighted { factor: 0.0 },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }
}
