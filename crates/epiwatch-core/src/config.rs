//! Typed configuration for nodes and the overseer.
//!
//! Configuration is deserialized from a YAML file into strongly-typed
//! structs and validated at construction: role parameters live in
//! per-role structs, probabilities must be actual probabilities, and
//! cadences must be positive before a process is allowed to start. The
//! `NATS_URL` environment variable overrides the configured bus URL,
//! matching how deployments point a whole fleet at one broker.
//!
//! Producing the file (CLI flags, provisioning tooling) is outside the
//! core; these types are the boundary it hands a validated `Config`
//! across.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use epiwatch_types::{NodeId, Role};

/// Default bus URL when neither the file nor the environment names one.
const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The file parsed but describes an unusable deployment.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of the rejected value.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Message-bus connection settings shared by every process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusConfig {
    /// NATS server URL (e.g. `nats://localhost:4222`).
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
}

fn default_nats_url() -> String {
    DEFAULT_NATS_URL.to_owned()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
        }
    }
}

impl BusConfig {
    /// Apply the `NATS_URL` environment override, if set.
    fn apply_env_override(&mut self) {
        if let Ok(url) = std::env::var("NATS_URL") {
            self.nats_url = url;
        }
    }
}

/// How a record source draws disease occurrences each tick.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum GenerationModel {
    /// Uniform Bernoulli draw against a fixed probability.
    Random {
        /// Occurrence probability per disease per tick, in `[0, 1]`.
        probability: f64,
    },
    /// Probability oscillates sinusoidally over the wall-clock second
    /// between the configured bounds.
    Sine {
        /// Lower probability bound, in `[0, 1]`.
        min_probability: f64,
        /// Upper probability bound, in `[0, 1]`.
        max_probability: f64,
    },
}

impl GenerationModel {
    fn validate(&self) -> Result<(), ConfigError> {
        let check = |name: &str, p: f64| -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(ConfigError::Invalid {
                    reason: format!("{name} must be within [0, 1], got {p}"),
                })
            }
        };
        match *self {
            Self::Random { probability } => check("probability", probability),
            Self::Sine {
                min_probability,
                max_probability,
            } => {
                check("min_probability", min_probability)?;
                check("max_probability", max_probability)?;
                if min_probability > max_probability {
                    return Err(ConfigError::Invalid {
                        reason: format!(
                            "min_probability {min_probability} exceeds max_probability \
                             {max_probability}"
                        ),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Parameters for a record source node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordSourceParameters {
    /// Occurrence generator for every configured disease.
    pub disease_generation: GenerationModel,
    /// Simulated hours between outbreak queries to the aggregator.
    pub outbreak_query_frequency_hours: f64,
}

/// Parameters for a district aggregator node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DistrictAggregatorParameters {
    /// Simulated hours between daily-count broadcasts.
    pub daily_count_send_frequency_hours: f64,
}

/// Parameters for an outbreak analyzer node.
///
/// Each analyzer watches exactly one disease; a deployment covers more
/// diseases by running more analyzers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutbreakAnalyzerParameters {
    /// The disease this analyzer watches.
    pub disease: String,
    /// Daily total at or above which an outbreak alert is raised.
    pub daily_outbreak_threshold: u64,
}

/// Role-specific parameters, keyed by role in the YAML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleParameters {
    /// Parameters for a record source.
    RecordSource(RecordSourceParameters),
    /// Parameters for a district aggregator.
    DistrictAggregator(DistrictAggregatorParameters),
    /// Parameters for an outbreak analyzer.
    OutbreakAnalyzer(OutbreakAnalyzerParameters),
}

impl RoleParameters {
    /// The role these parameters belong to.
    pub const fn role(&self) -> Role {
        match self {
            Self::RecordSource(_) => Role::RecordSource,
            Self::DistrictAggregator(_) => Role::DistrictAggregator,
            Self::OutbreakAnalyzer(_) => Role::OutbreakAnalyzer,
        }
    }
}

/// Complete configuration for one node process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeConfig {
    /// This node's operator-assigned id.
    pub node_id: NodeId,
    /// The role this node plays.
    pub role: Role,
    /// Role-specific parameters; must match `role`.
    #[serde(with = "serde_yml::with::singleton_map")]
    pub role_parameters: RoleParameters,
    /// Peer node ids this node connects to (role-dependent meaning).
    #[serde(default)]
    pub connections: Vec<NodeId>,
    /// Diseases tracked by this deployment.
    pub diseases: Vec<String>,
    /// Wall-clock to simulated-time multiplier.
    pub time_scaling_factor: f64,
    /// Message-bus connection settings.
    #[serde(default)]
    pub bus: BusConfig,
}

impl NodeConfig {
    /// Load, env-override, and validate a node configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] / [`ConfigError::Yaml`] on read or
    /// parse failures and [`ConfigError::Invalid`] on rejected values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse, env-override, and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Same contract as [`NodeConfig::load`], minus the I/O.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(text)?;
        config.bus.apply_env_override();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.role_parameters.role() != self.role {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "role is {} but role_parameters are for {}",
                    self.role,
                    self.role_parameters.role()
                ),
            });
        }
        if !self.time_scaling_factor.is_finite() || self.time_scaling_factor <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "time_scaling_factor must be finite and positive, got {}",
                    self.time_scaling_factor
                ),
            });
        }
        if self.diseases.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one disease must be configured".to_owned(),
            });
        }

        match &self.role_parameters {
            RoleParameters::RecordSource(params) => {
                params.disease_generation.validate()?;
                positive_frequency(
                    "outbreak_query_frequency_hours",
                    params.outbreak_query_frequency_hours,
                )?;
                if self.connections.len() != 1 {
                    return Err(ConfigError::Invalid {
                        reason: format!(
                            "a record source connects to exactly one aggregator, got {}",
                            self.connections.len()
                        ),
                    });
                }
            }
            RoleParameters::DistrictAggregator(params) => {
                positive_frequency(
                    "daily_count_send_frequency_hours",
                    params.daily_count_send_frequency_hours,
                )?;
            }
            RoleParameters::OutbreakAnalyzer(params) => {
                if params.disease.is_empty() {
                    return Err(ConfigError::Invalid {
                        reason: "outbreak analyzer disease must be non-empty".to_owned(),
                    });
                }
                if params.daily_outbreak_threshold == 0 {
                    return Err(ConfigError::Invalid {
                        reason: "daily_outbreak_threshold must be at least 1".to_owned(),
                    });
                }
                if self.connections.is_empty() {
                    return Err(ConfigError::Invalid {
                        reason: "an outbreak analyzer needs at least one aggregator connection"
                            .to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn positive_frequency(name: &str, hours: f64) -> Result<(), ConfigError> {
    if hours.is_finite() && hours > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            reason: format!("{name} must be finite and positive, got {hours}"),
        })
    }
}

/// Complete configuration for the overseer process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverseerConfig {
    /// Every node id expected to register for this run.
    pub nodes: Vec<NodeId>,
    /// Message-bus connection settings.
    #[serde(default)]
    pub bus: BusConfig,
    /// Log file handed to the post-run command, if any.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// External command invoked with the log file path at shutdown
    /// (stands in for the deployment's log-upload collaborator).
    #[serde(default)]
    pub post_log_command: Option<String>,
}

impl OverseerConfig {
    /// Load, env-override, and validate an overseer configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] / [`ConfigError::Yaml`] on read or
    /// parse failures and [`ConfigError::Invalid`] on rejected values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse, env-override, and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Same contract as [`OverseerConfig::load`], minus the I/O.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(text)?;
        config.bus.apply_env_override();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one node must be configured".to_owned(),
            });
        }
        let distinct: BTreeSet<&NodeId> = self.nodes.iter().collect();
        if distinct.len() != self.nodes.len() {
            return Err(ConfigError::Invalid {
                reason: "node ids must be distinct".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn record_source_config_parses_and_validates() {
        let yaml = r#"
node_id: emr_1
role: record_source
role_parameters:
  record_source:
    disease_generation:
      model: random
      probability: 0.3
    outbreak_query_frequency_hours: 1.0
connections: [hds_1]
diseases: [measles, influenza]
time_scaling_factor: 1800.0
"#;
        let config = NodeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.node_id, NodeId::new("emr_1"));
        assert_eq!(config.role, Role::RecordSource);
        assert_eq!(config.connections, vec![NodeId::new("hds_1")]);
    }

    #[test]
    fn sine_generation_parses_with_bounds() {
        let yaml = r#"
node_id: emr_2
role: record_source
role_parameters:
  record_source:
    disease_generation:
      model: sine
      min_probability: 0.2
      max_probability: 0.8
    outbreak_query_frequency_hours: 2.0
connections: [hds_1]
diseases: [measles]
time_scaling_factor: 1800.0
"#;
        let config = NodeConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.role_parameters,
            RoleParameters::RecordSource(RecordSourceParameters {
                disease_generation: GenerationModel::Sine { .. },
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let yaml = r#"
node_id: emr_1
role: record_source
role_parameters:
  record_source:
    disease_generation:
      model: random
      probability: 1.5
    outbreak_query_frequency_hours: 1.0
connections: [hds_1]
diseases: [measles]
time_scaling_factor: 1800.0
"#;
        assert!(matches!(
            NodeConfig::from_yaml(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn mismatched_role_and_parameters_are_rejected() {
        let yaml = r#"
node_id: hds_1
role: district_aggregator
role_parameters:
  outbreak_analyzer:
    disease: measles
    daily_outbreak_threshold: 10
connections: [doa_1]
diseases: [measles]
time_scaling_factor: 1800.0
"#;
        assert!(matches!(
            NodeConfig::from_yaml(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn record_source_needs_exactly_one_connection() {
        let yaml = r#"
node_id: emr_1
role: record_source
role_parameters:
  record_source:
    disease_generation:
      model: random
      probability: 0.5
    outbreak_query_frequency_hours: 1.0
connections: [hds_1, hds_2]
diseases: [measles]
time_scaling_factor: 1800.0
"#;
        assert!(matches!(
            NodeConfig::from_yaml(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let yaml = r#"
node_id: doa_1
role: outbreak_analyzer
role_parameters:
  outbreak_analyzer:
    disease: measles
    daily_outbreak_threshold: 0
connections: [hds_1]
diseases: [measles]
time_scaling_factor: 1800.0
"#;
        assert!(matches!(
            NodeConfig::from_yaml(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn overseer_config_requires_distinct_nodes() {
        let ok = OverseerConfig::from_yaml("nodes: [emr_1, hds_1, doa_1]\n").unwrap();
        assert_eq!(ok.nodes.len(), 3);
        assert_eq!(ok.bus.nats_url, "nats://localhost:4222");

        assert!(matches!(
            OverseerConfig::from_yaml("nodes: [emr_1, emr_1]\n"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            OverseerConfig::from_yaml("nodes: []\n"),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
