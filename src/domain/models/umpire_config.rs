//! The Umpire configuration document: rulesets, services and bundles.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ruleset::Rule;
use super::service::ServiceProcessConfig;
use crate::domain::errors::UmpireConfigError;
use crate::domain::ports::ResourceStore;

/// One bundle of factory software and resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bundle {
    /// Unique key for this bundle
    pub id: String,
    #[serde(default)]
    pub note: String,
    /// Resource name of the payload config of this bundle
    pub payloads: String,
}

/// Settings of one named service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    /// Default service state on deploy
    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub processes: Vec<ServiceProcessConfig>,
}

const fn default_active() -> bool {
    true
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            active: default_active(),
            processes: Vec::new(),
        }
    }
}

/// Top level Umpire config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UmpireConfig {
    pub rulesets: Vec<Rule>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceSection>,

    #[serde(default)]
    pub bundles: Vec<Bundle>,
}

impl UmpireConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(text: &str) -> Result<Self, UmpireConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| UmpireConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document and validate it.
    pub fn from_yaml(text: &str) -> Result<Self, UmpireConfigError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| UmpireConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.yaml`/`.yml` files are read as YAML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self, UmpireConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| UmpireConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Semantic checks beyond the schema.
    pub fn validate(&self) -> Result<(), UmpireConfigError> {
        let mut seen = HashSet::new();
        for bundle in &self.bundles {
            if !seen.insert(bundle.id.as_str()) {
                return Err(UmpireConfigError::DuplicateBundle(bundle.id.clone()));
            }
        }
        for (name, section) in &self.services {
            let mut names = HashSet::new();
            for process in &section.processes {
                if !names.insert(process.name.as_str()) {
                    return Err(UmpireConfigError::Schema(format!(
                        "service {name} has duplicate process name {}",
                        process.name
                    )));
                }
            }
        }
        if self.default_bundle().is_none() {
            return Err(UmpireConfigError::MissingDefaultBundle);
        }
        Ok(())
    }

    pub fn bundle(&self, bundle_id: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.id == bundle_id)
    }

    /// The bundle of the first active rule.
    pub fn default_bundle(&self) -> Option<&Bundle> {
        self.rulesets
            .iter()
            .find(|r| r.active)
            .and_then(|r| self.bundle(&r.bundle_id))
    }

    /// Bundles referenced by active rules, in rule order, without repeats.
    pub fn active_bundles(&self) -> Vec<&Bundle> {
        let mut seen = HashSet::new();
        self.rulesets
            .iter()
            .filter(|r| r.active)
            .filter_map(|r| self.bundle(&r.bundle_id))
            .filter(|b| seen.insert(b.id.as_str()))
            .collect()
    }

    /// Names of services that should run under this config.
    pub fn active_service_names(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|(_, s)| s.active)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Check every `file`/`partN` resource referenced by every active bundle.
    ///
    /// All missing resources are reported in one error.
    pub fn validate_resources(&self, store: &dyn ResourceStore) -> Result<(), UmpireConfigError> {
        let mut missing = Vec::new();
        for bundle in self.active_bundles() {
            let payloads = match load_payloads(store, &bundle.payloads) {
                Ok(payloads) => payloads,
                Err(reason) => {
                    missing.push(format!(
                        "[NOT FOUND] payload config {:?} for bundle {:?}: {reason}",
                        bundle.payloads, bundle.id
                    ));
                    continue;
                }
            };
            for (type_name, parts) in &payloads {
                for (part, value) in parts {
                    if !is_resource_part(part) {
                        continue;
                    }
                    let Some(res_name) = value.as_str() else {
                        continue;
                    };
                    if !store.resource_exists(res_name) {
                        missing.push(format!(
                            "[NOT FOUND] resource {type_name}:{part}:{res_name:?} for bundle {:?}",
                            bundle.id
                        ));
                    }
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(UmpireConfigError::ResourceMissing(missing))
        }
    }
}

type PayloadMap = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

fn load_payloads(store: &dyn ResourceStore, name: &str) -> Result<PayloadMap, String> {
    let bytes = store.read_resource(name).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

/// `file` or `part<digits>`.
fn is_resource_part(part: &str) -> bool {
    part == "file"
        || part
            .strip_prefix("part")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Active rules added and deleted between two configs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RulesetDiff {
    pub added: Vec<Rule>,
    pub deleted: Vec<Rule>,
}

impl RulesetDiff {
    pub fn between(original: &UmpireConfig, new: &UmpireConfig) -> Self {
        let old_active: Vec<&Rule> = original.rulesets.iter().filter(|r| r.active).collect();
        let new_active: Vec<&Rule> = new.rulesets.iter().filter(|r| r.active).collect();
        Self {
            added: new_active
                .iter()
                .filter(|r| !old_active.contains(r))
                .map(|r| (*r).clone())
                .collect(),
            deleted: old_active
                .iter()
                .filter(|r| !new_active.contains(r))
                .map(|r| (*r).clone())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Human readable listing.
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut dump = |title: &str, rules: &[Rule]| {
            if rules.is_empty() {
                return;
            }
            lines.push(title.to_string());
            for rule in rules {
                let text = serde_json::to_string_pretty(rule).unwrap_or_default();
                lines.extend(text.lines().map(|l| format!("  {l}")));
            }
        };
        dump("Newly added rulesets:", &self.added);
        dump("Deleted rulesets:", &self.deleted);
        lines
    }
}
