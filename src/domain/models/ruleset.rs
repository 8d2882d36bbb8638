//! Bundle selection rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::dut::{DutIdentity, DUT_INFO_KEYS};

/// Suffix that turns an attribute into an inclusive range matcher.
pub const RANGE_SUFFIX: &str = "_range";

/// Attributes that may be matched by range.
const RANGE_KEYS: &[&str] = &["sn", "mlb_sn"];

/// Open end of a range.
pub const OPEN_END: &str = "-";

/// One rule of a ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// The target bundle
    pub bundle_id: String,

    /// Rules with `active = false` are skipped.
    pub active: bool,

    /// Brief summary of this rule
    #[serde(default)]
    pub note: String,

    /// No matcher means the rule matches every DUT.
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub matcher: Option<RuleMatch>,

    /// Stages at which each update component may be pushed to the DUT.
    /// Carried through untouched; bundle selection does not read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_update: Option<EnableUpdate>,
}

/// Factory stage range: `[from, to]`, either end may be null.
pub type StageRange = Vec<Option<String>>;

/// Per-component update stage ranges of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnableUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_factory_toolkit: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_bios: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_ec: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_pd: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs_release: Option<StageRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs_test: Option<StageRange>,
}

impl Rule {
    /// Unconditional rule, usually the last one of a ruleset.
    pub fn fallback(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            active: true,
            note: String::new(),
            matcher: None,
            enable_update: None,
        }
    }

    pub fn matches(&self, dut: &DutIdentity) -> bool {
        self.matcher.as_ref().is_none_or(|m| m.matches(dut))
    }
}

/// A single condition of a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchCondition {
    /// Some value of `key` (or `key.<suffix>`) equals one of `values`.
    AnyOf { key: String, values: Vec<String> },
    /// `low <= dut[key] <= high`, lexicographically; `None` is unbounded.
    Range {
        key: String,
        low: Option<String>,
        high: Option<String>,
    },
}

impl MatchCondition {
    pub fn matches(&self, dut: &DutIdentity) -> bool {
        match self {
            Self::AnyOf { key, values } => dut
                .values_with_prefix(key)
                .any(|v| values.iter().any(|candidate| candidate == v)),
            Self::Range { key, low, high } => {
                let Some(value) = dut.get(key) else {
                    return false;
                };
                low.as_deref().is_none_or(|low| low <= value)
                    && high.as_deref().is_none_or(|high| value <= high)
            }
        }
    }

    fn to_entry(&self) -> (String, Vec<String>) {
        match self {
            Self::AnyOf { key, values } => (key.clone(), values.clone()),
            Self::Range { key, low, high } => {
                let bound = |b: &Option<String>| b.clone().unwrap_or_else(|| OPEN_END.to_string());
                (format!("{key}{RANGE_SUFFIX}"), vec![bound(low), bound(high)])
            }
        }
    }
}

/// Conjunction of match conditions, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct RuleMatch {
    conditions: Vec<MatchCondition>,
}

impl RuleMatch {
    pub fn conditions(&self) -> &[MatchCondition] {
        &self.conditions
    }

    /// Every condition must hold.
    pub fn matches(&self, dut: &DutIdentity) -> bool {
        self.conditions.iter().all(|c| c.matches(dut))
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for RuleMatch {
    type Error = String;

    fn try_from(map: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut conditions = Vec::with_capacity(map.len());
        for (key, values) in map {
            if let Some(base) = key.strip_suffix(RANGE_SUFFIX) {
                if !RANGE_KEYS.contains(&base) {
                    return Err(format!("unknown range matcher: {key}"));
                }
                let [low, high]: [String; 2] = values.try_into().map_err(|v: Vec<String>| {
                    format!("{key} needs a [start, end] pair, got {} values", v.len())
                })?;
                let bound = |b: String| (b != OPEN_END).then_some(b);
                conditions.push(MatchCondition::Range {
                    key: base.to_string(),
                    low: bound(low),
                    high: bound(high),
                });
            } else {
                if !DUT_INFO_KEYS.contains(&key.as_str()) {
                    return Err(format!("unknown matcher key: {key}"));
                }
                conditions.push(MatchCondition::AnyOf { key, values });
            }
        }
        Ok(Self { conditions })
    }
}

impl From<RuleMatch> for BTreeMap<String, Vec<String>> {
    fn from(matcher: RuleMatch) -> Self {
        matcher.conditions.iter().map(MatchCondition::to_entry).collect()
    }
}
