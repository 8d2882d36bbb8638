//! Bundle selection: DUT identity + ruleset -> bundle id.
//!
//! Rules are scanned top to bottom and the first active rule whose matcher
//! holds wins. There is no state and no I/O here.

use tracing::debug;

use crate::domain::errors::MatchError;
use crate::domain::models::{Bundle, DutIdentity, Rule, UmpireConfig};

/// Pick the bundle id for `dut`, or `None` when no active rule matches.
pub fn select_bundle<'a>(rules: &'a [Rule], dut: &DutIdentity) -> Option<&'a str> {
    rules
        .iter()
        .filter(|rule| rule.active)
        .find(|rule| rule.matches(dut))
        .map(|rule| rule.bundle_id.as_str())
}

/// Parse a DUT header and resolve the bundle to serve from `config`.
///
/// Header errors are reported before any rule is evaluated. A rule that
/// points at a bundle id absent from `config` resolves to `None`.
pub fn select_bundle_for_header<'a>(
    config: &'a UmpireConfig,
    header: &str,
) -> Result<Option<&'a Bundle>, MatchError> {
    let dut = DutIdentity::parse(header)?;
    let selected = select_bundle(&config.rulesets, &dut);
    debug!(header, bundle_id = ?selected, "bundle selected");
    Ok(selected.and_then(|id| config.bundle(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(value: serde_json::Value) -> Vec<Rule> {
        serde_json::from_value(value).unwrap()
    }

    fn dut(pairs: &[(&str, &str)]) -> DutIdentity {
        DutIdentity::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn test_end_to_end_sn_matcher_and_default() {
        let ruleset = rules(json!([
            {"bundle_id": "sn_matcher", "active": true, "match": {"sn": ["SN001"]}},
            {"bundle_id": "default", "active": true}
        ]));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN001")])), Some("sn_matcher"));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN002")])), Some("default"));
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let ruleset = rules(json!([
            {"bundle_id": "off", "active": false},
            {"bundle_id": "on", "active": true}
        ]));
        assert_eq!(select_bundle(&ruleset, &DutIdentity::default()), Some("on"));
    }

    #[test]
    fn test_range_is_inclusive() {
        let ruleset = rules(json!([
            {"bundle_id": "r", "active": true, "match": {"sn_range": ["SN001", "SN005"]}}
        ]));
        for sn in ["SN001", "SN003", "SN005"] {
            assert_eq!(select_bundle(&ruleset, &dut(&[("sn", sn)])), Some("r"), "{sn}");
        }
        for sn in ["SN000", "SN006"] {
            assert_eq!(select_bundle(&ruleset, &dut(&[("sn", sn)])), None, "{sn}");
        }
    }

    #[test]
    fn test_open_ranges() {
        let ruleset = rules(json!([
            {"bundle_id": "low", "active": true, "match": {"sn_range": ["-", "SN010"]}},
            {"bundle_id": "high", "active": true, "match": {"sn_range": ["SN020", "-"]}}
        ]));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "A000")])), Some("low"));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN010")])), Some("low"));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN015")])), None);
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN020")])), Some("high"));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "ZZZ")])), Some("high"));
    }

    #[test]
    fn test_range_requires_base_attribute() {
        let ruleset = rules(json!([
            {"bundle_id": "r", "active": true, "match": {"mlb_sn_range": ["-", "-"]}}
        ]));
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN001")])), None);
        assert_eq!(select_bundle(&ruleset, &dut(&[("mlb_sn", "M")])), Some("r"));
    }

    #[test]
    fn test_dotted_mac_matching() {
        let ruleset = rules(json!([
            {"bundle_id": "mac", "active": true, "match": {"mac": ["aa:bb"]}}
        ]));
        assert_eq!(select_bundle(&ruleset, &dut(&[("mac.eth0", "aa:bb")])), Some("mac"));
        assert_eq!(select_bundle(&ruleset, &dut(&[("mac.wlan0", "aa:bb")])), Some("mac"));
        assert_eq!(
            select_bundle(&ruleset, &dut(&[("mac.eth0", "00:00"), ("mac.wlan0", "aa:bb")])),
            Some("mac")
        );
        assert_eq!(select_bundle(&ruleset, &dut(&[("mac.eth0", "00:00")])), None);
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let ruleset = rules(json!([
            {"bundle_id": "both", "active": true,
             "match": {"sn": ["SN001"], "stage": ["SMT", "FATP"]}}
        ]));
        assert_eq!(
            select_bundle(&ruleset, &dut(&[("sn", "SN001"), ("stage", "FATP")])),
            Some("both")
        );
        assert_eq!(
            select_bundle(&ruleset, &dut(&[("sn", "SN001"), ("stage", "RUNIN")])),
            None
        );
        assert_eq!(select_bundle(&ruleset, &dut(&[("sn", "SN001")])), None);
    }

    #[test]
    fn test_no_fallback_yields_none() {
        let ruleset = rules(json!([
            {"bundle_id": "a", "active": true, "match": {"board": ["x"]}}
        ]));
        assert_eq!(select_bundle(&ruleset, &dut(&[("board", "y")])), None);
        assert_eq!(select_bundle(&[], &dut(&[("board", "y")])), None);
    }

    #[test]
    fn test_header_selection_against_config() {
        let config = UmpireConfig::from_json(
            r#"{"rulesets": [
                    {"bundle_id": "smt", "active": true, "match": {"stage": ["SMT"]}},
                    {"bundle_id": "default", "active": true}
                ],
                "bundles": [
                    {"id": "default", "payloads": "p0"},
                    {"id": "smt", "payloads": "p1"}
                ]}"#,
        )
        .unwrap();
        let bundle = select_bundle_for_header(&config, "sn=1; stage=SMT").unwrap();
        assert_eq!(bundle.map(|b| b.id.as_str()), Some("smt"));
        let bundle = select_bundle_for_header(&config, "sn=1").unwrap();
        assert_eq!(bundle.map(|b| b.id.as_str()), Some("default"));
        assert!(matches!(
            select_bundle_for_header(&config, "sn=1; color=red"),
            Err(MatchError::UnknownKey(_))
        ));
    }
}
