//! DUT identity parsed from the `X-Umpire-DUT` request header.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::MatchError;

/// Attribute names a DUT may report. `mac` may carry an interface suffix
/// (`mac.eth0`, `mac.wlan0`).
pub const DUT_INFO_KEYS: &[&str] = &[
    "sn", "mlb_sn", "mac", "board", "firmware", "ec", "stage", "uuid",
];

/// Keys that accept a dotted `<key>.<suffix>` form.
const DUT_INFO_PREFIX_KEYS: &[&str] = &["mac"];

/// Returns true when `key` is a recognized DUT attribute name.
pub fn is_known_key(key: &str) -> bool {
    if DUT_INFO_KEYS.contains(&key) {
        return true;
    }
    match key.split_once('.') {
        Some((base, suffix)) => !suffix.is_empty() && DUT_INFO_PREFIX_KEYS.contains(&base),
        None => false,
    }
}

/// Flat, immutable identity record of one device under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DutIdentity {
    attributes: BTreeMap<String, String>,
}

impl DutIdentity {
    /// Parse a `;`-separated `key=value` header, e.g. `sn=SN001; mac=aa:bb:cc:dd:ee:ff`.
    pub fn parse(header: &str) -> Result<Self, MatchError> {
        let mut attributes = BTreeMap::new();
        for segment in header.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| MatchError::MalformedSegment(segment.to_string()))?;
            let key = key.trim();
            if !is_known_key(key) {
                return Err(MatchError::UnknownKey(key.to_string()));
            }
            if attributes
                .insert(key.to_string(), value.trim().to_string())
                .is_some()
            {
                return Err(MatchError::DuplicateKey(key.to_string()));
            }
        }
        Ok(Self { attributes })
    }

    /// Build an identity from explicit pairs, validating every key.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, MatchError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut attributes = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            if !is_known_key(&key) {
                return Err(MatchError::UnknownKey(key));
            }
            if attributes.insert(key.clone(), value.into()).is_some() {
                return Err(MatchError::DuplicateKey(key));
            }
        }
        Ok(Self { attributes })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Values of `key` itself and of every `key.<suffix>` variant.
    pub fn values_with_prefix<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attributes.iter().filter_map(move |(k, v)| {
            let matches = k == key
                || k.strip_prefix(key)
                    .is_some_and(|rest| rest.starts_with('.'));
            matches.then_some(v.as_str())
        })
    }
}

impl FromStr for DutIdentity {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<BTreeMap<String, String>> for DutIdentity {
    type Error = MatchError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

impl From<DutIdentity> for BTreeMap<String, String> {
    fn from(identity: DutIdentity) -> Self {
        identity.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let dut = DutIdentity::parse("sn=SN001; mac=aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(dut.get("sn"), Some("SN001"));
        assert_eq!(dut.get("mac"), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(dut.get("stage"), None);
    }

    #[test]
    fn test_parse_dotted_mac_and_trailing_separator() {
        let dut = DutIdentity::parse("mac.eth0=aa:bb;mac.wlan0=00:11;").unwrap();
        let macs: Vec<&str> = dut.values_with_prefix("mac").collect();
        assert_eq!(macs, vec!["aa:bb", "00:11"]);
    }

    #[test]
    fn test_parse_empty_value_is_allowed() {
        let dut = DutIdentity::parse("uuid=").unwrap();
        assert_eq!(dut.get("uuid"), Some(""));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let err = DutIdentity::parse("sn=SN001; color=red").unwrap_err();
        assert_eq!(err, MatchError::UnknownKey("color".to_string()));
    }

    #[test]
    fn test_parse_rejects_dotted_key_on_plain_attribute() {
        assert!(matches!(
            DutIdentity::parse("sn.main=SN001"),
            Err(MatchError::UnknownKey(_))
        ));
        assert!(matches!(
            DutIdentity::parse("mac.=aa"),
            Err(MatchError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_segment() {
        assert_eq!(
            DutIdentity::parse("sn").unwrap_err(),
            MatchError::MalformedSegment("sn".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_duplicate_key() {
        assert_eq!(
            DutIdentity::parse("sn=A; sn=B").unwrap_err(),
            MatchError::DuplicateKey("sn".to_string())
        );
    }

    #[test]
    fn test_prefix_lookup_does_not_match_longer_names() {
        let dut = DutIdentity::from_pairs([("mlb_sn", "M1"), ("sn", "S1")]).unwrap();
        let values: Vec<&str> = dut.values_with_prefix("sn").collect();
        assert_eq!(values, vec!["S1"]);
    }
}
