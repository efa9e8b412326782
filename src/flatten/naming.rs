// Metric naming - sanitization, naming modes and the legacy rename table

use serde::Deserialize;
use std::fmt;

/// Naming scheme used by a collector for every document it flattens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// Legacy names kept for existing dashboards, plus the special-case passes.
    Compatible,
    /// Names derived directly from the document path.
    #[default]
    Hierarchical,
}

impl NamingMode {
    pub fn is_compatible(self) -> bool {
        self == NamingMode::Compatible
    }
}

impl fmt::Display for NamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingMode::Compatible => write!(f, "compatible"),
            NamingMode::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

/// Makes `raw` a valid metric name.
///
/// Lower-cases, replaces everything outside `[a-zA-Z0-9_:]` with `_` and
/// prepends `_` when the result would start with a digit. Applying it twice
/// yields the same string as applying it once.
pub fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Maps a leading run of path segments to a legacy name fragment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameRule {
    /// Raw segments, matched exactly; the prefix counts as the first segment.
    pub path: Vec<String>,
    /// Replacement for the matched segments.
    pub name: String,
}

impl RenameRule {
    pub fn new(path: &[&str], name: &str) -> Self {
        RenameRule {
            path: path.iter().map(|s| s.to_string()).collect(),
            name: name.to_string(),
        }
    }

    fn matches(&self, segments: &[&str]) -> bool {
        !self.path.is_empty()
            && self.path.len() <= segments.len()
            && self.path.iter().zip(segments).all(|(a, b)| a == b)
    }
}

/// Lookup table consulted in compatible mode. The longest matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RenameTable {
    rules: Vec<RenameRule>,
}

impl RenameTable {
    pub fn new() -> Self {
        RenameTable::default()
    }

    /// Table seeded with the historically exposed prefixes.
    ///
    /// Not exhaustive; deployments add rules through `legacy_renames`.
    pub fn legacy() -> Self {
        RenameTable::new()
            .with_rule(RenameRule::new(&["mongodb", "serverStatus"], "mongodb_ss"))
            .with_rule(RenameRule::new(
                &["mongodb", "serverStatus", "wiredTiger"],
                "mongodb_ss_wt",
            ))
            .with_rule(RenameRule::new(&["mongodb_ss", "wiredTiger"], "mongodb_ss_wt"))
            .with_rule(RenameRule::new(&["mongodb", "replSetGetStatus"], "mongodb_rs"))
            .with_rule(RenameRule::new(
                &["mongodb", "local.oplog.rs.stats"],
                "mongodb_oplog_stats",
            ))
            .with_rule(RenameRule::new(&["mongodb", "systemMetrics"], "mongodb_sys"))
    }

    pub fn with_rule(mut self, rule: RenameRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = RenameRule>) {
        self.rules.extend(rules);
    }

    /// Returns the replacement and the number of segments it consumes.
    pub fn resolve(&self, segments: &[&str]) -> Option<(&str, usize)> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(segments))
            .max_by_key(|rule| rule.path.len())
            .map(|rule| (rule.name.as_str(), rule.path.len()))
    }
}

/// Builds final metric names for one naming mode.
#[derive(Debug, Clone)]
pub struct NameBuilder {
    mode: NamingMode,
    renames: RenameTable,
}

impl NameBuilder {
    pub fn new(mode: NamingMode, renames: RenameTable) -> Self {
        NameBuilder { mode, renames }
    }

    pub fn mode(&self) -> NamingMode {
        self.mode
    }

    /// Joins prefix and path with `_`, applies legacy renames in compatible
    /// mode, then sanitizes.
    pub fn build(&self, prefix: &str, path: &[&str]) -> String {
        let mut segments: Vec<&str> = Vec::with_capacity(path.len() + 1);
        if !prefix.is_empty() {
            segments.push(prefix);
        }
        segments.extend_from_slice(path);

        if self.mode.is_compatible() {
            if let Some((replacement, consumed)) = self.renames.resolve(&segments) {
                let mut renamed = vec![replacement];
                renamed.extend_from_slice(&segments[consumed..]);
                return sanitize(&renamed.join("_"));
            }
        }

        sanitize(&segments.join("_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize("serverStatus.opcounters"), "serverstatus_opcounters");
        assert_eq!(sanitize("bytes currently in the cache"), "bytes_currently_in_the_cache");
        assert_eq!(sanitize("a:b-c/d"), "a:b_c_d");
        assert_eq!(sanitize("0_shard"), "_0_shard");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "",
            "_",
            "9lives",
            "MiXeD.Case",
            "weird é ü chars",
            "db.coll$stats",
            "::",
            "tab\tnewline\n",
            "ǅ title case",
        ];

        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_sanitized_names_are_valid_metric_names() {
        for input in ["1", "a b", "Δ", "x.y.z", ""] {
            let name = sanitize(input);
            let mut chars = name.chars();
            let first = chars.next().unwrap();
            assert!(first.is_ascii_alphabetic() || first == '_' || first == ':');
            assert!(chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':'));
        }
    }

    #[test]
    fn test_longest_rename_rule_wins() {
        let table = RenameTable::legacy();

        assert_eq!(
            table.resolve(&["mongodb", "serverStatus", "wiredTiger", "cache"]),
            Some(("mongodb_ss_wt", 3))
        );
        assert_eq!(
            table.resolve(&["mongodb", "serverStatus", "opcounters"]),
            Some(("mongodb_ss", 2))
        );
        assert_eq!(table.resolve(&["mongodb"]), None);
        assert_eq!(table.resolve(&["other", "serverStatus"]), None);
    }

    #[test]
    fn test_name_builder_modes() {
        let compatible = NameBuilder::new(NamingMode::Compatible, RenameTable::legacy());
        let hierarchical = NameBuilder::new(NamingMode::Hierarchical, RenameTable::legacy());
        let path = ["serverStatus", "wiredTiger", "cache", "pages read into cache"];

        assert_eq!(
            compatible.build("mongodb", &path),
            "mongodb_ss_wt_cache_pages_read_into_cache"
        );
        assert_eq!(
            hierarchical.build("mongodb", &path),
            "mongodb_serverstatus_wiredtiger_cache_pages_read_into_cache"
        );
        assert_eq!(hierarchical.build("", &["a", "b"]), "a_b");
    }

    #[test]
    fn test_naming_mode_deserializes_lowercase() {
        let mode: NamingMode = serde_json::from_str("\"compatible\"").unwrap();
        assert_eq!(mode, NamingMode::Compatible);
        assert_eq!(NamingMode::default(), NamingMode::Hierarchical);
    }
}
