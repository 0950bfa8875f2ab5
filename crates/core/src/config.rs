//! Engine configuration.
//!
//! Defaults are usable as-is; hosts can override through `CONVERGE_*`
//! environment variables via [`EngineConfig::from_env`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MAX_REPLICAS: u32 = 1000;
pub const DEFAULT_NAME_SEPARATOR: &str = "-";

/// Categories of per-resource entries a builder may add to its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfoKind {
    Create,
    Skip,
    DesiredDelete,
    ExplicitDelete,
    DesiredUpdate,
    ExplicitUpdate,
}

impl InfoKind {
    pub const ALL: [InfoKind; 6] = [
        InfoKind::Create,
        InfoKind::Skip,
        InfoKind::DesiredDelete,
        InfoKind::ExplicitDelete,
        InfoKind::DesiredUpdate,
        InfoKind::ExplicitUpdate,
    ];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(InfoKind::Create),
            "skip" => Some(InfoKind::Skip),
            "desired-delete" => Some(InfoKind::DesiredDelete),
            "explicit-delete" => Some(InfoKind::ExplicitDelete),
            "desired-update" => Some(InfoKind::DesiredUpdate),
            "explicit-update" => Some(InfoKind::ExplicitUpdate),
            _ => None,
        }
    }
}

/// Set of report categories to include; empty means counts only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeInfo(BTreeSet<InfoKind>);

impl IncludeInfo {
    pub fn all() -> Self {
        Self(InfoKind::ALL.into_iter().collect())
    }

    pub fn contains(&self, kind: InfoKind) -> bool {
        self.0.contains(&kind)
    }

    /// Parse `all` or a comma list such as `create,explicit-delete`.
    /// Unknown entries are skipped with a warning.
    pub fn parse_list(s: &str) -> Self {
        let mut out = Self::default();
        for tok in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if tok.eq_ignore_ascii_case("all") {
                return Self::all();
            }
            match InfoKind::parse(&tok.to_ascii_lowercase()) {
                Some(k) => {
                    out.0.insert(k);
                }
                None => warn!(entry = %tok, "unknown CONVERGE_INCLUDE_INFO entry; ignoring"),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub include_info: IncludeInfo,
    /// Upper bound on `replicas` for a single task.
    pub max_replicas: u32,
    /// Joins base name and replica index; also used for delete-prefix matching.
    pub name_separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            include_info: IncludeInfo::default(),
            max_replicas: DEFAULT_MAX_REPLICAS,
            name_separator: DEFAULT_NAME_SEPARATOR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; invalid values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(s) = lookup("CONVERGE_INCLUDE_INFO") {
            cfg.include_info = IncludeInfo::parse_list(&s);
        }
        if let Some(s) = lookup("CONVERGE_MAX_REPLICAS") {
            match s.trim().parse::<u32>() {
                Ok(n) if n > 0 => cfg.max_replicas = n,
                _ => warn!(value = %s, "invalid CONVERGE_MAX_REPLICAS; keeping default"),
            }
        }
        if let Some(s) = lookup("CONVERGE_NAME_SEPARATOR") {
            if s.is_empty() {
                warn!("empty CONVERGE_NAME_SEPARATOR; keeping default");
            } else {
                cfg.name_separator = s;
            }
        }
        cfg
    }

    pub fn with_include_info(mut self, include_info: IncludeInfo) -> Self {
        self.include_info = include_info;
        self
    }
}
