//! Analysis configuration and per-package merging.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// The effective analysis configuration for a package.
///
/// `checks` selects which diagnostics are reported downstream; it never
/// affects what gets analyzed or cached (all analyzers always run, output is
/// filtered later), so it is deliberately excluded from [`Config::hash_repr`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub checks: Vec<String>,
    pub settings: BTreeMap<String, String>,
}

impl Config {
    /// Merges a per-package fragment over a base configuration.
    ///
    /// A fragment's non-empty `checks` list replaces the base list; settings
    /// are unioned with the fragment taking precedence per key.
    pub fn merge(base: &Config, fragment: &Config) -> Config {
        let checks = if fragment.checks.is_empty() {
            base.checks.clone()
        } else {
            fragment.checks.clone()
        };
        let mut settings = base.settings.clone();
        for (key, value) in &fragment.settings {
            settings.insert(key.clone(), value.clone());
        }
        Config { checks, settings }
    }

    /// A stable textual representation of everything that participates in the
    /// cache key. `checks` is excluded: changing the check selection must not
    /// invalidate cached analysis results.
    pub fn hash_repr(&self) -> String {
        let mut out = String::from("settings{");
        for (i, (key, value)) in self.settings.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{key}={value:?}");
        }
        out.push('}');
        out
    }
}
