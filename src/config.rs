//! Session configuration.

use std::env;

use tracing::warn;

use crate::kernel::tc::DEFAULT_MAX_STEPS;

pub const MAX_STEPS_VAR: &str = "DTK_MAX_STEPS";
pub const VERIFY_UNITS_VAR: &str = "DTK_VERIFY_UNITS";
pub const CACHE_VAR: &str = "DTK_CACHE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Reduction steps a single declaration or query may spend.
  pub max_reduction_steps: u64,
  /// Re-check every declaration of a unit before committing a load.
  pub verify_units: bool,
  /// Memoize reduction and inference results for closed terms.
  pub cache_results: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      max_reduction_steps: DEFAULT_MAX_STEPS,
      verify_units: true,
      cache_results: true,
    }
  }
}

impl Config {
  /// Defaults overridden by `DTK_MAX_STEPS`, `DTK_VERIFY_UNITS` and
  /// `DTK_CACHE`. Unparseable values are logged and ignored.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Config::default();
    if let Some(raw) = lookup(MAX_STEPS_VAR) {
      match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => config.max_reduction_steps = n,
        _ => warn!(var = MAX_STEPS_VAR, value = %raw, "ignoring invalid step limit"),
      }
    }
    if let Some(raw) = lookup(VERIFY_UNITS_VAR) {
      match parse_flag(&raw) {
        Some(flag) => config.verify_units = flag,
        None => warn!(var = VERIFY_UNITS_VAR, value = %raw, "ignoring invalid flag"),
      }
    }
    if let Some(raw) = lookup(CACHE_VAR) {
      match parse_flag(&raw) {
        Some(flag) => config.cache_results = flag,
        None => warn!(var = CACHE_VAR, value = %raw, "ignoring invalid flag"),
      }
    }
    config
  }
}

fn parse_flag(raw: &str) -> Option<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" => Some(false),
    _ => None,
  }
}
