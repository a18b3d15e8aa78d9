pub(crate) const HELP_NAME: &str = "--help";
pub(crate) const HELP_SHORT: &str = "-h";
pub(crate) const SHORTCUT_NAME: &str = "--shortcut";
pub(crate) const COMP_NAME: &str = "--comp";
pub(crate) const COMP_SHORT: &str = "?";

/// Sentinel key under which unaccounted tokens are bound when `strict` is off.
pub(crate) const EXTRA_KEY: &str = "$extra";

pub(crate) const DEFAULT_CACHE_CAPACITY: usize = 100;

// Jaro-Winkler floor below which a candidate is not worth suggesting.
pub(crate) const SUGGEST_THRESHOLD: f64 = 0.6;

pub(crate) const DEFAULT_SEPARATORS: &[char] = &[' ', '\t'];
