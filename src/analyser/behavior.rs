use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::model::Value;
use crate::result::{Arparma, OptionResult};

/// A post-parse hook that validates or mutates the result.
///
/// Behaviors run exactly once per parse, in registration order, after body
/// matching. Returning `Err(reason)` flips the result to unmatched with a
/// `BehaviorError` record.
pub trait Behavior: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, result: &mut Arparma) -> Result<(), String>;
}

/// Write a value under a path when the parse left it unset.
///
/// Paths take the form `<arg>` (a main argument) or `options.<dest>` (an
/// option's value).
pub struct SetDefault {
    path: String,
    value: Value,
}

impl SetDefault {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

impl Behavior for SetDefault {
    fn name(&self) -> &str {
        "set_default"
    }

    fn apply(&self, result: &mut Arparma) -> Result<(), String> {
        match self.path.strip_prefix("options.") {
            Some(dest) => {
                result
                    .options
                    .entry(dest.to_string())
                    .or_insert_with(|| OptionResult {
                        value: self.value.clone(),
                        args: Default::default(),
                    });
            }
            None => {
                if !result.main_args.contains_key(&self.path) {
                    result
                        .main_args
                        .insert(self.path.clone(), self.value.clone());
                    result
                        .other_args
                        .insert(self.path.clone(), self.value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Reject parses where two paths are both present.
pub struct Exclusion {
    left: String,
    right: String,
}

impl Exclusion {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl Behavior for Exclusion {
    fn name(&self) -> &str {
        "exclusion"
    }

    fn apply(&self, result: &mut Arparma) -> Result<(), String> {
        if result.find(&self.left) && result.find(&self.right) {
            return Err(format!(
                "'{left}' and '{right}' cannot be used together",
                left = self.left,
                right = self.right
            ));
        }
        Ok(())
    }
}

/// Reject parses arriving faster than the configured interval.
pub struct CoolDown {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl CoolDown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }
}

impl Behavior for CoolDown {
    fn name(&self) -> &str {
        "cool_down"
    }

    fn apply(&self, _result: &mut Arparma) -> Result<(), String> {
        let now = Instant::now();
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            if now.duration_since(previous) < self.interval {
                return Err("cooling down".to_string());
            }
        }
        *last = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_default_fills_missing_main_arg() {
        let mut result = Arparma::default();
        SetDefault::new("depth", 3_i64).apply(&mut result).unwrap();
        assert_eq!(result.main_args.get("depth"), Some(&Value::Int(3)));

        // Present values are left alone.
        SetDefault::new("depth", 9_i64).apply(&mut result).unwrap();
        assert_eq!(result.main_args.get("depth"), Some(&Value::Int(3)));
    }

    #[test]
    fn set_default_fills_missing_option() {
        let mut result = Arparma::default();
        SetDefault::new("options.verbose", 0_i64)
            .apply(&mut result)
            .unwrap();
        assert_eq!(
            result.options.get("verbose").map(|o| &o.value),
            Some(&Value::Int(0))
        );
    }

    #[test]
    fn exclusion_rejects_pairs() {
        let mut result = Arparma::default();
        result.main_args.insert("a".to_string(), Value::Int(1));
        result.main_args.insert("b".to_string(), Value::Int(2));

        let behavior = Exclusion::new("a", "b");
        assert!(behavior.apply(&mut result).is_err());

        result.main_args.remove("b");
        assert!(behavior.apply(&mut result).is_ok());
    }

    #[test]
    fn cool_down_rejects_rapid_repeats() {
        let behavior = CoolDown::new(Duration::from_secs(60));
        let mut result = Arparma::default();
        assert!(behavior.apply(&mut result).is_ok());
        assert!(behavior.apply(&mut result).is_err());
    }
}
