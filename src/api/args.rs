use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::model::Value;
use crate::pattern::Pattern;

type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

#[derive(Clone)]
enum ArgDefault {
    Value(Value),
    Factory(DefaultFactory),
}

impl std::fmt::Debug for ArgDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgDefault::Value(value) => write!(f, "default({value})"),
            ArgDefault::Factory(_) => write!(f, "default(<factory>)"),
        }
    }
}

/// A single typed argument slot.
///
/// A slot is *variadic* iff its pattern carries a multiplicity marker and
/// *keyword* iff its pattern carries a keyword marker; both are fixed at
/// construction.
///
/// ### Example
/// ```
/// use alconna::{Arg, Pattern};
///
/// let slot = Arg::new("pak_name", Pattern::text())
///     .optional()
///     .default("numpy")
///     .notice("the package to operate on");
/// assert_eq!(slot.name(), "pak_name");
/// ```
#[derive(Debug, Clone)]
pub struct Arg {
    name: String,
    pattern: Pattern,
    optional: bool,
    hidden: bool,
    default: Option<ArgDefault>,
    separators: Option<Vec<char>>,
    notice: Option<String>,
}

impl Arg {
    pub fn new(name: impl Into<String>, pattern: Pattern) -> Self {
        Self {
            name: name.into(),
            pattern,
            optional: false,
            hidden: false,
            default: None,
            separators: None,
            notice: None,
        }
    }

    /// The slot may be skipped when its pattern rejects the token at hand.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Hide the slot from help output.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Invert the slot's pattern: it binds the raw token iff the pattern
    /// rejects it.
    pub fn anti(mut self) -> Self {
        self.pattern = Pattern::anti(self.pattern);
        self
    }

    /// Fixed default, bound when the slot is skipped or absent.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ArgDefault::Value(value.into()));
        self
    }

    /// Default computed at bind time.
    pub fn default_factory(mut self, factory: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(ArgDefault::Factory(Arc::new(factory)));
        self
    }

    /// Override the separator set used when this slot splits a single token
    /// into multiple values.
    pub fn separator(mut self, sep: char) -> Self {
        self.separators.get_or_insert_with(Vec::default).push(sep);
        self
    }

    /// Help notice.
    pub fn notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_variadic(&self) -> bool {
        self.pattern.count().is_some()
    }

    pub fn is_keyword(&self) -> bool {
        self.pattern.keyword_spec().is_some()
    }

    pub(crate) fn notice_text(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub(crate) fn separator_override(&self) -> Option<&[char]> {
        self.separators.as_deref()
    }

    pub(crate) fn default_value(&self) -> Option<Value> {
        match &self.default {
            Some(ArgDefault::Value(value)) => Some(value.clone()),
            Some(ArgDefault::Factory(factory)) => Some(factory()),
            None => None,
        }
    }

    pub(crate) fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// An ordered sequence of argument slots.
///
/// Invariants are checked by [`Args::validate`] when the owning node is
/// built: slot names must be unique, at most one positional slot may be
/// variadic, and at most one keyword slot may be variadic.
#[derive(Debug, Clone, Default)]
pub struct Args {
    slots: Vec<Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot. Invariants are deferred to [`Args::validate`] so that
    /// construction stays chainable.
    pub fn add(mut self, slot: Arg) -> Self {
        self.slots.push(slot);
        self
    }

    /// Shorthand for a required positional slot.
    pub fn slot(self, name: impl Into<String>, pattern: Pattern) -> Self {
        self.add(Arg::new(name, pattern))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.slots.iter()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut names: HashSet<&str> = HashSet::default();
        let mut unnamed_variadic = 0_usize;
        let mut keyword_variadic = 0_usize;

        for slot in &self.slots {
            if !names.insert(slot.name()) {
                return Err(ConfigError(format!(
                    "Cannot duplicate the argument slot '{}'.",
                    slot.name()
                )));
            }
            if slot.is_variadic() {
                if slot.is_keyword() {
                    keyword_variadic += 1;
                } else {
                    unnamed_variadic += 1;
                }
            }
        }

        if unnamed_variadic > 1 {
            return Err(ConfigError(
                "At most one positional slot may be variadic.".to_string(),
            ));
        }
        if keyword_variadic > 1 {
            return Err(ConfigError(
                "At most one keyword slot may be variadic.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Count;

    #[test]
    fn arg_markers() {
        let positional = Arg::new("a", Pattern::text());
        assert!(!positional.is_variadic());
        assert!(!positional.is_keyword());

        let variadic = Arg::new("rest", Pattern::text().repeat(Count::AtLeast(0)));
        assert!(variadic.is_variadic());

        let keyword = Arg::new("name", Pattern::text().keyword("name"));
        assert!(keyword.is_keyword());
    }

    #[test]
    fn anti_wraps_pattern() {
        use crate::model::Token;
        let slot = Arg::new("not_int", Pattern::int()).anti();
        assert!(!slot.pattern().accept(&Token::text("3")).is_matched());
        assert!(slot.pattern().accept(&Token::text("three")).is_matched());
    }

    #[test]
    fn default_factory_runs_per_bind() {
        let slot = Arg::new("stamp", Pattern::int()).default_factory(|| Value::Int(42));
        assert_eq!(slot.default_value(), Some(Value::Int(42)));
        assert_eq!(slot.default_value(), Some(Value::Int(42)));
    }

    #[test]
    fn validate_rejects_duplicates() {
        let args = Args::new()
            .slot("a", Pattern::text())
            .slot("a", Pattern::int());
        assert_matches!(args.validate(), Err(ConfigError(_)));
    }

    #[test]
    fn validate_rejects_two_positional_variadics() {
        let args = Args::new()
            .add(Arg::new("a", Pattern::text().repeat(Count::AtLeast(0))))
            .add(Arg::new("b", Pattern::int().repeat(Count::AtLeast(0))));
        assert_matches!(args.validate(), Err(ConfigError(_)));
    }

    #[test]
    fn validate_allows_one_of_each_variadic() {
        let args = Args::new()
            .add(Arg::new("a", Pattern::text().repeat(Count::AtLeast(0))))
            .add(Arg::new(
                "kw",
                Pattern::int().repeat(Count::AtLeast(0)).keyword("kw"),
            ));
        assert_matches!(args.validate(), Ok(()));
    }
}
