use std::any::{Any, TypeId};
use std::sync::Arc;

use regex::Regex;

use crate::api::args::Args;
use crate::error::ConfigError;
use crate::model::Value;
use crate::result::OptionResult;

/// A required literal prefix sequence attached to an option or subcommand.
/// The node can only match when the tokens at the cursor spell the sentence
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence(Vec<String>);

impl Sentence {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Sentence(words.into_iter().map(Into::into).collect())
    }

    pub(crate) fn words(&self) -> &[String] {
        &self.0
    }
}

type Reducer = Arc<dyn Fn(Value, Value) -> Value + Send + Sync>;

/// How repeated matches of a node fold into its accumulated result.
#[derive(Clone)]
pub enum OptAction {
    /// Last write wins.
    Store,
    /// Fixed constant from the schema.
    StoreValue(Value),
    StoreTrue,
    StoreFalse,
    /// Ordered list of every matched value, argument slots included.
    Append,
    /// Integer count of matches.
    Count,
    /// User-supplied reducer over (accumulated, incoming) values.
    Reduce(Reducer),
}

impl std::fmt::Debug for OptAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OptAction::Store => "store",
            OptAction::StoreValue(_) => "store_value",
            OptAction::StoreTrue => "store_true",
            OptAction::StoreFalse => "store_false",
            OptAction::Append => "append",
            OptAction::Count => "count",
            OptAction::Reduce(_) => "reduce",
        };
        write!(f, "{name}")
    }
}

impl OptAction {
    pub(crate) fn fold(
        &self,
        existing: Option<OptionResult>,
        incoming: OptionResult,
    ) -> OptionResult {
        match self {
            OptAction::Store => incoming,
            OptAction::StoreValue(constant) => OptionResult {
                value: constant.clone(),
                args: incoming.args,
            },
            OptAction::StoreTrue => OptionResult {
                value: Value::Bool(true),
                args: incoming.args,
            },
            OptAction::StoreFalse => OptionResult {
                value: Value::Bool(false),
                args: incoming.args,
            },
            OptAction::Count => {
                let so_far = existing
                    .and_then(|prev| prev.value.as_int())
                    .unwrap_or_default();
                OptionResult {
                    value: Value::Int(so_far + 1),
                    args: incoming.args,
                }
            }
            OptAction::Append => {
                let mut accumulated = existing.unwrap_or_else(|| OptionResult {
                    value: Value::List(Vec::default()),
                    args: Default::default(),
                });
                if !matches!(accumulated.value, Value::List(_)) {
                    accumulated.value = Value::List(vec![accumulated.value]);
                }
                if let Value::List(values) = &mut accumulated.value {
                    if !incoming.value.is_none() {
                        values.push(incoming.value);
                    }
                }
                for (key, bound) in incoming.args {
                    let entry = accumulated
                        .args
                        .entry(key)
                        .or_insert_with(|| Value::List(Vec::default()));
                    if !matches!(entry, Value::List(_)) {
                        *entry = Value::List(vec![std::mem::take(entry)]);
                    }
                    if let Value::List(values) = entry {
                        values.push(bound);
                    }
                }
                accumulated
            }
            OptAction::Reduce(reducer) => {
                let accumulated = match existing {
                    Some(prev) => reducer(prev.value, incoming.value),
                    None => incoming.value,
                };
                OptionResult {
                    value: accumulated,
                    args: incoming.args,
                }
            }
        }
    }
}

/// Split an `"-u|--upgrade"` style name spec into (primary, aliases). The
/// longest segment is the primary; the dest strips its leading dashes.
fn parse_name_spec(spec: &str) -> (String, Vec<String>) {
    let mut aliases: Vec<String> = spec.split('|').map(str::to_string).collect();
    aliases.retain(|a| !a.is_empty());
    let primary = aliases
        .iter()
        .max_by_key(|a| a.len())
        .cloned()
        .unwrap_or_default();
    (primary, aliases)
}

/// A leaf node of the command grammar.
///
/// ### Example
/// ```
/// use alconna::{Args, Opt, OptAction, Pattern};
///
/// let upgrade = Opt::new("-u|--upgrade");
/// let file = Opt::new("-f")
///     .args(Args::new().slot("flag", Pattern::text()))
///     .compact()
///     .action(OptAction::Append);
/// assert_eq!(upgrade.dest(), "upgrade");
/// assert_eq!(file.dest(), "f");
/// ```
#[derive(Debug, Clone)]
pub struct Opt {
    name: String,
    aliases: Vec<String>,
    dest: Option<String>,
    sentence: Option<Sentence>,
    args: Args,
    action: OptAction,
    priority: i32,
    compact: bool,
    default: Option<Value>,
    help: Option<String>,
}

impl Opt {
    /// Create an option from a `|`-separated name spec.
    pub fn new(spec: &str) -> Self {
        let (name, aliases) = parse_name_spec(spec);
        Self {
            name,
            aliases,
            dest: None,
            sentence: None,
            args: Args::default(),
            action: OptAction::Store,
            priority: 0,
            compact: false,
            default: None,
            help: None,
        }
    }

    pub fn args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    pub fn action(mut self, action: OptAction) -> Self {
        self.action = action;
        self
    }

    /// Higher priority wins dispatch ties; definition order breaks the rest.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Allow the first argument to abut the option name (`-f1` ≡ `-f 1`).
    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn sentence(mut self, sentence: Sentence) -> Self {
        self.sentence = Some(sentence);
        self
    }

    /// Result recorded when the option is absent from the input.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Override the result key; defaults to the primary name sans dashes.
    pub fn dest(&self) -> String {
        match &self.dest {
            Some(dest) => dest.clone(),
            None => self.name.trim_start_matches('-').to_string(),
        }
    }

    pub fn dest_as(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub(crate) fn sentence_ref(&self) -> Option<&Sentence> {
        self.sentence.as_ref()
    }

    pub(crate) fn args_ref(&self) -> &Args {
        &self.args
    }

    pub(crate) fn action_ref(&self) -> &OptAction {
        &self.action
    }

    pub(crate) fn priority_value(&self) -> i32 {
        self.priority
    }

    pub(crate) fn is_compact(&self) -> bool {
        self.compact
    }

    pub(crate) fn default_result(&self) -> Option<OptionResult> {
        self.default.as_ref().map(|value| OptionResult {
            value: value.clone(),
            args: Default::default(),
        })
    }

    pub(crate) fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError("An option requires a name.".to_string()));
        }
        self.args.validate()
    }
}

/// An internal node of the command grammar: an option that additionally
/// nests options and further subcommands, without depth bound.
#[derive(Debug, Clone)]
pub struct Subcommand {
    name: String,
    aliases: Vec<String>,
    dest: Option<String>,
    sentence: Option<Sentence>,
    args: Args,
    action: OptAction,
    priority: i32,
    compact: bool,
    default: Option<Value>,
    help: Option<String>,
    separators: Option<Vec<char>>,
    options: Vec<Opt>,
    subcommands: Vec<Subcommand>,
}

impl Subcommand {
    pub fn new(spec: &str) -> Self {
        let (name, aliases) = parse_name_spec(spec);
        Self {
            name,
            aliases,
            dest: None,
            sentence: None,
            args: Args::default(),
            action: OptAction::Store,
            priority: 0,
            compact: false,
            default: None,
            help: None,
            separators: None,
            options: Vec::default(),
            subcommands: Vec::default(),
        }
    }

    pub fn args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    pub fn option(mut self, option: Opt) -> Self {
        self.options.push(option);
        self
    }

    pub fn subcommand(mut self, subcommand: Subcommand) -> Self {
        self.subcommands.push(subcommand);
        self
    }

    pub fn action(mut self, action: OptAction) -> Self {
        self.action = action;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn sentence(mut self, sentence: Sentence) -> Self {
        self.sentence = Some(sentence);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Inner parses inherit these separators in place of the root's.
    pub fn separators(mut self, separators: &[char]) -> Self {
        self.separators = Some(separators.to_vec());
        self
    }

    pub fn dest(&self) -> String {
        match &self.dest {
            Some(dest) => dest.clone(),
            None => self.name.trim_start_matches('-').to_string(),
        }
    }

    pub fn dest_as(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub(crate) fn sentence_ref(&self) -> Option<&Sentence> {
        self.sentence.as_ref()
    }

    pub(crate) fn args_ref(&self) -> &Args {
        &self.args
    }

    pub(crate) fn action_ref(&self) -> &OptAction {
        &self.action
    }

    pub(crate) fn priority_value(&self) -> i32 {
        self.priority
    }

    pub(crate) fn is_compact(&self) -> bool {
        self.compact
    }

    pub(crate) fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub(crate) fn separator_override(&self) -> Option<&[char]> {
        self.separators.as_deref()
    }

    pub(crate) fn options_ref(&self) -> &[Opt] {
        &self.options
    }

    pub(crate) fn subcommands_ref(&self) -> &[Subcommand] {
        &self.subcommands
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError("A subcommand requires a name.".to_string()));
        }
        self.args.validate()?;
        validate_scope(&self.options, &self.subcommands)
    }
}

/// Reject name collisions among the children of one scope. A sentence
/// participates in the identity: two nodes may share a name when distinct
/// sentences disambiguate them.
pub(crate) fn validate_scope(
    options: &[Opt],
    subcommands: &[Subcommand],
) -> Result<(), ConfigError> {
    let mut seen: std::collections::HashSet<(Vec<String>, String)> =
        std::collections::HashSet::default();
    let mut check = |sentence: Option<&Sentence>, alias: &str| -> Result<(), ConfigError> {
        let words = sentence.map(|s| s.words().to_vec()).unwrap_or_default();
        if !seen.insert((words, alias.to_string())) {
            return Err(ConfigError(format!(
                "Cannot duplicate the name '{alias}' within a scope."
            )));
        }
        Ok(())
    };

    for option in options {
        option.validate()?;
        for alias in option.aliases() {
            check(option.sentence_ref(), alias)?;
        }
    }
    for subcommand in subcommands {
        subcommand.validate()?;
        for alias in subcommand.aliases() {
            check(subcommand.sentence_ref(), alias)?;
        }
    }
    Ok(())
}

/// The command's entry point: prefix strings combined with a name that may
/// be a literal, a regex, or a set of opaque token types.
#[derive(Debug, Clone)]
pub enum HeaderName {
    Literal(String),
    Regex(Regex),
    Types(Vec<(TypeId, &'static str)>),
}

#[derive(Debug, Clone)]
pub struct Header {
    prefixes: Vec<String>,
    name: HeaderName,
}

impl Header {
    pub fn literal(name: impl Into<String>) -> Self {
        Self {
            prefixes: Vec::default(),
            name: HeaderName::Literal(name.into()),
        }
    }

    /// Full-match regex name; captured groups land in the head result.
    pub fn regex(source: &str) -> Result<Self, ConfigError> {
        let anchored = format!("^(?:{source})$");
        let regex = Regex::new(&anchored)
            .map_err(|e| ConfigError(format!("Invalid header regex: {e}.")))?;
        Ok(Self {
            prefixes: Vec::default(),
            name: HeaderName::Regex(regex),
        })
    }

    /// Name matched by opaque token type.
    pub fn of_type<T: Any + Send + Sync>() -> Self {
        Self {
            prefixes: Vec::default(),
            name: HeaderName::Types(vec![(TypeId::of::<T>(), std::any::type_name::<T>())]),
        }
    }

    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn prefix_set(&self) -> &[String] {
        &self.prefixes
    }

    pub(crate) fn name_ref(&self) -> &HeaderName {
        &self.name
    }

    /// The composed prefix-plus-name forms, used for display and fuzzy
    /// suggestion candidates. Regex and type names render symbolically.
    pub(crate) fn candidates(&self) -> Vec<String> {
        let rendered = match &self.name {
            HeaderName::Literal(name) => name.clone(),
            HeaderName::Regex(regex) => regex.as_str().to_string(),
            HeaderName::Types(types) => {
                let names: Vec<&str> = types.iter().map(|(_, name)| *name).collect();
                format!("<{}>", names.join("|"))
            }
        };
        if self.prefixes.is_empty() {
            vec![rendered]
        } else {
            self.prefixes
                .iter()
                .map(|prefix| format!("{prefix}{rendered}"))
                .collect()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let HeaderName::Literal(name) = &self.name {
            if name.is_empty() && self.prefixes.is_empty() {
                return Err(ConfigError("A header requires a command name.".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use rstest::rstest;

    #[rstest]
    #[case("-u|--upgrade", "--upgrade", "upgrade")]
    #[case("--verbose|-v", "--verbose", "verbose")]
    #[case("list", "list", "list")]
    #[case("-f", "-f", "f")]
    fn name_spec(#[case] spec: &str, #[case] primary: &str, #[case] dest: &str) {
        let option = Opt::new(spec);
        assert_eq!(option.name(), primary);
        assert_eq!(option.dest(), dest);
        assert!(option.aliases().contains(&spec.split('|').next().unwrap().to_string()));
    }

    #[test]
    fn fold_store() {
        let incoming = OptionResult {
            value: Value::Int(2),
            args: Default::default(),
        };
        let folded = OptAction::Store.fold(
            Some(OptionResult {
                value: Value::Int(1),
                args: Default::default(),
            }),
            incoming.clone(),
        );
        assert_eq!(folded, incoming);
    }

    #[test]
    fn fold_count() {
        let mut accumulated = None;
        for _ in 0..4 {
            let folded = OptAction::Count.fold(
                accumulated.clone(),
                OptionResult {
                    value: Value::None,
                    args: Default::default(),
                },
            );
            accumulated = Some(folded);
        }
        assert_eq!(accumulated.unwrap().value, Value::Int(4));
    }

    #[test]
    fn fold_append_accumulates_args_in_order() {
        let mut accumulated = None;
        for text in ["1", "2", "3"] {
            let mut args = std::collections::BTreeMap::default();
            args.insert("flag".to_string(), Value::from(text));
            let folded = OptAction::Append.fold(
                accumulated.clone(),
                OptionResult {
                    value: Value::None,
                    args,
                },
            );
            accumulated = Some(folded);
        }
        let accumulated = accumulated.unwrap();
        assert_eq!(
            accumulated.args.get("flag"),
            Some(&Value::List(vec![
                Value::from("1"),
                Value::from("2"),
                Value::from("3")
            ]))
        );
    }

    #[test]
    fn fold_store_true_false() {
        let incoming = OptionResult {
            value: Value::None,
            args: Default::default(),
        };
        assert_eq!(
            OptAction::StoreTrue.fold(None, incoming.clone()).value,
            Value::Bool(true)
        );
        assert_eq!(
            OptAction::StoreFalse.fold(None, incoming).value,
            Value::Bool(false)
        );
    }

    #[test]
    fn fold_reduce() {
        let action = OptAction::Reduce(Arc::new(|prev, next| {
            Value::Int(prev.as_int().unwrap_or_default() + next.as_int().unwrap_or_default())
        }));
        let first = action.fold(
            None,
            OptionResult {
                value: Value::Int(2),
                args: Default::default(),
            },
        );
        let second = action.fold(
            Some(first),
            OptionResult {
                value: Value::Int(3),
                args: Default::default(),
            },
        );
        assert_eq!(second.value, Value::Int(5));
    }

    #[test]
    fn scope_rejects_alias_collision() {
        let options = vec![Opt::new("-u|--upgrade"), Opt::new("-u")];
        assert_matches!(validate_scope(&options, &[]), Err(ConfigError(_)));
    }

    #[test]
    fn subcommand_validates_recursively() {
        let subcommand = Subcommand::new("install").args(
            Args::new()
                .slot("a", Pattern::text())
                .slot("a", Pattern::text()),
        );
        assert_matches!(subcommand.validate(), Err(ConfigError(_)));
    }

    #[test]
    fn header_candidates_compose() {
        let header = Header::literal("test_fuzzy").prefixes(["!", "/"]);
        assert_eq!(
            header.candidates(),
            vec!["!test_fuzzy".to_string(), "/test_fuzzy".to_string()]
        );
    }
}
