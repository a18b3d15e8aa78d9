use std::collections::BTreeMap;

use crate::error::{Builtin, ErrorKind};
use crate::model::{Token, Value, ValueKind};

/// Outcome of header matching.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeadResult {
    /// The token(s) offered to the header.
    pub origin: Vec<Token>,
    /// The composed name that matched, as a value.
    pub result: Value,
    pub matched: bool,
    /// Captured groups when the header name is a regex.
    pub groups: BTreeMap<String, String>,
}

/// Accumulated result of one option node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionResult {
    pub value: Value,
    pub args: BTreeMap<String, Value>,
}

/// Accumulated result of one subcommand node, recursively.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubcommandResult {
    pub value: Value,
    pub args: BTreeMap<String, Value>,
    pub options: BTreeMap<String, OptionResult>,
    pub subcommands: BTreeMap<String, SubcommandResult>,
}

/// The output tree of a parse.
///
/// An `Arparma` is always returned (unless the command opts into raising):
/// callers check [`Arparma::matched`] and read [`Arparma::error_info`] on
/// failure. Addressing into the tree goes through [`Arparma::query`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arparma {
    pub head: HeadResult,
    pub matched: bool,
    pub main_args: BTreeMap<String, Value>,
    pub options: BTreeMap<String, OptionResult>,
    pub subcommands: BTreeMap<String, SubcommandResult>,
    /// Every bound argument, flattened across scopes.
    pub other_args: BTreeMap<String, Value>,
    pub error_info: Option<ErrorKind>,
    /// The ingested token stream, before shortcut splicing.
    pub source: Vec<Token>,
}

impl Arparma {
    pub(crate) fn unmatched(head: HeadResult, source: Vec<Token>, error: ErrorKind) -> Self {
        Self {
            head,
            matched: false,
            error_info: Some(error),
            source,
            ..Self::default()
        }
    }

    /// Flip a (possibly matched) result to unmatched. Used by behaviors.
    pub fn fail(&mut self, error: ErrorKind) {
        self.matched = false;
        self.error_info = Some(error);
    }

    /// Output carried by a built-in option, when one handled the input.
    pub fn builtin_output(&self) -> Option<(Builtin, &str)> {
        match &self.error_info {
            Some(ErrorKind::BuiltinAction { kind, output }) => Some((*kind, output.as_str())),
            _ => None,
        }
    }

    /// Existence probe; ambiguity reads as absent.
    pub fn find(&self, path: &str) -> bool {
        matches!(self.query(path), Ok(Some(_)))
    }

    /// Addressable lookup by dotted path.
    ///
    /// A path walks through subcommands and options by dest name, ending at
    /// `value`, `args.<name>`, or a bare argument name. Missing paths return
    /// `Ok(None)`; a name reachable through both an option and a subcommand
    /// is an [`ErrorKind::AmbiguousPath`] unless the path disambiguates with
    /// an `options.` or `subcommands.` segment.
    ///
    /// ### Example
    /// ```
    /// # use alconna::{Arparma, Value};
    /// # let mut result = Arparma::default();
    /// # result.main_args.insert("foo".to_string(), Value::Int(2));
    /// assert_eq!(result.query("foo").unwrap(), Some(&Value::Int(2)));
    /// assert_eq!(result.query("bar").unwrap(), None);
    /// ```
    pub fn query(&self, path: &str) -> Result<Option<&Value>, ErrorKind> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(None);
        }

        match segments[0] {
            "options" => Self::query_options(&self.options, &segments[1..]),
            "subcommands" => Self::query_subcommands(&self.subcommands, &segments[1..], path),
            "args" => {
                let Some(name) = segments.get(1) else {
                    return Ok(None);
                };
                Ok(self.main_args.get(*name))
            }
            first => {
                if segments.len() == 1 {
                    if let Some(value) = self.main_args.get(first) {
                        return Ok(Some(value));
                    }
                }
                let in_options = self.options.contains_key(first);
                let in_subcommands = self.subcommands.contains_key(first);
                if in_options && in_subcommands {
                    return Err(ErrorKind::AmbiguousPath(path.to_string()));
                }
                if in_options {
                    return Self::query_options(&self.options, &segments);
                }
                if in_subcommands {
                    return Self::query_subcommands(&self.subcommands, &segments, path);
                }
                Ok(None)
            }
        }
    }

    fn query_options<'a>(
        options: &'a BTreeMap<String, OptionResult>,
        segments: &[&str],
    ) -> Result<Option<&'a Value>, ErrorKind> {
        let Some(name) = segments.first() else {
            return Ok(None);
        };
        let Some(result) = options.get(*name) else {
            return Ok(None);
        };
        match &segments[1..] {
            [] | ["value"] => Ok(Some(&result.value)),
            ["args", arg] => Ok(result.args.get(*arg)),
            [arg] => Ok(result.args.get(*arg)),
            _ => Ok(None),
        }
    }

    fn query_subcommands<'a>(
        subcommands: &'a BTreeMap<String, SubcommandResult>,
        segments: &[&str],
        full_path: &str,
    ) -> Result<Option<&'a Value>, ErrorKind> {
        let Some(name) = segments.first() else {
            return Ok(None);
        };
        let Some(result) = subcommands.get(*name) else {
            return Ok(None);
        };
        let rest = &segments[1..];
        match rest {
            [] | ["value"] => Ok(Some(&result.value)),
            ["args", arg] => Ok(result.args.get(*arg)),
            _ => {
                // Explicit child roots first.
                match rest[0] {
                    "options" => {
                        return Self::query_options(&result.options, &rest[1..])
                    }
                    "subcommands" => {
                        return Self::query_subcommands(&result.subcommands, &rest[1..], full_path)
                    }
                    _ => {}
                }
                if rest.len() == 1 {
                    if let Some(value) = result.args.get(rest[0]) {
                        return Ok(Some(value));
                    }
                }
                let in_options = result.options.contains_key(rest[0]);
                let in_subcommands = result.subcommands.contains_key(rest[0]);
                if in_options && in_subcommands {
                    return Err(ErrorKind::AmbiguousPath(full_path.to_string()));
                }
                if in_options {
                    return Self::query_options(&result.options, rest);
                }
                if in_subcommands {
                    return Self::query_subcommands(&result.subcommands, rest, full_path);
                }
                Ok(None)
            }
        }
    }

    /// The `n`th bound value of the given kind, irrespective of path, in
    /// stable (key-sorted) order over the flattened bindings.
    pub fn nth_of_kind(&self, kind: ValueKind, n: usize) -> Option<&Value> {
        self.other_args
            .values()
            .filter(|value| value.kind() == kind)
            .nth(n)
    }

    /// Typed variant of [`Arparma::nth_of_kind`] for opaque payloads.
    pub fn nth_opaque<T: std::any::Any>(&self, n: usize) -> Option<&T> {
        self.other_args
            .values()
            .filter_map(|value| value.downcast_ref::<T>())
            .nth(n)
    }
}
