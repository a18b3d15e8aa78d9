use thiserror::Error;

/// A problem found while building a command schema (ex: a repeated name).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Config error: {0}")]
pub struct ConfigError(pub(crate) String);

/// Which built-in option handled the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Help,
    Shortcut,
    Completion,
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Builtin::Help => "help",
            Builtin::Shortcut => "shortcut",
            Builtin::Completion => "completion",
        };
        write!(f, "{name}")
    }
}

/// Everything that can terminate or taint a parse, in one discriminated type.
///
/// The analyser records these on the result rather than returning `Err`,
/// unless the command sets `raise_exception`. `BuiltinAction` is the one
/// non-failure variant: it carries the output of a built-in option and leaves
/// the parse matched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ErrorKind {
    #[error("no prefix or command name matched '{got}'.")]
    HeaderMismatch { got: String },

    #[error("unknown command '{got}', did you mean '{candidate}'?")]
    FuzzySuggestion { got: String, candidate: String },

    #[error("token '{token}' does not fit '{expected}'.")]
    ParamsUnmatched { token: String, expected: String },

    #[error("required slot '{0}' ran out of input.")]
    ParamsMissing(String),

    #[error("keyword argument '{0}' is missing its key.")]
    ArgumentMissing(String),

    #[error("invalid value for '{slot}': {reason}.")]
    InvalidParam { slot: String, reason: String },

    #[error("path '{0}' is reachable through both an option and a subcommand.")]
    AmbiguousPath(String),

    #[error("behavior '{behavior}' rejected the parse: {reason}.")]
    BehaviorError { behavior: String, reason: String },

    #[error("builtin '{kind}' handled the input.")]
    BuiltinAction { kind: Builtin, output: String },
}

impl ErrorKind {
    /// Stable lookup key into the i18n string table.
    pub fn key(&self) -> &'static str {
        match self {
            ErrorKind::HeaderMismatch { .. } => "analyser.header_mismatch",
            ErrorKind::FuzzySuggestion { .. } => "analyser.fuzzy_suggest",
            ErrorKind::ParamsUnmatched { .. } => "args.params_unmatched",
            ErrorKind::ParamsMissing(_) => "args.params_missing",
            ErrorKind::ArgumentMissing(_) => "args.argument_missing",
            ErrorKind::InvalidParam { .. } => "args.invalid_param",
            ErrorKind::AmbiguousPath(_) => "result.ambiguous_path",
            ErrorKind::BehaviorError { .. } => "behavior.rejected",
            ErrorKind::BuiltinAction { .. } => "builtin.handled",
        }
    }

    /// Positional placeholders for the i18n template, in `{0}`, `{1}` order.
    pub fn placeholders(&self) -> Vec<String> {
        match self {
            ErrorKind::HeaderMismatch { got } => vec![got.clone()],
            ErrorKind::FuzzySuggestion { got, candidate } => {
                vec![got.clone(), candidate.clone()]
            }
            ErrorKind::ParamsUnmatched { token, expected } => {
                vec![token.clone(), expected.clone()]
            }
            ErrorKind::ParamsMissing(slot) => vec![slot.clone()],
            ErrorKind::ArgumentMissing(key) => vec![key.clone()],
            ErrorKind::InvalidParam { slot, reason } => vec![slot.clone(), reason.clone()],
            ErrorKind::AmbiguousPath(path) => vec![path.clone()],
            ErrorKind::BehaviorError { behavior, reason } => {
                vec![behavior.clone(), reason.clone()]
            }
            ErrorKind::BuiltinAction { kind, .. } => vec![kind.to_string()],
        }
    }

    /// Whether this record still counts as a successful match.
    pub(crate) fn is_clean(&self) -> bool {
        matches!(self, ErrorKind::BuiltinAction { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct() {
        let kinds = vec![
            ErrorKind::HeaderMismatch { got: "x".into() },
            ErrorKind::FuzzySuggestion {
                got: "x".into(),
                candidate: "y".into(),
            },
            ErrorKind::ParamsUnmatched {
                token: "x".into(),
                expected: "int".into(),
            },
            ErrorKind::ParamsMissing("slot".into()),
            ErrorKind::ArgumentMissing("key".into()),
            ErrorKind::InvalidParam {
                slot: "slot".into(),
                reason: "bad".into(),
            },
            ErrorKind::AmbiguousPath("a.b".into()),
            ErrorKind::BehaviorError {
                behavior: "b".into(),
                reason: "no".into(),
            },
            ErrorKind::BuiltinAction {
                kind: Builtin::Help,
                output: String::default(),
            },
        ];
        let keys: std::collections::HashSet<&str> = kinds.iter().map(|k| k.key()).collect();
        assert_eq!(keys.len(), kinds.len());
    }

    #[test]
    fn builtin_is_clean() {
        assert!(ErrorKind::BuiltinAction {
            kind: Builtin::Help,
            output: String::default(),
        }
        .is_clean());
        assert!(!ErrorKind::ParamsMissing("slot".into()).is_clean());
    }

    #[test]
    fn placeholder_order() {
        let kind = ErrorKind::ParamsUnmatched {
            token: "two".into(),
            expected: "int".into(),
        };
        assert_eq!(kind.placeholders(), vec!["two".to_string(), "int".to_string()]);
    }
}
