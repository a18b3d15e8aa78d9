use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::model::{Count, Token, Value};

/// Outcome of offering one token to a pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Accept {
    /// The token denotes a value of the pattern's target type.
    Matched(Value),
    /// The token is not of this pattern's shape; the cursor should not move.
    Mismatch,
    /// The conversion succeeded but a validator rejected the value.
    Refused,
}

impl Accept {
    pub fn is_matched(&self) -> bool {
        matches!(self, Accept::Matched(_))
    }

    pub(crate) fn into_value(self) -> Option<Value> {
        match self {
            Accept::Matched(value) => Some(value),
            _ => None,
        }
    }
}

type Validator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type Converter = Arc<dyn Fn(&Token) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
enum PatternKind {
    Any,
    Text,
    Bool,
    Int,
    Float,
    Bytes,
    Path,
    Literal(Value),
    Regex(Regex),
    Union(Vec<Pattern>),
    Anti(Box<Pattern>),
    Sequence(Box<Pattern>),
    Mapping {
        key: Box<Pattern>,
        value: Box<Pattern>,
    },
    OpaqueType {
        type_id: TypeId,
        type_name: &'static str,
    },
    Custom {
        name: &'static str,
        convert: Converter,
    },
}

/// Key-prefix marker for keyword arguments: the literal key that must precede
/// the value, and the key/value separator (`=` unless overridden).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub(crate) key: String,
    pub(crate) sep: char,
}

/// A typed value predicate and converter.
///
/// A pattern answers one question: does this token denote a `T`, and if so,
/// which `T`? Construction fixes the kind, the validator chain and the
/// optional variadic/keyword markers; after that a pattern is immutable and
/// [`Pattern::accept`] is a pure function of `(pattern, token)`.
///
/// ### Example
/// ```
/// use alconna::{Accept, Pattern, Token, Value};
///
/// let pattern = Pattern::int().validate(|v| v.as_int().map_or(false, |i| i >= 0));
/// assert_eq!(pattern.accept(&Token::text("3")), Accept::Matched(Value::Int(3)));
/// assert_eq!(pattern.accept(&Token::text("-3")), Accept::Refused);
/// assert_eq!(pattern.accept(&Token::text("three")), Accept::Mismatch);
/// ```
#[derive(Clone)]
pub struct Pattern {
    kind: PatternKind,
    validators: Vec<Validator>,
    count: Option<Count>,
    keyword: Option<Keyword>,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pattern[{}]", self.origin())
    }
}

impl Pattern {
    fn from_kind(kind: PatternKind) -> Self {
        Self {
            kind,
            validators: Vec::default(),
            count: None,
            keyword: None,
        }
    }

    /// Accepts any token, text or opaque.
    pub fn any() -> Self {
        Self::from_kind(PatternKind::Any)
    }

    /// Accepts only text tokens.
    pub fn text() -> Self {
        Self::from_kind(PatternKind::Text)
    }

    pub fn boolean() -> Self {
        Self::from_kind(PatternKind::Bool)
    }

    pub fn int() -> Self {
        Self::from_kind(PatternKind::Int)
    }

    pub fn float() -> Self {
        Self::from_kind(PatternKind::Float)
    }

    /// Text decodes through utf-8; opaque byte buffers and paths convert by
    /// identity and by their rendered form respectively.
    pub fn bytes() -> Self {
        Self::from_kind(PatternKind::Bytes)
    }

    pub fn path() -> Self {
        Self::from_kind(PatternKind::Path)
    }

    /// Exact-equality pattern against a fixed value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::from_kind(PatternKind::Literal(value.into()))
    }

    /// Full-match regex over text tokens.
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{source})$");
        Ok(Self::from_kind(PatternKind::Regex(Regex::new(&anchored)?)))
    }

    /// First-hit union of the alternatives.
    pub fn union(alternatives: Vec<Pattern>) -> Self {
        Self::from_kind(PatternKind::Union(alternatives))
    }

    /// Matches iff `inner` rejects; binds the raw token. The inner pattern's
    /// multiplicity and keyword markers carry over.
    pub fn anti(inner: Pattern) -> Self {
        let count = inner.count;
        let keyword = inner.keyword.clone();
        let mut pattern = Self::from_kind(PatternKind::Anti(Box::new(inner)));
        pattern.count = count;
        pattern.keyword = keyword;
        pattern
    }

    /// Comma-separated text whose every element satisfies `inner`.
    pub fn sequence(inner: Pattern) -> Self {
        Self::from_kind(PatternKind::Sequence(Box::new(inner)))
    }

    /// Comma-separated `k:v` text entries.
    pub fn mapping(key: Pattern, value: Pattern) -> Self {
        Self::from_kind(PatternKind::Mapping {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    /// Accepts opaque tokens of type `T` only.
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self::from_kind(PatternKind::OpaqueType {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Escape hatch: a named conversion function.
    pub fn custom(
        name: &'static str,
        convert: impl Fn(&Token) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::from_kind(PatternKind::Custom {
            name,
            convert: Arc::new(convert),
        })
    }

    /// Append a post-acceptance predicate; a failing validator demotes a
    /// match to [`Accept::Refused`].
    pub fn validate(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.validators.push(Arc::new(predicate));
        self
    }

    /// Mark the pattern variadic with the given multiplicity.
    pub fn repeat(mut self, count: Count) -> Self {
        self.count = Some(count);
        self
    }

    /// Mark the pattern as keyword-prefixed, separated by `=`.
    pub fn keyword(self, key: impl Into<String>) -> Self {
        self.keyword_with(key, '=')
    }

    /// Mark the pattern as keyword-prefixed with an explicit separator. A
    /// whitespace separator means the value arrives as the following token.
    pub fn keyword_with(mut self, key: impl Into<String>, sep: char) -> Self {
        self.keyword = Some(Keyword {
            key: key.into(),
            sep,
        });
        self
    }

    pub(crate) fn count(&self) -> Option<Count> {
        self.count
    }

    pub(crate) fn keyword_spec(&self) -> Option<&Keyword> {
        self.keyword.as_ref()
    }

    /// The pattern's target, for reflection and error reporting.
    pub fn origin(&self) -> String {
        match &self.kind {
            PatternKind::Any => "any".to_string(),
            PatternKind::Text => "text".to_string(),
            PatternKind::Bool => "bool".to_string(),
            PatternKind::Int => "int".to_string(),
            PatternKind::Float => "float".to_string(),
            PatternKind::Bytes => "bytes".to_string(),
            PatternKind::Path => "path".to_string(),
            PatternKind::Literal(value) => format!("literal({value})"),
            PatternKind::Regex(regex) => format!("regex({})", regex.as_str()),
            PatternKind::Union(alternatives) => {
                let names: Vec<String> = alternatives.iter().map(|p| p.origin()).collect();
                format!("union[{}]", names.join("|"))
            }
            PatternKind::Anti(inner) => format!("anti({})", inner.origin()),
            PatternKind::Sequence(inner) => format!("sequence({})", inner.origin()),
            PatternKind::Mapping { key, value } => {
                format!("mapping({}:{})", key.origin(), value.origin())
            }
            PatternKind::OpaqueType { type_name, .. } => (*type_name).to_string(),
            PatternKind::Custom { name, .. } => (*name).to_string(),
        }
    }

    /// Offer one token. Pure: no state is read or written beyond the inputs.
    pub fn accept(&self, token: &Token) -> Accept {
        let converted = self.convert(token);
        match converted {
            Some(value) => {
                for validator in &self.validators {
                    if !validator(&value) {
                        return Accept::Refused;
                    }
                }
                Accept::Matched(value)
            }
            None => Accept::Mismatch,
        }
    }

    fn convert(&self, token: &Token) -> Option<Value> {
        match (&self.kind, token) {
            (PatternKind::Any, _) => Some(Value::from_token(token)),

            (PatternKind::Text, Token::Text(s)) => Some(Value::Str(s.clone())),
            (PatternKind::Text, Token::Opaque(_)) => None,

            (PatternKind::Bool, Token::Text(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (PatternKind::Bool, Token::Opaque(o)) => {
                o.downcast_ref::<bool>().map(|b| Value::Bool(*b))
            }

            (PatternKind::Int, Token::Text(s)) => s.parse::<i64>().ok().map(Value::Int),
            (PatternKind::Int, Token::Opaque(o)) => o.downcast_ref::<i64>().map(|i| Value::Int(*i)),

            (PatternKind::Float, Token::Text(s)) => s.parse::<f64>().ok().map(Value::Float),
            (PatternKind::Float, Token::Opaque(o)) => {
                o.downcast_ref::<f64>().map(|x| Value::Float(*x))
            }

            (PatternKind::Bytes, Token::Text(s)) => Some(Value::Bytes(s.as_bytes().to_vec())),
            (PatternKind::Bytes, Token::Opaque(o)) => {
                if let Some(buffer) = o.downcast_ref::<Vec<u8>>() {
                    Some(Value::Bytes(buffer.clone()))
                } else {
                    o.downcast_ref::<PathBuf>()
                        .map(|p| Value::Bytes(p.to_string_lossy().into_owned().into_bytes()))
                }
            }

            (PatternKind::Path, Token::Text(s)) => {
                Some(Value::Opaque(crate::model::OpaqueValue::new(PathBuf::from(
                    s,
                ))))
            }
            (PatternKind::Path, Token::Opaque(o)) => {
                if o.is::<PathBuf>() {
                    Some(Value::Opaque(o.clone()))
                } else {
                    None
                }
            }

            (PatternKind::Literal(expected), token) => {
                let equal = match (expected, token) {
                    (Value::Str(want), Token::Text(got)) => want == got,
                    (Value::Int(want), Token::Text(got)) => got.parse::<i64>().ok() == Some(*want),
                    (Value::Float(want), Token::Text(got)) => {
                        got.parse::<f64>().ok() == Some(*want)
                    }
                    (Value::Bool(want), Token::Text(got)) => {
                        got.parse::<bool>().ok() == Some(*want)
                    }
                    (Value::Opaque(want), Token::Opaque(got)) => want == got,
                    _ => false,
                };
                if equal {
                    Some(expected.clone())
                } else {
                    None
                }
            }

            (PatternKind::Regex(regex), Token::Text(s)) => {
                if regex.is_match(s) {
                    Some(Value::Str(s.clone()))
                } else {
                    None
                }
            }
            (PatternKind::Regex(_), Token::Opaque(_)) => None,

            (PatternKind::Union(alternatives), token) => alternatives
                .iter()
                .find_map(|alternative| alternative.accept(token).into_value()),

            (PatternKind::Anti(inner), token) => match inner.accept(token) {
                Accept::Matched(_) => None,
                Accept::Mismatch | Accept::Refused => Some(Value::from_token(token)),
            },

            (PatternKind::Sequence(inner), Token::Text(s)) => {
                let mut items = Vec::default();
                for piece in s.split(',') {
                    let piece = piece.trim();
                    if piece.is_empty() {
                        continue;
                    }
                    items.push(inner.accept(&Token::text(piece)).into_value()?);
                }
                Some(Value::List(items))
            }
            (PatternKind::Sequence(_), Token::Opaque(_)) => None,

            (PatternKind::Mapping { key, value }, Token::Text(s)) => {
                let mut entries = BTreeMap::default();
                for piece in s.split(',') {
                    let piece = piece.trim();
                    if piece.is_empty() {
                        continue;
                    }
                    let (k, v) = piece.split_once(':')?;
                    let bound_key = key.accept(&Token::text(k.trim())).into_value()?;
                    let bound_value = value.accept(&Token::text(v.trim())).into_value()?;
                    entries.insert(bound_key.to_string(), bound_value);
                }
                Some(Value::Map(entries))
            }
            (PatternKind::Mapping { .. }, Token::Opaque(_)) => None,

            (PatternKind::OpaqueType { type_id, .. }, Token::Opaque(o)) => {
                if o.type_id() == *type_id {
                    Some(Value::Opaque(o.clone()))
                } else {
                    None
                }
            }
            (PatternKind::OpaqueType { .. }, Token::Text(_)) => None,

            (PatternKind::Custom { convert, .. }, token) => convert(token),
        }
    }
}
