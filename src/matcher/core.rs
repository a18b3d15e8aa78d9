use std::collections::BTreeMap;

use crate::api::{Arg, Args};
use crate::argv::Argv;
use crate::error::ErrorKind;
use crate::matcher::model::{CloseError, SlotBuffer};
use crate::model::{Token, Value};
use crate::pattern::Accept;

/// Outcome of offering the token at the cursor to the argument slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feed {
    /// The token was bound and the cursor committed.
    Consumed,
    /// The token is a reserved built-in name and the pending slot may be
    /// skipped; it is left at the cursor for the node level.
    Reserved,
    /// No slot can take the token; it is left for the enclosing scope.
    Exhausted,
}

enum SlotAccept {
    Matched(Vec<Value>),
    Mismatch,
    Refused,
}

/// Walks an [`Args`] schema over the token stream, one token per feed.
///
/// Slots are consumed in definition order with a secondary pool of
/// unsatisfied keyword slots; a variadic slot accumulates through a
/// [`SlotBuffer`] until its pattern rejects or its bounds fill. `close`
/// settles defaults and reports missing required slots.
pub(crate) struct ArgsMatcher<'s> {
    slots: Vec<&'s Arg>,
    position: usize,
    keyword_pool: Vec<usize>,
    bound: BTreeMap<String, Value>,
    buffer: Option<(usize, SlotBuffer)>,
    scope_separators: Option<Vec<char>>,
}

impl<'s> ArgsMatcher<'s> {
    pub(crate) fn new(args: &'s Args) -> Self {
        Self::with_separators(args, None)
    }

    /// Scope-level separator override, inherited by slots that carry none of
    /// their own (a subcommand's separators apply to its argument slots).
    pub(crate) fn with_separators(args: &'s Args, separators: Option<&[char]>) -> Self {
        let slots: Vec<&Arg> = args.iter().collect();
        let keyword_pool = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_keyword())
            .map(|(index, _)| index)
            .collect();
        Self {
            slots,
            position: 0,
            keyword_pool,
            bound: BTreeMap::default(),
            buffer: None,
            scope_separators: separators.map(<[char]>::to_vec),
        }
    }

    fn next_positional(&self) -> Option<usize> {
        (self.position..self.slots.len()).find(|&index| !self.slots[index].is_keyword())
    }

    /// Names of slots that still await input, for completion candidates.
    pub(crate) fn pending(&self) -> Vec<String> {
        let mut names = Vec::default();
        if let Some(index) = self.next_positional() {
            for slot in &self.slots[index..] {
                if !slot.is_keyword() && !self.bound.contains_key(slot.name()) {
                    names.push(slot.name().to_string());
                }
            }
        }
        for &index in &self.keyword_pool {
            let slot = self.slots[index];
            if !self.bound.contains_key(slot.name()) {
                names.push(slot.name().to_string());
            }
        }
        names
    }

    /// Whether an unsatisfied required slot would accept this token. Used to
    /// arbitrate node-versus-slot claims on the stream's final token.
    pub(crate) fn wants(&self, token: &Token) -> bool {
        if let Some((index, buffer)) = &self.buffer {
            if !buffer.can_close() {
                return matches!(
                    accept_slot(self.slots[*index], token, self.scope_separators.as_deref()),
                    SlotAccept::Matched(_)
                );
            }
            return false;
        }
        if let Some(index) = self.next_positional() {
            let slot = self.slots[index];
            let required = !slot.is_optional()
                && !slot.has_default()
                && slot.pattern().count().map_or(true, |count| count.min() > 0);
            if required {
                return matches!(
                    accept_slot(slot, token, self.scope_separators.as_deref()),
                    SlotAccept::Matched(_)
                );
            }
        }
        false
    }

    /// Offer the token at the cursor. `reserved` carries the built-in option
    /// names active at the node level.
    pub(crate) fn feed(
        &mut self,
        argv: &mut Argv,
        reserved: &[&str],
    ) -> Result<Feed, ErrorKind> {
        let Some(token) = argv.peek() else {
            return Ok(Feed::Exhausted);
        };

        // Reserved names are left to the node level whenever the pending
        // slot can recover without this token.
        if let Some(text) = token.as_text() {
            if reserved.contains(&text) && self.can_yield() {
                return Ok(Feed::Reserved);
            }
        }

        if let Some(outcome) = self.feed_keyword(argv, &token)? {
            return Ok(outcome);
        }

        loop {
            if let Some((index, buffer)) = &mut self.buffer {
                let slot = self.slots[*index];
                if buffer.is_open() {
                    match accept_slot(slot, &token, self.scope_separators.as_deref()) {
                        SlotAccept::Matched(values) => {
                            for value in values {
                                buffer.push(value);
                            }
                            argv.take();
                            return Ok(Feed::Consumed);
                        }
                        SlotAccept::Mismatch => {
                            if buffer.can_close() {
                                self.close_buffer()?;
                                continue;
                            }
                            return Err(ErrorKind::ParamsUnmatched {
                                token: token.display(),
                                expected: slot.pattern().origin(),
                            });
                        }
                        SlotAccept::Refused => {
                            return Err(ErrorKind::InvalidParam {
                                slot: slot.name().to_string(),
                                reason: "invalid value".to_string(),
                            });
                        }
                    }
                }
                self.close_buffer()?;
                continue;
            }

            let Some(index) = self.next_positional() else {
                return Ok(Feed::Exhausted);
            };
            let slot = self.slots[index];

            if slot.is_variadic() {
                let count = slot
                    .pattern()
                    .count()
                    .expect("internal error - a variadic slot carries a count");
                self.buffer = Some((index, SlotBuffer::new(slot.name(), count)));
                self.position = index + 1;
                continue;
            }

            match accept_slot(slot, &token, self.scope_separators.as_deref()) {
                SlotAccept::Matched(values) => {
                    let value = collapse(values);
                    self.bound.insert(slot.name().to_string(), value);
                    self.position = index + 1;
                    argv.take();
                    return Ok(Feed::Consumed);
                }
                SlotAccept::Mismatch => {
                    if slot.is_optional() {
                        if let Some(default) = slot.default_value() {
                            self.bound.insert(slot.name().to_string(), default);
                        }
                        self.position = index + 1;
                        continue;
                    }
                    return Err(ErrorKind::ParamsUnmatched {
                        token: token.display(),
                        expected: slot.pattern().origin(),
                    });
                }
                SlotAccept::Refused => {
                    return Err(ErrorKind::InvalidParam {
                        slot: slot.name().to_string(),
                        reason: "invalid value".to_string(),
                    });
                }
            }
        }
    }

    fn can_yield(&self) -> bool {
        if let Some((_, buffer)) = &self.buffer {
            return buffer.can_close();
        }
        match self.next_positional() {
            Some(index) => {
                let slot = self.slots[index];
                slot.is_optional()
                    || slot.has_default()
                    || slot.pattern().count().map_or(false, |count| count.min() == 0)
            }
            None => true,
        }
    }

    /// Route a `key=value` (or whitespace-separated) token to a pooled
    /// keyword slot. Returns `None` when no key matches.
    fn feed_keyword(
        &mut self,
        argv: &mut Argv,
        token: &Token,
    ) -> Result<Option<Feed>, ErrorKind> {
        let Some(text) = token.as_text() else {
            return Ok(None);
        };

        let mut hit: Option<(usize, Option<String>)> = None;
        for &index in &self.keyword_pool {
            let slot = self.slots[index];
            let spec = slot
                .pattern()
                .keyword_spec()
                .expect("internal error - pooled slot must carry a keyword marker");
            if spec.sep.is_whitespace() {
                if text == spec.key {
                    hit = Some((index, None));
                    break;
                }
            } else if let Some(rest) = text.strip_prefix(spec.key.as_str()) {
                if let Some(value) = rest.strip_prefix(spec.sep) {
                    hit = Some((index, Some(value.to_string())));
                    break;
                }
            }
        }

        let Some((index, inline_value)) = hit else {
            return Ok(None);
        };
        let slot = self.slots[index];

        argv.take();
        let value_token = match inline_value {
            Some(text) => Token::text(text),
            None => match argv.take() {
                Some(next) => next,
                None => {
                    return Err(ErrorKind::ParamsMissing(slot.name().to_string()));
                }
            },
        };

        match slot.pattern().accept(&value_token) {
            Accept::Matched(value) => {
                if slot.is_variadic() {
                    let entry = self
                        .bound
                        .entry(slot.name().to_string())
                        .or_insert_with(|| Value::List(Vec::default()));
                    if let Value::List(values) = entry {
                        values.push(value);
                    }
                } else {
                    self.bound.insert(slot.name().to_string(), value);
                    self.keyword_pool.retain(|&i| i != index);
                }
                Ok(Some(Feed::Consumed))
            }
            Accept::Mismatch => Err(ErrorKind::ParamsUnmatched {
                token: value_token.display(),
                expected: slot.pattern().origin(),
            }),
            Accept::Refused => Err(ErrorKind::InvalidParam {
                slot: slot.name().to_string(),
                reason: "invalid value".to_string(),
            }),
        }
    }

    fn close_buffer(&mut self) -> Result<(), ErrorKind> {
        if let Some((_, buffer)) = self.buffer.take() {
            let (name, value) = buffer.close().map_err(|error| match error {
                CloseError::TooFewValues { name, .. } => ErrorKind::ParamsMissing(name),
            })?;
            self.bound.insert(name, value);
        }
        Ok(())
    }

    /// Settle the matcher: close any open buffer, bind defaults, and report
    /// the first missing required slot.
    pub(crate) fn close(mut self) -> Result<BTreeMap<String, Value>, ErrorKind> {
        self.close_buffer()?;

        let mut index = self.position;
        while index < self.slots.len() {
            let slot = self.slots[index];
            index += 1;
            if slot.is_keyword() || self.bound.contains_key(slot.name()) {
                continue;
            }
            if let Some(default) = slot.default_value() {
                self.bound.insert(slot.name().to_string(), default);
            } else if slot.pattern().count().map_or(false, |count| count.min() == 0) {
                // A never-opened variadic slot with no lower bound settles
                // to an empty list.
                self.bound
                    .insert(slot.name().to_string(), Value::List(Vec::default()));
            } else if !slot.is_optional() {
                return Err(ErrorKind::ParamsMissing(slot.name().to_string()));
            }
        }

        for &index in &self.keyword_pool {
            let slot = self.slots[index];
            if self.bound.contains_key(slot.name()) {
                continue;
            }
            if let Some(default) = slot.default_value() {
                self.bound.insert(slot.name().to_string(), default);
            } else if !slot.is_optional() {
                return Err(ErrorKind::ArgumentMissing(slot.name().to_string()));
            }
        }

        Ok(self.bound)
    }
}

/// Accept one token for a slot, honoring its separator override (falling
/// back to the scope's): a token containing override separators splits into
/// pieces that must all match.
fn accept_slot(slot: &Arg, token: &Token, scope_separators: Option<&[char]>) -> SlotAccept {
    let override_separators = slot.separator_override().or(scope_separators);
    if let (Some(separators), Some(text)) = (override_separators, token.as_text()) {
        let pieces: Vec<&str> = text
            .split(|c: char| separators.contains(&c))
            .filter(|piece| !piece.is_empty())
            .collect();
        if pieces.len() > 1 {
            let mut values = Vec::default();
            for piece in pieces {
                match slot.pattern().accept(&Token::text(piece)) {
                    Accept::Matched(value) => values.push(value),
                    Accept::Mismatch => return SlotAccept::Mismatch,
                    Accept::Refused => return SlotAccept::Refused,
                }
            }
            return SlotAccept::Matched(values);
        }
    }
    match slot.pattern().accept(token) {
        Accept::Matched(value) => SlotAccept::Matched(vec![value]),
        Accept::Mismatch => SlotAccept::Mismatch,
        Accept::Refused => SlotAccept::Refused,
    }
}

fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.pop().expect("internal error - length checked")
    } else {
        Value::List(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argv::Argv;
    use crate::model::Count;
    use crate::pattern::Pattern;
    use rstest::rstest;

    fn argv_of(line: &str) -> Argv {
        let tokens = line
            .split_whitespace()
            .map(Token::text)
            .collect::<Vec<Token>>();
        Argv::from_tokens(tokens)
    }

    fn drain(matcher: &mut ArgsMatcher<'_>, argv: &mut Argv) -> Result<Feed, ErrorKind> {
        let mut last = Feed::Exhausted;
        while !argv.exhausted() {
            last = matcher.feed(argv, &[])?;
            if last != Feed::Consumed {
                break;
            }
        }
        Ok(last)
    }

    #[test]
    fn positional_in_order() {
        // Setup
        let args = Args::new()
            .slot("foo", Pattern::int())
            .slot("bar", Pattern::text());
        let mut argv = argv_of("2 hello");
        let mut matcher = ArgsMatcher::new(&args);

        // Execute
        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();

        // Verify
        assert_eq!(bound.get("foo"), Some(&Value::Int(2)));
        assert_eq!(bound.get("bar"), Some(&Value::from("hello")));
    }

    #[test]
    fn mismatch_on_required_slot() {
        let args = Args::new()
            .slot("foo", Pattern::int())
            .slot("bar", Pattern::text());
        let mut argv = argv_of("two hello");
        let mut matcher = ArgsMatcher::new(&args);

        let error = drain(&mut matcher, &mut argv).unwrap_err();
        assert_matches!(error, ErrorKind::ParamsUnmatched { .. });
    }

    #[test]
    fn missing_required_slot_on_close() {
        let args = Args::new()
            .slot("foo", Pattern::int())
            .slot("bar", Pattern::text());
        let mut argv = argv_of("2");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        assert_eq!(matcher.close().unwrap_err(), ErrorKind::ParamsMissing("bar".to_string()));
    }

    #[test]
    fn optional_skips_and_binds_default() {
        let args = Args::new()
            .add(Arg::new("num", Pattern::int()).optional().default(7_i64))
            .slot("word", Pattern::text());
        let mut argv = argv_of("hello");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();

        assert_eq!(bound.get("num"), Some(&Value::Int(7)));
        assert_eq!(bound.get("word"), Some(&Value::from("hello")));
    }

    #[test]
    fn default_completeness_on_close() {
        let args = Args::new().add(Arg::new("num", Pattern::int()).default(7_i64));
        let mut argv = argv_of("");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(bound.get("num"), Some(&Value::Int(7)));
    }

    #[rstest]
    #[case("1 2 3", vec![1, 2, 3])]
    #[case("1", vec![1])]
    fn variadic_greedy(#[case] line: &str, #[case] expected: Vec<i64>) {
        let args = Args::new().add(Arg::new("nums", Pattern::int().repeat(Count::AtLeast(1))));
        let mut argv = argv_of(line);
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(
            bound.get("nums"),
            Some(&Value::List(expected.into_iter().map(Value::Int).collect()))
        );
    }

    #[test]
    fn variadic_stops_at_mismatch_then_next_slot() {
        let args = Args::new()
            .add(Arg::new("nums", Pattern::int().repeat(Count::AtLeast(0))))
            .slot("word", Pattern::text());
        let mut argv = argv_of("1 2 stop");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(
            bound.get("nums"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(bound.get("word"), Some(&Value::from("stop")));
    }

    #[test]
    fn variadic_respects_upper_bound() {
        let args = Args::new()
            .add(Arg::new("pair", Pattern::int().repeat(Count::Exactly(2))))
            .slot("word", Pattern::text());
        let mut argv = argv_of("1 2 3");
        let mut matcher = ArgsMatcher::new(&args);

        // The third token falls to 'word', not the filled buffer.
        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(
            bound.get("pair"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(bound.get("word"), Some(&Value::from("3")));
    }

    #[test]
    fn unfed_variadic_with_zero_minimum_is_empty() {
        let args = Args::new().add(Arg::new("nums", Pattern::int().repeat(Count::AtLeast(0))));
        let mut argv = argv_of("");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(bound.get("nums"), Some(&Value::List(Vec::default())));
    }

    #[test]
    fn variadic_under_minimum_is_missing() {
        let args = Args::new().add(Arg::new("nums", Pattern::int().repeat(Count::AtLeast(2))));
        let mut argv = argv_of("1");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        assert_eq!(
            matcher.close().unwrap_err(),
            ErrorKind::ParamsMissing("nums".to_string())
        );
    }

    #[test]
    fn keyword_inline_value() {
        let args = Args::new()
            .slot("word", Pattern::text())
            .add(Arg::new("depth", Pattern::int().keyword("depth")));
        let mut argv = argv_of("depth=3 hello");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(bound.get("depth"), Some(&Value::Int(3)));
        assert_eq!(bound.get("word"), Some(&Value::from("hello")));
    }

    #[test]
    fn keyword_whitespace_sep_takes_next_token() {
        let args = Args::new().add(Arg::new("depth", Pattern::int().keyword_with("depth", ' ')));
        let mut argv = argv_of("depth 3");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(bound.get("depth"), Some(&Value::Int(3)));
    }

    #[test]
    fn keyword_missing_is_argument_missing() {
        let args = Args::new().add(Arg::new("depth", Pattern::int().keyword("depth")));
        let mut argv = argv_of("");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        assert_eq!(
            matcher.close().unwrap_err(),
            ErrorKind::ArgumentMissing("depth".to_string())
        );
    }

    #[test]
    fn keyword_value_mismatch() {
        let args = Args::new().add(Arg::new("depth", Pattern::int().keyword("depth")));
        let mut argv = argv_of("depth=deep");
        let mut matcher = ArgsMatcher::new(&args);

        let error = drain(&mut matcher, &mut argv).unwrap_err();
        assert_matches!(error, ErrorKind::ParamsUnmatched { .. });
    }

    #[test]
    fn keywords_in_any_order() {
        let args = Args::new()
            .add(Arg::new("a", Pattern::int().keyword("a")))
            .add(Arg::new("b", Pattern::int().keyword("b")));
        let mut argv = argv_of("b=2 a=1");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(bound.get("a"), Some(&Value::Int(1)));
        assert_eq!(bound.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn reserved_yields_when_slot_optional() {
        let args = Args::new().add(Arg::new("word", Pattern::text()).optional());
        let mut argv = argv_of("--help");
        let mut matcher = ArgsMatcher::new(&args);

        assert_eq!(matcher.feed(&mut argv, &["--help"]).unwrap(), Feed::Reserved);
        // The token stays at the cursor.
        assert_eq!(argv.peek_text(), Some("--help"));
    }

    #[test]
    fn reserved_binds_when_slot_required() {
        let args = Args::new().slot("word", Pattern::text());
        let mut argv = argv_of("--help");
        let mut matcher = ArgsMatcher::new(&args);

        assert_eq!(matcher.feed(&mut argv, &["--help"]).unwrap(), Feed::Consumed);
        let bound = matcher.close().unwrap();
        assert_eq!(bound.get("word"), Some(&Value::from("--help")));
    }

    #[test]
    fn exhausted_when_no_slot_takes_it() {
        let args = Args::new().slot("word", Pattern::text());
        let mut argv = argv_of("first extra");
        let mut matcher = ArgsMatcher::new(&args);

        assert_eq!(matcher.feed(&mut argv, &[]).unwrap(), Feed::Consumed);
        assert_eq!(matcher.feed(&mut argv, &[]).unwrap(), Feed::Exhausted);
        assert_eq!(argv.peek_text(), Some("extra"));
    }

    #[test]
    fn separator_override_splits_one_token() {
        let args = Args::new().add(
            Arg::new("nums", Pattern::int().repeat(Count::AtLeast(1))).separator(';'),
        );
        let mut argv = argv_of("1;2;3");
        let mut matcher = ArgsMatcher::new(&args);

        drain(&mut matcher, &mut argv).unwrap();
        let bound = matcher.close().unwrap();
        assert_eq!(
            bound.get("nums"),
            Some(&Value::List(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3)
            ]))
        );
    }

    #[test]
    fn refused_surfaces_invalid_param() {
        let args = Args::new().add(Arg::new(
            "even",
            Pattern::int().validate(|v| v.as_int().map_or(false, |i| i % 2 == 0)),
        ));
        let mut argv = argv_of("3");
        let mut matcher = ArgsMatcher::new(&args);

        let error = drain(&mut matcher, &mut argv).unwrap_err();
        assert_matches!(error, ErrorKind::InvalidParam { .. });
    }

    #[test]
    fn wants_tracks_the_pending_required_slot() {
        let args = Args::new().slot("word", Pattern::text());
        let mut argv = argv_of("hello");
        let mut matcher = ArgsMatcher::new(&args);
        assert!(matcher.wants(&Token::text("anything")));

        drain(&mut matcher, &mut argv).unwrap();
        assert!(!matcher.wants(&Token::text("anything")));
    }

    #[test]
    fn pending_lists_unsatisfied_names() {
        let args = Args::new()
            .slot("word", Pattern::text())
            .add(Arg::new("depth", Pattern::int().keyword("depth")));
        let matcher = ArgsMatcher::new(&args);
        assert_eq!(matcher.pending(), vec!["word".to_string(), "depth".to_string()]);
    }
}
