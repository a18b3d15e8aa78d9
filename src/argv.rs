use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::model::Token;

/// Raw input to a parse: a single line to be tokenized, or a pre-built
/// heterogeneous token sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseInput {
    Line(String),
    Tokens(Vec<Token>),
}

impl From<&str> for ParseInput {
    fn from(value: &str) -> Self {
        ParseInput::Line(value.to_string())
    }
}

impl From<String> for ParseInput {
    fn from(value: String) -> Self {
        ParseInput::Line(value)
    }
}

impl From<Vec<Token>> for ParseInput {
    fn from(value: Vec<Token>) -> Self {
        ParseInput::Tokens(value)
    }
}

pub(crate) type Preprocessor = Arc<dyn Fn(Token) -> Token + Send + Sync>;

/// Saved cursor position. Rewinding restores both the token index and the
/// byte offset within a partially consumed text token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArgvState {
    cursor: usize,
    offset: usize,
}

/// The stateful cursor over an ingested token stream.
///
/// The cursor only moves forward except through [`Argv::rewind`]: a
/// successful match commits its advancement, a failed one restores the state
/// captured on entry.
#[derive(Debug, Clone)]
pub(crate) struct Argv {
    origin: Vec<Token>,
    tokens: Vec<Token>,
    cursor: usize,
    offset: usize,
}

impl Argv {
    /// Normalize raw input into a token stream: split text on the separator
    /// set (honoring backslash escapes and paired quotes), transform opaque
    /// elements through registered preprocessors, drop filtered types.
    pub(crate) fn ingest(
        input: &ParseInput,
        separators: &[char],
        preprocessors: &HashMap<TypeId, Preprocessor>,
        filter_out: &HashSet<TypeId>,
    ) -> Self {
        let mut tokens = Vec::default();
        let raw: Vec<Token> = match input {
            ParseInput::Line(line) => vec![Token::text(line.clone())],
            ParseInput::Tokens(elements) => elements.clone(),
        };

        for element in raw {
            let transform = match &element {
                Token::Opaque(o) => preprocessors.get(&o.type_id()),
                Token::Text(_) => None,
            };
            let element = match transform {
                Some(transform) => transform(element),
                None => element,
            };
            match element {
                Token::Text(text) => {
                    for piece in split(&text, separators) {
                        tokens.push(Token::Text(piece));
                    }
                }
                Token::Opaque(o) => {
                    if !filter_out.contains(&o.type_id()) {
                        tokens.push(Token::Opaque(o));
                    }
                }
            }
        }

        Self {
            origin: tokens.clone(),
            tokens,
            cursor: 0,
            offset: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_tokens(tokens: Vec<Token>) -> Self {
        Self {
            origin: tokens.clone(),
            tokens,
            cursor: 0,
            offset: 0,
        }
    }

    /// The post-ingest snapshot, before any shortcut splicing.
    pub(crate) fn origin(&self) -> &[Token] {
        &self.origin
    }

    pub(crate) fn state(&self) -> ArgvState {
        ArgvState {
            cursor: self.cursor,
            offset: self.offset,
        }
    }

    pub(crate) fn rewind(&mut self, state: ArgvState) {
        self.cursor = state.cursor;
        self.offset = state.offset;
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    /// The current token without committing. A partially consumed text token
    /// is seen from its offset onward.
    pub(crate) fn peek(&self) -> Option<Token> {
        let token = self.tokens.get(self.cursor)?;
        match token {
            Token::Text(s) if self.offset > 0 => Some(Token::text(&s[self.offset..])),
            _ => Some(token.clone()),
        }
    }

    /// Text view of the current token, `None` for opaque tokens.
    pub(crate) fn peek_text(&self) -> Option<&str> {
        match self.tokens.get(self.cursor)? {
            Token::Text(s) => Some(&s[self.offset..]),
            Token::Opaque(_) => None,
        }
    }

    /// Commit the current token and advance.
    pub(crate) fn take(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.cursor += 1;
        self.offset = 0;
        Some(token)
    }

    /// Consume `bytes` of the current text token, leaving the remainder at
    /// the cursor as the next token to be seen. Used by compact matching to
    /// split a token mid-way.
    pub(crate) fn advance_within(&mut self, bytes: usize) {
        let remaining = match self.tokens.get(self.cursor) {
            Some(Token::Text(s)) => s.len() - self.offset,
            _ => unreachable!("internal error - advance_within on a non-text token"),
        };
        if bytes >= remaining {
            self.cursor += 1;
            self.offset = 0;
        } else {
            self.offset += bytes;
        }
    }

    /// Replace the `consumed` tokens at the cursor with `replacement`,
    /// leaving the cursor at the start of the spliced region. Used by
    /// shortcut expansion.
    pub(crate) fn splice(&mut self, consumed: usize, replacement: Vec<Token>) {
        let end = (self.cursor + consumed).min(self.tokens.len());
        self.tokens.splice(self.cursor..end, replacement);
        self.offset = 0;
    }

    /// Tokens from the cursor to the end, ignoring any partial-token offset.
    pub(crate) fn rest(&self) -> &[Token] {
        &self.tokens[self.cursor..]
    }
}

/// Split on the separator set, honoring backslash escapes and paired quotes.
/// Quotes group separator characters into one token and are stripped; a
/// backslash makes the following character literal.
pub(crate) fn split(text: &str, separators: &[char]) -> Vec<String> {
    let mut pieces = Vec::default();
    let mut current = String::default();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        match quote {
            Some(open) if ch == open => {
                quote = None;
            }
            Some(_) => current.push(ch),
            None => {
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                } else if separators.contains(&ch) {
                    if !current.is_empty() {
                        pieces.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(ch);
                }
            }
        }
    }

    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
