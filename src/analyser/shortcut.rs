use regex::Regex;

use crate::argv::Argv;
use crate::model::Token;

// Sentinels standing in for escaped braces while placeholders substitute.
const OPEN_SENTINEL: char = '\u{1}';
const CLOSE_SENTINEL: char = '\u{2}';

/// A named template substituted for a matching prefix of the input before
/// header matching.
///
/// Template placeholders: `{N}` is the Nth remainder token, `{*}` all
/// remaining tokens joined by the command separator, `{*(SEP)}` joined by
/// `SEP`, and `\{`/`\}` are literal braces.
///
/// ### Example
/// ```
/// use alconna::Shortcut;
///
/// let echo = Shortcut::new("echo", r"eval print(\'{*}\')");
/// assert_eq!(echo.key(), "echo");
/// ```
#[derive(Debug, Clone)]
pub struct Shortcut {
    key: String,
    template: String,
    fuzzy: bool,
    prefix: bool,
}

impl Shortcut {
    pub fn new(key: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            template: template.into(),
            fuzzy: false,
            prefix: false,
        }
    }

    /// Also match when the key is a prefix of the first token; the split
    /// remainder joins the remainder tokens.
    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    /// Also match the key preceded by one of the command's header prefixes.
    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn matches(&self, first: &str, header_prefixes: &[String]) -> Option<Option<String>> {
        if first == self.key {
            return Some(None);
        }
        if self.prefix {
            for prefix in header_prefixes {
                if let Some(rest) = first.strip_prefix(prefix.as_str()) {
                    if rest == self.key {
                        return Some(None);
                    }
                }
            }
        }
        if self.fuzzy {
            if let Some(rest) = first.strip_prefix(self.key.as_str()) {
                if !rest.is_empty() {
                    return Some(Some(rest.to_string()));
                }
            }
        }
        None
    }
}

/// The per-command shortcut store.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShortcutTable {
    items: Vec<Shortcut>,
}

impl ShortcutTable {
    pub(crate) fn add(&mut self, shortcut: Shortcut) {
        // Re-registering a key replaces the old template.
        self.items.retain(|existing| existing.key != shortcut.key);
        self.items.push(shortcut);
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| existing.key != key);
        self.items.len() != before
    }

    pub(crate) fn list(&self) -> &[Shortcut] {
        &self.items
    }

    /// Expand the first matching shortcut in place. Returns whether a splice
    /// happened.
    pub(crate) fn expand(
        &self,
        argv: &mut Argv,
        separators: &[char],
        header_prefixes: &[String],
    ) -> bool {
        let Some(first) = argv.peek_text().map(str::to_string) else {
            return false;
        };

        for shortcut in &self.items {
            let Some(split_rest) = shortcut.matches(&first, header_prefixes) else {
                continue;
            };

            let mut remainder: Vec<Token> = Vec::default();
            if let Some(rest) = split_rest {
                remainder.push(Token::Text(rest));
            }
            remainder.extend(argv.rest().iter().skip(1).cloned());

            let consumed = argv.rest().len();
            let expanded = expand_template(&shortcut.template, &remainder, separators);
            argv.splice(consumed, expanded);
            return true;
        }
        false
    }
}

/// Render a template against the remainder tokens.
fn expand_template(template: &str, remainder: &[Token], separators: &[char]) -> Vec<Token> {
    let protected = template
        .replace("\\{", &OPEN_SENTINEL.to_string())
        .replace("\\}", &CLOSE_SENTINEL.to_string());

    let joiner = separators.first().copied().unwrap_or(' ').to_string();
    let placeholder =
        Regex::new(r"\{(\d+|\*(?:\(([^)]*)\))?)\}").expect("internal error - static regex");

    let mut out: Vec<Token> = Vec::default();
    let mut star_seen = false;
    let mut max_indexed: Option<usize> = None;

    for piece in crate::argv::split(&protected, separators) {
        // A placeholder standing alone passes opaque tokens through intact.
        if let Some(captures) = placeholder.captures(&piece) {
            if captures.get(0).map(|m| m.as_str()) == Some(piece.as_str()) {
                let spec = &captures[1];
                if let Ok(index) = spec.parse::<usize>() {
                    max_indexed = Some(max_indexed.map_or(index, |m| m.max(index)));
                    if let Some(token) = remainder.get(index) {
                        out.push(token.clone());
                    }
                    continue;
                }
            }
        }

        let mut rendered = String::default();
        let mut last = 0;
        for captures in placeholder.captures_iter(&piece) {
            let whole = captures.get(0).expect("internal error - group 0 always exists");
            rendered.push_str(&piece[last..whole.start()]);
            last = whole.end();

            let spec = &captures[1];
            if let Ok(index) = spec.parse::<usize>() {
                max_indexed = Some(max_indexed.map_or(index, |m| m.max(index)));
                if let Some(token) = remainder.get(index) {
                    rendered.push_str(&token.display());
                }
            } else {
                star_seen = true;
                let sep = captures
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| joiner.clone());
                let joined: Vec<String> =
                    remainder.iter().map(|token| token.display()).collect();
                rendered.push_str(&joined.join(&sep));
            }
        }
        rendered.push_str(&piece[last..]);

        // Re-split the rendered text so an expansion tokenizes exactly like
        // the equivalent direct input (quotes introduced by substitution
        // group and strip the same way).
        for final_piece in crate::argv::split(&rendered, separators) {
            let restored = final_piece
                .replace(OPEN_SENTINEL, "{")
                .replace(CLOSE_SENTINEL, "}");
            out.push(Token::Text(restored));
        }
    }

    // Without a star placeholder, remainder tokens beyond the highest {N}
    // reference carry over after the template.
    if !star_seen {
        let from = max_indexed.map_or(0, |m| m + 1);
        out.extend(remainder.iter().skip(from).cloned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argv::Argv;
    use crate::constant::DEFAULT_SEPARATORS;
    use rstest::rstest;

    fn argv_of(line: &str) -> Argv {
        Argv::from_tokens(line.split_whitespace().map(Token::text).collect())
    }

    fn texts(argv: &Argv) -> Vec<String> {
        argv.rest().iter().map(|t| t.display()).collect()
    }

    #[test]
    fn exact_key_splices_template() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("st", "status --all"));
        let mut argv = argv_of("st");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), vec!["status", "--all"]);
    }

    #[test]
    fn star_joins_remainder() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("echo", r"eval print(\'{*}\')"));
        let mut argv = argv_of("echo hello world");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        // The quotes introduced by the template group and strip on the
        // re-split, exactly as they would in direct input.
        assert_eq!(texts(&argv), vec!["eval", "print(hello world)"]);
    }

    #[rstest]
    #[case("run a b", vec!["go", "b", "a"])]
    fn indexed_placeholders(#[case] line: &str, #[case] expected: Vec<&str>) {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("run", "go {1} {0}"));
        let mut argv = argv_of(line);

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), expected);
    }

    #[test]
    fn star_with_custom_separator() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("sum", "add {*(+)}"));
        let mut argv = argv_of("sum 1 2 3");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), vec!["add", "1+2+3"]);
    }

    #[test]
    fn no_placeholder_appends_remainder() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("i", "/pip install"));
        let mut argv = argv_of("i numpy");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), vec!["/pip", "install", "numpy"]);
    }

    #[test]
    fn escaped_braces_stay_literal() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("b", r"show \{0\}"));
        let mut argv = argv_of("b");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), vec!["show", "{0}"]);
    }

    #[test]
    fn fuzzy_splits_key_prefix() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("dd", "roll {*}").fuzzy());
        let mut argv = argv_of("dd6");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), vec!["roll", "6"]);
    }

    #[test]
    fn non_fuzzy_requires_exact_key() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("dd", "roll {*}"));
        let mut argv = argv_of("dd6");

        assert!(!table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        assert_eq!(texts(&argv), vec!["dd6"]);
    }

    #[test]
    fn prefix_flag_honors_header_prefixes() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("st", "/pip list").prefix());
        let mut argv = argv_of("/st");

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &["/".to_string()]));
        assert_eq!(texts(&argv), vec!["/pip", "list"]);
    }

    #[test]
    fn opaque_remainder_passes_through_indexed() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("read", "load {0}"));
        let mut argv = Argv::from_tokens(vec![
            Token::text("read"),
            Token::opaque(vec![1_u8, 2]),
        ]);

        assert!(table.expand(&mut argv, DEFAULT_SEPARATORS, &[]));
        let rest = argv.rest();
        assert_eq!(rest[0], Token::text("load"));
        assert_eq!(rest[1].as_text(), None);
    }

    #[test]
    fn re_adding_a_key_replaces() {
        let mut table = ShortcutTable::default();
        table.add(Shortcut::new("st", "one"));
        table.add(Shortcut::new("st", "two"));
        assert_eq!(table.list().len(), 1);
        assert_eq!(table.list()[0].template(), "two");
        assert!(table.remove("st"));
        assert!(!table.remove("st"));
    }
}
