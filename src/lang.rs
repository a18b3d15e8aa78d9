use std::collections::HashMap;

use crate::error::ErrorKind;

/// An i18n string table: stable keys mapped to templates with positional
/// `{0}`, `{1}` placeholders.
///
/// The core never formats user-facing text itself; it emits a key plus
/// placeholders and the table renders them. Replacing or extending entries
/// swaps the language without touching parse logic.
#[derive(Debug, Clone)]
pub struct Lang {
    entries: HashMap<String, String>,
}

impl Default for Lang {
    fn default() -> Self {
        let mut entries = HashMap::default();
        for (key, template) in [
            ("analyser.header_mismatch", "no prefix or command name matched '{0}'."),
            ("analyser.fuzzy_suggest", "unknown command '{0}', did you mean '{1}'?"),
            ("args.params_unmatched", "token '{0}' does not fit '{1}'."),
            ("args.params_missing", "required slot '{0}' ran out of input."),
            ("args.argument_missing", "keyword argument '{0}' is missing its key."),
            ("args.invalid_param", "invalid value for '{0}': {1}."),
            ("result.ambiguous_path", "path '{0}' is reachable through both an option and a subcommand."),
            ("behavior.rejected", "behavior '{0}' rejected the parse: {1}."),
            ("builtin.handled", "builtin '{0}' handled the input."),
            ("help.usage", "usage:"),
            ("help.arguments", "arguments:"),
            ("help.options", "options:"),
            ("help.subcommands", "subcommands:"),
            ("help.shortcuts", "shortcuts:"),
        ] {
            entries.insert(key.to_string(), template.to_string());
        }
        Self { entries }
    }
}

impl Lang {
    /// Override or add a template.
    pub fn set(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.entries.insert(key.into(), template.into());
    }

    /// Render a template by key, substituting `{n}` with `placeholders[n]`.
    /// Unknown keys fall back to the key itself so a missing entry is visible
    /// rather than fatal.
    pub fn render(&self, key: &str, placeholders: &[String]) -> String {
        let template = match self.entries.get(key) {
            Some(t) => t.as_str(),
            None => key,
        };
        let mut out = template.to_string();
        for (index, value) in placeholders.iter().enumerate() {
            out = out.replace(&format!("{{{index}}}"), value);
        }
        out
    }

    /// Localized message for an error record.
    pub fn message(&self, error: &ErrorKind) -> String {
        self.render(error.key(), &error.placeholders())
    }
}
