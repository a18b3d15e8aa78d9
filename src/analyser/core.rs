use std::collections::BTreeMap;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

use crate::analyser::completion::CompCollector;
use crate::analyser::shortcut::Shortcut;
use crate::api::{Command, Header, HeaderName, Opt, OptAction, Sentence, Subcommand};
use crate::argv::{Argv, ParseInput};
use crate::constant::*;
use crate::error::{Builtin, ErrorKind};
use crate::matcher::{ArgsMatcher, Feed};
use crate::model::{Token, Value};
use crate::printer;
use crate::registry::Registry;
use crate::result::{Arparma, HeadResult, OptionResult, SubcommandResult};

/// Parse the input against the command, consulting the registry for
/// shortcuts, the parse cache and the i18n table.
pub(crate) fn parse(command: &Command, input: &ParseInput, registry: &Registry) -> Arparma {
    let meta = command.meta_ref();
    let argv = Argv::ingest(
        input,
        meta.separators(),
        meta.preprocessors(),
        meta.filter_out(),
    );

    // Only pure-text inputs cache: opaque handles have no stable identity
    // across parses. Commands with behaviors stay uncached, since a behavior
    // may be stateful.
    let cache_key = if command.behaviors_ref().is_empty() {
        canonical_key(command, &argv)
    } else {
        None
    };
    if let Some(key) = &cache_key {
        if let Some(hit) = registry.cache_get(key) {
            #[cfg(feature = "tracing_debug")]
            debug!("cache hit for '{}'", key.1);
            return hit;
        }
    }

    let mut driver = Driver {
        command,
        registry,
        argv,
        comp: None,
    };
    let result = driver.run();

    if let Some(key) = cache_key {
        if result.builtin_output().is_none() {
            registry.cache_put(key, result.clone());
        }
    }
    result
}

/// Speculative parse: instead of reporting an error, record the candidate
/// next-tokens at the cursor's stopping point.
pub(crate) fn complete(
    command: &Command,
    input: &ParseInput,
    registry: &Registry,
) -> crate::analyser::CompSession {
    let meta = command.meta_ref();
    let argv = Argv::ingest(
        input,
        meta.separators(),
        meta.preprocessors(),
        meta.filter_out(),
    );
    let mut driver = Driver {
        command,
        registry,
        argv,
        comp: Some(CompCollector::default()),
    };
    driver.run();
    driver
        .comp
        .expect("internal error - completion collector installed above")
        .into_session()
}

fn canonical_key(command: &Command, argv: &Argv) -> Option<(u64, String)> {
    let mut parts = Vec::with_capacity(argv.origin().len());
    for token in argv.origin() {
        parts.push(token.as_text()?.to_string());
    }
    Some((command.fingerprint(), parts.join("\u{1f}")))
}

/// Everything bound within one scope of the grammar.
#[derive(Debug, Default)]
struct ScopeOutcome {
    args: BTreeMap<String, Value>,
    options: BTreeMap<String, OptionResult>,
    subcommands: BTreeMap<String, SubcommandResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateKind {
    Option(usize),
    Subcommand(usize),
}

struct Driver<'c> {
    command: &'c Command,
    registry: &'c Registry,
    argv: Argv,
    comp: Option<CompCollector>,
}

impl<'c> Driver<'c> {
    fn run(&mut self) -> Arparma {
        let command = self.command;
        let meta = command.meta_ref();
        let source = self.argv.origin().to_vec();

        let shortcuts = self.registry.shortcut_table(&command.id());
        if shortcuts.expand(
            &mut self.argv,
            meta.separators(),
            command.header_ref().prefix_set(),
        ) {
            #[cfg(feature = "tracing_debug")]
            debug!("shortcut expanded for '{}'", command.id());
        }

        let head = match match_header(command.header_ref(), &mut self.argv) {
            Ok(head) => head,
            Err(head) => {
                if let Some(comp) = &mut self.comp {
                    for candidate in command.header_ref().candidates() {
                        comp.offer(candidate);
                    }
                }
                let got = head
                    .origin
                    .first()
                    .map(Token::display)
                    .unwrap_or_default();
                let error = self
                    .suggest(&got)
                    .map(|candidate| ErrorKind::FuzzySuggestion {
                        got: got.clone(),
                        candidate,
                    })
                    .unwrap_or(ErrorKind::HeaderMismatch { got });
                #[cfg(feature = "tracing_debug")]
                debug!("header mismatch: {error}");
                return Arparma::unmatched(head, source, error);
            }
        };

        let outcome = self.parse_scope(
            command.options_ref(),
            command.subcommands_ref(),
            command.args_ref(),
            None,
            true,
        );

        let mut result = match outcome {
            Ok(scope) => {
                let mut result = Arparma {
                    head,
                    matched: true,
                    main_args: scope.args,
                    options: scope.options,
                    subcommands: scope.subcommands,
                    other_args: BTreeMap::default(),
                    error_info: None,
                    source,
                };
                flatten(&mut result);
                result
            }
            Err(error) if error.is_clean() => Arparma {
                head,
                matched: true,
                error_info: Some(error),
                source,
                ..Arparma::default()
            },
            Err(error) => return Arparma::unmatched(head, source, error),
        };

        for behavior in command.behaviors_ref() {
            if !result.matched {
                break;
            }
            if let Err(reason) = behavior.apply(&mut result) {
                #[cfg(feature = "tracing_debug")]
                debug!("behavior '{}' rejected the parse", behavior.name());
                result.fail(ErrorKind::BehaviorError {
                    behavior: behavior.name().to_string(),
                    reason,
                });
            }
        }
        result
    }

    /// Best near-miss among this command's header forms and every registered
    /// command id, when fuzzy matching is on.
    fn suggest(&self, got: &str) -> Option<String> {
        if !self.command.meta_ref().fuzzy_match() || got.is_empty() {
            return None;
        }
        let mut candidates = self.command.header_ref().candidates();
        candidates.extend(self.registry.command_ids());

        let mut best: Option<(f64, String)> = None;
        for candidate in candidates {
            let metric = strsim::jaro_winkler(got, &candidate);
            if metric < SUGGEST_THRESHOLD {
                continue;
            }
            if best.as_ref().map_or(true, |(m, _)| metric > *m) {
                best = Some((metric, candidate));
            }
        }
        best.map(|(_, candidate)| candidate)
    }

    /// The dispatch loop for one scope: examine the next token, prefer
    /// child nodes over argument slots, and settle defaults on exit.
    fn parse_scope(
        &mut self,
        options: &'c [Opt],
        subcommands: &'c [Subcommand],
        args: &'c crate::api::Args,
        separators: Option<&[char]>,
        root: bool,
    ) -> Result<ScopeOutcome, ErrorKind> {
        let mut outcome = ScopeOutcome::default();
        let mut matcher = ArgsMatcher::with_separators(args, separators);
        let mut extra: Vec<Value> = Vec::default();
        let reserved = self.reserved_names();

        loop {
            if self.argv.exhausted() {
                break;
            }

            // Nodes win over argument slots, except on the stream's final
            // token when a required slot accepts it and could not recover
            // from losing it.
            let last_chance = self.argv.rest().len() == 1
                && self
                    .argv
                    .peek()
                    .map_or(false, |token| matcher.wants(&token));

            if let Some(kind) = self.select_candidate(options, subcommands).filter(|_| !last_chance) {
                match kind {
                    CandidateKind::Option(index) => {
                        let option = &options[index];
                        if let Some((result, occurrences)) = self.match_option(option)? {
                            let dest = option.dest();
                            let mut folded = outcome.options.remove(&dest);
                            for _ in 0..occurrences {
                                folded =
                                    Some(option.action_ref().fold(folded, result.clone()));
                            }
                            outcome.options.insert(
                                dest,
                                folded.expect("internal error - at least one fold ran"),
                            );
                            continue;
                        }
                    }
                    CandidateKind::Subcommand(index) => {
                        let subcommand = &subcommands[index];
                        if let Some(result) = self.match_subcommand(subcommand)? {
                            let dest = subcommand.dest();
                            let existing = outcome.subcommands.remove(&dest);
                            outcome.subcommands.insert(
                                dest,
                                fold_subcommand(subcommand.action_ref(), existing, result),
                            );
                            continue;
                        }
                    }
                }
                // A candidate that failed its full match hands the token on.
            }

            match matcher.feed(&mut self.argv, &reserved) {
                Ok(Feed::Consumed) => continue,
                Ok(Feed::Reserved) => {
                    if root {
                        if let Some(error) =
                            self.handle_builtin(&matcher, options, subcommands, &outcome)
                        {
                            return Err(error);
                        }
                    }
                    // An inner scope hands reserved tokens to its parent.
                    break;
                }
                Ok(Feed::Exhausted) => {
                    if !root {
                        break;
                    }
                    if let Some(error) =
                        self.handle_builtin(&matcher, options, subcommands, &outcome)
                    {
                        return Err(error);
                    }
                    if self.command.meta_ref().strict() {
                        let token = self
                            .argv
                            .peek()
                            .expect("internal error - loop guarded on exhaustion");
                        if let Some(comp) = &mut self.comp {
                            offer_scope(comp, &matcher, options, subcommands, &outcome);
                        }
                        return Err(ErrorKind::ParamsUnmatched {
                            token: token.display(),
                            expected: "end of input".to_string(),
                        });
                    }
                    let token = self
                        .argv
                        .take()
                        .expect("internal error - loop guarded on exhaustion");
                    extra.push(Value::from_token(&token));
                }
                Err(error) => {
                    if let Some(comp) = &mut self.comp {
                        offer_scope(comp, &matcher, options, subcommands, &outcome);
                    }
                    return Err(error);
                }
            }
        }

        if let Some(comp) = &mut self.comp {
            if self.argv.exhausted() {
                offer_scope(comp, &matcher, options, subcommands, &outcome);
            }
        }

        outcome.args = matcher.close()?;
        if !extra.is_empty() {
            outcome.args.insert(EXTRA_KEY.to_string(), Value::List(extra));
        }

        // Absent children carrying a default still populate the result.
        for option in options {
            if !outcome.options.contains_key(&option.dest()) {
                if let Some(default) = option.default_result() {
                    outcome.options.insert(option.dest(), default);
                }
            }
        }
        for subcommand in subcommands {
            if !outcome.subcommands.contains_key(&subcommand.dest()) {
                if let Some(default) = subcommand.default_value() {
                    outcome.subcommands.insert(
                        subcommand.dest(),
                        SubcommandResult {
                            value: default.clone(),
                            ..SubcommandResult::default()
                        },
                    );
                }
            }
        }

        Ok(outcome)
    }

    fn reserved_names(&self) -> Vec<&'static str> {
        let meta = self.command.meta_ref();
        let mut names = Vec::default();
        if meta.builtin_enabled(Builtin::Help) {
            names.push(HELP_NAME);
            names.push(HELP_SHORT);
        }
        if meta.builtin_enabled(Builtin::Shortcut) {
            names.push(SHORTCUT_NAME);
        }
        if meta.builtin_enabled(Builtin::Completion) {
            names.push(COMP_NAME);
            names.push(COMP_SHORT);
        }
        names
    }

    /// Pick the best node for the token at the cursor: sentence-prefixed
    /// nodes outrank bare ones, then higher priority, then definition order.
    /// Repeated matches are admitted; each action's fold defines how they
    /// accumulate (`store` keeps the last, `append`/`count` grow).
    fn select_candidate(
        &self,
        options: &[Opt],
        subcommands: &[Subcommand],
    ) -> Option<CandidateKind> {
        let compact_meta = self.command.meta_ref().compact();
        let mut best: Option<(bool, i32, usize, CandidateKind)> = None;

        let mut consider = |sentenced: bool, priority: i32, order: usize, kind: CandidateKind| {
            let candidate = (sentenced, priority, order, kind);
            match &best {
                None => best = Some(candidate),
                Some((s, p, o, _)) => {
                    if (sentenced, priority, std::cmp::Reverse(order))
                        > (*s, *p, std::cmp::Reverse(*o))
                    {
                        best = Some(candidate);
                    }
                }
            }
        };

        for (index, option) in options.iter().enumerate() {
            let stacking = matches!(option.action_ref(), OptAction::Count);
            if self.heads_match(
                option.sentence_ref(),
                option.aliases(),
                option.is_compact() || compact_meta,
                stacking,
            ) {
                consider(
                    option.sentence_ref().is_some(),
                    option.priority_value(),
                    index,
                    CandidateKind::Option(index),
                );
            }
        }
        for (index, subcommand) in subcommands.iter().enumerate() {
            if self.heads_match(
                subcommand.sentence_ref(),
                subcommand.aliases(),
                subcommand.is_compact() || compact_meta,
                false,
            ) {
                consider(
                    subcommand.sentence_ref().is_some(),
                    subcommand.priority_value(),
                    options.len() + index,
                    CandidateKind::Subcommand(index),
                );
            }
        }
        best.map(|(_, _, _, kind)| kind)
    }

    /// Peek-only test of a node's sentence and name against the cursor.
    fn heads_match(
        &self,
        sentence: Option<&Sentence>,
        aliases: &[String],
        compact: bool,
        stacking: bool,
    ) -> bool {
        let mut skip = 0;
        if let Some(sentence) = sentence {
            for word in sentence.words() {
                let text = if skip == 0 {
                    self.argv.peek_text()
                } else {
                    self.argv.rest().get(skip).and_then(Token::as_text)
                };
                if text != Some(word.as_str()) {
                    return false;
                }
                skip += 1;
            }
        }
        let text = if skip == 0 {
            self.argv.peek_text()
        } else {
            self.argv.rest().get(skip).and_then(Token::as_text)
        };
        let Some(text) = text else {
            return false;
        };
        aliases
            .iter()
            .any(|alias| name_match(text, alias, compact, stacking).is_some())
    }

    /// Match one option: sentence, name (with compact/equals splitting),
    /// then its argument slots. `None` means no cursor movement happened.
    fn match_option(
        &mut self,
        option: &Opt,
    ) -> Result<Option<(OptionResult, usize)>, ErrorKind> {
        let entry = self.argv.state();
        if !self.consume_sentence(option.sentence_ref()) {
            return Ok(None);
        }

        let compact = option.is_compact() || self.command.meta_ref().compact();
        let stacking = matches!(option.action_ref(), OptAction::Count);
        let text = match self.argv.peek_text() {
            Some(text) => text.to_string(),
            None => {
                self.argv.rewind(entry);
                return Ok(None);
            }
        };

        let mut hit: Option<NameMatch> = None;
        for alias in option.aliases() {
            if let Some(found) = name_match(&text, alias, compact, stacking) {
                let better = match (&hit, &found) {
                    (None, _) => true,
                    (Some(NameMatch::Exact), _) => false,
                    (Some(_), NameMatch::Exact) => true,
                    _ => false,
                };
                if better {
                    hit = Some(found);
                }
            }
        }

        let occurrences = match hit {
            None => {
                self.argv.rewind(entry);
                return Ok(None);
            }
            Some(NameMatch::Exact) => {
                self.argv.take();
                1
            }
            Some(NameMatch::Equals(consumed)) => {
                self.argv.advance_within(consumed);
                1
            }
            Some(NameMatch::Compact(consumed)) => {
                #[cfg(feature = "tracing_debug")]
                debug!("compact split on '{}'", option.name());
                self.argv.advance_within(consumed);
                1
            }
            Some(NameMatch::Stacked(times)) => {
                self.argv.take();
                times
            }
        };

        let reserved = self.reserved_names();
        let mut matcher = ArgsMatcher::new(option.args_ref());
        loop {
            match matcher.feed(&mut self.argv, &reserved)? {
                Feed::Consumed => continue,
                Feed::Reserved | Feed::Exhausted => break,
            }
        }
        let args = matcher.close()?;

        Ok(Some((
            OptionResult {
                value: Value::None,
                args,
            },
            occurrences,
        )))
    }

    /// Match one subcommand: consume the name, then drive a nested scope
    /// until it can no longer use the cursor.
    fn match_subcommand(
        &mut self,
        subcommand: &'c Subcommand,
    ) -> Result<Option<SubcommandResult>, ErrorKind> {
        let entry = self.argv.state();
        if !self.consume_sentence(subcommand.sentence_ref()) {
            return Ok(None);
        }

        let compact = subcommand.is_compact() || self.command.meta_ref().compact();
        let text = match self.argv.peek_text() {
            Some(text) => text.to_string(),
            None => {
                self.argv.rewind(entry);
                return Ok(None);
            }
        };
        let mut hit = None;
        for alias in subcommand.aliases() {
            if let Some(found) = name_match(&text, alias, compact, false) {
                hit = Some(found);
                if matches!(hit, Some(NameMatch::Exact)) {
                    break;
                }
            }
        }
        match hit {
            None => {
                self.argv.rewind(entry);
                return Ok(None);
            }
            Some(NameMatch::Exact) | Some(NameMatch::Stacked(_)) => {
                self.argv.take();
            }
            Some(NameMatch::Equals(consumed)) | Some(NameMatch::Compact(consumed)) => {
                self.argv.advance_within(consumed);
            }
        }

        #[cfg(feature = "tracing_debug")]
        debug!("entering subcommand '{}'", subcommand.name());
        let scope = self.parse_scope(
            subcommand.options_ref(),
            subcommand.subcommands_ref(),
            subcommand.args_ref(),
            subcommand.separator_override(),
            false,
        )?;

        Ok(Some(SubcommandResult {
            value: Value::None,
            args: scope.args,
            options: scope.options,
            subcommands: scope.subcommands,
        }))
    }

    fn consume_sentence(&mut self, sentence: Option<&Sentence>) -> bool {
        let Some(sentence) = sentence else {
            return true;
        };
        let entry = self.argv.state();
        for word in sentence.words() {
            if self.argv.peek_text() == Some(word.as_str()) {
                self.argv.take();
            } else {
                self.argv.rewind(entry);
                return false;
            }
        }
        true
    }

    /// Intercept `--help`, `--shortcut` and `--comp` at the scope level.
    /// Returns the clean `BuiltinAction` record that terminates body
    /// matching, or `None` when the cursor holds no enabled builtin.
    fn handle_builtin(
        &mut self,
        matcher: &ArgsMatcher<'_>,
        options: &[Opt],
        subcommands: &[Subcommand],
        outcome: &ScopeOutcome,
    ) -> Option<ErrorKind> {
        let meta = self.command.meta_ref();
        let text = self.argv.peek_text()?;

        if meta.builtin_enabled(Builtin::Help) && (text == HELP_NAME || text == HELP_SHORT) {
            self.argv.take();
            let output =
                printer::render_help(self.command, &self.registry.lang_snapshot());
            return Some(ErrorKind::BuiltinAction {
                kind: Builtin::Help,
                output,
            });
        }

        if meta.builtin_enabled(Builtin::Shortcut) && text == SHORTCUT_NAME {
            self.argv.take();
            let output = self.run_shortcut_builtin();
            return Some(ErrorKind::BuiltinAction {
                kind: Builtin::Shortcut,
                output,
            });
        }

        if meta.builtin_enabled(Builtin::Completion)
            && (text == COMP_NAME || text == COMP_SHORT)
        {
            self.argv.take();
            let mut collector = CompCollector::default();
            offer_scope(&mut collector, matcher, options, subcommands, outcome);
            let output = collector.into_session().candidates().join("\n");
            return Some(ErrorKind::BuiltinAction {
                kind: Builtin::Completion,
                output,
            });
        }

        None
    }

    /// `--shortcut list` prints the table; `--shortcut <key> <template...>`
    /// registers an entry.
    fn run_shortcut_builtin(&mut self) -> String {
        let command_id = self.command.id();
        let mut words: Vec<String> = Vec::default();
        while let Some(text) = self.argv.peek_text() {
            words.push(text.to_string());
            self.argv.take();
        }

        match words.split_first() {
            None => list_shortcuts(self.registry, &command_id),
            Some((first, [])) if first.as_str() == "list" => {
                list_shortcuts(self.registry, &command_id)
            }
            Some((key, template)) => {
                if template.is_empty() {
                    return format!("shortcut '{key}' needs a template");
                }
                self.registry
                    .add_shortcut(&command_id, Shortcut::new(key, template.join(" ")));
                format!("shortcut '{key}' registered")
            }
        }
    }
}

fn list_shortcuts(registry: &Registry, command_id: &str) -> String {
    let table = registry.shortcut_table(command_id);
    if table.list().is_empty() {
        return "no shortcuts".to_string();
    }
    table
        .list()
        .iter()
        .map(|shortcut| format!("{} => {}", shortcut.key(), shortcut.template()))
        .collect::<Vec<String>>()
        .join("\n")
}

/// Candidate next-tokens at the stopping point: unmatched node names plus
/// pending argument slots.
fn offer_scope(
    collector: &mut CompCollector,
    matcher: &ArgsMatcher<'_>,
    options: &[Opt],
    subcommands: &[Subcommand],
    outcome: &ScopeOutcome,
) {
    for option in options {
        if !outcome.options.contains_key(&option.dest()) {
            collector.offer(option.name());
        }
    }
    for subcommand in subcommands {
        if !outcome.subcommands.contains_key(&subcommand.dest()) {
            collector.offer(subcommand.name());
        }
    }
    for name in matcher.pending() {
        collector.offer(format!("<{name}>"));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameMatch {
    /// The token is exactly the alias.
    Exact,
    /// `alias=value`: consume through the separator.
    Equals(usize),
    /// Compact concatenation: consume the alias, leave the remainder.
    Compact(usize),
    /// A count-action short flag repeated within one token (`-vvvv`).
    Stacked(usize),
}

fn name_match(text: &str, alias: &str, compact: bool, stacking: bool) -> Option<NameMatch> {
    if text == alias {
        return Some(NameMatch::Exact);
    }
    let rest = text.strip_prefix(alias)?;
    if rest.is_empty() {
        return None;
    }
    if let Some(stripped) = rest.strip_prefix('=') {
        if !stripped.is_empty() {
            return Some(NameMatch::Equals(alias.len() + 1));
        }
    }
    if stacking {
        if let Some(last) = alias.chars().last() {
            if rest.chars().all(|c| c == last) {
                return Some(NameMatch::Stacked(1 + rest.chars().count()));
            }
        }
    }
    if compact {
        return Some(NameMatch::Compact(alias.len()));
    }
    None
}

/// Match each (prefix, name) pair against the cursor; the first to consume
/// wins. On failure the offered token is reported in the head result.
fn match_header(header: &Header, argv: &mut Argv) -> Result<HeadResult, HeadResult> {
    let miss = |argv: &Argv| HeadResult {
        origin: argv.peek().into_iter().collect(),
        result: Value::None,
        matched: false,
        groups: BTreeMap::default(),
    };

    let Some(first) = argv.peek() else {
        return Err(miss(argv));
    };

    match header.name_ref() {
        HeaderName::Literal(name) => {
            let Some(text) = first.as_text() else {
                return Err(miss(argv));
            };
            if header.prefix_set().is_empty() {
                if text == name {
                    let token = argv.take().expect("internal error - peeked above");
                    return Ok(head_hit(vec![token], Value::from(name.as_str())));
                }
                return Err(miss(argv));
            }
            for prefix in header.prefix_set() {
                let composed = format!("{prefix}{name}");
                if text == composed {
                    let token = argv.take().expect("internal error - peeked above");
                    return Ok(head_hit(vec![token], Value::Str(composed)));
                }
                // Soft prefix: the prefix and name may arrive as two tokens.
                if text == prefix.as_str()
                    && argv.rest().get(1).and_then(Token::as_text) == Some(name.as_str())
                {
                    let p = argv.take().expect("internal error - peeked above");
                    let n = argv.take().expect("internal error - length checked");
                    return Ok(head_hit(vec![p, n], Value::Str(composed)));
                }
            }
            Err(miss(argv))
        }
        HeaderName::Regex(regex) => {
            let Some(text) = first.as_text() else {
                return Err(miss(argv));
            };
            let attempts: Vec<&str> = if header.prefix_set().is_empty() {
                vec![text]
            } else {
                header
                    .prefix_set()
                    .iter()
                    .filter_map(|prefix| text.strip_prefix(prefix.as_str()))
                    .collect()
            };
            for attempt in attempts {
                if let Some(captures) = regex.captures(attempt) {
                    let mut groups = BTreeMap::default();
                    for (index, capture) in captures.iter().enumerate() {
                        if let Some(capture) = capture {
                            groups.insert(index.to_string(), capture.as_str().to_string());
                        }
                    }
                    for name in regex.capture_names().flatten() {
                        if let Some(capture) = captures.name(name) {
                            groups.insert(name.to_string(), capture.as_str().to_string());
                        }
                    }
                    let token = argv.take().expect("internal error - peeked above");
                    return Ok(HeadResult {
                        origin: vec![token],
                        result: Value::from(text),
                        matched: true,
                        groups,
                    });
                }
            }
            Err(miss(argv))
        }
        HeaderName::Types(types) => match &first {
            Token::Opaque(o) if types.iter().any(|(id, _)| *id == o.type_id()) => {
                let token = argv.take().expect("internal error - peeked above");
                let value = Value::Opaque(o.clone());
                Ok(head_hit(vec![token], value))
            }
            _ => Err(miss(argv)),
        },
    }
}

fn head_hit(origin: Vec<Token>, result: Value) -> HeadResult {
    HeadResult {
        origin,
        result,
        matched: true,
        groups: BTreeMap::default(),
    }
}

fn fold_subcommand(
    action: &OptAction,
    existing: Option<SubcommandResult>,
    incoming: SubcommandResult,
) -> SubcommandResult {
    let (previous_proxy, mut options, mut subcommands) = match existing {
        Some(previous) => (
            Some(OptionResult {
                value: previous.value,
                args: previous.args,
            }),
            previous.options,
            previous.subcommands,
        ),
        None => (None, BTreeMap::default(), BTreeMap::default()),
    };
    let folded = action.fold(
        previous_proxy,
        OptionResult {
            value: incoming.value,
            args: incoming.args,
        },
    );
    options.extend(incoming.options);
    subcommands.extend(incoming.subcommands);
    SubcommandResult {
        value: folded.value,
        args: folded.args,
        options,
        subcommands,
    }
}

/// Collect every bound argument across the tree into `other_args`.
fn flatten(result: &mut Arparma) {
    let mut flattened: BTreeMap<String, Value> = BTreeMap::default();
    for (name, value) in &result.main_args {
        flattened.insert(name.clone(), value.clone());
    }
    for option in result.options.values() {
        for (name, value) in &option.args {
            flattened.insert(name.clone(), value.clone());
        }
    }
    fn walk(flattened: &mut BTreeMap<String, Value>, subcommand: &SubcommandResult) {
        for (name, value) in &subcommand.args {
            flattened.insert(name.clone(), value.clone());
        }
        for option in subcommand.options.values() {
            for (name, value) in &option.args {
                flattened.insert(name.clone(), value.clone());
            }
        }
        for nested in subcommand.subcommands.values() {
            walk(flattened, nested);
        }
    }
    for subcommand in result.subcommands.values() {
        walk(&mut flattened, subcommand);
    }
    result.other_args = flattened;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_match_forms() {
        assert_eq!(name_match("-f", "-f", false, false), Some(NameMatch::Exact));
        assert_eq!(name_match("-f1", "-f", false, false), None);
        assert_eq!(
            name_match("-f1", "-f", true, false),
            Some(NameMatch::Compact(2))
        );
        assert_eq!(
            name_match("--opt=3", "--opt", false, false),
            Some(NameMatch::Equals(6))
        );
        assert_eq!(
            name_match("-vvvv", "-v", false, true),
            Some(NameMatch::Stacked(4))
        );
        assert_eq!(name_match("-vvx", "-v", false, true), None);
    }

    #[test]
    fn header_literal_with_prefix_forms() {
        let header = crate::api::Header::literal("pip").prefixes(["/"]);
        let mut argv = Argv::from_tokens(vec![Token::text("/pip"), Token::text("list")]);
        let head = match_header(&header, &mut argv).unwrap();
        assert!(head.matched);
        assert_eq!(head.result, Value::from("/pip"));
        assert_eq!(argv.peek_text(), Some("list"));

        // Two-token soft prefix.
        let mut argv = Argv::from_tokens(vec![
            Token::text("/"),
            Token::text("pip"),
            Token::text("list"),
        ]);
        let head = match_header(&header, &mut argv).unwrap();
        assert!(head.matched);
        assert_eq!(head.origin.len(), 2);
        assert_eq!(argv.peek_text(), Some("list"));
    }

    #[test]
    fn header_regex_captures_groups() {
        let header = crate::api::Header::regex(r"roll(?P<sides>\d+)").unwrap();
        let mut argv = Argv::from_tokens(vec![Token::text("roll20")]);
        let head = match_header(&header, &mut argv).unwrap();
        assert!(head.matched);
        assert_eq!(head.groups.get("sides"), Some(&"20".to_string()));
        assert_eq!(head.groups.get("1"), Some(&"20".to_string()));
    }

    #[test]
    fn header_type_match() {
        let header = crate::api::Header::of_type::<i64>();
        let mut argv = Argv::from_tokens(vec![Token::opaque(7_i64), Token::text("x")]);
        let head = match_header(&header, &mut argv).unwrap();
        assert!(head.matched);
        assert_matches!(head.result, Value::Opaque(_));

        let mut argv = Argv::from_tokens(vec![Token::text("7")]);
        assert!(match_header(&header, &mut argv).is_err());
    }

    #[test]
    fn header_mismatch_keeps_cursor() {
        let header = crate::api::Header::literal("pip");
        let mut argv = Argv::from_tokens(vec![Token::text("pap")]);
        let head = match_header(&header, &mut argv).unwrap_err();
        assert!(!head.matched);
        assert_eq!(argv.peek_text(), Some("pap"));
    }

    #[test]
    fn fold_subcommand_merges_children() {
        let mut first = SubcommandResult::default();
        first
            .options
            .insert("a".to_string(), OptionResult::default());
        let mut second = SubcommandResult::default();
        second
            .options
            .insert("b".to_string(), OptionResult::default());

        let folded = fold_subcommand(&OptAction::Store, Some(first), second);
        assert!(folded.options.contains_key("a"));
        assert!(folded.options.contains_key("b"));
    }
}
