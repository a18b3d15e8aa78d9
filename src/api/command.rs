use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;

use crate::analyser;
use crate::analyser::{Behavior, CompSession, Shortcut};
use crate::api::args::Args;
use crate::api::node::{validate_scope, Header, Opt, Subcommand};
use crate::argv::{ParseInput, Preprocessor};
use crate::constant::DEFAULT_SEPARATORS;
use crate::error::{Builtin, ConfigError, ErrorKind};
use crate::model::Token;
use crate::registry::Registry;
use crate::result::Arparma;

/// Synchronous callback bound to a command, invoked after a matched parse.
pub trait Executor: Send + Sync {
    fn call(&self, result: &Arparma);
}

impl<F> Executor for F
where
    F: Fn(&Arparma) + Send + Sync,
{
    fn call(&self, result: &Arparma) {
        self(result)
    }
}

/// Asynchronous callback bound to a command; the returned future is awaited
/// by the caller, never scheduled by the core.
pub trait AsyncExecutor: Send + Sync {
    fn call<'a>(&'a self, result: &'a Arparma) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Per-command configuration.
#[derive(Clone)]
pub struct CommandMeta {
    separators: Vec<char>,
    fuzzy_match: bool,
    compact: bool,
    strict: bool,
    raise_exception: bool,
    namespace: Option<String>,
    disabled_builtins: HashSet<Builtin>,
    filter_out: HashSet<TypeId>,
    preprocessors: HashMap<TypeId, Preprocessor>,
}

impl std::fmt::Debug for CommandMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandMeta")
            .field("separators", &self.separators)
            .field("fuzzy_match", &self.fuzzy_match)
            .field("compact", &self.compact)
            .field("strict", &self.strict)
            .field("raise_exception", &self.raise_exception)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl Default for CommandMeta {
    fn default() -> Self {
        Self {
            separators: DEFAULT_SEPARATORS.to_vec(),
            fuzzy_match: false,
            compact: false,
            strict: true,
            raise_exception: false,
            namespace: None,
            disabled_builtins: HashSet::default(),
            filter_out: HashSet::default(),
            preprocessors: HashMap::default(),
        }
    }
}

impl CommandMeta {
    pub(crate) fn separators(&self) -> &[char] {
        &self.separators
    }

    pub(crate) fn fuzzy_match(&self) -> bool {
        self.fuzzy_match
    }

    pub(crate) fn compact(&self) -> bool {
        self.compact
    }

    pub(crate) fn strict(&self) -> bool {
        self.strict
    }

    pub(crate) fn raise_exception(&self) -> bool {
        self.raise_exception
    }

    pub(crate) fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub(crate) fn builtin_enabled(&self, builtin: Builtin) -> bool {
        !self.disabled_builtins.contains(&builtin)
    }

    pub(crate) fn filter_out(&self) -> &HashSet<TypeId> {
        &self.filter_out
    }

    pub(crate) fn preprocessors(&self) -> &HashMap<TypeId, Preprocessor> {
        &self.preprocessors
    }
}

/// Staging area for a [`Command`]. Configuration is chainable; `build`
/// checks the schema and freezes it.
pub struct CommandBuilder {
    header: Header,
    args: Args,
    options: Vec<Opt>,
    subcommands: Vec<Subcommand>,
    meta: CommandMeta,
    behaviors: Vec<Arc<dyn Behavior>>,
    executor: Option<Arc<dyn Executor>>,
    async_executor: Option<Arc<dyn AsyncExecutor>>,
}

impl CommandBuilder {
    fn new(header: Header) -> Self {
        Self {
            header,
            args: Args::default(),
            options: Vec::default(),
            subcommands: Vec::default(),
            meta: CommandMeta::default(),
            behaviors: Vec::default(),
            executor: None,
            async_executor: None,
        }
    }

    /// Prefix strings accepted before the command name.
    pub fn prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = self.header.prefixes(prefixes);
        self
    }

    /// Top-level argument slots.
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

    /// Token boundary characters for string input.
    pub fn separators(mut self, separators: &[char]) -> Self {
        self.meta.separators = separators.to_vec();
        self
    }

    /// Suggest near-miss command names on header mismatch.
    pub fn fuzzy_match(mut self) -> Self {
        self.meta.fuzzy_match = true;
        self
    }

    /// Allow option-name/first-argument concatenation at the root level.
    pub fn compact(mut self) -> Self {
        self.meta.compact = true;
        self
    }

    /// Extra-token policy: `true` (the default) rejects unaccounted tokens,
    /// `false` collects them under the `$extra` key.
    pub fn strict(mut self, strict: bool) -> Self {
        self.meta.strict = strict;
        self
    }

    /// Return `Err` from `parse` on fatal errors instead of an unmatched
    /// result.
    pub fn raise_exception(mut self) -> Self {
        self.meta.raise_exception = true;
        self
    }

    /// Registry grouping tag.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.meta.namespace = Some(namespace.into());
        self
    }

    pub fn disable_builtin(mut self, builtin: Builtin) -> Self {
        self.meta.disabled_builtins.insert(builtin);
        self
    }

    /// Drop opaque input elements of type `T` during ingest.
    pub fn filter_out<T: Any>(mut self) -> Self {
        self.meta.filter_out.insert(TypeId::of::<T>());
        self
    }

    /// Transform opaque input elements of type `T` during ingest.
    pub fn preprocess<T: Any>(
        mut self,
        transform: impl Fn(Token) -> Token + Send + Sync + 'static,
    ) -> Self {
        self.meta
            .preprocessors
            .insert(TypeId::of::<T>(), Arc::new(transform));
        self
    }

    /// Register a post-parse behavior; behaviors run in registration order.
    pub fn behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behaviors.push(Arc::new(behavior));
        self
    }

    /// Bind the synchronous executor invoked after a matched parse.
    pub fn on_execute(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Bind the asynchronous executor awaited by [`Command::parse_async`].
    pub fn on_execute_async(mut self, executor: impl AsyncExecutor + 'static) -> Self {
        self.async_executor = Some(Arc::new(executor));
        self
    }

    /// Check the schema and freeze it.
    pub fn build(self) -> Result<Command, ConfigError> {
        self.header.validate()?;
        self.args.validate()?;
        validate_scope(&self.options, &self.subcommands)?;

        let name = self
            .header
            .candidates()
            .into_iter()
            .next()
            .ok_or_else(|| ConfigError("A header requires a command name.".to_string()))?;
        let fingerprint = fingerprint(&name, &self.options, &self.subcommands, &self.args);

        Ok(Command {
            header: self.header,
            args: self.args,
            options: self.options,
            subcommands: self.subcommands,
            meta: self.meta,
            behaviors: self.behaviors,
            executor: self.executor,
            async_executor: self.async_executor,
            name,
            fingerprint,
        })
    }
}

/// Schema shape digest; a changed schema never collides with its cached
/// parses.
fn fingerprint(name: &str, options: &[Opt], subcommands: &[Subcommand], args: &Args) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    for slot in args.iter() {
        slot.name().hash(&mut hasher);
        slot.pattern().origin().hash(&mut hasher);
    }
    for option in options {
        option.aliases().hash(&mut hasher);
        option.args_ref().len().hash(&mut hasher);
    }
    for subcommand in subcommands {
        subcommand.aliases().hash(&mut hasher);
        subcommand.options_ref().len().hash(&mut hasher);
        subcommand.subcommands_ref().len().hash(&mut hasher);
    }
    hasher.finish()
}

/// The root of a command grammar: a header, top-level argument slots, child
/// nodes and meta. Immutable once built; safe to share across threads.
///
/// ### Example
/// ```
/// use alconna::{Args, Command, Opt, Pattern, Subcommand};
///
/// let pip = Command::new("/pip")
///     .subcommand(
///         Subcommand::new("install")
///             .option(Opt::new("-u|--upgrade"))
///             .args(Args::new().slot("pak_name", Pattern::text())),
///     )
///     .option(Opt::new("list"))
///     .build()
///     .unwrap();
///
/// let result = pip.parse("/pip install numpy --upgrade").unwrap();
/// assert!(result.matched);
/// ```
pub struct Command {
    header: Header,
    args: Args,
    options: Vec<Opt>,
    subcommands: Vec<Subcommand>,
    meta: CommandMeta,
    behaviors: Vec<Arc<dyn Behavior>>,
    executor: Option<Arc<dyn Executor>>,
    async_executor: Option<Arc<dyn AsyncExecutor>>,
    name: String,
    fingerprint: u64,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("options", &self.options.len())
            .field("subcommands", &self.subcommands.len())
            .finish()
    }
}

impl Command {
    /// Start a command with a literal header name.
    pub fn new(name: &str) -> CommandBuilder {
        CommandBuilder::new(Header::literal(name))
    }

    /// Start a command from an explicit header (regex or type-matched).
    pub fn with_header(header: Header) -> CommandBuilder {
        CommandBuilder::new(header)
    }

    /// The command's identity: its first composed header form, qualified by
    /// namespace when one is set.
    pub fn id(&self) -> String {
        match self.meta.namespace() {
            Some(namespace) => format!("{namespace}:{name}", name = self.name),
            None => self.name.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub(crate) fn header_ref(&self) -> &Header {
        &self.header
    }

    pub(crate) fn args_ref(&self) -> &Args {
        &self.args
    }

    pub(crate) fn options_ref(&self) -> &[Opt] {
        &self.options
    }

    pub(crate) fn subcommands_ref(&self) -> &[Subcommand] {
        &self.subcommands
    }

    pub(crate) fn meta_ref(&self) -> &CommandMeta {
        &self.meta
    }

    pub(crate) fn behaviors_ref(&self) -> &[Arc<dyn Behavior>] {
        &self.behaviors
    }

    /// Parse against the process-wide registry.
    ///
    /// Always returns `Ok` with a (possibly unmatched) result, unless the
    /// command sets `raise_exception`, in which case fatal errors surface as
    /// `Err`.
    pub fn parse(&self, input: impl Into<ParseInput>) -> Result<Arparma, ErrorKind> {
        self.parse_with(input, Registry::global())
    }

    /// Parse against an explicit registry.
    pub fn parse_with(
        &self,
        input: impl Into<ParseInput>,
        registry: &Registry,
    ) -> Result<Arparma, ErrorKind> {
        let result = analyser::parse(self, &input.into(), registry);
        if self.meta.raise_exception() {
            if let Some(error) = &result.error_info {
                if !error.is_clean() {
                    return Err(error.clone());
                }
            }
        }
        if result.matched {
            if let Some(executor) = &self.executor {
                executor.call(&result);
            }
        }
        Ok(result)
    }

    /// Parse, then await the bound asynchronous executor (if any).
    pub async fn parse_async(
        &self,
        input: impl Into<ParseInput>,
    ) -> Result<Arparma, ErrorKind> {
        let result = self.parse(input)?;
        if result.matched {
            if let Some(executor) = &self.async_executor {
                executor.call(&result).await;
            }
        }
        Ok(result)
    }

    /// Register a shortcut for this command in the process-wide registry.
    pub fn shortcut(&self, shortcut: Shortcut) {
        self.shortcut_in(shortcut, Registry::global());
    }

    pub fn shortcut_in(&self, shortcut: Shortcut, registry: &Registry) {
        registry.add_shortcut(&self.id(), shortcut);
    }

    /// Start a completion session: a speculative parse that records the
    /// candidate next-tokens at the cursor's stopping point.
    pub fn complete(&self, input: impl Into<ParseInput>) -> CompSession {
        self.complete_with(input, Registry::global())
    }

    pub fn complete_with(
        &self,
        input: impl Into<ParseInput>,
        registry: &Registry,
    ) -> CompSession {
        analyser::complete(self, &input.into(), registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    #[test]
    fn build_validates_scope() {
        let result = Command::new("demo")
            .option(Opt::new("-f"))
            .option(Opt::new("-f"))
            .build();
        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn build_validates_args() {
        let result = Command::new("demo")
            .args(
                Args::new()
                    .slot("a", Pattern::text())
                    .slot("a", Pattern::text()),
            )
            .build();
        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn id_carries_namespace() {
        let command = Command::new("demo").namespace("testing").build().unwrap();
        assert_eq!(command.id(), "testing:demo");
        assert_eq!(command.name(), "demo");
    }

    #[test]
    fn fingerprint_tracks_schema_shape() {
        let bare = Command::new("demo").build().unwrap();
        let with_option = Command::new("demo").option(Opt::new("-f")).build().unwrap();
        assert_ne!(bare.fingerprint(), with_option.fingerprint());
    }
}
