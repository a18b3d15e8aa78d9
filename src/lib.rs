//! `alconna` is a schema-driven command and message-chain parser.
//!
//! Although other crates parse command lines, they bind parsed values to
//! variables of a program being launched. `alconna` instead matches a
//! *command schema* (a tree of header, arguments, options and nested
//! subcommands) against an *input token stream*, and returns a structured
//! result tree recording which branches matched and which arguments bound
//! to which typed values. The input may be a single string or a
//! heterogeneous sequence mixing strings with opaque non-text objects, which
//! makes the crate suitable for chat-style message commands as much as for
//! conventional command lines. Specifically, `alconna` prioritizes:
//! * *Typed patterns*: every argument slot carries a [`Pattern`] that both
//!   tests and converts tokens, with validator chains, unions, anti-patterns
//!   and opaque type identity.
//! * *Structured results*: a parse always yields an [`Arparma`] tree with a
//!   dotted-path query Api, rather than writing through references.
//! * *Recoverable matching*: failed steps rewind the cursor; errors are
//!   recorded on the result instead of thrown, unless opted into.
//! * *External collaborators behind one registry*: shortcuts, a bounded
//!   recent-parse cache, and the i18n string table live in a [`Registry`]
//!   value, with a process-wide default for ergonomic use.
//!
//! # Usage
//! ```
//! use alconna::{Args, Command, Opt, Pattern, Subcommand, Value};
//!
//! let pip = Command::new("/pip")
//!     .subcommand(
//!         Subcommand::new("install")
//!             .option(Opt::new("-u|--upgrade"))
//!             .args(Args::new().slot("pak_name", Pattern::text())),
//!     )
//!     .option(Opt::new("list"))
//!     .build()
//!     .expect("the schema must be valid (ex: no name repeats)");
//!
//! let result = pip.parse("/pip install numpy --upgrade").unwrap();
//! assert!(result.matched);
//! assert_eq!(
//!     result.query("install.pak_name").unwrap(),
//!     Some(&Value::from("numpy")),
//! );
//! assert!(result.find("install.upgrade"));
//! ```
//!
//! # Api configuration
//! Configure a command by starting from [`Command::new`] and chaining:
//! * [`CommandBuilder::args`] for the top-level argument slots;
//! * [`CommandBuilder::option`] / [`CommandBuilder::subcommand`] for child
//!   nodes, nesting without depth bound;
//! * meta switches: separators, `fuzzy_match`, `compact`, `strict`,
//!   `raise_exception`, `namespace`, per-command builtin toggles;
//! * [`CommandBuilder::behavior`] for post-parse hooks and
//!   [`CommandBuilder::on_execute`] for callbacks.
//!
//! `build` validates the schema (duplicate names, conflicting variadic
//! slots) and freezes it; a built [`Command`] is immutable and may be shared
//! across threads.

mod analyser;
mod api;
mod argv;
mod constant;
mod error;
mod lang;
mod matcher;
mod model;
mod pattern;
mod printer;
mod registry;
mod result;

pub use analyser::{Behavior, CompSession, CoolDown, Exclusion, SetDefault, Shortcut};
pub use api::{
    Arg, Args, AsyncExecutor, Command, CommandBuilder, CommandMeta, Executor, Header, HeaderName,
    Opt, OptAction, Sentence, Subcommand,
};
pub use argv::ParseInput;
pub use error::{Builtin, ConfigError, ErrorKind};
pub use lang::Lang;
pub use model::{Count, OpaqueValue, Token, Value, ValueKind};
pub use pattern::{Accept, Pattern};
pub use registry::Registry;
pub use result::{Arparma, HeadResult, OptionResult, SubcommandResult};

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
