mod behavior;
mod completion;
mod core;
mod shortcut;

pub use behavior::{Behavior, CoolDown, Exclusion, SetDefault};
pub use completion::CompSession;
pub use shortcut::Shortcut;

pub(crate) use self::core::{complete, parse};
pub(crate) use shortcut::ShortcutTable;
