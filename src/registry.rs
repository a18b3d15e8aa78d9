use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::analyser::{Shortcut, ShortcutTable};
use crate::api::Command;
use crate::constant::DEFAULT_CACHE_CAPACITY;
use crate::error::ErrorKind;
use crate::lang::Lang;
use crate::result::Arparma;

type CacheKey = (u64, String);

/// Bounded LRU of recent parses, keyed by (schema fingerprint, canonical
/// input). A schema change produces a new fingerprint, so stale entries
/// simply stop being reachable.
struct ParseCache {
    capacity: usize,
    entries: HashMap<CacheKey, Arparma>,
    order: VecDeque<CacheKey>,
}

impl ParseCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::default(),
            order: VecDeque::default(),
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Arparma> {
        let hit = self.entries.get(key).cloned();
        if hit.is_some() {
            self.order.retain(|k| k != key);
            self.order.push_back(key.clone());
        }
        hit
    }

    fn put(&mut self, key: CacheKey, value: Arparma) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
            while self.entries.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
        } else {
            self.order.retain(|k| k != &key);
            self.order.push_back(key);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Process-wide collaborator state: the command registry, per-command
/// shortcut tables, the recent-parse cache and the i18n table.
///
/// A registry can be constructed and passed to `Command::parse_with`
/// explicitly; [`Registry::global`] offers a process default for ergonomic
/// use at the boundary. Each store sits behind its own mutex, so sharing a
/// registry across threads is safe; grammar values themselves are immutable.
pub struct Registry {
    commands: Mutex<HashMap<String, Arc<Command>>>,
    shortcuts: Mutex<HashMap<String, ShortcutTable>>,
    cache: Mutex<ParseCache>,
    lang: Mutex<Lang>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

fn relock<'a, T>(
    result: Result<MutexGuard<'a, T>, std::sync::PoisonError<MutexGuard<'a, T>>>,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            commands: Mutex::new(HashMap::default()),
            shortcuts: Mutex::new(HashMap::default()),
            cache: Mutex::new(ParseCache::new(capacity)),
            lang: Mutex::new(Lang::default()),
        }
    }

    /// The process-wide default registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::default)
    }

    /// Register a command under its id (namespace-qualified name).
    pub fn register(&self, command: Arc<Command>) {
        relock(self.commands.lock()).insert(command.id(), command);
    }

    pub fn command(&self, id: &str) -> Option<Arc<Command>> {
        relock(self.commands.lock()).get(id).cloned()
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<Command>> {
        relock(self.commands.lock()).remove(id)
    }

    /// Ids of every registered command; fuzzy suggestion candidates draw on
    /// these.
    pub fn command_ids(&self) -> Vec<String> {
        relock(self.commands.lock()).keys().cloned().collect()
    }

    /// Terminate the registry's lifetime: drop commands, shortcuts and
    /// cached parses.
    pub fn clear(&self) {
        relock(self.commands.lock()).clear();
        relock(self.shortcuts.lock()).clear();
        relock(self.cache.lock()).clear();
    }

    pub fn add_shortcut(&self, command_id: &str, shortcut: Shortcut) {
        relock(self.shortcuts.lock())
            .entry(command_id.to_string())
            .or_default()
            .add(shortcut);
    }

    pub fn remove_shortcut(&self, command_id: &str, key: &str) -> bool {
        relock(self.shortcuts.lock())
            .get_mut(command_id)
            .map_or(false, |table| table.remove(key))
    }

    pub(crate) fn shortcut_table(&self, command_id: &str) -> ShortcutTable {
        relock(self.shortcuts.lock())
            .get(command_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn cache_get(&self, key: &CacheKey) -> Option<Arparma> {
        relock(self.cache.lock()).get(key)
    }

    pub(crate) fn cache_put(&self, key: CacheKey, value: Arparma) {
        relock(self.cache.lock()).put(key, value);
    }

    /// Override an i18n template.
    pub fn set_lang_entry(&self, key: impl Into<String>, template: impl Into<String>) {
        relock(self.lang.lock()).set(key, template);
    }

    /// Render an error through the i18n table.
    pub fn render_error(&self, error: &ErrorKind) -> String {
        relock(self.lang.lock()).message(error)
    }

    pub(crate) fn lang_snapshot(&self) -> Lang {
        relock(self.lang.lock()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn entry(tag: i64) -> Arparma {
        let mut result = Arparma::default();
        result.main_args.insert("tag".to_string(), Value::Int(tag));
        result
    }

    #[test]
    fn cache_round_trip() {
        let registry = Registry::with_cache_capacity(2);
        let key = (1_u64, "a".to_string());
        assert_eq!(registry.cache_get(&key), None);

        registry.cache_put(key.clone(), entry(1));
        assert_eq!(registry.cache_get(&key), Some(entry(1)));
    }

    #[test]
    fn cache_evicts_least_recent() {
        let registry = Registry::with_cache_capacity(2);
        let (a, b, c) = (
            (1_u64, "a".to_string()),
            (1_u64, "b".to_string()),
            (1_u64, "c".to_string()),
        );
        registry.cache_put(a.clone(), entry(1));
        registry.cache_put(b.clone(), entry(2));
        // Touch 'a' so 'b' is the eviction victim.
        registry.cache_get(&a);
        registry.cache_put(c.clone(), entry(3));

        assert_eq!(registry.cache_get(&a), Some(entry(1)));
        assert_eq!(registry.cache_get(&b), None);
        assert_eq!(registry.cache_get(&c), Some(entry(3)));
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let registry = Registry::with_cache_capacity(0);
        let key = (1_u64, "a".to_string());
        registry.cache_put(key.clone(), entry(1));
        assert_eq!(registry.cache_get(&key), None);
    }

    #[test]
    fn register_and_clear() {
        let registry = Registry::new();
        let command = Arc::new(crate::api::Command::new("demo").build().unwrap());
        registry.register(command.clone());
        assert!(registry.command("demo").is_some());
        assert_eq!(registry.command_ids(), vec!["demo".to_string()]);

        registry.clear();
        assert!(registry.command("demo").is_none());
    }

    #[test]
    fn shortcut_store_per_command() {
        let registry = Registry::new();
        registry.add_shortcut("demo", Shortcut::new("st", "status"));
        assert_eq!(registry.shortcut_table("demo").list().len(), 1);
        assert_eq!(registry.shortcut_table("other").list().len(), 0);
        assert!(registry.remove_shortcut("demo", "st"));
        assert!(!registry.remove_shortcut("demo", "st"));
    }
}
