//! Process-wide set of propagated entries plus the settings that shape the wire format.
//!
//! The registry is read on every request and written rarely (start-up, tests). Its state is
//! an immutable [`Snapshot`] behind an [`ArcSwap`]: readers load a consistent snapshot
//! without locking, writers publish a modified copy.
mod config;
pub use config::PropagationConfig;

mod logger;
pub use logger::Logger;

use std::{
    fmt,
    sync::{Arc, LazyLock},
};

use arc_swap::ArcSwap;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    codec::{IntCodec, TextCodec, TimeFormat, TimestampCodec, WireFormat},
    entry::Entry,
    error::ConfigError,
    harvest::Harvester,
    key::Key,
    propagate::Propagator,
};

/// Prefix used for both headers and metadata unless configured otherwise.
pub const DEFAULT_PREFIX: &str = "X-Go-Context-";

/// Name of the deadline field, appended to the transport prefix.
pub const DEADLINE_NAME: &str = "Deadline";

static DEADLINE_KEY: LazyLock<Key<OffsetDateTime>> = LazyLock::new(Key::new);

static DEADLINE_ENTRY: LazyLock<Entry> =
    LazyLock::new(|| Entry::new(&DEADLINE_KEY, DEADLINE_NAME, TimestampCodec));

static GLOBAL: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::new()));

/// Which carrier a field travels in. Selects the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// HTTP request headers.
    Http,
    /// gRPC metadata.
    Metadata,
}

/// Immutable view of the registry at one point in time.
#[derive(Clone)]
pub struct Snapshot {
    entries: Vec<Entry>,
    http_prefix: Arc<str>,
    metadata_prefix: Arc<str>,
    deadline: bool,
    wire: WireFormat,
    logger: Logger,
}

impl Snapshot {
    /// Registered entries in registration order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn prefix(&self, transport: Transport) -> &str {
        match transport {
            Transport::Http => &self.http_prefix,
            Transport::Metadata => &self.metadata_prefix,
        }
    }

    /// Wire name of `name` in `transport`.
    pub fn field_name(&self, transport: Transport, name: &str) -> String {
        let prefix = self.prefix(transport);
        let mut out = String::with_capacity(prefix.len() + name.len());
        out.push_str(prefix);
        out.push_str(name);
        out
    }

    pub fn deadline_enabled(&self) -> bool {
        self.deadline
    }

    /// The deadline entry, or `None` when deadline propagation is disabled.
    pub fn deadline_entry(&self) -> Option<&Entry> {
        self.deadline.then(|| &*DEADLINE_ENTRY)
    }

    pub fn wire(&self) -> &WireFormat {
        &self.wire
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            http_prefix: Arc::from(DEFAULT_PREFIX),
            metadata_prefix: Arc::from(DEFAULT_PREFIX),
            deadline: true,
            wire: WireFormat::default(),
            logger: Logger::default(),
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("entries", &self.entries)
            .field("http_prefix", &&*self.http_prefix)
            .field("metadata_prefix", &&*self.metadata_prefix)
            .field("deadline", &self.deadline)
            .field("time_format", &self.wire.time.to_string())
            .field("logger", &self.logger)
            .finish()
    }
}

/// Ordered, upsert-by-key collection of [`Entry`] values.
///
/// Usually shared as `Arc<Registry>` between the adapters of one process; [`Registry::global`]
/// offers a process-wide default for code that configures itself on load.
pub struct Registry {
    state: ArcSwap<Snapshot>,
}

impl Registry {
    /// Empty registry with default prefixes, deadline propagation on and the RFC 3339 time format.
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Registry configured from `cfg`. Prefixes and time format are validated.
    pub fn from_config(cfg: &PropagationConfig) -> Result<Self, ConfigError> {
        let registry = Self::new();
        registry.apply(cfg)?;
        Ok(registry)
    }

    /// Process-wide default instance.
    pub fn global() -> Arc<Registry> {
        Arc::clone(&GLOBAL)
    }

    /// Apply prefixes, deadline flag and time format from `cfg`, keeping entries and logger.
    pub fn apply(&self, cfg: &PropagationConfig) -> Result<(), ConfigError> {
        validate_prefix(&cfg.http_prefix)?;
        validate_prefix(&cfg.metadata_prefix)?;
        let time: TimeFormat = cfg.time_format.parse()?;

        let http: Arc<str> = Arc::from(cfg.http_prefix.as_str());
        let metadata: Arc<str> = Arc::from(cfg.metadata_prefix.as_str());
        self.update(|s| {
            s.http_prefix = http.clone();
            s.metadata_prefix = metadata.clone();
            s.deadline = cfg.deadline;
            s.wire.time = time.clone();
        });
        debug!(?cfg, "propagation config applied");
        Ok(())
    }

    /// Consistent view of the current state.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.load_full()
    }

    /// Insert `entry`, or replace the entry registered under the same key in place.
    pub fn register(&self, entry: Entry) {
        debug!(name = entry.name(), ty = entry.value_type_name(), "register entry");
        self.update(|s| match s.entries.iter().position(|e| e.key() == entry.key()) {
            Some(at) => s.entries[at] = entry.clone(),
            None => s.entries.push(entry.clone()),
        });
    }

    /// Register a text entry carried verbatim.
    pub fn text(&self, key: &Key<String>, name: impl Into<String>) {
        self.register(Entry::new(key, name, TextCodec));
    }

    /// Register a platform-width integer entry.
    pub fn int(&self, key: &Key<isize>, name: impl Into<String>) {
        self.register(Entry::new(key, name, IntCodec::<isize>::new()));
    }

    /// Register a 32-bit integer entry, rendered in decimal.
    ///
    /// Incoming text outside the `i32` range is rejected as a parse error, never wrapped.
    ///
    /// # Examples
    /// ```
    /// use std::sync::LazyLock;
    /// use netctx_core::{Key, Registry, RequestContext, Transport};
    ///
    /// static HOP: LazyLock<Key<i32>> = LazyLock::new(Key::new);
    ///
    /// let registry = Registry::new();
    /// registry.int32(&HOP, "hop");
    ///
    /// let ctx = RequestContext::background().with_value(&*HOP, 7);
    /// let fields = registry.propagator(Transport::Http).propagate(&ctx);
    /// assert_eq!(fields[0].name, "X-Go-Context-hop");
    /// assert_eq!(fields[0].value, "7");
    /// ```
    pub fn int32(&self, key: &Key<i32>, name: impl Into<String>) {
        self.register(Entry::new(key, name, IntCodec::<i32>::new()));
    }

    /// Register a 64-bit integer entry. The full width is carried on the wire.
    pub fn int64(&self, key: &Key<i64>, name: impl Into<String>) {
        self.register(Entry::new(key, name, IntCodec::<i64>::new()));
    }

    /// Register a timestamp entry rendered with the registry's time format.
    pub fn timestamp(&self, key: &Key<OffsetDateTime>, name: impl Into<String>) {
        self.register(Entry::new(key, name, TimestampCodec));
    }

    /// Registered entries in registration order.
    pub fn entries(&self) -> Vec<Entry> {
        self.state.load().entries.clone()
    }

    /// Set the HTTP and metadata prefix to the same value.
    pub fn set_prefixes(&self, prefix: &str) -> Result<(), ConfigError> {
        validate_prefix(prefix)?;
        let prefix: Arc<str> = Arc::from(prefix);
        self.update(|s| {
            s.http_prefix = prefix.clone();
            s.metadata_prefix = prefix.clone();
        });
        Ok(())
    }

    /// Prefix prepended to every entry name in HTTP headers.
    ///
    /// Takes effect for propagators and harvesters created afterwards; ones already bound
    /// to a snapshot keep the prefix they started with. The empty prefix is allowed.
    ///
    /// # Errors
    /// [`ConfigError::InvalidPrefix`] if `prefix` holds characters that are not valid in an
    /// HTTP header name. The registry is left unchanged.
    ///
    /// # Examples
    /// ```
    /// use netctx_core::Registry;
    ///
    /// let registry = Registry::new();
    /// registry.set_http_prefix("Z-").unwrap();
    /// assert_eq!(registry.http_prefix(), "Z-");
    /// assert!(registry.set_http_prefix("bad prefix").is_err());
    /// assert_eq!(registry.http_prefix(), "Z-");
    /// ```
    pub fn set_http_prefix(&self, prefix: &str) -> Result<(), ConfigError> {
        validate_prefix(prefix)?;
        let prefix: Arc<str> = Arc::from(prefix);
        self.update(|s| s.http_prefix = prefix.clone());
        Ok(())
    }

    /// Prefix prepended to every entry name in gRPC metadata. Same rules as
    /// [`Registry::set_http_prefix`]; metadata keys end up lowercased on the wire.
    pub fn set_metadata_prefix(&self, prefix: &str) -> Result<(), ConfigError> {
        validate_prefix(prefix)?;
        let prefix: Arc<str> = Arc::from(prefix);
        self.update(|s| s.metadata_prefix = prefix.clone());
        Ok(())
    }

    pub fn http_prefix(&self) -> String {
        self.state.load().http_prefix.to_string()
    }

    pub fn metadata_prefix(&self) -> String {
        self.state.load().metadata_prefix.to_string()
    }

    /// Stop propagating and consuming deadlines.
    pub fn disable_deadline(&self) {
        self.update(|s| s.deadline = false);
    }

    pub fn deadline_enabled(&self) -> bool {
        self.state.load().deadline
    }

    /// The deadline entry, or `None` when deadline propagation is disabled.
    pub fn deadline_entry(&self) -> Option<Entry> {
        self.state.load().deadline_entry().cloned()
    }

    /// Format shared by every timestamp entry and the deadline.
    pub fn set_time_format(&self, format: TimeFormat) {
        self.update(|s| s.wire.time = format.clone());
    }

    pub fn set_logger(&self, logger: Logger) {
        self.update(|s| s.logger = logger.clone());
    }

    /// Forward a message to the configured logger.
    pub fn log(&self, args: fmt::Arguments<'_>) {
        self.state.load().logger.log(args);
    }

    /// Restore the freshly constructed state. Meant for test isolation.
    pub fn reset(&self) {
        self.state.store(Arc::new(Snapshot::default()));
    }

    /// Outbound side for `transport`, bound to the current snapshot.
    pub fn propagator(&self, transport: Transport) -> Propagator {
        Propagator::new(self.snapshot(), transport)
    }

    /// Inbound side for `transport`, bound to the current snapshot.
    pub fn harvester(&self, transport: Transport) -> Harvester {
        Harvester::new(self.snapshot(), transport)
    }

    fn update<F>(&self, mut f: F)
    where
        F: FnMut(&mut Snapshot),
    {
        self.state.rcu(|current| {
            let mut next = Snapshot::clone(current);
            f(&mut next);
            next
        });
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Registry").field(&*self.state.load()).finish()
    }
}

/// Prefixes must be usable as the start of an HTTP header name. Empty is allowed.
fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    let bad = prefix.chars().find(|c| !is_token_char(*c));
    match bad {
        None => Ok(()),
        Some(c) => Err(ConfigError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: format!("character {c:?} is not allowed in a header name"),
        }),
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn register_keeps_order() {
        let reg = Registry::new();
        let a: Key<String> = Key::new();
        let b: Key<i32> = Key::new();
        let c: Key<i64> = Key::new();

        reg.text(&a, "a");
        reg.int32(&b, "b");
        reg.int64(&c, "c");

        let names: Vec<_> = reg.entries().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let reg = Registry::new();
        let first: Key<String> = Key::new();
        let second: Key<String> = Key::new();

        reg.text(&first, "user");
        reg.text(&second, "tenant");
        reg.text(&first, "account");

        let entries = reg.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key(), first.id());
        assert_eq!(entries[0].name(), "account");
        assert_eq!(entries[1].name(), "tenant");
    }

    #[test]
    fn upsert_swaps_codec() {
        let reg = Registry::new();
        let key: Key<i32> = Key::new();
        reg.int32(&key, "n");
        reg.register(
            Entry::builder(&key, "n")
                .parse(|s| Ok(s.len() as i32))
                .build()
                .unwrap(),
        );

        let entries = reg.entries();
        assert_eq!(entries.len(), 1);
        let v: i32 = entries[0].unmarshal("abcd", &WireFormat::default()).unwrap();
        assert_eq!(v, 4);
    }

    #[test]
    fn snapshot_is_stable_across_writes() {
        let reg = Registry::new();
        let key: Key<String> = Key::new();
        let before = reg.snapshot();

        reg.text(&key, "user");
        reg.set_prefixes("Z-").unwrap();

        assert!(before.entries().is_empty());
        assert_eq!(before.prefix(Transport::Http), DEFAULT_PREFIX);
        assert_eq!(reg.snapshot().entries().len(), 1);
    }

    #[test]
    fn prefixes_are_independent() {
        let reg = Registry::new();
        reg.set_http_prefix("Z-").unwrap();

        let snap = reg.snapshot();
        assert_eq!(snap.field_name(Transport::Http, "hop"), "Z-hop");
        assert_eq!(snap.field_name(Transport::Metadata, "hop"), "X-Go-Context-hop");

        reg.set_prefixes("").unwrap();
        assert_eq!(reg.http_prefix(), "");
        assert_eq!(reg.metadata_prefix(), "");
    }

    #[test]
    fn invalid_prefix_is_rejected_and_state_kept() {
        let reg = Registry::new();
        for bad in ["X Ctx-", "X:Ctx-", "ünï-", "X\nY"] {
            let res = reg.set_http_prefix(bad);
            assert!(matches!(res, Err(ConfigError::InvalidPrefix { .. })), "{bad:?}");
        }
        assert_eq!(reg.http_prefix(), DEFAULT_PREFIX);
    }

    #[test]
    fn deadline_entry_follows_flag() {
        let reg = Registry::new();
        let entry = reg.deadline_entry().unwrap();
        assert_eq!(entry.name(), DEADLINE_NAME);
        assert!(reg.entries().is_empty());

        reg.disable_deadline();
        assert!(reg.deadline_entry().is_none());
        assert!(!reg.deadline_enabled());
    }

    #[test]
    fn reset_restores_defaults() {
        let reg = Registry::new();
        let key: Key<isize> = Key::new();
        reg.int(&key, "n");
        reg.set_prefixes("Z-").unwrap();
        reg.disable_deadline();
        reg.set_logger(Logger::Off);

        reg.reset();

        let snap = reg.snapshot();
        assert!(snap.entries().is_empty());
        assert_eq!(snap.prefix(Transport::Metadata), DEFAULT_PREFIX);
        assert!(snap.deadline_enabled());
        assert!(matches!(snap.logger(), Logger::Tracing));
        assert!(matches!(snap.wire().time, TimeFormat::Rfc3339));
    }

    #[test]
    fn from_config_applies_everything() {
        let cfg = PropagationConfig {
            http_prefix: "Z-".into(),
            metadata_prefix: "m-".into(),
            deadline: false,
            time_format: "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]".into(),
        };
        let reg = Registry::from_config(&cfg).unwrap();
        let snap = reg.snapshot();

        assert_eq!(snap.prefix(Transport::Http), "Z-");
        assert_eq!(snap.prefix(Transport::Metadata), "m-");
        assert!(!snap.deadline_enabled());
        assert!(matches!(snap.wire().time, TimeFormat::Custom { .. }));
    }

    #[test]
    fn from_config_rejects_bad_time_format() {
        let cfg = PropagationConfig {
            time_format: "[year".into(),
            ..Default::default()
        };
        assert!(matches!(
            Registry::from_config(&cfg),
            Err(ConfigError::InvalidTimeFormat { .. })
        ));
    }

    #[test]
    fn concurrent_writes_do_not_lose_entries() {
        let reg = Arc::new(Registry::new());
        let keys: Vec<Key<i64>> = (0..32).map(|_| Key::new()).collect();

        let handles: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let reg = reg.clone();
                let key = *key;
                thread::spawn(move || {
                    reg.int64(&key, format!("n{i}"));
                    let _ = reg.snapshot().entries().len();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(reg.entries().len(), keys.len());
    }
}
