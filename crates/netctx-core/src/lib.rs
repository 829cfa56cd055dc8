//! Propagation of typed request-scoped values and deadlines across process boundaries.
//!
//! Register entries once in a [`Registry`]. On the way out a [`Propagator`] renders the values
//! of a [`RequestContext`] into header or metadata fields; on the way in a [`Harvester`] parses
//! them back and turns a propagated deadline into a local cancellation scope.
//!
//! ```
//! use std::sync::LazyLock;
//! use netctx_core::{Key, Registry, RequestContext, Transport};
//!
//! static HOP: LazyLock<Key<i32>> = LazyLock::new(Key::new);
//!
//! let registry = Registry::new();
//! registry.int32(&HOP, "hop");
//!
//! let ctx = RequestContext::background().with_value(&HOP, 0);
//! let fields = registry.propagator(Transport::Http).propagate(&ctx);
//! assert_eq!(fields[0].name, "X-Go-Context-hop");
//!
//! let back = registry
//!     .harvester(Transport::Http)
//!     .extract(&fields, &RequestContext::background());
//! assert_eq!(back.value(&HOP), Some(&0));
//! ```
mod codec;
pub use codec::{Codec, FnCodec, IntCodec, TextCodec, TimeFormat, TimestampCodec, WireFormat};

mod context;
pub use context::{RequestContext, ScopeGuard, ValueSet, instant_from_wall, wall_from_instant};

mod entry;
pub use entry::{Entry, EntryBuilder, EntryValue};

mod error;
pub use error::{ConfigError, ContextError, EntryError, ParseError, RenderError};

mod harvest;
pub use harvest::{Harvest, Harvester};

mod key;
pub use key::{Key, KeyId};

mod propagate;
pub use propagate::Propagator;

mod registry;
pub use registry::{
    DEADLINE_NAME, DEFAULT_PREFIX, Logger, PropagationConfig, Registry, Snapshot, Transport,
};

mod wire;
pub use wire::{Extractor, Injector, WireField};
