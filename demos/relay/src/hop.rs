use std::sync::LazyLock;

use netctx_core::{Key, Registry};

/// Number of services the request passed through.
pub static HOP: LazyLock<Key<i32>> = LazyLock::new(Key::new);

pub const HOP_NAME: &str = "hop";

pub fn register(registry: &Registry) {
    registry.int32(&HOP, HOP_NAME);
}
