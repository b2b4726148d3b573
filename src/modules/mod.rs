//! Namespaces shipped with the server binary.

pub mod search;
pub mod system;

use crate::registry::loader::Registry;

pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(system::NAMESPACE, system::handler)
        .register(search::NAMESPACE, search::handler);
    registry
}
