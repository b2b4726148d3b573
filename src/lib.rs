pub mod command;
pub mod filter;
pub mod frontend;
pub mod logging;
pub mod modules;
pub mod registry;
pub mod shared;

#[cfg(test)]
#[path = "../tests/helpers/mod.rs"]
pub mod test_helpers;
