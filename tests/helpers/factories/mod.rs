pub mod envelope_factory;
pub mod handler_factory;
pub mod registry_factory;

pub use envelope_factory::EnvelopeFactory;
pub use handler_factory::HandlerFactory;
pub use registry_factory::{CountingLoader, RegistryFactory};
