pub use super::factories::{CountingLoader, EnvelopeFactory, HandlerFactory, RegistryFactory};

pub struct Factory;

impl Factory {
    pub fn envelope() -> EnvelopeFactory {
        EnvelopeFactory::new()
    }

    pub fn handler() -> HandlerFactory {
        HandlerFactory::new()
    }

    pub fn registry() -> RegistryFactory {
        RegistryFactory::new()
    }
}
