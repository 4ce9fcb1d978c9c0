//! Vendor registry.
//!
//! Maps a vendor name from the controller config to the factory that builds
//! its [`CommandEncoder`]. Constructed at startup and passed by value; there
//! is no global registry.

use std::collections::HashMap;

use crate::driver::{CommandEncoder, EncoderFactory, HalError};

/// Registry of available vendor encoders.
pub struct DriverRegistry {
    factories: HashMap<&'static str, EncoderFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry pre-populated with every built-in vendor.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        crate::drivers::register_builtin(&mut reg);
        reg
    }

    /// Register an encoder factory.
    ///
    /// # Errors
    /// `HalError::DuplicateDriver` if the name is taken.
    pub fn register(&mut self, name: &'static str, factory: EncoderFactory) -> Result<(), HalError> {
        if self.factories.contains_key(name) {
            return Err(HalError::DuplicateDriver(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create an encoder by vendor name.
    ///
    /// # Errors
    /// `HalError::DriverNotFound` if no vendor with the given name is registered.
    pub fn create_encoder(&self, name: &str) -> Result<Box<dyn CommandEncoder>, HalError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Registered vendor names, sorted.
    pub fn vendors(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vernier_common::motion::command::CommandKind;
    use vernier_common::motion::error::ProtocolError;
    use vernier_common::motion::status::AxisReading;
    use vernier_common::motion::types::AxisId;

    struct NullEncoder;

    impl CommandEncoder for NullEncoder {
        fn name(&self) -> &'static str {
            "null"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn encode(&self, _: AxisId, _: CommandKind, _: f64) -> Result<Vec<u8>, ProtocolError> {
            Ok(Vec::new())
        }

        fn decode(&self, _: &[u8]) -> Result<AxisReading, ProtocolError> {
            Ok(AxisReading::default())
        }
    }

    fn create_null() -> Box<dyn CommandEncoder> {
        Box::new(NullEncoder)
    }

    #[test]
    fn register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("null", create_null).unwrap();
        let enc = reg.create_encoder("null").unwrap();
        assert_eq!(enc.name(), "null");
        assert_eq!(enc.reply_count(CommandKind::Go), 0);
    }

    #[test]
    fn unknown_vendor() {
        let reg = DriverRegistry::new();
        assert!(matches!(
            reg.create_encoder("esp300"),
            Err(HalError::DriverNotFound(name)) if name == "esp300"
        ));
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut reg = DriverRegistry::new();
        reg.register("dup", create_null).unwrap();
        assert!(matches!(
            reg.register("dup", create_null),
            Err(HalError::DuplicateDriver("dup"))
        ));
    }

    #[test]
    fn builtin_has_simulation() {
        let reg = DriverRegistry::with_builtin();
        assert!(reg.contains("simulation"));
        assert_eq!(reg.vendors(), vec!["simulation"]);
    }
}
