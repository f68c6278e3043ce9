//! Model factory registry for configuration-driven setup.
//!
//! Models are registered by type name so that a [`SimConfig`](crate::config::SimConfig)
//! can instantiate them from their `model` field and string attributes.
//!
//! # Example
//!
//! ```
//! use cosync::registry::ModelRegistry;
//! use cosync::models::Plant;
//! use cosync::subsystem::Subsystem;
//! use std::collections::HashMap;
//!
//! let mut registry = ModelRegistry::new();
//! registry.register("Plant", |_attrs| Box::new(Plant::new()));
//!
//! let plant = registry.create("Plant", &HashMap::new()).unwrap();
//! assert_eq!(plant.variables().len(), 4);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::subsystem::{Subsystem, SubsystemKind};

/// Type alias for model factory functions.
pub type ModelFactory = Arc<dyn Fn(&HashMap<String, String>) -> Box<dyn Subsystem> + Send + Sync>;

/// A registry for model factories.
#[derive(Default)]
pub struct ModelRegistry {
    factories: HashMap<String, ModelFactory>,
}

impl ModelRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model factory with the given name.
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&HashMap<String, String>) -> Box<dyn Subsystem> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Creates a model instance by type name.
    ///
    /// # Returns
    /// `Some(model)` if the type is registered, `None` otherwise
    pub fn create(
        &self,
        type_name: &str,
        attrs: &HashMap<String, String>,
    ) -> Option<Box<dyn Subsystem>> {
        self.factories.get(type_name).map(|f| f(attrs))
    }

    /// Returns true if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Returns an iterator over registered type names.
    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }

    /// Unregisters a model type.
    pub fn unregister(&mut self, type_name: &str) -> bool {
        self.factories.remove(type_name).is_some()
    }

    /// Clears all registered types.
    pub fn clear(&mut self) {
        self.factories.clear();
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("registered_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads the `kind` attribute; anything but `co-simulation` is model exchange.
fn kind_attr(attrs: &HashMap<String, String>) -> SubsystemKind {
    match attrs.get("kind").map(String::as_str) {
        Some("co-simulation") | Some("cs") => SubsystemKind::CoSimulation,
        _ => SubsystemKind::ModelExchange,
    }
}

fn f64_attr(attrs: &HashMap<String, String>, key: &str, default: f64) -> f64 {
    attrs
        .get(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Creates a default registry with the built-in models.
///
/// Includes:
/// - `Plant` - first-order plant (`kind`, `x0`)
/// - `Controller` - periodically clocked controller (`kind`, `interval`)
/// - `Supervisor` - threshold supervisor (`kind`, `threshold`)
pub fn create_default_registry() -> ModelRegistry {
    use crate::models::{controller, supervisor, Controller, Plant, Supervisor};

    let mut registry = ModelRegistry::new();

    registry.register("Plant", |attrs| {
        Box::new(Plant::with_kind(kind_attr(attrs)).with_initial_state(f64_attr(attrs, "x0", 0.0)))
    });

    registry.register("Controller", |attrs| {
        Box::new(
            Controller::new()
                .with_kind(kind_attr(attrs))
                .with_interval(f64_attr(attrs, "interval", controller::DEFAULT_INTERVAL)),
        )
    });

    registry.register("Supervisor", |attrs| {
        Box::new(
            Supervisor::new(f64_attr(attrs, "threshold", supervisor::DEFAULT_THRESHOLD))
                .with_kind(kind_attr(attrs)),
        )
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Plant;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_registry_basic() {
        let mut registry = ModelRegistry::new();
        assert!(registry.is_empty());

        registry.register("Test", |_| Box::new(Plant::new()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("Test"));
    }

    #[test]
    fn test_registry_create() {
        let registry = create_default_registry();
        assert!(registry.create("Plant", &HashMap::new()).is_some());
        assert!(registry.create("NonExistent", &HashMap::new()).is_none());
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        assert!(registry.contains("Plant"));
        assert!(registry.contains("Controller"));
        assert!(registry.contains("Supervisor"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_kind_attribute() {
        let registry = create_default_registry();
        let cs = registry
            .create("Controller", &attrs(&[("kind", "co-simulation")]))
            .unwrap();
        assert_eq!(cs.kind(), SubsystemKind::CoSimulation);

        let me = registry.create("Controller", &HashMap::new()).unwrap();
        assert_eq!(me.kind(), SubsystemKind::ModelExchange);
    }

    #[test]
    fn test_numeric_attributes() {
        let registry = create_default_registry();
        let mut controller = registry
            .create("Controller", &attrs(&[("interval", "0.25")]))
            .unwrap();
        assert_eq!(controller.get_interval("r").unwrap().value, 0.25);

        // Unparseable values fall back to the default.
        let mut controller = registry
            .create("Controller", &attrs(&[("interval", "soon")]))
            .unwrap();
        assert_eq!(
            controller.get_interval("r").unwrap().value,
            crate::models::controller::DEFAULT_INTERVAL
        );
    }

    #[test]
    fn test_registry_unregister() {
        let mut registry = create_default_registry();
        assert!(registry.unregister("Plant"));
        assert!(!registry.contains("Plant"));
        assert!(!registry.unregister("Plant"));
        registry.clear();
        assert!(registry.is_empty());
    }
}
