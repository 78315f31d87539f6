// Pipeline & Driver Registries
//
// Concurrent maps; single-key operations need no external locking. Anything
// spanning both maps (declare, destroy, the serve walk) is serialized by the
// jobs service's lifecycle lock.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Pipeline;
use crate::port::{Driver, DriverConstructor};

/// Pipeline name -> pipeline definition
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<String, Arc<Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pipeline: Arc<Pipeline>) -> Option<Arc<Pipeline>> {
        self.pipelines
            .insert(pipeline.name().to_string(), pipeline)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(name).map(|p| Arc::clone(p.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.remove(name).map(|(_, p)| p)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Snapshot of registered names, unordered
    pub fn names(&self) -> Vec<String> {
        self.pipelines.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of registered pipelines, unordered
    pub fn snapshot(&self) -> Vec<Arc<Pipeline>> {
        self.pipelines.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Driver type -> constructor (fixed once serving starts) and
/// pipeline name -> live driver
#[derive(Default)]
pub struct DriverRegistry {
    constructors: HashMap<String, Arc<dyn DriverConstructor>>,
    consumers: DashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constructor; needs `&mut`, so it can only happen before the
    /// registry is shared
    pub fn register_constructor(
        &mut self,
        driver: impl Into<String>,
        constructor: Arc<dyn DriverConstructor>,
    ) {
        self.constructors.insert(driver.into(), constructor);
    }

    pub fn constructor(&self, driver: &str) -> Option<Arc<dyn DriverConstructor>> {
        self.constructors.get(driver).cloned()
    }

    /// Bind the live driver for a pipeline
    pub fn bind(&self, pipeline: &str, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        self.consumers.insert(pipeline.to_string(), driver)
    }

    pub fn consumer(&self, pipeline: &str) -> Option<Arc<dyn Driver>> {
        self.consumers.get(pipeline).map(|d| Arc::clone(d.value()))
    }

    pub fn unbind(&self, pipeline: &str) -> Option<Arc<dyn Driver>> {
        self.consumers.remove(pipeline).map(|(_, d)| d)
    }

    /// Unbind every live driver
    pub fn drain(&self) -> Vec<(String, Arc<dyn Driver>)> {
        let names: Vec<String> = self.consumers.iter().map(|e| e.key().clone()).collect();
        names
            .into_iter()
            .filter_map(|name| self.consumers.remove(&name))
            .collect()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::driver::{MockDriver, MockDriverConstructor};

    #[test]
    fn test_pipeline_registry_roundtrip() {
        let registry = PipelineRegistry::new();
        assert!(registry.is_empty());

        registry.insert(Arc::new(Pipeline::new("p1", "ephemeral")));
        registry.insert(Arc::new(Pipeline::new("p2", "amqp")));

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["p1", "p2"]);
        assert_eq!(registry.get("p2").unwrap().driver(), "amqp");

        assert!(registry.remove("p1").is_some());
        assert!(!registry.contains("p1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_driver_registry_binds_one_driver_per_pipeline() {
        let mut registry = DriverRegistry::new();
        registry.register_constructor("ephemeral", Arc::new(MockDriverConstructor::new()));

        assert!(registry.constructor("ephemeral").is_some());
        assert!(registry.constructor("amqp").is_none());

        assert!(registry.bind("p1", Arc::new(MockDriver::new())).is_none());
        // rebinding replaces, never duplicates
        assert!(registry.bind("p1", Arc::new(MockDriver::new())).is_some());
        assert_eq!(registry.consumer_count(), 1);

        registry.bind("p2", Arc::new(MockDriver::new()));
        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.consumer_count(), 0);
        assert!(registry.consumer("p1").is_none());
    }
}
