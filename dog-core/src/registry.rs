use std::collections::HashMap;
use std::sync::Arc;

use crate::DogService;

/// Maps service names (the `<service>` part of an operation identifier
/// such as `users.find`) to DogService instances.
pub struct DogServiceRegistry<R, P = ()> {
    services: HashMap<String, Arc<dyn DogService<R, P>>>,
}

impl<R, P> DogServiceRegistry<R, P> {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Register a service under a given name, replacing any previous one.
    pub fn register<S>(&mut self, name: S, service: Arc<dyn DogService<R, P>>)
    where
        S: Into<String>,
    {
        self.services.insert(name.into(), service);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DogService<R, P>>> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }
}

impl<R, P> Default for DogServiceRegistry<R, P> {
    fn default() -> Self {
        Self::new()
    }
}
