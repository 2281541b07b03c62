use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::http::request::Request;
use crate::http::response::Response;

/// Upper bound on concurrently registered services.
pub const MAX_SERVICES: usize = 16;

/// Handles one operation of a service: `(operation_name, request)`.
pub type OperationHandler = Arc<dyn Fn(&str, &Request) -> Result<Response> + Send + Sync>;
pub type InitHook = Arc<dyn Fn() -> Result<()> + Send + Sync>;
pub type CleanupHook = Arc<dyn Fn() + Send + Sync>;
pub type CapabilityHook = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Everything a service hands the dispatcher when it registers.
#[derive(Clone)]
pub struct ServiceRegistration {
    name: String,
    handler: OperationHandler,
    init: Option<InitHook>,
    cleanup: Option<CleanupHook>,
    capability: Option<CapabilityHook>,
}

impl ServiceRegistration {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, &Request) -> Result<Response> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            init: None,
            cleanup: None,
            capability: None,
        }
    }

    /// Runs once during `register`; an error aborts the registration.
    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Runs after the service has been removed from the registry.
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    pub fn with_capabilities<F>(mut self, capability: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.capability = Some(Arc::new(capability));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("name", &self.name)
            .field("init", &self.init.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("capability", &self.capability.is_some())
            .finish()
    }
}

/// Routes `(service, operation)` pairs to registered handlers.
///
/// The registry is read-mostly: dispatch takes a read lock just long enough
/// to clone the handler, then calls it with no lock held. Register and
/// unregister either complete fully or leave the registry untouched.
#[derive(Debug, Default)]
pub struct ServiceDispatcher {
    services: RwLock<Vec<ServiceRegistration>>,
}

impl ServiceDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service.
    ///
    /// The init hook runs while the registry is locked, so it must not call
    /// back into the dispatcher.
    pub fn register(&self, registration: ServiceRegistration) -> Result<()> {
        if registration.name.is_empty() {
            return Err(Error::InvalidArgument("service name must not be empty".to_string()));
        }

        let mut services = self.services.write();
        if services.iter().any(|s| s.name == registration.name) {
            return Err(Error::Duplicate(format!(
                "service '{}' already registered",
                registration.name
            )));
        }
        if services.len() >= MAX_SERVICES {
            return Err(Error::ResourceExhausted(format!(
                "at most {} services can be registered",
                MAX_SERVICES
            )));
        }

        if let Some(init) = &registration.init {
            if let Err(e) = init() {
                tracing::error!(service = %registration.name, error = %e, "Service init failed");
                return Err(e);
            }
        }

        tracing::info!(service = %registration.name, "Service registered");
        services.push(registration);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        let removed = {
            let mut services = self.services.write();
            let index = services
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| Error::NotFound(format!("service '{}' not registered", name)))?;
            services.remove(index)
        };

        if let Some(cleanup) = &removed.cleanup {
            cleanup();
        }
        tracing::info!(service = name, "Service unregistered");
        Ok(())
    }

    /// Calls the service's handler with `operation` and `request`.
    ///
    /// Whatever the handler returns is passed through untouched.
    pub fn dispatch(&self, service: &str, operation: &str, request: &Request) -> Result<Response> {
        let handler = self
            .services
            .read()
            .iter()
            .find(|s| s.name == service)
            .map(|s| Arc::clone(&s.handler))
            .ok_or_else(|| Error::NotFound(format!("service '{}' not registered", service)))?;

        tracing::debug!(service, operation, "Dispatching");
        handler(operation, request)
    }

    /// False for unknown services and services without a capability hook.
    pub fn capabilities(&self, service: &str, capability: &str) -> bool {
        let hook = self
            .services
            .read()
            .iter()
            .find(|s| s.name == service)
            .and_then(|s| s.capability.clone());

        hook.is_some_and(|hook| hook(capability))
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.read().iter().any(|s| s.name == name)
    }

    /// Registered names in registration order.
    pub fn services(&self) -> Vec<String> {
        self.services.read().iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Empties the registry, running cleanup hooks newest first.
    pub fn shutdown(&self) {
        let drained: Vec<ServiceRegistration> = self.services.write().drain(..).collect();
        for registration in drained.iter().rev() {
            if let Some(cleanup) = &registration.cleanup {
                cleanup();
            }
        }
        tracing::info!(services = drained.len(), "Dispatcher shut down");
    }
}
