//! # Step Handler Registry
//!
//! Maps a [`StepType`] to the handler that executes it.
//!
//! ## Key Features
//!
//! - **Thread-safe operations** using a `parking_lot` RwLock
//! - **Last registration wins**: re-registering a type replaces its handler
//!   and logs a warning, never an error
//! - **Statistics** for diagnostics
//!
//! ## Usage
//!
//! ```rust
//! use tasker_pipeline::orchestration::{
//!     Step, StepExecutionContext, StepExecutionResult, StepHandlerRegistry, StepType,
//! };
//!
//! let registry = StepHandlerRegistry::new();
//! registry.register(
//!     StepType::Custom("echo".into()),
//!     |_context: StepExecutionContext, step: Step| async move {
//!         Ok::<_, anyhow::Error>(StepExecutionResult::success(serde_json::json!(step.id)))
//!     },
//! );
//!
//! assert!(registry.contains(&StepType::Custom("echo".into())));
//! assert_eq!(registry.stats().custom_handlers, 1);
//! ```

use crate::orchestration::step_handler::StepHandler;
use crate::orchestration::types::StepType;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_handlers: usize,
    pub builtin_handlers: usize,
    pub custom_handlers: usize,
    /// Registered type tags, sorted
    pub step_types: Vec<String>,
}

#[derive(Default)]
pub struct StepHandlerRegistry {
    handlers: RwLock<HashMap<StepType, Arc<dyn StepHandler>>>,
}

impl std::fmt::Debug for StepHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepHandlerRegistry")
            .field("step_types", &self.registered_types())
            .finish()
    }
}

impl StepHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `step_type`, replacing any previous one
    pub fn register<H>(&self, step_type: StepType, handler: H)
    where
        H: StepHandler + 'static,
    {
        self.register_arc(step_type, Arc::new(handler));
    }

    /// Register a shared handler for `step_type`, replacing any previous one
    pub fn register_arc(&self, step_type: StepType, handler: Arc<dyn StepHandler>) {
        let handler_name = handler.name().to_string();
        let previous = self.handlers.write().insert(step_type.clone(), handler);

        if previous.is_some() {
            warn!(
                step_type = %step_type,
                handler = %handler_name,
                "Handler already registered, replacing"
            );
        } else {
            info!(step_type = %step_type, handler = %handler_name, "Registered step handler");
        }
    }

    pub fn get(&self, step_type: &StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers.read().get(step_type).cloned()
    }

    pub fn contains(&self, step_type: &StepType) -> bool {
        self.handlers.read().contains_key(step_type)
    }

    pub fn remove(&self, step_type: &StepType) -> bool {
        self.handlers.write().remove(step_type).is_some()
    }

    /// Registered type tags, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .keys()
            .map(|step_type| step_type.as_str().to_string())
            .collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Clear all handlers (useful for testing)
    pub fn clear(&self) {
        self.handlers.write().clear();
        info!("Step handler registry cleared");
    }

    pub fn stats(&self) -> RegistryStats {
        let handlers = self.handlers.read();
        let builtin_handlers = handlers.keys().filter(|t| t.is_builtin()).count();
        let mut step_types: Vec<String> = handlers.keys().map(|t| t.as_str().to_string()).collect();
        step_types.sort();

        RegistryStats {
            total_handlers: handlers.len(),
            builtin_handlers,
            custom_handlers: handlers.len() - builtin_handlers,
            step_types,
        }
    }
}
