//! Handler registry
//!
//! Handlers are the silent steps of a story: named functions from the current
//! contexts to a context delta. They are registered once at boot, grouped by
//! provider namespace, and looked up by name while a plan executes.

mod dev_tools;
mod namespace;
mod registry;

pub use dev_tools::DevToolsProvider;
pub use namespace::Namespace;
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};

use crate::session::ContextStore;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A registered side-effecting step.
///
/// Implementations may perform I/O; the turn processor bounds every call with
/// the configured handler timeout.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Compute the contexts to merge into the session.
    ///
    /// An `Err` message aborts the rest of the turn.
    async fn invoke(&self, contexts: &ContextStore) -> Result<ContextStore, String>;
}

/// Adapts a synchronous closure to `Handler`
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&ContextStore) -> Result<ContextStore, String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&ContextStore) -> Result<ContextStore, String> + Send + Sync,
{
    async fn invoke(&self, contexts: &ContextStore) -> Result<ContextStore, String> {
        (self.0)(contexts)
    }
}

/// A handler as exposed by a provider.
///
/// Non-empty context sets are a contract stories are validated against.
#[derive(Clone)]
pub struct HandlerDef {
    pub name: String,
    pub description: String,
    pub input_contexts: BTreeSet<String>,
    pub output_contexts: BTreeSet<String>,
    pub handler: Arc<dyn Handler>,
}

impl HandlerDef {
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_contexts: BTreeSet::new(),
            output_contexts: BTreeSet::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_inputs<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_contexts.extend(contexts.into_iter().map(Into::into));
        self
    }

    pub fn with_outputs<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_contexts.extend(contexts.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for HandlerDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDef")
            .field("name", &self.name)
            .field("input_contexts", &self.input_contexts)
            .field("output_contexts", &self.output_contexts)
            .finish_non_exhaustive()
    }
}

/// A group of handlers installed together
pub trait HandlerProvider: Send + Sync {
    fn namespace(&self) -> Namespace;

    fn handlers(&self) -> Vec<HandlerDef>;
}

/// Boot-time registration failures; the process must not start
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Handler <{name}> is already registered (namespace {existing})")]
    DuplicateHandler { name: String, existing: String },
    #[error("Namespace key must not be blank")]
    BlankNamespace,
}

/// Runtime invocation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Handler <{0}> is not registered")]
    NotFound(String),
    #[error("Handler <{handler}> failed: {message}")]
    Failure { handler: String, message: String },
}
