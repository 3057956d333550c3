use super::{Handler, HandlerDef, HandlerError, HandlerProvider, Namespace, RegistryError};
use crate::session::ContextStore;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Entry {
    namespace: Namespace,
    def: HandlerDef,
}

/// Append-only registration phase.
///
/// The registry only exists once `build` has been called, so nothing can be
/// registered after sessions start using it.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    entries: BTreeMap<String, Entry>,
}

impl HandlerRegistryBuilder {
    /// Register a story-specific handler outside any provider
    pub fn register(
        self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<Self, RegistryError> {
        self.register_def(HandlerDef::new(name, handler))
    }

    /// Like `register`, keeping the declared context contract of `def`
    pub fn register_def(self, def: HandlerDef) -> Result<Self, RegistryError> {
        self.insert(Namespace::UNKNOWN, def)
    }

    pub fn register_provider(mut self, provider: &dyn HandlerProvider) -> Result<Self, RegistryError> {
        let namespace = provider.namespace();
        for def in provider.handlers() {
            self = self.insert(namespace.clone(), def)?;
        }
        tracing::debug!(namespace = %namespace, "Registered handler provider");
        Ok(self)
    }

    fn insert(mut self, namespace: Namespace, def: HandlerDef) -> Result<Self, RegistryError> {
        if let Some(existing) = self.entries.get(&def.name) {
            return Err(RegistryError::DuplicateHandler {
                name: def.name,
                existing: existing.namespace.to_string(),
            });
        }
        self.entries
            .insert(def.name.clone(), Entry { namespace, def });
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        tracing::info!(handlers = self.entries.len(), "Handler registry ready");
        HandlerRegistry {
            entries: self.entries,
        }
    }
}

/// Frozen name -> handler table, shared read-only by all sessions
pub struct HandlerRegistry {
    entries: BTreeMap<String, Entry>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn namespace_of(&self, name: &str) -> Option<&Namespace> {
        self.entries.get(name).map(|e| &e.namespace)
    }

    pub fn get(&self, name: &str) -> Option<&HandlerDef> {
        self.entries.get(name).map(|e| &e.def)
    }

    /// Every registered handler, by name
    pub fn definitions(&self) -> impl Iterator<Item = (&Namespace, &HandlerDef)> {
        self.entries.values().map(|e| (&e.namespace, &e.def))
    }

    /// Handler names grouped by namespace
    pub fn by_namespace(&self) -> BTreeMap<Namespace, Vec<&str>> {
        let mut grouped: BTreeMap<Namespace, Vec<&str>> = BTreeMap::new();
        for (name, entry) in &self.entries {
            grouped
                .entry(entry.namespace.clone())
                .or_default()
                .push(name);
        }
        grouped
    }

    /// Handle to a registered handler, for callers that bound the call themselves
    pub fn handler(&self, name: &str) -> Result<Arc<dyn Handler>, HandlerError> {
        self.entries
            .get(name)
            .map(|e| Arc::clone(&e.def.handler))
            .ok_or_else(|| HandlerError::NotFound(name.to_string()))
    }

    pub async fn invoke(&self, name: &str, contexts: &ContextStore) -> Result<ContextStore, HandlerError> {
        let handler = self.handler(name)?;
        handler
            .invoke(contexts)
            .await
            .map_err(|message| HandlerError::Failure {
                handler: name.to_string(),
                message,
            })
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
