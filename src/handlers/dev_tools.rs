//! Handlers for authoring and testing stories without a backend

use super::{FnHandler, HandlerDef, HandlerProvider, Namespace};
use crate::session::ContextStore;

/// Shared provider of `dev-tools:set_context_{1,2,3}`, each setting
/// `DEV_CONTEXT_{n}`
pub struct DevToolsProvider;

impl DevToolsProvider {
    const SLOTS: [u8; 3] = [1, 2, 3];
}

impl HandlerProvider for DevToolsProvider {
    fn namespace(&self) -> Namespace {
        Namespace::DEV_TOOLS
    }

    fn handlers(&self) -> Vec<HandlerDef> {
        Self::SLOTS
            .into_iter()
            .map(|n| {
                let context = format!("DEV_CONTEXT_{n}");
                let produced = context.clone();
                HandlerDef::new(
                    Namespace::DEV_TOOLS.qualify(&format!("set_context_{n}")),
                    FnHandler::new(move |_: &ContextStore| {
                        let mut out = ContextStore::new();
                        out.set(produced.clone());
                        Ok(out)
                    }),
                )
                .with_description(format!("Set {context}"))
                .with_outputs([context])
            })
            .collect()
    }
}
