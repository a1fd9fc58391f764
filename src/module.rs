//! Extension modules and their registry.
//!
//! A module is a unit of protocol behavior plugged into a session. The
//! session offers every inbound stanza to its modules in registration order
//! and stops at the first one that consumes it.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{Result, XmppError};
use crate::session::Session;
use crate::stanza::Stanza;

/// Extension contract.
///
/// Hooks run on whichever thread triggered them: `registered`/`unregistered`
/// on the caller of [`Session::register`]/[`Session::unregister`], `consume`
/// on the transport thread. `consume` must not block on a correlated request
/// ([`Session::send_request`]); the response would be delivered by the very
/// thread that is blocked. Spawn a thread or use
/// [`Session::submit_request`] and poll instead.
pub trait Module: Send + Sync {
    /// Unique name within a session.
    fn name(&self) -> &str;

    /// Called once the module is in the registry. Keep a
    /// [`crate::session::WeakSession`] if the module needs to send later.
    fn registered(&self, session: &Session) {
        let _ = session;
    }

    /// Called once the module has left the registry.
    fn unregistered(&self, session: &Session) {
        let _ = session;
    }

    /// Offer a stanza. Return `true` to consume it and stop dispatch.
    ///
    /// Failures are the module's own business: log them, answer the sender
    /// with an error stanza, and return. They never end the session.
    fn consume(&self, session: &Session, stanza: &Stanza) -> bool;

    /// Feature namespaces this module contributes to service discovery.
    fn disco_features(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Ordered, name-unique module collection.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module. Fails without modifying the registry if the name is
    /// taken.
    pub fn insert(&mut self, module: Arc<dyn Module>) -> Result<()> {
        if self.contains(module.name()) {
            return Err(XmppError::DuplicateModule(module.name().to_string()));
        }
        self.modules.push(module);
        Ok(())
    }

    /// Remove a module by name, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Module>> {
        let pos = self.modules.iter().position(|m| m.name() == name)?;
        Some(self.modules.remove(pos))
    }

    /// Whether a module with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name() == name)
    }

    /// Module by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.iter().find(|m| m.name() == name).cloned()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Handles to every module, in order. Dispatch iterates a snapshot so
    /// registry changes made mid-dispatch apply from the next stanza on.
    pub fn snapshot(&self) -> Vec<Arc<dyn Module>> {
        self.modules.clone()
    }

    /// Union of every module's disco features.
    pub fn disco_features(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .flat_map(|m| m.disco_features())
            .collect()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Offer `stanza` to `modules` in order; returns the consumer's name.
pub(crate) fn dispatch<'a>(
    modules: &'a [Arc<dyn Module>],
    session: &Session,
    stanza: &Stanza,
) -> Option<&'a str> {
    modules
        .iter()
        .find(|m| m.consume(session, stanza))
        .map(|m| m.name())
}
