/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! The running execution environment the completer introspects.

pub mod client;
pub mod memory;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EnvError;
pub use remote::{
    CallSite, Evaluation, ExceptionDetails, PropertyDescriptor, RemoteObject, ValueType,
};

/// Request/response access to a live scripting environment.
///
/// Implementations must tolerate other parts of the shell mutating the
/// environment between calls; the completer never resets it.
#[async_trait]
pub trait LiveEnvironment: Send + Sync {
    /// Short name used in logs
    fn backend_name(&self) -> &'static str;

    /// Evaluates `expression`. With `silent` set, exceptions are reported in
    /// the result instead of being printed by the environment.
    async fn evaluate(&self, expression: &str, silent: bool) -> Result<Evaluation, EnvError>;

    /// Every name visible at global scope
    async fn global_names(&self) -> Result<Vec<String>, EnvError>;

    /// Loads a module and makes it available under its name
    async fn load_module(&self, specifier: &str) -> Result<Evaluation, EnvError>;

    /// Own and inherited property names of the object behind `object_id`
    async fn properties(&self, object_id: &str) -> Result<Vec<PropertyDescriptor>, EnvError>;

    /// Asks the environment for a usage hint for `callee` at `call_site`
    async fn invoke_hint(
        &self,
        callee: &RemoteObject,
        call_site: &CallSite,
        line: &str,
    ) -> Result<RemoteObject, EnvError>;

    async fn shutdown(&self) -> Result<(), EnvError> {
        Ok(())
    }
}

/// Shared handle to the environment, passed explicitly to the completer
pub type Session = Arc<dyn LiveEnvironment>;
