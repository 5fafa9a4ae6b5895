/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! In-process environment backed by a table of objects.
//!
//! Only dotted identifier paths such as `fs.promises` can be evaluated.
//! That is enough for completion, which never evaluates anything but
//! member-access objects and callees.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use super::LiveEnvironment;
use super::remote::{CallSite, Evaluation, PropertyDescriptor, RemoteObject};
use crate::error::EnvError;

/// Builtin commands every shell session starts with, and their usage
pub const SHELL_BUILTINS: &[(&str, &str)] = &[
    ("cat", "cat(path)"),
    ("cd", "cd([path])"),
    ("chmod", "chmod(mode, path)"),
    ("chown", "chown(uid, gid, path)"),
    ("grep", "grep(regex)"),
    ("ls", "ls([path])"),
    ("mkdir", "mkdir(path)"),
    ("pwd", "pwd()"),
    ("sh", "sh(command)"),
    ("stat", "stat(path)"),
    ("touch", "touch(path)"),
];

const ID_PREFIX: &str = "obj:";

/// Identity of an object in a [`MemoryEnvironment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(usize);

impl ObjectHandle {
    /// The object id reported to the completer
    pub fn object_id(&self) -> String {
        format!("{ID_PREFIX}{}", self.0)
    }

    fn parse(object_id: &str) -> Option<Self> {
        object_id
            .strip_prefix(ID_PREFIX)
            .and_then(|index| index.parse().ok())
            .map(Self)
    }
}

/// What a global, property or module name is bound to
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Object(ObjectHandle),
    Primitive(RemoteObject),
}

impl From<ObjectHandle> for Binding {
    fn from(handle: ObjectHandle) -> Self {
        Binding::Object(handle)
    }
}

impl From<RemoteObject> for Binding {
    fn from(value: RemoteObject) -> Self {
        Binding::Primitive(value)
    }
}

#[derive(Debug)]
struct Object {
    /// Function name for callables, class name otherwise
    name: String,
    callable: bool,
    properties: Vec<(String, Binding)>,
    prototype: Option<ObjectHandle>,
}

#[derive(Debug, Default)]
struct State {
    objects: Vec<Object>,
    globals: Vec<(String, Binding)>,
    modules: FxHashMap<String, Binding>,
    hints: FxHashMap<ObjectHandle, String>,
}

impl State {
    fn object(&self, handle: ObjectHandle) -> Option<&Object> {
        self.objects.get(handle.0)
    }

    fn global(&self, name: &str) -> Option<&Binding> {
        self.globals
            .iter()
            .find(|(global, _)| global == name)
            .map(|(_, binding)| binding)
    }

    /// Property lookup through the prototype chain
    fn property(&self, handle: ObjectHandle, name: &str) -> Option<&Binding> {
        let mut current = Some(handle);
        let mut seen = FxHashSet::default();
        while let Some(handle) = current {
            if !seen.insert(handle) {
                break;
            }
            let object = self.object(handle)?;
            if let Some((_, binding)) = object.properties.iter().find(|(key, _)| key == name) {
                return Some(binding);
            }
            current = object.prototype;
        }
        None
    }

    fn remote(&self, binding: &Binding) -> RemoteObject {
        match binding {
            Binding::Primitive(value) => value.clone(),
            Binding::Object(handle) => match self.object(*handle) {
                Some(object) if object.callable => {
                    RemoteObject::function(handle.object_id(), &object.name)
                }
                Some(object) => RemoteObject::object(handle.object_id(), object.name.clone()),
                None => RemoteObject::undefined(),
            },
        }
    }

    fn set_global(&mut self, name: &str, binding: Binding) {
        match self.globals.iter_mut().find(|(global, _)| global == name) {
            Some((_, slot)) => *slot = binding,
            None => self.globals.push((name.to_string(), binding)),
        }
    }

    fn evaluate(&self, expression: &str) -> Evaluation {
        let expression = expression.trim();
        let segments: Vec<&str> = expression.split('.').map(str::trim).collect();
        if segments.iter().any(|segment| !is_identifier(segment)) {
            return Evaluation::thrown(format!("SyntaxError: Unexpected token in '{expression}'"));
        }

        let undefined = Binding::Primitive(RemoteObject::undefined());
        let Some(mut current) = self.global(segments[0]) else {
            return Evaluation::thrown(format!("ReferenceError: {} is not defined", segments[0]));
        };

        for segment in &segments[1..] {
            current = match current {
                Binding::Object(handle) => self.property(*handle, segment).unwrap_or(&undefined),
                Binding::Primitive(value) if value.kind == super::ValueType::Undefined => {
                    return Evaluation::thrown(format!(
                        "TypeError: Cannot read properties of undefined (reading '{segment}')"
                    ));
                }
                Binding::Primitive(_) => &undefined,
            };
        }

        Evaluation::value(self.remote(current))
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first == '_' || first == '$' || first.is_alphabetic() => {
            chars.all(|ch| ch == '_' || ch == '$' || ch.is_alphanumeric())
        }
        _ => false,
    }
}

/// A [`LiveEnvironment`] that lives in this process.
///
/// Other parts of the shell may define globals while a completion request
/// is in flight; the table is behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    state: RwLock<State>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment with every shell builtin defined as a global function
    pub fn shell() -> Self {
        let environment = Self::new();
        for (name, usage) in SHELL_BUILTINS {
            let function = environment.create_function(name);
            environment.register_hint(function, usage);
            environment.define_global(name, function);
        }
        environment
    }

    pub fn create_object(&self, class_name: &str) -> ObjectHandle {
        self.insert(Object {
            name: class_name.to_string(),
            callable: false,
            properties: Vec::new(),
            prototype: None,
        })
    }

    pub fn create_function(&self, name: &str) -> ObjectHandle {
        self.insert(Object {
            name: name.to_string(),
            callable: true,
            properties: Vec::new(),
            prototype: None,
        })
    }

    fn insert(&self, object: Object) -> ObjectHandle {
        let mut state = self.state.write();
        state.objects.push(object);
        ObjectHandle(state.objects.len() - 1)
    }

    /// Sets or replaces a property on `object`
    pub fn set_property(&self, object: ObjectHandle, name: &str, value: impl Into<Binding>) {
        let value = value.into();
        let mut state = self.state.write();
        let Some(object) = state.objects.get_mut(object.0) else {
            return;
        };
        match object.properties.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => object.properties.push((name.to_string(), value)),
        }
    }

    pub fn set_prototype(&self, object: ObjectHandle, prototype: ObjectHandle) {
        if let Some(object) = self.state.write().objects.get_mut(object.0) {
            object.prototype = Some(prototype);
        }
    }

    pub fn define_global(&self, name: &str, value: impl Into<Binding>) {
        self.state.write().set_global(name, value.into());
    }

    pub fn remove_global(&self, name: &str) {
        self.state.write().globals.retain(|(global, _)| global != name);
    }

    /// Makes `specifier` loadable through [`LiveEnvironment::load_module`]
    pub fn register_module(&self, specifier: &str, exports: impl Into<Binding>) {
        self.state
            .write()
            .modules
            .insert(specifier.to_string(), exports.into());
    }

    /// Usage hint returned when `function` is the callee of a call being typed
    pub fn register_hint(&self, function: ObjectHandle, hint: &str) {
        self.state.write().hints.insert(function, hint.to_string());
    }
}

#[async_trait]
impl LiveEnvironment for MemoryEnvironment {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn evaluate(&self, expression: &str, _silent: bool) -> Result<Evaluation, EnvError> {
        Ok(self.state.read().evaluate(expression))
    }

    async fn global_names(&self) -> Result<Vec<String>, EnvError> {
        let state = self.state.read();
        Ok(state.globals.iter().map(|(name, _)| name.clone()).collect())
    }

    /// Binds the module's exports to a global named after the last path
    /// segment of `specifier`.
    async fn load_module(&self, specifier: &str) -> Result<Evaluation, EnvError> {
        let mut state = self.state.write();
        let Some(exports) = state.modules.get(specifier).cloned() else {
            return Ok(Evaluation::thrown(format!(
                "Error: Cannot find module '{specifier}'"
            )));
        };

        let name = specifier.rsplit('/').next().unwrap_or(specifier);
        trace!(specifier, name, "module loaded");
        state.set_global(name, exports.clone());
        Ok(Evaluation::value(state.remote(&exports)))
    }

    async fn properties(&self, object_id: &str) -> Result<Vec<PropertyDescriptor>, EnvError> {
        let state = self.state.read();
        let unknown = || EnvError::UnknownObject(object_id.to_string());
        let handle = ObjectHandle::parse(object_id).ok_or_else(unknown)?;
        state.object(handle).ok_or_else(unknown)?;

        let mut names = FxHashSet::default();
        let mut seen = FxHashSet::default();
        let mut descriptors = Vec::new();
        let mut current = Some(handle);
        let mut is_own = true;
        while let Some(handle) = current {
            if !seen.insert(handle) {
                break;
            }
            let Some(object) = state.object(handle) else {
                break;
            };
            for (name, binding) in &object.properties {
                if names.insert(name.as_str()) {
                    descriptors.push(PropertyDescriptor {
                        name: name.clone(),
                        value: Some(state.remote(binding)),
                        is_own,
                    });
                }
            }
            is_own = false;
            current = object.prototype;
        }
        Ok(descriptors)
    }

    async fn invoke_hint(
        &self,
        callee: &RemoteObject,
        _call_site: &CallSite,
        _line: &str,
    ) -> Result<RemoteObject, EnvError> {
        let state = self.state.read();
        let hint = callee
            .object_id
            .as_deref()
            .and_then(ObjectHandle::parse)
            .and_then(|handle| state.hints.get(&handle));
        Ok(match hint {
            Some(hint) => RemoteObject::string(hint.clone()),
            None => RemoteObject::undefined(),
        })
    }
}
