//! Host-function bridge.
//!
//! A [`NativeRegistry`] maps names to host callables with a declared arity.
//! Registration happens before any call and the registry is read-only while
//! a program runs; the bridge is the only way script code reaches the
//! outside world.  Name and arity checks happen in the interpreter before a
//! callable is invoked, so a handler may index its argument slice freely.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Failure raised by a native callable.  The interpreter wraps it, keeping
/// the message intact.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct NativeError(pub String);

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type NativeResult = Result<Value, NativeError>;

type NativeHandler = Box<dyn Fn(&[Value]) -> NativeResult + Send + Sync>;

/// A host callable exposed to scripts by name.
pub struct NativeFunction {
    name: String,
    arity: usize,
    handler: NativeHandler,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        handler: impl Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn invoke(&self, args: &[Value]) -> NativeResult {
        (self.handler)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Name-keyed registry of host callables.  Re-registering a name replaces
/// the previous entry.
#[derive(Debug, Default)]
pub struct NativeRegistry {
    entries: HashMap<String, NativeFunction>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: NativeFunction) {
        self.entries.insert(function.name.clone(), function);
    }

    /// Convenience wrapper around [`NativeFunction::new`] + [`register`].
    ///
    /// [`register`]: Self::register
    pub fn register_fn(
        &mut self,
        name: impl Into<String>,
        arity: usize,
        handler: impl Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    ) {
        self.register(NativeFunction::new(name, arity, handler));
    }

    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.entries.get(name)
    }
}
