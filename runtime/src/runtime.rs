//! Embedding facade.
//!
//! A [`Runtime`] owns the native registry and execution limits, constructs a
//! fresh VM per call, and invokes the entry function.  This is the only
//! surface the surrounding collaborators (CLI, editors) use.

use tracing::debug;

use crate::bundle;
use crate::compiler;
use crate::error::Error;
use crate::interpreter::Vm;
use crate::limits::ExecutionLimits;
use crate::natives::NativeRegistry;
use crate::value::Value;

/// Entry function assumed when the embedder does not name one.
pub const DEFAULT_ENTRY: &str = "main";

#[derive(Debug)]
pub struct Runtime {
    natives: NativeRegistry,
    limits: ExecutionLimits,
}

impl Runtime {
    pub fn new(natives: NativeRegistry) -> Self {
        Self::with_limits(natives, ExecutionLimits::default())
    }

    pub fn with_limits(natives: NativeRegistry, limits: ExecutionLimits) -> Self {
        Self { natives, limits }
    }

    /// Access the registry for late registration.  Mutating it while a call
    /// is in flight is prevented by the borrow.
    pub fn natives_mut(&mut self) -> &mut NativeRegistry {
        &mut self.natives
    }

    /// Compile `source` and execute `entry` with no arguments.
    pub fn run_source(&self, source: &str, entry: &str) -> Result<Value, Error> {
        let program = compiler::compile(source)?;
        debug!(functions = program.functions.len(), entry, "running compiled source");
        let vm = Vm::with_limits(&program, &self.natives, self.limits);
        Ok(vm.call(entry, Vec::new())?)
    }

    /// Decode a bundle (verifying when `key` is supplied) and execute
    /// `entry` with no arguments.
    pub fn run_bundle(&self, bytes: &[u8], key: Option<&[u8]>, entry: &str) -> Result<Value, Error> {
        let program = bundle::read_bundle(bytes, key)?;
        debug!(functions = program.functions.len(), entry, "running bundle");
        let vm = Vm::with_limits(&program, &self.natives, self.limits);
        Ok(vm.call(entry, Vec::new())?)
    }

    /// Convenience for REPL-style input: wrap the lines in a synthetic
    /// `main` and run it.
    pub fn run_lines<I, S>(&self, lines: I) -> Result<Value, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut source = String::from("func main() {\n");
        for line in lines {
            source.push_str("    ");
            source.push_str(line.as_ref());
            source.push('\n');
        }
        source.push('}');
        self.run_source(&source, DEFAULT_ENTRY)
    }
}
