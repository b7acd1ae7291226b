//! Stack-based virtual machine.
//!
//! The interpreter executes a compiled [`Program`] starting from a named
//! entry function.  All state lives in two vectors: the operand stack and
//! the frame stack.  A frame's locals live *inside* the operand stack
//! starting at `frame.base`, so `Return` must truncate back to the base
//! before handing the result to the caller.  A gas meter bounds total
//! dispatches; every fault is annotated with the source line of the active
//! frame when the chunk carries a source map.

use std::fmt;

use thiserror::Error;

use crate::bytecode::{FunctionRef, Instruction, Program};
use crate::limits::{ExecutionLimits, GasMeter};
use crate::natives::{NativeError, NativeRegistry};
use crate::value::Value;

/// Classification of runtime faults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown native '{0}'")]
    UnknownNative(String),
    #[error("arity mismatch for '{name}': expected {expected} arguments, received {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot add {lhs} and {rhs}")]
    InvalidAdd {
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("constant {index} is not a name")]
    ConstantNotAName { index: u32 },
    #[error("gas limit exceeded (limit {limit})")]
    GasExceeded { limit: u64 },
    #[error("instruction pointer out of bounds")]
    IpOutOfBounds,
    #[error("constant index {index} out of bounds")]
    InvalidConstant { index: u32 },
    #[error("function index {index} out of bounds")]
    InvalidFunction { index: u32 },
    #[error("operand stack underflow in {0}")]
    StackUnderflow(&'static str),
    #[error("native '{name}' failed: {source}")]
    NativeFailure {
        name: String,
        #[source]
        source: NativeError,
    },
}

/// A runtime fault with the best-available 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub line: Option<u32>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, line: Option<u32>) -> Self {
        Self { kind, line }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {line}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

/// Per-call activation record.  The only mutable state is `ip`.
#[derive(Debug)]
struct Frame {
    func: FunctionRef,
    ip: usize,
    base: usize,
}

/// Single-use virtual machine borrowing an immutable program and registry.
#[derive(Debug)]
pub struct Vm<'a> {
    program: &'a Program,
    natives: &'a NativeRegistry,
    limits: ExecutionLimits,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program, natives: &'a NativeRegistry) -> Self {
        Self::with_limits(program, natives, ExecutionLimits::default())
    }

    pub fn with_limits(
        program: &'a Program,
        natives: &'a NativeRegistry,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            program,
            natives,
            limits,
        }
    }

    /// Execute the named entry function with the supplied arguments.
    pub fn call(&self, entry: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let (_, func) = self.program.function_named(entry).ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::UnknownFunction(entry.to_string()), None)
        })?;
        if func.arity as usize != args.len() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch {
                    name: func.name.clone(),
                    expected: func.arity as usize,
                    actual: args.len(),
                },
                None,
            ));
        }

        let mut stack: Vec<Value> = args;
        let base = stack.len() - func.arity as usize;
        let mut frames = vec![Frame {
            func: func.clone(),
            ip: 0,
            base,
        }];
        let mut gas = GasMeter::new(self.limits);

        while !frames.is_empty() {
            if let Err(exhausted) = gas.step() {
                return Err(self.error_at(
                    RuntimeErrorKind::GasExceeded {
                        limit: exhausted.limit,
                    },
                    &frames,
                ));
            }

            let (instruction, chunk) = {
                let frame = frames.last_mut().expect("frame stack checked above");
                let Some(chunk) = self.program.chunks.get(frame.func.chunk_index as usize) else {
                    return Err(self.error_at(RuntimeErrorKind::IpOutOfBounds, &frames));
                };
                if frame.ip >= chunk.code.len() {
                    return Err(self.error_at(RuntimeErrorKind::IpOutOfBounds, &frames));
                }
                let instruction = chunk.code[frame.ip];
                frame.ip += 1;
                (instruction, chunk)
            };

            match instruction {
                Instruction::PushConst(ix) => {
                    let Some(constant) = chunk.constants.get(ix as usize) else {
                        return Err(
                            self.error_at(RuntimeErrorKind::InvalidConstant { index: ix }, &frames)
                        );
                    };
                    stack.push(constant.to_value());
                }
                Instruction::LoadLocal(slot) => {
                    let frame = frames.last().expect("frame stack checked above");
                    let value = stack
                        .get(frame.base + slot as usize)
                        .cloned()
                        .unwrap_or(Value::Null);
                    stack.push(value);
                }
                Instruction::StoreLocal(slot) => {
                    let Some(value) = stack.pop() else {
                        return Err(self.error_at(
                            RuntimeErrorKind::StackUnderflow("StoreLocal"),
                            &frames,
                        ));
                    };
                    let frame = frames.last().expect("frame stack checked above");
                    let index = frame.base + slot as usize;
                    if stack.len() <= index {
                        stack.resize(index + 1, Value::Null);
                    }
                    stack[index] = value;
                }
                Instruction::Pop => {
                    if stack.pop().is_none() {
                        return Err(
                            self.error_at(RuntimeErrorKind::StackUnderflow("Pop"), &frames)
                        );
                    }
                }
                Instruction::Add => {
                    let (rhs, lhs) = match (stack.pop(), stack.pop()) {
                        (Some(rhs), Some(lhs)) => (rhs, lhs),
                        _ => {
                            return Err(
                                self.error_at(RuntimeErrorKind::StackUnderflow("Add"), &frames)
                            )
                        }
                    };
                    let result =
                        add_values(lhs, rhs).map_err(|kind| self.error_at(kind, &frames))?;
                    stack.push(result);
                }
                Instruction::Eq => {
                    let (rhs, lhs) = match (stack.pop(), stack.pop()) {
                        (Some(rhs), Some(lhs)) => (rhs, lhs),
                        _ => {
                            return Err(
                                self.error_at(RuntimeErrorKind::StackUnderflow("Eq"), &frames)
                            )
                        }
                    };
                    stack.push(Value::Bool(lhs == rhs));
                }
                Instruction::Jump(offset) => {
                    self.apply_jump(&mut frames, offset)?;
                }
                Instruction::JumpIfFalse(offset) => {
                    let Some(condition) = stack.pop() else {
                        return Err(self.error_at(
                            RuntimeErrorKind::StackUnderflow("JumpIfFalse"),
                            &frames,
                        ));
                    };
                    if !condition.is_truthy() {
                        self.apply_jump(&mut frames, offset)?;
                    }
                }
                Instruction::CallNative(name_ix, argc) => {
                    let Some(constant) = chunk.constants.get(name_ix as usize) else {
                        return Err(self.error_at(
                            RuntimeErrorKind::InvalidConstant { index: name_ix },
                            &frames,
                        ));
                    };
                    let Some(name) = constant.as_name() else {
                        return Err(self.error_at(
                            RuntimeErrorKind::ConstantNotAName { index: name_ix },
                            &frames,
                        ));
                    };
                    let argc = argc as usize;
                    if stack.len() < argc {
                        return Err(self.error_at(
                            RuntimeErrorKind::StackUnderflow("CallNative"),
                            &frames,
                        ));
                    }
                    // Oldest argument first, matching source evaluation order.
                    let call_args = stack.split_off(stack.len() - argc);
                    let Some(native) = self.natives.get(name) else {
                        return Err(self.error_at(
                            RuntimeErrorKind::UnknownNative(name.to_string()),
                            &frames,
                        ));
                    };
                    if native.arity() != argc {
                        return Err(self.error_at(
                            RuntimeErrorKind::ArityMismatch {
                                name: name.to_string(),
                                expected: native.arity(),
                                actual: argc,
                            },
                            &frames,
                        ));
                    }
                    let result = native.invoke(&call_args).map_err(|source| {
                        self.error_at(
                            RuntimeErrorKind::NativeFailure {
                                name: name.to_string(),
                                source,
                            },
                            &frames,
                        )
                    })?;
                    stack.push(result);
                }
                Instruction::CallFunc(func_ix, argc) => {
                    let Some(func) = self.program.functions.get(func_ix as usize) else {
                        return Err(self.error_at(
                            RuntimeErrorKind::InvalidFunction { index: func_ix },
                            &frames,
                        ));
                    };
                    if func.arity != argc {
                        return Err(self.error_at(
                            RuntimeErrorKind::ArityMismatch {
                                name: func.name.clone(),
                                expected: func.arity as usize,
                                actual: argc as usize,
                            },
                            &frames,
                        ));
                    }
                    if stack.len() < argc as usize {
                        return Err(
                            self.error_at(RuntimeErrorKind::StackUnderflow("CallFunc"), &frames)
                        );
                    }
                    // Arguments stay on the stack as the callee's first locals.
                    let base = stack.len() - argc as usize;
                    stack.reserve(func.locals as usize);
                    frames.push(Frame {
                        func: func.clone(),
                        ip: 0,
                        base,
                    });
                }
                Instruction::Return => {
                    let result = stack.pop().unwrap_or(Value::Null);
                    let frame = frames.pop().expect("frame stack checked above");
                    stack.truncate(frame.base);
                    if frames.is_empty() {
                        return Ok(result);
                    }
                    stack.push(result);
                }
                Instruction::Nop => {}
            }
        }

        Ok(Value::Null)
    }

    fn apply_jump(&self, frames: &mut [Frame], offset: i32) -> Result<(), RuntimeError> {
        let frame = frames.last_mut().expect("frame stack checked above");
        let target = frame.ip as i64 + offset as i64;
        if target < 0 {
            let kind = RuntimeErrorKind::IpOutOfBounds;
            let error = self.error_at(kind, frames);
            return Err(error);
        }
        frames.last_mut().expect("frame stack checked above").ip = target as usize;
        Ok(())
    }

    /// Annotate a fault with the source line of the active frame: the line
    /// recorded for the most recently fetched instruction.
    fn error_at(&self, kind: RuntimeErrorKind, frames: &[Frame]) -> RuntimeError {
        let line = frames.last().and_then(|frame| {
            let chunk = self.program.chunks.get(frame.func.chunk_index as usize)?;
            if chunk.debug_lines.is_empty() {
                return None;
            }
            let index = frame.ip.saturating_sub(1).min(chunk.debug_lines.len() - 1);
            Some(chunk.debug_lines[index])
        });
        RuntimeError::new(kind, line)
    }
}

/// Addition over the value universe: numeric pairs add (any `Double` operand
/// promotes), a `String` on either side concatenates with the other side
/// stringified, everything else is a fault.
fn add_values(lhs: Value, rhs: Value) -> Result<Value, RuntimeErrorKind> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (Value::Int(a), Value::Double(b)) => Ok(Value::Double(a as f64 + b)),
        (Value::Double(a), Value::Int(b)) => Ok(Value::Double(a + b as f64)),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
        (lhs @ (Value::Int(_) | Value::Double(_)), Value::String(b)) => {
            Ok(Value::String(format!("{}{b}", lhs.as_string())))
        }
        (Value::String(a), rhs) => Ok(Value::String(format!("{a}{}", rhs.as_string()))),
        (lhs, rhs) => Err(RuntimeErrorKind::InvalidAdd {
            lhs: lhs.kind(),
            rhs: rhs.kind(),
        }),
    }
}
