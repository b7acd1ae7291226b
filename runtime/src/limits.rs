//! Execution limits enforced by the interpreter.
//!
//! The VM bounds total work with a gas ceiling: one unit of gas is one
//! dispatched instruction.  A limit of `N` permits exactly `N` dispatches;
//! the `(N + 1)`-th faults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default gas ceiling applied when the embedder does not provide one.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Call-site configurable execution limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub gas_limit: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl ExecutionLimits {
    pub fn with_gas_limit(gas_limit: u64) -> Self {
        Self { gas_limit }
    }
}

/// Raised when the gas ceiling is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("gas limit exceeded (limit {limit})")]
pub struct GasExhausted {
    pub limit: u64,
}

/// Stateful step counter used by the dispatch loop.
#[derive(Debug)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limit: limits.gas_limit,
            used: 0,
        }
    }

    /// Charge one instruction dispatch.
    pub fn step(&mut self) -> Result<(), GasExhausted> {
        self.used += 1;
        if self.used > self.limit {
            return Err(GasExhausted { limit: self.limit });
        }
        Ok(())
    }

    /// Instructions dispatched so far.
    pub fn used(&self) -> u64 {
        self.used
    }
}
