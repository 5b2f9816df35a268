//! Command action table
//!
//! Maps command names (exact, case-sensitive) to handlers.

use std::collections::HashMap;
use std::fmt;

use lumen_core::Tick;
use serde_json::Value;
use tracing::info;

use crate::PendingRestart;

/// Command that schedules a device restart
pub const RESET_DEVICE: &str = "ResetDevice";

/// Result of executing a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteResult {
    Success,
    Failed,
    Error,
}

impl fmt::Display for ExecuteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecuteResult::Success => "EXECUTE_COMMAND_SUCCESS",
            ExecuteResult::Failed => "EXECUTE_COMMAND_FAILED",
            ExecuteResult::Error => "EXECUTE_COMMAND_ERROR",
        };
        f.write_str(name)
    }
}

/// What a command handler may touch
pub struct DeviceContext<'a> {
    /// Tick at dispatch time
    pub now: Tick,
    pub restart: &'a mut PendingRestart,
    /// Envelope parameters, `Null` for bare commands
    pub parameters: &'a Value,
}

pub type ActionHandler = fn(&mut DeviceContext<'_>) -> ExecuteResult;

/// Command name to handler table
#[derive(Clone)]
pub struct ActionTable {
    handlers: HashMap<String, ActionHandler>,
}

impl ActionTable {
    /// Empty table
    pub fn new() -> Self {
        ActionTable {
            handlers: HashMap::new(),
        }
    }

    /// Table with the device's built-in commands
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(RESET_DEVICE, reset_device);
        table
    }

    /// Register a handler, replacing any previous one for `name`
    pub fn register(&mut self, name: impl Into<String>, handler: ActionHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn lookup(&self, name: &str) -> Option<ActionHandler> {
        self.handlers.get(name).copied()
    }

    /// Run the handler for `name`. `None` for unknown commands.
    pub fn execute(&self, name: &str, ctx: &mut DeviceContext<'_>) -> Option<ExecuteResult> {
        self.lookup(name).map(|handler| handler(ctx))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Arm the pending restart. The main loop restarts after the grace interval.
pub fn reset_device(ctx: &mut DeviceContext<'_>) -> ExecuteResult {
    ctx.restart.arm(ctx.now);
    info!(now = ?ctx.now, "device reset scheduled");
    ExecuteResult::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(table: &ActionTable, name: &str, now: Tick) -> (Option<ExecuteResult>, PendingRestart) {
        let mut pending = PendingRestart::default();
        let mut ctx = DeviceContext {
            now,
            restart: &mut pending,
            parameters: &Value::Null,
        };
        let result = table.execute(name, &mut ctx);
        (result, pending)
    }

    #[test]
    fn test_reset_device_arms_marker() {
        let (result, pending) = run(&ActionTable::standard(), "ResetDevice", Tick::from_millis(42));

        assert_eq!(result, Some(ExecuteResult::Success));
        assert_eq!(pending.armed_at(), Some(Tick::from_millis(42)));
    }

    #[test]
    fn test_names_are_exact() {
        let table = ActionTable::standard();
        for name in ["resetdevice", "ResetDevice ", "Reset", ""] {
            let (result, pending) = run(&table, name, Tick::ZERO);
            assert_eq!(result, None, "{:?}", name);
            assert!(!pending.is_armed());
        }
    }

    #[test]
    fn test_register_custom_handler() {
        fn refuse(_: &mut DeviceContext<'_>) -> ExecuteResult {
            ExecuteResult::Failed
        }

        let mut table = ActionTable::new();
        assert!(table.is_empty());
        table.register("Blink", refuse);

        let (result, _) = run(&table, "Blink", Tick::ZERO);
        assert_eq!(result, Some(ExecuteResult::Failed));
        assert_eq!(ExecuteResult::Failed.to_string(), "EXECUTE_COMMAND_FAILED");
    }
}
