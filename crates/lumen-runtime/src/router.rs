//! Inbound command router
//!
//! Runs inside the work pump for every cloud-to-device message. Messages are
//! always accepted: a failure to extract, decode or execute a command is logged
//! and the message is still settled.

use lumen_core::{LumenError, LumenResult};
use lumen_time::TickClock;
use lumen_transport::{Disposition, InboundHandler, Message};
use lumen_wire::CommandInvocation;
use tracing::{debug, warn};

use crate::{ActionTable, AgentStats, DeviceContext, ExecuteResult, PendingRestart};

/// Copy a message body into a NUL-terminated scratch buffer and read it back
/// as text, stopping at the first NUL.
pub fn command_text(body: &[u8]) -> LumenResult<String> {
    let size = body.len() + 1;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(size)
        .map_err(|_| LumenError::BufferAllocation(size))?;
    buffer.extend_from_slice(body);
    buffer.push(0);

    let end = buffer.iter().position(|&b| b == 0).unwrap_or(body.len());
    buffer.truncate(end);
    String::from_utf8(buffer).map_err(|e| LumenError::InvalidCommand(e.to_string()))
}

/// Per-pump view of the agent state the router needs
pub struct CommandRouter<'a> {
    actions: &'a ActionTable,
    restart: &'a mut PendingRestart,
    clock: &'a dyn TickClock,
    stats: &'a mut AgentStats,
}

impl<'a> CommandRouter<'a> {
    pub fn new(
        actions: &'a ActionTable,
        restart: &'a mut PendingRestart,
        clock: &'a dyn TickClock,
        stats: &'a mut AgentStats,
    ) -> Self {
        CommandRouter {
            actions,
            restart,
            clock,
            stats,
        }
    }

    fn dispatch(&mut self, message: &Message) -> LumenResult<()> {
        let text = command_text(message.byte_array()?)?;
        let invocation = CommandInvocation::decode(&text)?;

        let mut ctx = DeviceContext {
            now: self.clock.now(),
            restart: &mut *self.restart,
            parameters: &invocation.parameters,
        };
        match self.actions.execute(&invocation.name, &mut ctx) {
            Some(ExecuteResult::Success) => {
                self.stats.commands_executed += 1;
                debug!(command = %invocation.name, "command executed");
            }
            Some(result) => {
                warn!(command = %invocation.name, %result, "execute command failed");
            }
            None => {
                debug!(command = %invocation.name, "unknown command ignored");
            }
        }
        Ok(())
    }
}

impl InboundHandler for CommandRouter<'_> {
    fn on_message(&mut self, message: Message) -> Disposition {
        self.stats.inbound_messages += 1;
        if let Err(e) = self.dispatch(&message) {
            warn!(
                len = message.len(),
                content_type = ?message.content_type(),
                error = %e,
                "inbound message not dispatched"
            );
        }
        Disposition::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Tick;
    use proptest::prelude::*;

    struct FixedClock(Tick);

    impl TickClock for FixedClock {
        fn now(&self) -> Tick {
            self.0
        }
    }

    fn route(message: Message) -> (Disposition, PendingRestart, AgentStats) {
        let actions = ActionTable::standard();
        let mut pending = PendingRestart::default();
        let mut stats = AgentStats::default();
        let clock = FixedClock(Tick::from_millis(77));

        let disposition =
            CommandRouter::new(&actions, &mut pending, &clock, &mut stats).on_message(message);
        (disposition, pending, stats)
    }

    #[test]
    fn test_command_text_stops_at_nul() {
        assert_eq!(command_text(b"ResetDevice\0garbage").unwrap(), "ResetDevice");
        assert_eq!(command_text(b"").unwrap(), "");
        assert!(matches!(
            command_text(&[0xff, 0xfe]),
            Err(LumenError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_reset_arms_with_current_tick() {
        let (disposition, pending, stats) = route(Message::from_payload(b"ResetDevice").unwrap());

        assert_eq!(disposition, Disposition::Accepted);
        assert_eq!(pending.armed_at(), Some(Tick::from_millis(77)));
        assert_eq!(stats.commands_executed, 1);
        assert_eq!(stats.inbound_messages, 1);
    }

    #[test]
    fn test_envelope_reset() {
        let (_, pending, _) =
            route(Message::from_payload(br#"{"Name":"ResetDevice","Parameters":{}}"#).unwrap());
        assert!(pending.is_armed());
    }

    #[test]
    fn test_failures_are_still_accepted() {
        for message in [
            Message::from_text("ResetDevice").unwrap(),
            Message::from_payload(b"Reboot").unwrap(),
            Message::from_payload(b"{\"Name\":").unwrap(),
            Message::from_payload(&[0xc3, 0x28]).unwrap(),
        ] {
            let (disposition, pending, stats) = route(message);
            assert_eq!(disposition, Disposition::Accepted);
            assert!(!pending.is_armed());
            assert_eq!(stats.commands_executed, 0);
        }
    }

    proptest! {
        #[test]
        fn prop_any_payload_is_accepted(body in proptest::collection::vec(any::<u8>(), 0..256)) {
            let (disposition, pending, _) = route(Message::from_payload(&body).unwrap());
            prop_assert_eq!(disposition, Disposition::Accepted);
            let armed = command_text(&body)
                .map(|text| text == "ResetDevice" || text.trim_start().starts_with('{'))
                .unwrap_or(false);
            if !armed {
                prop_assert!(!pending.is_armed());
            }
        }
    }
}
