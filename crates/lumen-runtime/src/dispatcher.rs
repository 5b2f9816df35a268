//! Outbound telemetry dispatch
//!
//! Each submission is tagged with a correlation id. The counter advances after
//! every submission attempt, accepted or not, and wraps on overflow.

use lumen_core::{CorrelationId, DeviceId, LumenResult};
use lumen_transport::{
    confirmation_channel, Confirmation, ConfirmationReceiver, ConfirmationSender, Message,
};
use tracing::{info, warn};

use crate::Session;

/// Receives delivery confirmations
pub trait ConfirmationHandler {
    fn on_confirmation(&mut self, id: CorrelationId, result: Confirmation);
}

/// Logs every confirmation
#[derive(Clone, Copy, Debug, Default)]
pub struct LogConfirmations;

impl ConfirmationHandler for LogConfirmations {
    fn on_confirmation(&mut self, id: CorrelationId, result: Confirmation) {
        if result.is_ok() {
            info!(correlation_id = %id, %result, "confirmation received");
        } else {
            warn!(correlation_id = %id, %result, "message not delivered");
        }
    }
}

/// Outbound dispatcher
pub struct Dispatcher {
    next_id: CorrelationId,
    sender: ConfirmationSender,
    receiver: ConfirmationReceiver,
    handler: Box<dyn ConfirmationHandler>,
}

impl Dispatcher {
    pub fn new(handler: Box<dyn ConfirmationHandler>) -> Self {
        let (sender, receiver) = confirmation_channel();
        Dispatcher {
            next_id: CorrelationId::ZERO,
            sender,
            receiver,
            handler,
        }
    }

    /// Sender handed to new connections
    pub fn confirmation_sender(&self) -> &ConfirmationSender {
        &self.sender
    }

    /// Id the next submission will carry
    pub fn next_id(&self) -> CorrelationId {
        self.next_id
    }

    /// Serialize `value` and submit it on the session's connection.
    ///
    /// The message and its payload are released before this returns,
    /// whatever the outcome.
    pub fn submit(
        &mut self,
        session: &mut Session,
        device_id: &DeviceId,
        value: i32,
    ) -> LumenResult<CorrelationId> {
        session.connection_mut().set_message_callback()?;

        let payload = session.encode(device_id, value)?;
        let message = Message::from_bytes(payload)?;

        let id = self.next_id;
        let submitted = session.connection_mut().send_event_async(&message, id);
        self.next_id = id.next();
        submitted.map(|()| id)
    }

    /// Hand queued confirmations to the handler. Returns how many there were.
    pub fn drain_confirmations(&mut self) -> usize {
        let mut count = 0;
        while let Ok(report) = self.receiver.try_recv() {
            self.handler.on_confirmation(report.id, report.result);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_transport::DeliveryReport;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recording(Rc<RefCell<Vec<(CorrelationId, Confirmation)>>>);

    impl ConfirmationHandler for Recording {
        fn on_confirmation(&mut self, id: CorrelationId, result: Confirmation) {
            self.0.borrow_mut().push((id, result));
        }
    }

    #[test]
    fn test_drain_hands_reports_to_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(Box::new(Recording(seen.clone())));
        assert_eq!(dispatcher.next_id(), CorrelationId::ZERO);
        assert_eq!(dispatcher.drain_confirmations(), 0);

        let sender = dispatcher.confirmation_sender().clone();
        sender
            .send(DeliveryReport { id: CorrelationId::new(0), result: Confirmation::Ok })
            .unwrap();
        sender
            .send(DeliveryReport { id: CorrelationId::new(1), result: Confirmation::MessageTimeout })
            .unwrap();

        assert_eq!(dispatcher.drain_confirmations(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![
                (CorrelationId::new(0), Confirmation::Ok),
                (CorrelationId::new(1), Confirmation::MessageTimeout),
            ]
        );
    }
}
