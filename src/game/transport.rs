//! Owner → authority input channel

use tokio::sync::mpsc;
use tracing::debug;

use super::input::Input;
use super::EntityId;

/// Fire-and-forget delivery of owner inputs to the authority.
///
/// No acknowledgement and no retry: a lost input is simply never applied.
pub trait InputSink {
    fn send_input(&mut self, entity_id: EntityId, input: Input);
}

/// Input as it travels to the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEnvelope {
    pub entity_id: EntityId,
    pub input: Input,
}

impl InputSink for mpsc::UnboundedSender<InputEnvelope> {
    fn send_input(&mut self, entity_id: EntityId, input: Input) {
        if self.send(InputEnvelope { entity_id, input }).is_err() {
            debug!(entity_id = %entity_id, tick = %input.tick(), "Input channel closed, dropping input");
        }
    }
}

impl InputSink for Vec<InputEnvelope> {
    fn send_input(&mut self, entity_id: EntityId, input: Input) {
        self.push(InputEnvelope { entity_id, input });
    }
}

impl<S: InputSink + ?Sized> InputSink for &mut S {
    fn send_input(&mut self, entity_id: EntityId, input: Input) {
        (**self).send_input(entity_id, input);
    }
}
