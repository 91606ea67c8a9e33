//! Trait abstraction for the vehicle link to enable testing

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::message::{MessageKind, VehicleCommand, VehicleMessage};

/// Link-level failures. Always non-fatal for workers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to send command: {0}")]
    Send(String),

    #[error("Failed to receive message: {0}")]
    Receive(String),

    #[error("Link is disconnected")]
    Disconnected,
}

/// Request/response link to the vehicle, shared by every worker.
#[async_trait]
pub trait VehicleLink: Send + Sync {
    /// Sends one command.
    async fn send_command(&self, command: VehicleCommand) -> Result<(), TransportError>;

    /// Receives the next message of `kind`.
    ///
    /// Non-blocking calls return immediately; blocking calls wait at most
    /// `timeout`. `Ok(None)` means nothing arrived.
    async fn receive_message(
        &self,
        kind: MessageKind,
        blocking: bool,
        timeout: Duration,
    ) -> Result<Option<VehicleMessage>, TransportError>;

    /// Waits up to `timeout` for the vehicle to announce itself.
    async fn wait_for_peer(&self, timeout: Duration) -> bool;

    /// Whether the vehicle is currently known to the link.
    fn is_peer_present(&self) -> bool;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    mockall::mock! {
        pub Link {}

        #[async_trait]
        impl VehicleLink for Link {
            async fn send_command(&self, command: VehicleCommand) -> Result<(), TransportError>;
            async fn receive_message(
                &self,
                kind: MessageKind,
                blocking: bool,
                timeout: Duration,
            ) -> Result<Option<VehicleMessage>, TransportError>;
            async fn wait_for_peer(&self, timeout: Duration) -> bool;
            fn is_peer_present(&self) -> bool;
        }
    }

    /// One scripted reply to a receive call.
    pub type Reply = Result<Option<VehicleMessage>, TransportError>;

    /// Link that replays per-kind scripts and records sent commands.
    ///
    /// Each receive call pops the next scripted reply for its kind; an
    /// exhausted script yields `Ok(None)`. A blocking call that yields nothing
    /// sleeps for its timeout first, like a real link would.
    #[derive(Clone, Default)]
    pub struct ScriptedLink {
        pub scripts: Arc<Mutex<HashMap<MessageKind, VecDeque<Reply>>>>,
        pub sent: Arc<Mutex<Vec<VehicleCommand>>>,
        pub receive_calls: Arc<Mutex<Vec<MessageKind>>>,
        pub send_error: Arc<Mutex<Option<TransportError>>>,
    }

    impl ScriptedLink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_reply(&self, kind: MessageKind, reply: Reply) {
            self.scripts
                .lock()
                .unwrap()
                .entry(kind)
                .or_default()
                .push_back(reply);
        }

        pub fn push_message(&self, message: VehicleMessage) {
            self.push_reply(message.kind(), Ok(Some(message)));
        }

        pub fn push_silence(&self, kind: MessageKind, times: usize) {
            for _ in 0..times {
                self.push_reply(kind, Ok(None));
            }
        }

        pub fn get_sent(&self) -> Vec<VehicleCommand> {
            self.sent.lock().unwrap().clone()
        }

        pub fn calls_for(&self, kind: MessageKind) -> usize {
            self.receive_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|k| **k == kind)
                .count()
        }

        pub fn set_send_error(&self, error: TransportError) {
            *self.send_error.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl VehicleLink for ScriptedLink {
        async fn send_command(&self, command: VehicleCommand) -> Result<(), TransportError> {
            if let Some(error) = self.send_error.lock().unwrap().clone() {
                return Err(error);
            }
            self.sent.lock().unwrap().push(command);
            Ok(())
        }

        async fn receive_message(
            &self,
            kind: MessageKind,
            blocking: bool,
            timeout: Duration,
        ) -> Result<Option<VehicleMessage>, TransportError> {
            self.receive_calls.lock().unwrap().push(kind);
            let reply = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&kind)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(None));

            if blocking && matches!(reply, Ok(None)) {
                tokio::time::sleep(timeout).await;
            }
            reply
        }

        async fn wait_for_peer(&self, _timeout: Duration) -> bool {
            true
        }

        fn is_peer_present(&self) -> bool {
            true
        }
    }
}
