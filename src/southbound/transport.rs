//! Southbound transport
//!
//! The controller never speaks the switch wire protocol itself. It hands shaped
//! [`SouthboundCommand`]s to a [`SouthboundTransport`], which is responsible for getting
//! them onto the right switch connection.
//!
//! [`ChannelTransport`] is the in-process implementation: every connected switch session
//! registers a bounded command queue and drains its receiving half. Sends use `try_send`,
//! so issuing a command never waits on a switch.

use super::types::{SouthboundCommand, SwitchId};
use crate::error_handling::types::SouthboundError;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

pub trait SouthboundTransport: Send + Sync {
    /// Queues `command` for `switch` without waiting for acknowledgment.
    fn send(&self, switch: SwitchId, command: SouthboundCommand) -> Result<(), SouthboundError>;
}

#[derive(Default)]
pub struct ChannelTransport {
    sessions: RwLock<HashMap<SwitchId, Sender<SouthboundCommand>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the command queue of `switch`'s session. Re-attaching a known switch
    /// replaces its previous queue.
    pub fn attach_sender(&self, switch: SwitchId, sender: Sender<SouthboundCommand>) {
        match self.sessions.write() {
            Ok(mut sessions) => {
                if sessions.insert(switch, sender).is_some() {
                    debug!("Replaced command queue of switch {}", switch);
                }
            }
            Err(e) => warn!("Transport session table poisoned: {}", e),
        }
    }

    pub fn detach(&self, switch: SwitchId) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&switch);
        }
    }
}

impl SouthboundTransport for ChannelTransport {
    fn send(&self, switch: SwitchId, command: SouthboundCommand) -> Result<(), SouthboundError> {
        let sender = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| SouthboundError::SouthboundUnavailable(switch))?;
            match sessions.get(&switch) {
                Some(s) => s.clone(),
                None => return Err(SouthboundError::UnknownSwitch(switch)),
            }
        };

        let kind = command.kind();
        match sender.try_send(command) {
            Ok(()) => {
                debug!("Queued {} for switch {}", kind, switch);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!("Command queue of switch {} is full, {} dropped", switch, kind);
                Err(SouthboundError::SouthboundUnavailable(switch))
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Session of switch {} is closed, {} dropped", switch, kind);
                Err(SouthboundError::SouthboundUnavailable(switch))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_transports {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every command and fails sends to switches marked as down.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<(SwitchId, SouthboundCommand)>>,
        down: Mutex<HashSet<SwitchId>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_switch(&self, switch: SwitchId) {
            self.down.lock().unwrap().insert(switch);
        }

        pub fn sent(&self) -> Vec<(SwitchId, SouthboundCommand)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, switch: SwitchId) -> Vec<SouthboundCommand> {
            self.sent()
                .into_iter()
                .filter(|(s, _)| *s == switch)
                .map(|(_, c)| c)
                .collect()
        }
    }

    impl SouthboundTransport for RecordingTransport {
        fn send(&self, switch: SwitchId, command: SouthboundCommand) -> Result<(), SouthboundError> {
            if self.down.lock().unwrap().contains(&switch) {
                return Err(SouthboundError::SouthboundUnavailable(switch));
            }
            self.sent.lock().unwrap().push((switch, command));
            Ok(())
        }
    }
}
