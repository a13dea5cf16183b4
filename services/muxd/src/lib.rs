//! netmux relay
//!
//! Binds one listener and relays every framed message it receives, either
//! back to its sender or to every other connected peer.

pub mod config;

use std::net::SocketAddr;
use std::time::Duration;

use netmux_core::{ConnectionKind, Core, CoreError, Event, EventKind, Handle};
use tracing::{debug, info, warn};

pub use config::{Config, RelayMode};

/// Counters for what one [`Relay::run_once`] call handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    pub joined: usize,
    pub left: usize,
    pub relayed: usize,
}

/// One relay: a [`Core`] with a single listener.
#[derive(Debug)]
pub struct Relay {
    core: Core,
    listener: Handle,
    mode: RelayMode,
    rc4_key: Option<Vec<u8>>,
}

impl Relay {
    /// Binds the listener and installs the allow list.
    pub fn bind(config: &Config) -> Result<Self, CoreError> {
        let mut core = Core::new(config.core_config())?;
        if !config.allow.is_empty() {
            core.set_firewall(config.allow.clone());
        }
        let listener = core.new_listener(config.listen, config.header_mode)?;

        // The listener's NEW event is of no interest to the relay.
        while core.pop_event().is_some() {}

        Ok(Self {
            core,
            listener,
            mode: config.relay_mode,
            rc4_key: config.rc4_key.clone(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CoreError> {
        self.core.local_addr(self.listener)
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Processes readiness for up to `timeout`, then handles every queued event.
    pub fn run_once(&mut self, timeout: Duration) -> Result<Tick, CoreError> {
        self.core.process(timeout)?;

        let mut tick = Tick::default();
        while let Some(event) = self.core.pop_event() {
            match event.kind {
                EventKind::New => {
                    if self.on_join(&event) {
                        tick.joined += 1;
                    }
                }
                EventKind::Leave => {
                    self.on_leave(&event);
                    tick.left += 1;
                }
                EventKind::Data => tick.relayed += self.on_data(&event),
                EventKind::Estab => {}
            }
        }
        Ok(tick)
    }

    fn on_join(&mut self, event: &Event) -> bool {
        let (Some(handle), Some(listener)) = (event.handle(), event.listener()) else {
            return false;
        };
        if listener != self.listener {
            return false;
        }
        if let Some(key) = &self.rc4_key {
            let keyed = self
                .core
                .set_send_key(handle, key)
                .and_then(|()| self.core.set_recv_key(handle, key));
            if let Err(err) = keyed {
                warn!(handle = %handle, error = %err, "Failed to install RC4 key");
                if let Err(err) = self.core.close(handle, 0) {
                    warn!(handle = %handle, error = %err, "Failed to close unkeyed peer");
                }
                return false;
            }
        }
        info!(
            handle = %handle,
            peer_addr = ?event.addr(),
            "Peer joined"
        );
        true
    }

    fn on_leave(&mut self, event: &Event) {
        let info = event.leave_info();
        info!(
            handle = ?event.handle(),
            code = info.map(|i| i.code),
            os_error = info.map(|i| i.error),
            "Peer left"
        );
    }

    /// Relays one message. Returns how many copies were queued.
    fn on_data(&mut self, event: &Event) -> usize {
        let Some(sender) = event.handle() else {
            return 0;
        };
        let targets: Vec<Handle> = match self.mode {
            RelayMode::Echo => vec![sender],
            RelayMode::Broadcast => self
                .core
                .handles()
                .filter(|h| *h != sender)
                .filter(|h| matches!(self.core.kind(*h), Ok(ConnectionKind::Inbound)))
                .collect(),
        };

        let mut sent = 0;
        for target in targets {
            match self.core.send(target, &event.payload) {
                Ok(_) => sent += 1,
                Err(err) => {
                    debug!(handle = %target, error = %err, "Relay send failed");
                }
            }
        }
        sent
    }
}
