/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! In-memory MIDI backend. Output ports record what was sent, and
//! [LoopbackBackend::deliver] plays the part of the device answering.

use super::{MessageHandler, MidiBackend, MidiInput, MidiOutput, PortId, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct InputSlot {
    open: bool,
    listening: bool,
    handler: Option<MessageHandler>,
    /// Bumped on every start/stop, so a handler that was taken out for a
    /// delivery isn't put back after it was replaced or stopped.
    generation: u64,
}

#[derive(Default)]
struct Shared {
    port_count: usize,
    inputs: HashMap<PortId, InputSlot>,
    sent: Vec<(PortId, Vec<u8>)>,
    fail_sends: bool,
}

#[derive(Clone)]
pub struct LoopbackBackend {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackBackend {
    /// A backend with ports `0..port_count`, both directions.
    pub fn new(port_count: usize) -> LoopbackBackend {
        LoopbackBackend {
            shared: Arc::new(Mutex::new(Shared {
                port_count,
                ..Default::default()
            })),
        }
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<(PortId, Vec<u8>)> {
        self.shared.lock().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<(PortId, Vec<u8>)> {
        std::mem::take(&mut self.shared.lock().sent)
    }

    /// Makes every send fail from now on, as if the device was unplugged.
    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.lock().fail_sends = fail;
    }

    pub fn is_listening(&self, port: PortId) -> bool {
        self.shared
            .lock()
            .inputs
            .get(&port)
            .is_some_and(|slot| slot.listening)
    }

    /// Hands `message` to the handler started on input `port`, on the calling
    /// thread. Returns whether anything was listening.
    pub fn deliver(&self, port: PortId, message: &[u8]) -> bool {
        let (mut handler, generation) = {
            let mut shared = self.shared.lock();
            let Some(slot) = shared.inputs.get_mut(&port) else {
                return false;
            };
            if !slot.listening {
                return false;
            }
            // None here means we're inside the handler already.
            let Some(handler) = slot.handler.take() else {
                return false;
            };
            (handler, slot.generation)
        };

        // The handler may well call stop(), so no lock can be held here.
        handler(message);

        let mut shared = self.shared.lock();
        if let Some(slot) = shared.inputs.get_mut(&port) {
            if slot.listening && slot.generation == generation {
                slot.handler = Some(handler);
            }
        }
        true
    }

    fn check_port(&self, port: PortId) -> Result<(), TransportError> {
        if port < self.shared.lock().port_count {
            Ok(())
        } else {
            Err(TransportError::NoSuchPort(port))
        }
    }
}

impl MidiBackend for LoopbackBackend {
    fn open_input(&self, port: PortId) -> Result<Box<dyn MidiInput>, TransportError> {
        self.check_port(port)?;
        let mut shared = self.shared.lock();
        let slot = shared.inputs.entry(port).or_default();
        if slot.open {
            return Err(TransportError::PortBusy(port));
        }
        slot.open = true;
        Ok(Box::new(LoopbackInput {
            shared: self.shared.clone(),
            port,
        }))
    }

    fn open_output(&self, port: PortId) -> Result<Box<dyn MidiOutput>, TransportError> {
        self.check_port(port)?;
        Ok(Box::new(LoopbackOutput {
            shared: self.shared.clone(),
            port,
        }))
    }
}

struct LoopbackInput {
    shared: Arc<Mutex<Shared>>,
    port: PortId,
}

impl MidiInput for LoopbackInput {
    fn start(&mut self, handler: MessageHandler) -> Result<(), TransportError> {
        let mut shared = self.shared.lock();
        let slot = shared.inputs.entry(self.port).or_default();
        slot.generation += 1;
        slot.handler = Some(handler);
        slot.listening = true;
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the handler runs its destructors, so not under the lock.
        let handler = {
            let mut shared = self.shared.lock();
            let slot = shared.inputs.entry(self.port).or_default();
            slot.generation += 1;
            slot.listening = false;
            slot.handler.take()
        };
        drop(handler);
    }
}

impl Drop for LoopbackInput {
    fn drop(&mut self) {
        self.stop();
        if let Some(slot) = self.shared.lock().inputs.get_mut(&self.port) {
            slot.open = false;
        }
    }
}

struct LoopbackOutput {
    shared: Arc<Mutex<Shared>>,
    port: PortId,
}

impl MidiOutput for LoopbackOutput {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let mut shared = self.shared.lock();
        if shared.fail_sends {
            return Err(TransportError::SendFailed {
                port: self.port,
                reason: "loopback set to fail".to_owned(),
            });
        }
        shared.sent.push((self.port, message.to_vec()));
        Ok(())
    }
}
