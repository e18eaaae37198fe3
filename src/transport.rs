/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! The boundary between the transfer logic and whatever actually moves MIDI
//! bytes around (an OS MIDI API, a test harness, ...).
//!
//! Ports are identified by index. Messages are always complete SysExes, from
//! `F0h` to `F7h`; splitting a byte stream into messages is the backend's job.

pub mod loopback;

use thiserror::Error;

pub type PortId = usize;

/// Called by an input port with each message it receives, on whichever thread
/// the backend delivers on.
pub type MessageHandler = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("there is no MIDI port {0}")]
    NoSuchPort(PortId),
    #[error("MIDI port {0} is already in use")]
    PortBusy(PortId),
    #[error("couldn't send to MIDI port {port}: {reason}")]
    SendFailed { port: PortId, reason: String },
}

pub trait MidiInput: Send {
    /// Starts delivering messages to `handler`.
    fn start(&mut self, handler: MessageHandler) -> Result<(), TransportError>;

    /// Stops delivering messages and drops the handler. Must be safe to call
    /// more than once, and from inside the handler itself.
    fn stop(&mut self);
}

pub trait MidiOutput: Send {
    /// Queues one complete message. Doesn't wait for the device.
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError>;
}

pub trait MidiBackend: Send + Sync {
    /// Opens an input port. It is closed when the returned value is dropped.
    fn open_input(&self, port: PortId) -> Result<Box<dyn MidiInput>, TransportError>;

    /// Opens an output port. It is closed when the returned value is dropped.
    fn open_output(&self, port: PortId) -> Result<Box<dyn MidiOutput>, TransportError>;
}
