/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! Reading patches from and dumping patches to the device.
//!
//! Dumping is simple: one DT1 per component, sent and forgotten. Reading is a
//! small state machine. [PatchManager::read] sends one RQ1 per component and
//! returns straight away. The device answers each with a DT1, which arrives on
//! the input port's thread. Once every component is in, the patch is
//! assembled and handed to the listener. If they don't all arrive before the
//! deadline, the listener is told the read timed out instead.
//!
//! ```text
//! Idle --read()--> AwaitingComponents --all received--> Completed
//!                          |----------deadline---------> TimedOut
//!                          |----bad message-----------> Failed
//!                          '----cancel_read()---------> Idle
//! ```
//!
//! Every way out of `AwaitingComponents` stops the input port and disarms the
//! deadline, and the listener hears about each read exactly once (never for
//! a cancelled one). The session stays in `AwaitingComponents` while the last
//! component's patch is being assembled, so [PatchManager::state] only reports
//! an outcome once it is known. Cancelling in that window
//! still works and discards the patch.

pub mod kinds;

use crate::patch::{Patch, PatchError};
use crate::sysex::roland::{
    build_data_message, build_request_message, validate_and_unwrap, Address, DeviceId,
    FramingError, DEFAULT_DEVICE_ID,
};
use crate::transport::{MidiBackend, MidiInput, PortId, TransportError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// How long a read waits for all of its components.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Device ID written into outgoing messages.
    pub device_id: DeviceId,
    /// Deadline for a whole read, not for each component.
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            device_id: DEFAULT_DEVICE_ID,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("bad message from device: {0}")]
    Framing(#[from] FramingError),
    #[error("device sent data for {address}, which isn't part of this patch")]
    UnknownComponent { address: Address },
    #[error("{component} dump should be {expected} bytes, got {actual}")]
    SizeMismatch {
        component: String,
        expected: usize,
        actual: usize,
    },
    #[error("device sent {0} twice")]
    DuplicateComponent(String),
    #[error("couldn't assemble patch: {0}")]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("a read is already in progress")]
    AlreadyReading,
    #[error("couldn't start the read deadline: {0}")]
    Timer(#[from] std::io::Error),
}

/// What the listener is told when a read ends.
#[derive(Debug)]
pub enum TransferEvent<P> {
    DumpReceived(P),
    TimedOut,
    Failed(TransferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingComponents,
    Completed,
    TimedOut,
    Failed,
}

/// Describes one kind of patch as the device stores it: which independently
/// addressed components it has and how to put them back together.
pub trait DumpKind: 'static {
    type Component: Copy + Eq + Hash + Debug + Send + 'static;
    type Patch: Patch;

    /// For log messages.
    const NAME: &'static str;

    /// Every component, in the order they are requested and dumped.
    fn components() -> &'static [Self::Component];
    fn address(component: Self::Component) -> Address;
    /// Payload length of one component's DT1.
    fn length(component: Self::Component) -> usize;
    /// Which component a received DT1 is for, going by its address.
    fn identify(address: &Address) -> Option<Self::Component>;
    fn component_bytes(patch: &Self::Patch, component: Self::Component) -> Vec<u8>;
    /// Builds a patch from one payload per component. Only called once all of
    /// them are present and the right length.
    fn assemble(payloads: &HashMap<Self::Component, Vec<u8>>) -> Result<Self::Patch, PatchError>;
}

/// Fires a callback after a timeout unless dropped first.
struct Deadline {
    _disarm: mpsc::Sender<()>,
}

impl Deadline {
    fn arm(
        name: String,
        timeout: Duration,
        on_expiry: impl FnOnce() + Send + 'static,
    ) -> std::io::Result<Deadline> {
        let (disarm, disarmed) = mpsc::channel::<()>();
        thread::Builder::new().name(name).spawn(move || {
            // Disconnected means the Deadline was dropped.
            if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(timeout) {
                on_expiry();
            }
        })?;
        Ok(Deadline { _disarm: disarm })
    }
}

/// The resources held for the duration of one read.
struct ActiveRead {
    input: Box<dyn MidiInput>,
    deadline: Option<Deadline>,
}

impl Drop for ActiveRead {
    fn drop(&mut self) {
        self.input.stop();
        self.deadline.take();
    }
}

/// Marks a read Failed if assembling its patch panics.
struct Assembling<'a, K: DumpKind> {
    inner: &'a Inner<K>,
    generation: u64,
}

impl<K: DumpKind> Drop for Assembling<'_, K> {
    fn drop(&mut self) {
        let mut session = self.inner.session.lock();
        if session.generation == self.generation
            && session.state == SessionState::AwaitingComponents
        {
            session.state = SessionState::Failed;
        }
    }
}

struct Session<C> {
    state: SessionState,
    /// Identifies the current read. Callbacks from older reads see a different
    /// number and do nothing.
    generation: u64,
    received: HashMap<C, Vec<u8>>,
    active: Option<ActiveRead>,
}

type Listener<P> = Box<dyn FnMut(TransferEvent<P>) + Send>;

struct Inner<K: DumpKind> {
    backend: Arc<dyn MidiBackend>,
    settings: Settings,
    session: Mutex<Session<K::Component>>,
    listener: Mutex<Option<Listener<K::Patch>>>,
}

/// Reads and dumps patches of kind `K`. One read at a time.
pub struct PatchManager<K: DumpKind> {
    inner: Arc<Inner<K>>,
}

impl<K: DumpKind> PatchManager<K> {
    pub fn new(backend: Arc<dyn MidiBackend>) -> PatchManager<K> {
        Self::with_settings(backend, Settings::default())
    }

    pub fn with_settings(backend: Arc<dyn MidiBackend>, settings: Settings) -> PatchManager<K> {
        PatchManager {
            inner: Arc::new(Inner {
                backend,
                settings,
                session: Mutex::new(Session {
                    state: SessionState::Idle,
                    generation: 0,
                    received: HashMap::new(),
                    active: None,
                }),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Sets the function told about the end of each read. It is called on the
    /// input port's or the deadline's thread, and must not call
    /// [PatchManager::set_listener] itself.
    pub fn set_listener(&self, listener: impl FnMut(TransferEvent<K::Patch>) + Send + 'static) {
        *self.inner.listener.lock() = Some(Box::new(listener));
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.lock().state
    }

    /// Starts reading a patch from the device. Requests go out on
    /// `output_port` and the answers are expected on `input_port`.
    pub fn read(&self, input_port: PortId, output_port: PortId) -> Result<(), TransferError> {
        let generation = {
            let mut session = self.inner.session.lock();
            if session.state == SessionState::AwaitingComponents {
                return Err(TransferError::AlreadyReading);
            }
            session.generation += 1;
            session.state = SessionState::AwaitingComponents;
            session.received.clear();
            session.generation
        };

        log::info!(
            "Reading {} (ports {} -> {})",
            K::NAME,
            output_port,
            input_port
        );

        let active = match self.start_read(generation, input_port, output_port) {
            Ok(active) => active,
            Err(err) => {
                log::error!("Couldn't start reading {}: {}", K::NAME, err);
                let mut session = self.inner.session.lock();
                if session.generation == generation {
                    session.state = SessionState::Failed;
                    session.received.clear();
                }
                return Err(err);
            }
        };

        // An answer (or the deadline) may have beaten us here, in which case
        // the read is already over and `active` is released on return.
        let stale = {
            let mut session = self.inner.session.lock();
            if session.generation == generation
                && session.state == SessionState::AwaitingComponents
            {
                session.active = Some(active);
                None
            } else {
                Some(active)
            }
        };
        drop(stale);
        Ok(())
    }

    fn start_read(
        &self,
        generation: u64,
        input_port: PortId,
        output_port: PortId,
    ) -> Result<ActiveRead, TransferError> {
        let mut input = self.inner.backend.open_input(input_port)?;
        let weak = Arc::downgrade(&self.inner);
        input.start(Box::new(move |message: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                Inner::on_message(&inner, generation, message);
            }
        }))?;
        // From here on, dropping `active` releases the input port.
        let mut active = ActiveRead {
            input,
            deadline: None,
        };

        let mut output = self.inner.backend.open_output(output_port)?;
        for &component in K::components() {
            let address = K::address(component);
            log::debug!("Requesting {:?} at {}", component, address);
            output.send(&build_request_message(
                self.inner.settings.device_id,
                &address,
                K::length(component),
            ))?;
        }
        drop(output);

        let weak: Weak<Inner<K>> = Arc::downgrade(&self.inner);
        active.deadline = Some(Deadline::arm(
            format!("{} read deadline", K::NAME),
            self.inner.settings.timeout,
            move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::on_timeout(&inner, generation);
                }
            },
        )?);
        Ok(active)
    }

    /// Abandons the current read, if any. The listener isn't told.
    pub fn cancel_read(&self) {
        let active = {
            let mut session = self.inner.session.lock();
            if session.state != SessionState::AwaitingComponents {
                return;
            }
            session.generation += 1;
            session.state = SessionState::Idle;
            session.received.clear();
            session.active.take()
        };
        log::info!("Cancelled reading {}", K::NAME);
        drop(active);
    }

    /// Sends `patch` to the device, one DT1 per component. Doesn't wait for
    /// anything.
    pub fn dump(&self, patch: &K::Patch, output_port: PortId) -> Result<(), TransferError> {
        let mut output = self.inner.backend.open_output(output_port)?;
        for &component in K::components() {
            self.send_component(&mut *output, patch, component)?;
        }
        log::info!("Dumped {} to port {}", K::NAME, output_port);
        Ok(())
    }

    /// Sends one component of `patch` to the device.
    pub fn dump_component(
        &self,
        patch: &K::Patch,
        component: K::Component,
        output_port: PortId,
    ) -> Result<(), TransferError> {
        let mut output = self.inner.backend.open_output(output_port)?;
        self.send_component(&mut *output, patch, component)
    }

    fn send_component(
        &self,
        output: &mut dyn crate::transport::MidiOutput,
        patch: &K::Patch,
        component: K::Component,
    ) -> Result<(), TransferError> {
        let address = K::address(component);
        let payload = K::component_bytes(patch, component);
        log::debug!(
            "Sending {:?} ({} bytes) to {}",
            component,
            payload.len(),
            address
        );
        output.send(&build_data_message(
            self.inner.settings.device_id,
            &address,
            &payload,
        ))?;
        Ok(())
    }
}

impl<K: DumpKind> Inner<K> {
    fn emit(&self, event: TransferEvent<K::Patch>) {
        match self.listener.lock().as_mut() {
            Some(listener) => listener(event),
            None => log::warn!("{} read ended with nobody listening", K::NAME),
        }
    }

    /// Stores one received component. Returns whether that was the last one.
    fn accept(
        session: &mut Session<K::Component>,
        message: &[u8],
    ) -> Result<bool, TransferError> {
        let (address, payload) = validate_and_unwrap(message)?;
        let component =
            K::identify(&address).ok_or(TransferError::UnknownComponent { address })?;
        let expected = K::length(component);
        if payload.len() != expected {
            return Err(TransferError::SizeMismatch {
                component: format!("{:?}", component),
                expected,
                actual: payload.len(),
            });
        }
        if session.received.contains_key(&component) {
            return Err(TransferError::DuplicateComponent(format!("{:?}", component)));
        }
        log::debug!("Received {:?} ({} bytes)", component, payload.len());
        session.received.insert(component, payload.to_vec());
        Ok(session.received.len() == K::components().len())
    }

    fn on_message(inner: &Arc<Inner<K>>, generation: u64, message: &[u8]) {
        let (finished, received, active) = {
            let mut session = inner.session.lock();
            if session.generation != generation
                || session.state != SessionState::AwaitingComponents
            {
                return;
            }
            match Self::accept(&mut session, message) {
                Ok(false) => return,
                Ok(true) => {
                    // Still AwaitingComponents until assembled, but under a
                    // new generation so this read's callbacks are now stale.
                    session.generation += 1;
                    (
                        session.generation,
                        std::mem::take(&mut session.received),
                        session.active.take(),
                    )
                }
                Err(err) => {
                    session.state = SessionState::Failed;
                    session.received.clear();
                    let active = session.active.take();
                    drop(session);
                    drop(active);
                    log::error!("Reading {} failed: {}", K::NAME, err);
                    inner.emit(TransferEvent::Failed(err));
                    return;
                }
            }
        };
        drop(active);

        let assembling = Assembling {
            inner,
            generation: finished,
        };
        let result = K::assemble(&received);
        let current = {
            let mut session = inner.session.lock();
            let current = session.generation == finished;
            if current {
                session.state = if result.is_ok() {
                    SessionState::Completed
                } else {
                    SessionState::Failed
                };
            }
            current
        };
        drop(assembling);
        if !current {
            log::info!("Dropped {}: read was cancelled during assembly", K::NAME);
            return;
        }

        let event = match result {
            Ok(patch) => {
                log::info!("Received {}", K::NAME);
                TransferEvent::DumpReceived(patch)
            }
            Err(err) => {
                log::error!("Couldn't assemble {}: {}", K::NAME, err);
                TransferEvent::Failed(err.into())
            }
        };
        inner.emit(event);
    }

    fn on_timeout(inner: &Arc<Inner<K>>, generation: u64) {
        let active = {
            let mut session = inner.session.lock();
            if session.generation != generation
                || session.state != SessionState::AwaitingComponents
            {
                return;
            }
            session.state = SessionState::TimedOut;
            log::warn!(
                "Reading {} timed out with {} of {} components",
                K::NAME,
                session.received.len(),
                K::components().len()
            );
            session.received.clear();
            session.active.take()
        };
        drop(active);
        inner.emit(TransferEvent::TimedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::kinds::{AnalogTone, ProgramEffects, VocalEffect};
    use super::*;
    use crate::patch::analog::AnalogPatch;
    use crate::patch::effects::{EffectSlot, EffectsPatch};
    use crate::patch::vocal_effect::VocalEffectPatch;
    use crate::sysex::roland::maps;
    use crate::transport::loopback::LoopbackBackend;
    use std::sync::mpsc::Receiver;

    const INPUT: PortId = 0;
    const OUTPUT: PortId = 1;
    const WAIT: Duration = Duration::from_secs(5);

    fn harness<K: DumpKind>(
        timeout: Duration,
    ) -> (
        PatchManager<K>,
        LoopbackBackend,
        Receiver<TransferEvent<K::Patch>>,
    ) {
        let backend = LoopbackBackend::new(2);
        let manager = PatchManager::with_settings(
            Arc::new(backend.clone()),
            Settings {
                timeout,
                ..Default::default()
            },
        );
        let (tx, rx) = mpsc::channel();
        manager.set_listener(move |event| {
            let _ = tx.send(event);
        });
        (manager, backend, rx)
    }

    fn effect_response(patch: &EffectsPatch, slot: EffectSlot) -> Vec<u8> {
        build_data_message(
            0x10,
            &ProgramEffects::address(slot),
            &patch.component_bytes(slot),
        )
    }

    fn interesting_effects() -> EffectsPatch {
        let mut patch = EffectsPatch::new();
        patch.effect1_mut().basic_mut().set_level(1).unwrap();
        patch
            .effect2_mut()
            .parameters_mut()
            .set_parameter(31, -20000)
            .unwrap();
        patch.delay_mut().basic_mut().set_reverb_send(77).unwrap();
        patch.reverb_mut().basic_mut().set_level(5).unwrap();
        patch
    }

    #[test]
    fn test_effects_read_sends_four_requests() {
        let (manager, backend, _rx) = harness::<ProgramEffects>(WAIT);
        manager.read(INPUT, OUTPUT).unwrap();
        assert_eq!(manager.state(), SessionState::AwaitingComponents);
        assert!(backend.is_listening(INPUT));

        let sent = backend.take_sent();
        assert_eq!(sent.len(), 4);
        let expected = [
            ([0x18, 0x00, 0x02, 0x00], [0x00, 0x00, 0x01, 0x11]),
            ([0x18, 0x00, 0x04, 0x00], [0x00, 0x00, 0x01, 0x11]),
            ([0x18, 0x00, 0x06, 0x00], [0x00, 0x00, 0x00, 0x64]),
            ([0x18, 0x00, 0x08, 0x00], [0x00, 0x00, 0x00, 0x63]),
        ];
        for ((port, message), (address, size)) in sent.iter().zip(expected) {
            assert_eq!(*port, OUTPUT);
            assert_eq!(message.len(), 18);
            assert_eq!(message[7], 0x11);
            assert_eq!(&message[8..12], address);
            assert_eq!(&message[12..16], size);
        }
        manager.cancel_read();
    }

    #[test]
    fn test_effects_read_completes_only_on_fourth() {
        let (manager, backend, rx) = harness::<ProgramEffects>(WAIT);
        let source = interesting_effects();
        manager.read(INPUT, OUTPUT).unwrap();

        // Any order will do.
        for slot in [EffectSlot::Reverb, EffectSlot::Effect1, EffectSlot::Delay] {
            assert!(backend.deliver(INPUT, &effect_response(&source, slot)));
            assert!(rx.try_recv().is_err());
            assert_eq!(manager.state(), SessionState::AwaitingComponents);
        }
        assert!(backend.deliver(INPUT, &effect_response(&source, EffectSlot::Effect2)));

        match rx.recv_timeout(WAIT) {
            Ok(TransferEvent::DumpReceived(patch)) => assert_eq!(patch, source),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(manager.state(), SessionState::Completed);
        assert!(!backend.is_listening(INPUT));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_timeout_after_three_components() {
        let (manager, backend, rx) = harness::<ProgramEffects>(Duration::from_millis(100));
        let source = interesting_effects();
        manager.read(INPUT, OUTPUT).unwrap();
        for slot in [EffectSlot::Effect1, EffectSlot::Effect2, EffectSlot::Delay] {
            backend.deliver(INPUT, &effect_response(&source, slot));
        }

        assert!(matches!(rx.recv_timeout(WAIT), Ok(TransferEvent::TimedOut)));
        assert_eq!(manager.state(), SessionState::TimedOut);
        assert!(!backend.is_listening(INPUT));

        // Too late.
        assert!(!backend.deliver(INPUT, &effect_response(&source, EffectSlot::Reverb)));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn test_wrong_size_fails_read() {
        let (manager, backend, rx) = harness::<ProgramEffects>(WAIT);
        manager.read(INPUT, OUTPUT).unwrap();
        let short = build_data_message(0x10, &maps::PROGRAM_EFFECT_1_ADDRESS, &[0x08; 144]);
        backend.deliver(INPUT, &short);

        match rx.recv_timeout(WAIT) {
            Ok(TransferEvent::Failed(TransferError::SizeMismatch {
                expected, actual, ..
            })) => assert_eq!((expected, actual), (145, 144)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(!backend.is_listening(INPUT));
    }

    #[test]
    fn test_protocol_errors_fail_read() {
        let source = EffectsPatch::new();

        let vocal = build_data_message(
            0x10,
            &maps::PROGRAM_VOCAL_EFFECT_ADDRESS,
            &VocalEffectPatch::new().get_bytes(),
        );
        let mut bad_checksum = effect_response(&source, EffectSlot::Delay);
        let last = bad_checksum.len() - 2;
        bad_checksum[last] = (bad_checksum[last] + 1) & 0x7F;
        let duplicate = effect_response(&source, EffectSlot::Delay);

        let (manager, backend, rx) = harness::<ProgramEffects>(WAIT);

        manager.read(INPUT, OUTPUT).unwrap();
        backend.deliver(INPUT, &vocal);
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(TransferEvent::Failed(TransferError::UnknownComponent { address }))
                if address == maps::PROGRAM_VOCAL_EFFECT_ADDRESS
        ));

        manager.read(INPUT, OUTPUT).unwrap();
        backend.deliver(INPUT, &bad_checksum);
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(TransferEvent::Failed(TransferError::Framing(
                FramingError::ChecksumMismatch { .. }
            )))
        ));

        manager.read(INPUT, OUTPUT).unwrap();
        backend.deliver(INPUT, &duplicate);
        backend.deliver(INPUT, &duplicate);
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(TransferEvent::Failed(TransferError::DuplicateComponent(_)))
        ));
        assert!(!backend.is_listening(INPUT));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cancel_read() {
        let (manager, backend, rx) = harness::<ProgramEffects>(Duration::from_millis(100));
        manager.read(INPUT, OUTPUT).unwrap();
        assert!(matches!(
            manager.read(INPUT, OUTPUT),
            Err(TransferError::AlreadyReading)
        ));

        manager.cancel_read();
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(!backend.is_listening(INPUT));
        // Neither the deadline nor late answers produce anything.
        assert!(!backend.deliver(
            INPUT,
            &effect_response(&EffectsPatch::new(), EffectSlot::Effect1)
        ));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        // The port is free for the next read.
        manager.read(INPUT, OUTPUT).unwrap();
        assert!(backend.is_listening(INPUT));
        manager.cancel_read();
    }

    #[test]
    fn test_failed_send_releases_input() {
        let (manager, backend, rx) = harness::<ProgramEffects>(WAIT);
        backend.set_fail_sends(true);
        assert!(matches!(
            manager.read(INPUT, OUTPUT),
            Err(TransferError::Transport(TransportError::SendFailed { .. }))
        ));
        assert!(!backend.is_listening(INPUT));
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(rx.try_recv().is_err());

        assert!(matches!(
            manager.read(INPUT, 7),
            Err(TransferError::Transport(TransportError::NoSuchPort(7)))
        ));
        assert!(!backend.is_listening(INPUT));
    }

    /// [AnalogTone], but assembly waits for the test when a gate is set.
    struct GatedAnalog;

    static GATE: parking_lot::Mutex<Option<(mpsc::Sender<()>, Receiver<()>)>> =
        parking_lot::const_mutex(None);

    fn set_gate() -> (Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        *GATE.lock() = Some((entered_tx, release_rx));
        (entered, release)
    }

    impl DumpKind for GatedAnalog {
        type Component = ();
        type Patch = AnalogPatch;

        const NAME: &'static str = "gated analog tone";

        fn components() -> &'static [()] {
            AnalogTone::components()
        }
        fn address(component: ()) -> Address {
            AnalogTone::address(component)
        }
        fn length(component: ()) -> usize {
            AnalogTone::length(component)
        }
        fn identify(address: &Address) -> Option<()> {
            AnalogTone::identify(address)
        }
        fn component_bytes(patch: &AnalogPatch, component: ()) -> Vec<u8> {
            AnalogTone::component_bytes(patch, component)
        }
        fn assemble(payloads: &HashMap<(), Vec<u8>>) -> Result<AnalogPatch, PatchError> {
            let gate = GATE.lock().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv_timeout(WAIT).unwrap();
            }
            AnalogTone::assemble(payloads)
        }
    }

    #[test]
    fn test_state_during_assembly() {
        let (manager, backend, rx) = harness::<GatedAnalog>(WAIT);
        let mut source = AnalogPatch::new();
        source.filter_mut().set_cutoff(3).unwrap();
        let response = build_data_message(0x10, &maps::ANALOG_TONE_ADDRESS, &source.get_bytes());

        // Assembly that goes on to succeed never looks finished early.
        let (entered, release) = set_gate();
        manager.read(INPUT, OUTPUT).unwrap();
        let delivering = {
            let backend = backend.clone();
            let response = response.clone();
            thread::spawn(move || backend.deliver(INPUT, &response))
        };
        entered.recv_timeout(WAIT).unwrap();
        assert_eq!(manager.state(), SessionState::AwaitingComponents);
        assert!(matches!(
            manager.read(INPUT, OUTPUT),
            Err(TransferError::AlreadyReading)
        ));
        assert!(!backend.is_listening(INPUT));
        assert!(rx.try_recv().is_err());
        release.send(()).unwrap();
        delivering.join().unwrap();
        match rx.recv_timeout(WAIT) {
            Ok(TransferEvent::DumpReceived(patch)) => assert_eq!(patch, source),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(manager.state(), SessionState::Completed);

        // Cancelling while assembling discards the patch.
        let (entered, release) = set_gate();
        manager.read(INPUT, OUTPUT).unwrap();
        let delivering = {
            let backend = backend.clone();
            thread::spawn(move || backend.deliver(INPUT, &response))
        };
        entered.recv_timeout(WAIT).unwrap();
        manager.cancel_read();
        assert_eq!(manager.state(), SessionState::Idle);
        release.send(()).unwrap();
        delivering.join().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[test]
    fn test_analog_dump() {
        let (manager, backend, _rx) = harness::<AnalogTone>(WAIT);
        manager.dump(&AnalogPatch::new(), OUTPUT).unwrap();

        let sent = backend.take_sent();
        assert_eq!(sent.len(), 1);
        let (port, message) = &sent[0];
        assert_eq!(*port, OUTPUT);
        let (address, payload) = validate_and_unwrap(message).unwrap();
        assert_eq!(address.0, [0x19, 0x42, 0x00, 0x00]);
        assert_eq!(payload.len(), 64);
        assert_eq!(payload, AnalogPatch::new().get_bytes());
    }

    #[test]
    fn test_effects_dump() {
        let (manager, backend, _rx) = harness::<ProgramEffects>(WAIT);
        let patch = interesting_effects();
        manager.dump(&patch, OUTPUT).unwrap();
        let sent = backend.take_sent();
        assert_eq!(sent.len(), 4);
        for ((_, message), &slot) in sent.iter().zip(EffectSlot::ALL) {
            let (address, payload) = validate_and_unwrap(message).unwrap();
            assert_eq!(address.group(), u8::from(slot));
            assert_eq!(payload, patch.component_bytes(slot));
        }

        manager
            .dump_component(&patch, EffectSlot::Delay, OUTPUT)
            .unwrap();
        let sent = backend.take_sent();
        assert_eq!(sent.len(), 1);
        let (address, payload) = validate_and_unwrap(&sent[0].1).unwrap();
        assert_eq!(address, maps::PROGRAM_DELAY_ADDRESS);
        assert_eq!(payload.len(), 100);
    }

    #[test]
    fn test_single_component_reads() {
        let (manager, backend, rx) = harness::<AnalogTone>(WAIT);
        let mut source = AnalogPatch::new();
        source.filter_mut().set_resonance(99).unwrap();
        manager.read(INPUT, OUTPUT).unwrap();
        let sent = backend.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0].1[8..16], [0x19, 0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40]);
        backend.deliver(
            INPUT,
            &build_data_message(0x10, &maps::ANALOG_TONE_ADDRESS, &source.get_bytes()),
        );
        match rx.recv_timeout(WAIT) {
            Ok(TransferEvent::DumpReceived(patch)) => assert_eq!(patch, source),
            other => panic!("unexpected {:?}", other),
        }

        let (manager, backend, rx) = harness::<VocalEffect>(WAIT);
        manager.read(INPUT, OUTPUT).unwrap();
        let mut bytes = VocalEffectPatch::new().get_bytes();
        bytes[4] = 0x05; // no such output
        backend.deliver(
            INPUT,
            &build_data_message(0x10, &maps::PROGRAM_VOCAL_EFFECT_ADDRESS, &bytes),
        );
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Ok(TransferEvent::Failed(TransferError::Patch(PatchError::Field {
                field: "output",
                ..
            })))
        ));
        assert!(!backend.is_listening(INPUT));
    }
}
