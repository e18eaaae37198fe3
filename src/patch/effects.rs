/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! The program's effects: Effect 1, Effect 2, Delay and Reverb.
//!
//! Each of the four is its own address block on the device and is sent and
//! requested separately. Every block has a handful of fixed parameters, some
//! reserved bytes, then a run of generic four-byte parameters whose meaning
//! depends on the selected effect type.

use super::{
    parameter_group, same_kind, ByteReader, ChangeBus, ChangeNotifier, ParameterGroup, Patch,
    PatchError,
};
use crate::codec::{byte_enum, EffectValue, Field, FieldError, Unsigned};
use std::any::Any;

byte_enum! {
    /// Which of the four effect blocks. The byte is the block's address
    /// group (third address byte).
    pub enum EffectSlot {
        Effect1 = 0x02 => "EFX1",
        Effect2 = 0x04 => "EFX2",
        Delay = 0x06 => "DELAY",
        Reverb = 0x08 => "REVERB",
    }
}

byte_enum! {
    pub enum Effect1Type {
        Thru = 0x00 => "THRU",
        Distortion = 0x01 => "DISTORTION",
        Fuzz = 0x02 => "FUZZ",
        Compressor = 0x03 => "COMPRESSOR",
        BitCrusher = 0x04 => "BIT CRUSHER",
    }
}

byte_enum! {
    pub enum Effect1Output {
        Direct = 0x00 => "DIR",
        Effect2 = 0x01 => "EFX2",
    }
}

byte_enum! {
    /// Types 1 to 4 are Effect 1's and are not valid here.
    pub enum Effect2Type {
        Thru = 0x00 => "THRU",
        Flanger = 0x05 => "FLANGER",
        Phaser = 0x06 => "PHASER",
        RingMod = 0x07 => "RING MOD",
        Slicer = 0x08 => "SLICER",
    }
}

type Level = Unsigned<0, 127>;

parameter_group! {
    pub struct Effect1Basic {
        effect_type / set_effect_type: Effect1Type = Effect1Type::Thru,
        level / set_level: Level = 127,
        delay_send / set_delay_send: Level = 0,
        reverb_send / set_reverb_send: Level = 0,
        output / set_output: Effect1Output = Effect1Output::Direct,
    }
}

parameter_group! {
    pub struct Effect2Basic {
        effect_type / set_effect_type: Effect2Type = Effect2Type::Thru,
        level / set_level: Level = 127,
        delay_send / set_delay_send: Level = 0,
        reverb_send / set_reverb_send: Level = 0,
    }
}

parameter_group! {
    pub struct DelayBasic {
        level / set_level: Level = 127,
        reverb_send / set_reverb_send: Level = 0,
    }
}

parameter_group! {
    pub struct ReverbBasic {
        level / set_level: Level = 127,
    }
}

const PARAMETER_NAMES: [&str; 32] = [
    "param1", "param2", "param3", "param4", "param5", "param6", "param7", "param8", "param9",
    "param10", "param11", "param12", "param13", "param14", "param15", "param16", "param17",
    "param18", "param19", "param20", "param21", "param22", "param23", "param24", "param25",
    "param26", "param27", "param28", "param29", "param30", "param31", "param32",
];

fn parameter_name(index: usize) -> &'static str {
    PARAMETER_NAMES.get(index).copied().unwrap_or("param")
}

/// `N` generic effect parameters, four bytes each.
///
/// Indices are zero-based here. The device's own documentation numbers them
/// from 1, which is what change notifications and decode errors use (`param1`
/// and up).
#[derive(Debug)]
pub struct EffectParameters<const N: usize> {
    values: [i32; N],
    notifier: ChangeNotifier,
}

/// The copy is detached: it doesn't notify the original's patch.
impl<const N: usize> Clone for EffectParameters<N> {
    fn clone(&self) -> Self {
        EffectParameters {
            values: self.values,
            notifier: ChangeNotifier::default(),
        }
    }
}

impl<const N: usize> EffectParameters<N> {
    pub fn parameter(&self, index: usize) -> Option<i32> {
        self.values.get(index).copied()
    }

    pub fn set_parameter(&mut self, index: usize, value: i32) -> Result<(), FieldError> {
        if index >= N {
            return Err(FieldError::OutOfRange {
                value: index as i32,
                min: 0,
                max: N as i32 - 1,
            });
        }
        let value = EffectValue::new(value)?.get();
        if self.values[index] != value {
            self.values[index] = value;
            self.notifier.notify(parameter_name(index));
        }
        Ok(())
    }

    pub fn values(&self) -> &[i32; N] {
        &self.values
    }
}

impl<const N: usize> Default for EffectParameters<N> {
    fn default() -> Self {
        EffectParameters {
            values: [0; N],
            notifier: ChangeNotifier::default(),
        }
    }
}

impl<const N: usize> PartialEq for EffectParameters<N> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl<const N: usize> ParameterGroup for EffectParameters<N> {
    const LENGTH: usize = N * EffectValue::SIZE;

    fn write_bytes(&self, out: &mut Vec<u8>) {
        for &value in &self.values {
            // Every stored value went through EffectValue::new().
            if let Ok(value) = EffectValue::new(value) {
                value.encode(out);
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, PatchError> {
        let mut reader = ByteReader::new(bytes, Self::LENGTH)?;
        let mut parameters = Self::default();
        for (index, value) in parameters.values.iter_mut().enumerate() {
            *value = reader.field::<EffectValue>(parameter_name(index))?.get();
        }
        Ok(parameters)
    }

    fn copy_from(&mut self, other: &Self) {
        for index in 0..N {
            if self.values[index] != other.values[index] {
                self.values[index] = other.values[index];
                self.notifier.notify(parameter_name(index));
            }
        }
    }

    fn attach(&mut self, notifier: ChangeNotifier) {
        self.notifier = notifier;
    }
}

/// One effect block: fixed parameters, `RESERVED` reserved bytes, then `N`
/// generic parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectPatch<B, const RESERVED: usize, const N: usize> {
    basic: B,
    parameters: EffectParameters<N>,
}

pub type Effect1Patch = EffectPatch<Effect1Basic, 12, 32>;
pub type Effect2Patch = EffectPatch<Effect2Basic, 13, 32>;
pub type DelayPatch = EffectPatch<DelayBasic, 2, 24>;
pub type ReverbPatch = EffectPatch<ReverbBasic, 2, 24>;

impl<B: ParameterGroup, const RESERVED: usize, const N: usize> EffectPatch<B, RESERVED, N> {
    pub fn basic(&self) -> &B {
        &self.basic
    }
    pub fn basic_mut(&mut self) -> &mut B {
        &mut self.basic
    }
    pub fn parameters(&self) -> &EffectParameters<N> {
        &self.parameters
    }
    pub fn parameters_mut(&mut self) -> &mut EffectParameters<N> {
        &mut self.parameters
    }
}

impl<B: ParameterGroup, const RESERVED: usize, const N: usize> ParameterGroup
    for EffectPatch<B, RESERVED, N>
{
    const LENGTH: usize = B::LENGTH + RESERVED + EffectParameters::<N>::LENGTH;

    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.basic.write_bytes(out);
        super::write_reserved(out, RESERVED);
        self.parameters.write_bytes(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self, PatchError> {
        let mut reader = ByteReader::new(bytes, Self::LENGTH)?;
        let basic = reader.group()?;
        reader.reserved(RESERVED);
        let parameters = reader.group()?;
        Ok(EffectPatch { basic, parameters })
    }

    fn copy_from(&mut self, other: &Self) {
        self.basic.copy_from(&other.basic);
        self.parameters.copy_from(&other.parameters);
    }

    fn attach(&mut self, notifier: ChangeNotifier) {
        self.basic.attach(notifier.child("basic"));
        self.parameters.attach(notifier.child("parameters"));
    }
}

/// All four effect blocks of a program.
#[derive(Debug)]
pub struct EffectsPatch {
    effect1: Effect1Patch,
    effect2: Effect2Patch,
    delay: DelayPatch,
    reverb: ReverbPatch,
    bus: ChangeBus,
}

impl EffectsPatch {
    pub const LENGTH: usize =
        Effect1Patch::LENGTH + Effect2Patch::LENGTH + DelayPatch::LENGTH + ReverbPatch::LENGTH;

    pub fn new() -> EffectsPatch {
        let mut patch = EffectsPatch {
            effect1: Default::default(),
            effect2: Default::default(),
            delay: Default::default(),
            reverb: Default::default(),
            bus: ChangeBus::new(),
        };
        patch.attach_groups();
        patch
    }

    fn attach_groups(&mut self) {
        self.effect1.attach(self.bus.scope("effect1"));
        self.effect2.attach(self.bus.scope("effect2"));
        self.delay.attach(self.bus.scope("delay"));
        self.reverb.attach(self.bus.scope("reverb"));
    }

    pub fn effect1(&self) -> &Effect1Patch {
        &self.effect1
    }
    pub fn effect1_mut(&mut self) -> &mut Effect1Patch {
        &mut self.effect1
    }
    pub fn effect2(&self) -> &Effect2Patch {
        &self.effect2
    }
    pub fn effect2_mut(&mut self) -> &mut Effect2Patch {
        &mut self.effect2
    }
    pub fn delay(&self) -> &DelayPatch {
        &self.delay
    }
    pub fn delay_mut(&mut self) -> &mut DelayPatch {
        &mut self.delay
    }
    pub fn reverb(&self) -> &ReverbPatch {
        &self.reverb
    }
    pub fn reverb_mut(&mut self) -> &mut ReverbPatch {
        &mut self.reverb
    }

    /// Dump length of one block.
    pub fn component_length(slot: EffectSlot) -> usize {
        match slot {
            EffectSlot::Effect1 => Effect1Patch::LENGTH,
            EffectSlot::Effect2 => Effect2Patch::LENGTH,
            EffectSlot::Delay => DelayPatch::LENGTH,
            EffectSlot::Reverb => ReverbPatch::LENGTH,
        }
    }

    pub fn component_bytes(&self, slot: EffectSlot) -> Vec<u8> {
        match slot {
            EffectSlot::Effect1 => self.effect1.get_bytes(),
            EffectSlot::Effect2 => self.effect2.get_bytes(),
            EffectSlot::Delay => self.delay.get_bytes(),
            EffectSlot::Reverb => self.reverb.get_bytes(),
        }
    }

    /// Replaces one block, leaving it untouched if `bytes` don't decode.
    pub fn copy_component_from_bytes(
        &mut self,
        slot: EffectSlot,
        bytes: &[u8],
    ) -> Result<(), PatchError> {
        match slot {
            EffectSlot::Effect1 => self.effect1.copy_from_bytes(bytes),
            EffectSlot::Effect2 => self.effect2.copy_from_bytes(bytes),
            EffectSlot::Delay => self.delay.copy_from_bytes(bytes),
            EffectSlot::Reverb => self.reverb.copy_from_bytes(bytes),
        }
    }

    /// Builds a patch out of the four blocks' dumps.
    pub fn from_components(
        effect1: &[u8],
        effect2: &[u8],
        delay: &[u8],
        reverb: &[u8],
    ) -> Result<EffectsPatch, PatchError> {
        let mut patch = EffectsPatch::new();
        patch.effect1 = Effect1Patch::decode(effect1)?;
        patch.effect2 = Effect2Patch::decode(effect2)?;
        patch.delay = DelayPatch::decode(delay)?;
        patch.reverb = ReverbPatch::decode(reverb)?;
        patch.attach_groups();
        Ok(patch)
    }

    fn copy_from(&mut self, other: &EffectsPatch) {
        self.effect1.copy_from(&other.effect1);
        self.effect2.copy_from(&other.effect2);
        self.delay.copy_from(&other.delay);
        self.reverb.copy_from(&other.reverb);
    }
}

impl Default for EffectsPatch {
    fn default() -> Self {
        EffectsPatch::new()
    }
}

impl Clone for EffectsPatch {
    fn clone(&self) -> Self {
        let mut patch = EffectsPatch::new();
        patch.copy_from(self);
        patch
    }
}

impl PartialEq for EffectsPatch {
    fn eq(&self, other: &Self) -> bool {
        self.effect1 == other.effect1
            && self.effect2 == other.effect2
            && self.delay == other.delay
            && self.reverb == other.reverb
    }
}

impl Patch for EffectsPatch {
    fn dump_length(&self) -> usize {
        Self::LENGTH
    }

    fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        self.effect1.write_bytes(&mut out);
        self.effect2.write_bytes(&mut out);
        self.delay.write_bytes(&mut out);
        self.reverb.write_bytes(&mut out);
        out
    }

    fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<(), PatchError> {
        let mut reader = ByteReader::new(bytes, Self::LENGTH)?;
        let decoded = EffectsPatch::from_components(
            reader.bytes(Effect1Patch::LENGTH),
            reader.bytes(Effect2Patch::LENGTH),
            reader.bytes(DelayPatch::LENGTH),
            reader.bytes(ReverbPatch::LENGTH),
        )?;
        self.copy_from(&decoded);
        Ok(())
    }

    fn reset(&mut self) {
        self.copy_from(&EffectsPatch::new());
    }

    fn copy_from_patch(&mut self, other: &dyn Patch) -> Result<(), PatchError> {
        let other = same_kind(self, other)?;
        self.copy_from(other);
        Ok(())
    }

    fn changes(&self) -> &ChangeBus {
        &self.bus
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind_name(&self) -> &'static str {
        "program effects"
    }
}

fn view_value(parameters: &EffectParameters<32>, index: usize, max: i32) -> Result<u8, FieldError> {
    let value = parameters.parameter(index).unwrap_or(0);
    if !(0..=max).contains(&value) {
        return Err(FieldError::OutOfRange {
            value,
            min: 0,
            max,
        });
    }
    Ok(value as u8)
}

fn check_view_value(value: u8, max: u8) -> Result<i32, FieldError> {
    if value > max {
        return Err(FieldError::OutOfRange {
            value: value.into(),
            min: 0,
            max: max.into(),
        });
    }
    Ok(value.into())
}

byte_enum! {
    pub enum DistortionType {
        Type1 = 0x00 => "1",
        Type2 = 0x01 => "2",
        Type3 = 0x02 => "3",
        Type4 = 0x03 => "4",
        Type5 = 0x04 => "5",
        Type6 = 0x05 => "6",
    }
}

/// Effect 1's generic parameters as the Distortion and Fuzz types use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistortionParameters {
    pub level: u8,
    pub drive: u8,
    pub kind: DistortionType,
    pub presence: u8,
}

impl DistortionParameters {
    pub fn from_parameters(parameters: &EffectParameters<32>) -> Result<Self, FieldError> {
        let kind = view_value(parameters, 2, DistortionType::ALL.len() as i32 - 1)?;
        Ok(DistortionParameters {
            level: view_value(parameters, 0, 127)?,
            drive: view_value(parameters, 1, 127)?,
            kind: DistortionType::try_from(kind)?,
            presence: view_value(parameters, 3, 127)?,
        })
    }

    /// Writes these values back. Nothing is written unless all of them are
    /// in range.
    pub fn apply(&self, parameters: &mut EffectParameters<32>) -> Result<(), FieldError> {
        let values = [
            check_view_value(self.level, 127)?,
            check_view_value(self.drive, 127)?,
            u8::from(self.kind).into(),
            check_view_value(self.presence, 127)?,
        ];
        for (index, value) in values.into_iter().enumerate() {
            parameters.set_parameter(index, value)?;
        }
        Ok(())
    }
}

/// Effect 1's generic parameters as the Bit Crusher type uses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitCrusherParameters {
    pub level: u8,
    pub rate: u8,
    pub bit: u8,
    pub filter: u8,
}

impl BitCrusherParameters {
    pub fn from_parameters(parameters: &EffectParameters<32>) -> Result<Self, FieldError> {
        Ok(BitCrusherParameters {
            level: view_value(parameters, 0, 127)?,
            rate: view_value(parameters, 1, 127)?,
            bit: view_value(parameters, 2, 127)?,
            filter: view_value(parameters, 3, 127)?,
        })
    }

    pub fn apply(&self, parameters: &mut EffectParameters<32>) -> Result<(), FieldError> {
        let values = [
            check_view_value(self.level, 127)?,
            check_view_value(self.rate, 127)?,
            check_view_value(self.bit, 127)?,
            check_view_value(self.filter, 127)?,
        ];
        for (index, value) in values.into_iter().enumerate() {
            parameters.set_parameter(index, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::mpsc;

    #[test]
    fn test_component_lengths() {
        assert_eq!(Effect1Patch::LENGTH, 145);
        assert_eq!(Effect2Patch::LENGTH, 145);
        assert_eq!(DelayPatch::LENGTH, 100);
        assert_eq!(ReverbPatch::LENGTH, 99);
        assert_eq!(EffectsPatch::LENGTH, 489);
        assert_eq!(EffectsPatch::new().get_bytes().len(), 489);
        for &slot in EffectSlot::ALL {
            assert_eq!(
                EffectsPatch::new().component_bytes(slot).len(),
                EffectsPatch::component_length(slot)
            );
        }
    }

    #[test]
    fn test_effect1_layout() {
        let mut effect1 = Effect1Patch::default();
        effect1
            .basic_mut()
            .set_effect_type(Effect1Type::BitCrusher)
            .unwrap();
        effect1.basic_mut().set_output(Effect1Output::Effect2).unwrap();
        effect1.parameters_mut().set_parameter(0, -20000).unwrap();
        effect1.parameters_mut().set_parameter(31, 20000).unwrap();
        let bytes = effect1.get_bytes();

        assert_eq!(&bytes[..5], [0x04, 127, 0, 0, 0x01]);
        assert_eq!(&bytes[5..17], [0x00; 12]);
        // -20000 + 32768 = 12768 = 31E0h
        assert_eq!(&bytes[17..21], [0x03, 0x01, 0x0E, 0x00]);
        // 20000 + 32768 = 52768 = CE20h
        assert_eq!(&bytes[141..145], [0x0C, 0x0E, 0x02, 0x00]);
        assert_eq!(Effect1Patch::decode(&bytes).unwrap(), effect1);
    }

    #[test]
    fn test_effect2_rejects_effect1_types() {
        let mut bytes = Effect2Patch::default().get_bytes();
        bytes[0] = 0x01;
        assert_eq!(
            Effect2Patch::decode(&bytes),
            Err(PatchError::Field {
                field: "effect_type",
                source: FieldError::UnknownVariant {
                    enumeration: "Effect2Type",
                    byte: 0x01
                }
            })
        );
        bytes[0] = 0x08;
        assert_eq!(
            Effect2Patch::decode(&bytes).unwrap().basic().effect_type(),
            Effect2Type::Slicer
        );
    }

    #[test]
    fn test_parameter_range() {
        let mut reverb = ReverbPatch::default();
        assert!(reverb.parameters_mut().set_parameter(0, 20001).is_err());
        assert!(reverb.parameters_mut().set_parameter(24, 0).is_err());
        assert_eq!(reverb.parameters().parameter(24), None);

        let mut bytes = reverb.get_bytes();
        // 0000h is -32768, outside the parameter range.
        bytes[3..7].copy_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(
            ReverbPatch::decode(&bytes),
            Err(PatchError::Field {
                field: "param1",
                source: FieldError::OutOfRange { value: -32768, .. },
            })
        ));

        let mut bytes = reverb.get_bytes();
        let last = bytes.len() - 4;
        bytes[last] = 0x10;
        assert_eq!(
            ReverbPatch::decode(&bytes),
            Err(PatchError::Field {
                field: "param24",
                source: FieldError::OutOfRange {
                    value: 0x10,
                    min: 0x0,
                    max: 0xF
                },
            })
        );
    }

    #[test]
    fn test_whole_patch_round_trip() {
        let mut patch = EffectsPatch::new();
        patch.delay_mut().basic_mut().set_reverb_send(50).unwrap();
        patch.reverb_mut().parameters_mut().set_parameter(23, -7).unwrap();
        patch
            .effect2_mut()
            .basic_mut()
            .set_effect_type(Effect2Type::Phaser)
            .unwrap();

        let bytes = patch.get_bytes();
        let mut decoded = EffectsPatch::new();
        decoded.copy_from_bytes(&bytes).unwrap();
        assert_eq!(decoded, patch);

        let from_components = EffectsPatch::from_components(
            &patch.component_bytes(EffectSlot::Effect1),
            &patch.component_bytes(EffectSlot::Effect2),
            &patch.component_bytes(EffectSlot::Delay),
            &patch.component_bytes(EffectSlot::Reverb),
        )
        .unwrap();
        assert_eq!(from_components, patch);
    }

    #[test]
    fn test_component_size_mismatch() {
        let mut patch = EffectsPatch::new();
        assert_eq!(
            patch.copy_component_from_bytes(EffectSlot::Delay, &[0; 99]),
            Err(PatchError::SizeMismatch {
                expected: 100,
                actual: 99
            })
        );
        assert_eq!(patch, EffectsPatch::new());
    }

    #[test]
    fn test_nested_notifications() {
        let mut patch = EffectsPatch::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        patch
            .changes()
            .subscribe("effect1", move |path| tx.lock().send(path.to_owned()).unwrap());

        patch.effect1_mut().basic_mut().set_level(100).unwrap();
        patch.effect1_mut().parameters_mut().set_parameter(2, 5).unwrap();
        patch.effect2_mut().basic_mut().set_level(100).unwrap();

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            ["effect1.basic.level", "effect1.parameters.param3"]
        );
    }

    #[test]
    fn test_cloned_effect_is_detached() {
        let mut patch = EffectsPatch::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        patch
            .changes()
            .subscribe("", move |path| tx.lock().send(path.to_owned()).unwrap());

        let mut detached = patch.effect1().clone();
        detached.parameters_mut().set_parameter(0, 9).unwrap();
        detached.basic_mut().set_level(1).unwrap();
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(patch.effect1().parameters().parameter(0), Some(0));

        patch.effect1_mut().parameters_mut().set_parameter(0, 9).unwrap();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["effect1.parameters.param1"]);
    }

    #[test]
    fn test_distortion_view() {
        let mut effect1 = Effect1Patch::default();
        let view = DistortionParameters {
            level: 100,
            drive: 64,
            kind: DistortionType::Type3,
            presence: 127,
        };
        view.apply(effect1.parameters_mut()).unwrap();
        assert_eq!(&effect1.parameters().values()[..4], [100, 64, 2, 127]);
        assert_eq!(
            DistortionParameters::from_parameters(effect1.parameters()),
            Ok(view)
        );

        effect1.parameters_mut().set_parameter(2, 6).unwrap();
        assert!(DistortionParameters::from_parameters(effect1.parameters()).is_err());
    }

    #[test]
    fn test_bit_crusher_view() {
        let mut effect1 = Effect1Patch::default();
        let bad = BitCrusherParameters {
            level: 127,
            rate: 128,
            bit: 0,
            filter: 0,
        };
        assert!(bad.apply(effect1.parameters_mut()).is_err());
        // Nothing partially written.
        assert_eq!(effect1, Effect1Patch::default());

        effect1.parameters_mut().set_parameter(3, -1).unwrap();
        assert_eq!(
            BitCrusherParameters::from_parameters(effect1.parameters()),
            Err(FieldError::OutOfRange {
                value: -1,
                min: 0,
                max: 127
            })
        );
    }
}
