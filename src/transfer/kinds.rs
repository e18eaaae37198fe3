/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! The patch kinds that can be read from and dumped to a JD-Xi.

use super::{DumpKind, PatchManager};
use crate::patch::analog::AnalogPatch;
use crate::patch::effects::{EffectSlot, EffectsPatch};
use crate::patch::vocal_effect::VocalEffectPatch;
use crate::patch::{Patch, PatchError};
use crate::sysex::roland::maps::{
    ANALOG_TONE_ADDRESS, PROGRAM_EFFECTS_ADDRESS, PROGRAM_VOCAL_EFFECT_ADDRESS,
};
use crate::sysex::roland::Address;
use std::collections::HashMap;

pub type AnalogPatchManager = PatchManager<AnalogTone>;
pub type EffectsPatchManager = PatchManager<ProgramEffects>;
pub type VocalEffectPatchManager = PatchManager<VocalEffect>;

fn payload<C: std::hash::Hash + Eq>(
    payloads: &HashMap<C, Vec<u8>>,
    component: C,
    expected: usize,
) -> Result<&[u8], PatchError> {
    payloads
        .get(&component)
        .map(Vec::as_slice)
        .ok_or(PatchError::SizeMismatch {
            expected,
            actual: 0,
        })
}

/// The analog synth part's tone. A single block.
pub struct AnalogTone;

impl DumpKind for AnalogTone {
    type Component = ();
    type Patch = AnalogPatch;

    const NAME: &'static str = "analog tone";

    fn components() -> &'static [()] {
        &[()]
    }
    fn address(_: ()) -> Address {
        ANALOG_TONE_ADDRESS
    }
    fn length(_: ()) -> usize {
        AnalogPatch::LENGTH
    }
    fn identify(address: &Address) -> Option<()> {
        (*address == ANALOG_TONE_ADDRESS).then_some(())
    }
    fn component_bytes(patch: &AnalogPatch, _: ()) -> Vec<u8> {
        patch.get_bytes()
    }
    fn assemble(payloads: &HashMap<(), Vec<u8>>) -> Result<AnalogPatch, PatchError> {
        AnalogPatch::decode(payload(payloads, (), AnalogPatch::LENGTH)?)
    }
}

/// The program's four effect blocks.
pub struct ProgramEffects;

impl DumpKind for ProgramEffects {
    type Component = EffectSlot;
    type Patch = EffectsPatch;

    const NAME: &'static str = "program effects";

    fn components() -> &'static [EffectSlot] {
        EffectSlot::ALL
    }
    fn address(slot: EffectSlot) -> Address {
        PROGRAM_EFFECTS_ADDRESS.with_group(slot.into())
    }
    fn length(slot: EffectSlot) -> usize {
        EffectsPatch::component_length(slot)
    }
    fn identify(address: &Address) -> Option<EffectSlot> {
        if address.with_group(0x00) != PROGRAM_EFFECTS_ADDRESS {
            return None;
        }
        EffectSlot::try_from(address.group()).ok()
    }
    fn component_bytes(patch: &EffectsPatch, slot: EffectSlot) -> Vec<u8> {
        patch.component_bytes(slot)
    }
    fn assemble(payloads: &HashMap<EffectSlot, Vec<u8>>) -> Result<EffectsPatch, PatchError> {
        let get = |slot| payload(payloads, slot, EffectsPatch::component_length(slot));
        EffectsPatch::from_components(
            get(EffectSlot::Effect1)?,
            get(EffectSlot::Effect2)?,
            get(EffectSlot::Delay)?,
            get(EffectSlot::Reverb)?,
        )
    }
}

/// The program's vocal effect. A single block.
pub struct VocalEffect;

impl DumpKind for VocalEffect {
    type Component = ();
    type Patch = VocalEffectPatch;

    const NAME: &'static str = "vocal effect";

    fn components() -> &'static [()] {
        &[()]
    }
    fn address(_: ()) -> Address {
        PROGRAM_VOCAL_EFFECT_ADDRESS
    }
    fn length(_: ()) -> usize {
        VocalEffectPatch::LENGTH
    }
    fn identify(address: &Address) -> Option<()> {
        (*address == PROGRAM_VOCAL_EFFECT_ADDRESS).then_some(())
    }
    fn component_bytes(patch: &VocalEffectPatch, _: ()) -> Vec<u8> {
        patch.get_bytes()
    }
    fn assemble(payloads: &HashMap<(), Vec<u8>>) -> Result<VocalEffectPatch, PatchError> {
        VocalEffectPatch::decode(payload(payloads, (), VocalEffectPatch::LENGTH)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysex::roland::maps;

    #[test]
    fn test_identify_effect_slots() {
        assert_eq!(
            ProgramEffects::identify(&maps::PROGRAM_EFFECT_1_ADDRESS),
            Some(EffectSlot::Effect1)
        );
        assert_eq!(
            ProgramEffects::identify(&maps::PROGRAM_REVERB_ADDRESS),
            Some(EffectSlot::Reverb)
        );
        // Vocal effect is in the same area but isn't one of the four.
        assert_eq!(
            ProgramEffects::identify(&maps::PROGRAM_VOCAL_EFFECT_ADDRESS),
            None
        );
        assert_eq!(ProgramEffects::identify(&ANALOG_TONE_ADDRESS), None);
        assert_eq!(
            ProgramEffects::identify(&Address::new(0x18, 0x00, 0x03, 0x00)),
            None
        );
        for &slot in EffectSlot::ALL {
            assert_eq!(
                ProgramEffects::identify(&ProgramEffects::address(slot)),
                Some(slot)
            );
        }
    }

    #[test]
    fn test_identify_single_blocks() {
        assert_eq!(AnalogTone::identify(&ANALOG_TONE_ADDRESS), Some(()));
        assert_eq!(AnalogTone::identify(&maps::PROGRAM_DELAY_ADDRESS), None);
        assert_eq!(
            VocalEffect::identify(&maps::PROGRAM_VOCAL_EFFECT_ADDRESS),
            Some(())
        );
        assert_eq!(VocalEffect::identify(&ANALOG_TONE_ADDRESS), None);
    }

    #[test]
    fn test_assemble_effects() {
        let mut source = EffectsPatch::new();
        source.reverb_mut().basic_mut().set_level(3).unwrap();
        let payloads: HashMap<_, _> = EffectSlot::ALL
            .iter()
            .map(|&slot| (slot, source.component_bytes(slot)))
            .collect();
        assert_eq!(ProgramEffects::assemble(&payloads).unwrap(), source);
    }
}
