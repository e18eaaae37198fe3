/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! The program's vocal effect (24 bytes at `18 00 01 00`).

use super::{
    parameter_group, same_kind, write_reserved, ByteReader, ChangeBus, ParameterGroup, Patch,
    PatchError,
};
use crate::codec::{byte_enum, Signed, Unsigned};
use std::any::Any;

byte_enum! {
    pub enum VocalOutput {
        Effect1 = 0x00 => "EFX1",
        Effect2 = 0x01 => "EFX2",
        Delay = 0x02 => "DLY",
        Reverb = 0x03 => "REV",
        Direct = 0x04 => "DIR",
    }
}

byte_enum! {
    pub enum AutoPitchType {
        Soft = 0x00 => "SOFT",
        Hard = 0x01 => "HARD",
        Electric1 = 0x02 => "ELECTRIC1",
        Electric2 = 0x03 => "ELECTRIC2",
    }
}

byte_enum! {
    pub enum AutoPitchScale {
        Chromatic = 0x00 => "CHROMATIC",
        MajorMinor = 0x01 => "Maj(Min)",
    }
}

byte_enum! {
    pub enum VocoderEnvelope {
        Sharp = 0x00 => "SHARP",
        Soft = 0x01 => "SOFT",
        Long = 0x02 => "LONG",
    }
}

type Level = Unsigned<0, 127>;

parameter_group! {
    pub struct VocalCommon {
        level / set_level: Level = 127,
        /// L64 to 63R.
        pan / set_pan: Signed<-64, 63> = 0,
        delay_send / set_delay_send: Level = 0,
        reverb_send / set_reverb_send: Level = 0,
        output / set_output: VocalOutput = VocalOutput::Effect1,
    }
}

parameter_group! {
    pub struct AutoPitch {
        switch / set_switch: bool = false,
        auto_pitch_type / set_auto_pitch_type: AutoPitchType = AutoPitchType::Soft,
        scale / set_scale: AutoPitchScale = AutoPitchScale::Chromatic,
        /// C, Db, ... B major then Cm ... Bm.
        key / set_key: Unsigned<0, 23> = 0,
        /// C to B.
        note / set_note: Unsigned<0, 11> = 0,
        gender / set_gender: Signed<-10, 10, 10> = 0,
        octave / set_octave: Signed<-1, 1, 1> = 0,
        /// Dry/wet, D100:0W to D0:100W.
        balance / set_balance: Unsigned<0, 100> = 100,
    }
}

parameter_group! {
    pub struct Vocoder {
        switch / set_switch: bool = false,
        envelope / set_envelope: VocoderEnvelope = VocoderEnvelope::Soft,
        level / set_level: Level = 127,
        mic_sens / set_mic_sens: Level = 64,
        synth_level / set_synth_level: Level = 127,
        mic_mix_level / set_mic_mix_level: Level = 0,
        /// 0 is bypass, then 1000 Hz up to 16000 Hz.
        mic_hpf / set_mic_hpf: Unsigned<0, 13> = 0,
    }
}

const RESERVED_AT_END: usize = 4;

#[derive(Debug)]
pub struct VocalEffectPatch {
    common: VocalCommon,
    auto_pitch: AutoPitch,
    vocoder: Vocoder,
    bus: ChangeBus,
}

impl VocalEffectPatch {
    pub const LENGTH: usize =
        VocalCommon::LENGTH + AutoPitch::LENGTH + Vocoder::LENGTH + RESERVED_AT_END;

    pub fn new() -> VocalEffectPatch {
        let mut patch = VocalEffectPatch {
            common: Default::default(),
            auto_pitch: Default::default(),
            vocoder: Default::default(),
            bus: ChangeBus::new(),
        };
        patch.attach_groups();
        patch
    }

    fn attach_groups(&mut self) {
        self.common.attach(self.bus.scope("common"));
        self.auto_pitch.attach(self.bus.scope("auto_pitch"));
        self.vocoder.attach(self.bus.scope("vocoder"));
    }

    pub fn common(&self) -> &VocalCommon {
        &self.common
    }
    pub fn common_mut(&mut self) -> &mut VocalCommon {
        &mut self.common
    }
    pub fn auto_pitch(&self) -> &AutoPitch {
        &self.auto_pitch
    }
    pub fn auto_pitch_mut(&mut self) -> &mut AutoPitch {
        &mut self.auto_pitch
    }
    pub fn vocoder(&self) -> &Vocoder {
        &self.vocoder
    }
    pub fn vocoder_mut(&mut self) -> &mut Vocoder {
        &mut self.vocoder
    }

    pub fn decode(bytes: &[u8]) -> Result<VocalEffectPatch, PatchError> {
        let mut reader = ByteReader::new(bytes, Self::LENGTH)?;
        let mut patch = VocalEffectPatch::new();
        patch.common = reader.group()?;
        patch.auto_pitch = reader.group()?;
        patch.vocoder = reader.group()?;
        reader.reserved(RESERVED_AT_END);
        patch.attach_groups();
        Ok(patch)
    }

    fn copy_from(&mut self, other: &VocalEffectPatch) {
        self.common.copy_from(&other.common);
        self.auto_pitch.copy_from(&other.auto_pitch);
        self.vocoder.copy_from(&other.vocoder);
    }
}

impl Default for VocalEffectPatch {
    fn default() -> Self {
        VocalEffectPatch::new()
    }
}

impl Clone for VocalEffectPatch {
    fn clone(&self) -> Self {
        let mut patch = VocalEffectPatch::new();
        patch.copy_from(self);
        patch
    }
}

impl PartialEq for VocalEffectPatch {
    fn eq(&self, other: &Self) -> bool {
        self.common == other.common
            && self.auto_pitch == other.auto_pitch
            && self.vocoder == other.vocoder
    }
}

impl Patch for VocalEffectPatch {
    fn dump_length(&self) -> usize {
        Self::LENGTH
    }

    fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        self.common.write_bytes(&mut out);
        self.auto_pitch.write_bytes(&mut out);
        self.vocoder.write_bytes(&mut out);
        write_reserved(&mut out, RESERVED_AT_END);
        out
    }

    fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<(), PatchError> {
        let decoded = VocalEffectPatch::decode(bytes)?;
        self.copy_from(&decoded);
        Ok(())
    }

    fn reset(&mut self) {
        self.copy_from(&VocalEffectPatch::new());
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
        "vocal effect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldError;

    #[test]
    fn test_layout() {
        assert_eq!(VocalCommon::LENGTH, 5);
        assert_eq!(AutoPitch::LENGTH, 8);
        assert_eq!(Vocoder::LENGTH, 7);
        assert_eq!(VocalEffectPatch::LENGTH, 24);
        assert_eq!(VocalEffectPatch::new().get_bytes().len(), 24);
    }

    #[test]
    fn test_small_offsets() {
        let mut patch = VocalEffectPatch::new();
        patch.auto_pitch_mut().set_gender(-10).unwrap();
        patch.auto_pitch_mut().set_octave(1).unwrap();
        let bytes = patch.get_bytes();
        assert_eq!(bytes[5 + 5], 0x00);
        assert_eq!(bytes[5 + 6], 0x02);
        assert!(patch.auto_pitch_mut().set_octave(2).is_err());

        let mut bad = bytes.clone();
        bad[5 + 6] = 0x03;
        assert_eq!(
            VocalEffectPatch::decode(&bad),
            Err(PatchError::Field {
                field: "octave",
                source: FieldError::OutOfRange {
                    value: 2,
                    min: -1,
                    max: 1
                }
            })
        );
    }

    #[test]
    fn test_round_trip() {
        let mut patch = VocalEffectPatch::new();
        patch.common_mut().set_pan(-64).unwrap();
        patch.common_mut().set_output(VocalOutput::Direct).unwrap();
        patch
            .auto_pitch_mut()
            .set_scale(AutoPitchScale::MajorMinor)
            .unwrap();
        patch.vocoder_mut().set_mic_hpf(13).unwrap();

        let bytes = patch.get_bytes();
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[4], 0x04);
        assert_eq!(VocalEffectPatch::decode(&bytes).unwrap(), patch);

        let mut copy = VocalEffectPatch::new();
        copy.copy_from_patch(&patch).unwrap();
        assert_eq!(copy.get_bytes(), bytes);
        copy.reset();
        assert_eq!(copy, VocalEffectPatch::new());
    }
}
