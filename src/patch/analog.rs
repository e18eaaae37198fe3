/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! The analog synth part's tone (64 bytes at `19 42 00 00`).

use super::{
    parameter_group, same_kind, write_reserved, ByteReader, ChangeBus, ParameterGroup, Patch,
    PatchError,
};
use crate::codec::{byte_enum, Name, Signed, Unsigned};
use std::any::Any;

byte_enum! {
    pub enum LfoShape {
        Triangle = 0x00 => "TRI",
        Sine = 0x01 => "SIN",
        Saw = 0x02 => "SAW",
        Square = 0x03 => "SQR",
        SampleAndHold = 0x04 => "S&H",
        Random = 0x05 => "RND",
    }
}

byte_enum! {
    /// Note length the LFO follows when tempo sync is on.
    pub enum SyncNote {
        Bars16 = 0x00 => "16",
        Bars12 = 0x01 => "12",
        Bars8 = 0x02 => "8",
        Bars4 = 0x03 => "4",
        Bars2 = 0x04 => "2",
        Whole = 0x05 => "1",
        DottedHalf = 0x06 => "3/4",
        HalfTriplet = 0x07 => "2/3",
        Half = 0x08 => "1/2",
        DottedQuarter = 0x09 => "3/8",
        WholeTriplet = 0x0A => "1/3",
        Quarter = 0x0B => "1/4",
        DottedEighth = 0x0C => "3/16",
        QuarterTriplet = 0x0D => "1/6",
        Eighth = 0x0E => "1/8",
        DottedSixteenth = 0x0F => "3/32",
        EighthTriplet = 0x10 => "1/12",
        Sixteenth = 0x11 => "1/16",
        SixteenthTriplet = 0x12 => "1/24",
        ThirtySecond = 0x13 => "1/32",
    }
}

byte_enum! {
    pub enum OscWaveform {
        Saw = 0x00 => "SAW",
        Triangle = 0x01 => "TRI",
        PulseSquare = 0x02 => "PW-SQR",
    }
}

byte_enum! {
    pub enum SubOscType {
        Off = 0x00 => "OFF",
        OctaveDown = 0x01 => "-1 OCT",
        TwoOctavesDown = 0x02 => "-2 OCT",
    }
}

byte_enum! {
    pub enum FilterType {
        Bypass = 0x00 => "BYPASS",
        LowPass = 0x01 => "LPF",
    }
}

type Level = Unsigned<0, 127>;
type Depth = Signed<-63, 63>;
type Keyfollow = Signed<-10, 10>;
type BendRange = Unsigned<0, 24>;

parameter_group! {
    pub struct ToneName {
        name / set_name: Name<12> = "Init Tone".to_owned(),
    }
}

parameter_group! {
    pub struct Lfo {
        shape / set_shape: LfoShape = LfoShape::Triangle,
        rate / set_rate: Level = 53,
        fade_time / set_fade_time: Level = 0,
        tempo_sync / set_tempo_sync: bool = false,
        sync_note / set_sync_note: SyncNote = SyncNote::Sixteenth,
        pitch_depth / set_pitch_depth: Depth = 0,
        filter_depth / set_filter_depth: Depth = 0,
        amp_depth / set_amp_depth: Depth = 0,
        key_trigger / set_key_trigger: bool = true,
    }
}

parameter_group! {
    pub struct Oscillator {
        waveform / set_waveform: OscWaveform = OscWaveform::Saw,
        /// Semitones.
        pitch_coarse / set_pitch_coarse: Signed<-24, 24> = 0,
        /// Cents.
        pitch_fine / set_pitch_fine: Signed<-50, 50> = 0,
        pulse_width / set_pulse_width: Level = 0,
        pulse_width_mod_depth / set_pulse_width_mod_depth: Level = 0,
        pitch_env_velocity_sens / set_pitch_env_velocity_sens: Depth = 0,
        pitch_env_attack / set_pitch_env_attack: Level = 0,
        pitch_env_decay / set_pitch_env_decay: Level = 0,
        pitch_env_depth / set_pitch_env_depth: Depth = 0,
        sub_oscillator / set_sub_oscillator: SubOscType = SubOscType::Off,
    }
}

parameter_group! {
    pub struct Filter {
        filter_type / set_filter_type: FilterType = FilterType::LowPass,
        cutoff / set_cutoff: Level = 127,
        /// In tens of percent, -100% to +100%.
        cutoff_keyfollow / set_cutoff_keyfollow: Keyfollow = 0,
        resonance / set_resonance: Level = 0,
        env_velocity_sens / set_env_velocity_sens: Depth = 0,
        env_attack / set_env_attack: Level = 0,
        env_decay / set_env_decay: Level = 0,
        env_sustain / set_env_sustain: Level = 127,
        env_release / set_env_release: Level = 0,
        env_depth / set_env_depth: Depth = 0,
    }
}

parameter_group! {
    pub struct Amplifier {
        level / set_level: Level = 127,
        level_keyfollow / set_level_keyfollow: Keyfollow = 0,
        level_velocity_sens / set_level_velocity_sens: Depth = 0,
        env_attack / set_env_attack: Level = 0,
        env_decay / set_env_decay: Level = 0,
        env_sustain / set_env_sustain: Level = 127,
        env_release / set_env_release: Level = 0,
    }
}

parameter_group! {
    pub struct Common {
        portamento / set_portamento: bool = false,
        portamento_time / set_portamento_time: Level = 20,
        legato / set_legato: bool = false,
        octave_shift / set_octave_shift: Signed<-3, 3> = 0,
        bend_range_up / set_bend_range_up: BendRange = 2,
        bend_range_down / set_bend_range_down: BendRange = 2,
    }
}

parameter_group! {
    /// How far the modulation wheel pushes each LFO destination.
    pub struct LfoModulation {
        pitch / set_pitch: Depth = 16,
        filter / set_filter: Depth = 0,
        amp / set_amp: Depth = 0,
        rate / set_rate: Depth = 18,
    }
}

const RESERVED_AFTER_NAME: usize = 1;
const RESERVED_AFTER_COMMON: usize = 1;
const RESERVED_AT_END: usize = 4;

#[derive(Debug)]
pub struct AnalogPatch {
    name: ToneName,
    lfo: Lfo,
    oscillator: Oscillator,
    filter: Filter,
    amplifier: Amplifier,
    common: Common,
    lfo_modulation: LfoModulation,
    bus: ChangeBus,
}

impl AnalogPatch {
    pub const LENGTH: usize = ToneName::LENGTH
        + RESERVED_AFTER_NAME
        + Lfo::LENGTH
        + Oscillator::LENGTH
        + Filter::LENGTH
        + Amplifier::LENGTH
        + Common::LENGTH
        + RESERVED_AFTER_COMMON
        + LfoModulation::LENGTH
        + RESERVED_AT_END;

    pub fn new() -> AnalogPatch {
        let mut patch = AnalogPatch {
            name: Default::default(),
            lfo: Default::default(),
            oscillator: Default::default(),
            filter: Default::default(),
            amplifier: Default::default(),
            common: Default::default(),
            lfo_modulation: Default::default(),
            bus: ChangeBus::new(),
        };
        patch.attach_groups();
        patch
    }

    fn attach_groups(&mut self) {
        self.name.attach(self.bus.scope("name"));
        self.lfo.attach(self.bus.scope("lfo"));
        self.oscillator.attach(self.bus.scope("oscillator"));
        self.filter.attach(self.bus.scope("filter"));
        self.amplifier.attach(self.bus.scope("amplifier"));
        self.common.attach(self.bus.scope("common"));
        self.lfo_modulation.attach(self.bus.scope("lfo_modulation"));
    }

    pub fn name(&self) -> &ToneName {
        &self.name
    }
    pub fn name_mut(&mut self) -> &mut ToneName {
        &mut self.name
    }
    pub fn lfo(&self) -> &Lfo {
        &self.lfo
    }
    pub fn lfo_mut(&mut self) -> &mut Lfo {
        &mut self.lfo
    }
    pub fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }
    pub fn oscillator_mut(&mut self) -> &mut Oscillator {
        &mut self.oscillator
    }
    pub fn filter(&self) -> &Filter {
        &self.filter
    }
    pub fn filter_mut(&mut self) -> &mut Filter {
        &mut self.filter
    }
    pub fn amplifier(&self) -> &Amplifier {
        &self.amplifier
    }
    pub fn amplifier_mut(&mut self) -> &mut Amplifier {
        &mut self.amplifier
    }
    pub fn common(&self) -> &Common {
        &self.common
    }
    pub fn common_mut(&mut self) -> &mut Common {
        &mut self.common
    }
    pub fn lfo_modulation(&self) -> &LfoModulation {
        &self.lfo_modulation
    }
    pub fn lfo_modulation_mut(&mut self) -> &mut LfoModulation {
        &mut self.lfo_modulation
    }

    fn copy_from(&mut self, other: &AnalogPatch) {
        self.name.copy_from(&other.name);
        self.lfo.copy_from(&other.lfo);
        self.oscillator.copy_from(&other.oscillator);
        self.filter.copy_from(&other.filter);
        self.amplifier.copy_from(&other.amplifier);
        self.common.copy_from(&other.common);
        self.lfo_modulation.copy_from(&other.lfo_modulation);
    }

    /// Decodes a detached patch (its own empty bus) from a 64-byte dump.
    pub fn decode(bytes: &[u8]) -> Result<AnalogPatch, PatchError> {
        let mut reader = ByteReader::new(bytes, Self::LENGTH)?;
        let name = reader.group()?;
        reader.reserved(RESERVED_AFTER_NAME);
        let lfo = reader.group()?;
        let oscillator = reader.group()?;
        let filter = reader.group()?;
        let amplifier = reader.group()?;
        let common = reader.group()?;
        reader.reserved(RESERVED_AFTER_COMMON);
        let lfo_modulation = reader.group()?;
        reader.reserved(RESERVED_AT_END);

        let mut patch = AnalogPatch::new();
        patch.name = name;
        patch.lfo = lfo;
        patch.oscillator = oscillator;
        patch.filter = filter;
        patch.amplifier = amplifier;
        patch.common = common;
        patch.lfo_modulation = lfo_modulation;
        // The groups came out of decode() detached.
        patch.attach_groups();
        Ok(patch)
    }
}

impl Default for AnalogPatch {
    fn default() -> Self {
        AnalogPatch::new()
    }
}

impl Clone for AnalogPatch {
    /// The clone gets its own bus; subscribers stay with the original.
    fn clone(&self) -> Self {
        let mut patch = AnalogPatch::new();
        patch.copy_from(self);
        patch
    }
}

impl PartialEq for AnalogPatch {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.lfo == other.lfo
            && self.oscillator == other.oscillator
            && self.filter == other.filter
            && self.amplifier == other.amplifier
            && self.common == other.common
            && self.lfo_modulation == other.lfo_modulation
    }
}

impl Patch for AnalogPatch {
    fn dump_length(&self) -> usize {
        Self::LENGTH
    }

    fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        self.name.write_bytes(&mut out);
        write_reserved(&mut out, RESERVED_AFTER_NAME);
        self.lfo.write_bytes(&mut out);
        self.oscillator.write_bytes(&mut out);
        self.filter.write_bytes(&mut out);
        self.amplifier.write_bytes(&mut out);
        self.common.write_bytes(&mut out);
        write_reserved(&mut out, RESERVED_AFTER_COMMON);
        self.lfo_modulation.write_bytes(&mut out);
        write_reserved(&mut out, RESERVED_AT_END);
        out
    }

    fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<(), PatchError> {
        let decoded = AnalogPatch::decode(bytes)?;
        self.copy_from(&decoded);
        Ok(())
    }

    fn reset(&mut self) {
        self.copy_from(&AnalogPatch::new());
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
        "analog tone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldError;
    use parking_lot::Mutex;
    use std::sync::mpsc;

    #[test]
    fn test_layout() {
        assert_eq!(ToneName::LENGTH, 12);
        assert_eq!(Lfo::LENGTH, 9);
        assert_eq!(Oscillator::LENGTH, 10);
        assert_eq!(Filter::LENGTH, 10);
        assert_eq!(Amplifier::LENGTH, 7);
        assert_eq!(Common::LENGTH, 6);
        assert_eq!(LfoModulation::LENGTH, 4);
        assert_eq!(AnalogPatch::LENGTH, 64);
    }

    #[test]
    fn test_default_bytes() {
        let bytes = AnalogPatch::new().get_bytes();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[..12], b"Init Tone   ");
        assert_eq!(bytes[0x0C], 0x00);
        // LFO: TRI, rate 53, fade 0, sync off, 1/16, depths 0, key trigger on.
        assert_eq!(
            &bytes[0x0D..0x16],
            [0x00, 53, 0, 0x00, 0x11, 0x40, 0x40, 0x40, 0x01]
        );
        // Modulation controls: +16, 0, 0, +18.
        assert_eq!(&bytes[0x38..0x3C], [0x50, 0x40, 0x40, 0x52]);
        assert_eq!(&bytes[0x3C..], [0x00; 4]);
    }

    #[test]
    fn test_round_trip() {
        let mut patch = AnalogPatch::new();
        patch.name_mut().set_name("Bass 1".to_owned()).unwrap();
        patch.lfo_mut().set_shape(LfoShape::SampleAndHold).unwrap();
        patch.oscillator_mut().set_pitch_coarse(-24).unwrap();
        patch.oscillator_mut().set_pitch_fine(50).unwrap();
        patch.filter_mut().set_cutoff_keyfollow(-10).unwrap();
        patch.common_mut().set_octave_shift(3).unwrap();
        patch.lfo_modulation_mut().set_rate(-63).unwrap();

        let bytes = patch.get_bytes();
        let mut decoded = AnalogPatch::new();
        decoded.copy_from_bytes(&bytes).unwrap();
        assert_eq!(decoded, patch);
        assert_eq!(decoded.get_bytes(), bytes);
    }

    #[test]
    fn test_reserved_bytes_ignored() {
        let mut bytes = AnalogPatch::new().get_bytes();
        bytes[0x0C] = 0x7F;
        bytes[0x37] = 0x12;
        bytes[0x3F] = 0x01;
        let decoded = AnalogPatch::decode(&bytes).unwrap();
        assert_eq!(decoded, AnalogPatch::new());
        assert_eq!(decoded.get_bytes(), AnalogPatch::new().get_bytes());
    }

    #[test]
    fn test_bad_dump_changes_nothing() {
        let mut patch = AnalogPatch::new();
        patch.filter_mut().set_cutoff(10).unwrap();
        let before = patch.get_bytes();

        assert_eq!(
            patch.copy_from_bytes(&before[..63]),
            Err(PatchError::SizeMismatch {
                expected: 64,
                actual: 63
            })
        );

        // Valid everywhere except the very last group's last field.
        let mut bad = AnalogPatch::new().get_bytes();
        bad[0x3B] = 0x80;
        assert_eq!(
            patch.copy_from_bytes(&bad),
            Err(PatchError::Field {
                field: "rate",
                source: FieldError::NotDataByte(0x80)
            })
        );

        let mut bad = AnalogPatch::new().get_bytes();
        bad[0x10] = 0x02; // tempo sync
        assert!(matches!(
            patch.copy_from_bytes(&bad),
            Err(PatchError::Field {
                field: "tempo_sync",
                ..
            })
        ));
        assert_eq!(patch.get_bytes(), before);
    }

    #[test]
    fn test_reset_notifies_changed_fields() {
        let mut patch = AnalogPatch::new();
        patch.amplifier_mut().set_level(90).unwrap();
        patch.lfo_mut().set_rate(1).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        patch
            .changes()
            .subscribe("", move |path| tx.lock().send(path.to_owned()).unwrap());
        patch.reset();

        let mut paths: Vec<String> = rx.try_iter().collect();
        paths.sort();
        assert_eq!(paths, ["amplifier.level", "lfo.rate"]);
        assert_eq!(patch, AnalogPatch::new());
    }

    #[test]
    fn test_cloned_lfo_is_detached() {
        let patch = AnalogPatch::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        patch
            .changes()
            .subscribe("", move |path| tx.lock().send(path.to_owned()).unwrap());

        let mut detached = patch.lfo().clone();
        detached.set_rate(1).unwrap();
        assert_eq!(detached.rate(), 1);
        assert_eq!(patch.lfo().rate(), 53);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_copy_from_patch() {
        let mut source = AnalogPatch::new();
        source.oscillator_mut().set_waveform(OscWaveform::PulseSquare).unwrap();
        let mut target = AnalogPatch::new();
        target.copy_from_patch(&source).unwrap();
        assert_eq!(target, source);

        let other = crate::patch::vocal_effect::VocalEffectPatch::new();
        assert_eq!(
            target.copy_from_patch(&other),
            Err(PatchError::UnsupportedCopy {
                target: "analog tone",
                from: "vocal effect"
            })
        );
        assert_eq!(target, source);
    }
}
