/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! Address maps, following the JD-Xi's _MIDI Implementation_ document.
//!
//! Only the blocks this crate can dump or request are listed. The JD-Xi has
//! many more (system settings, the digital synth parts, the drum kit).

use super::{Address, Block, ModelInfo, MODEL_ID_JD_XI};

pub const MODELS: &[&ModelInfo] = &[&JD_XI];

const JD_XI: ModelInfo = ModelInfo {
    model_id: &MODEL_ID_JD_XI,
    name: "Roland JD-Xi",
    address_size: 4,
    blocks: JD_XI_BLOCKS,
};

/// Temporary tone of the analog synth part.
pub const ANALOG_TONE_ADDRESS: Address = Address::new(0x19, 0x42, 0x00, 0x00);

/// Temporary program's effects. The group byte picks the block.
pub const PROGRAM_EFFECTS_ADDRESS: Address = Address::new(0x18, 0x00, 0x00, 0x00);

pub const PROGRAM_VOCAL_EFFECT_ADDRESS: Address = PROGRAM_EFFECTS_ADDRESS.with_group(0x01);
pub const PROGRAM_EFFECT_1_ADDRESS: Address = PROGRAM_EFFECTS_ADDRESS.with_group(0x02);
pub const PROGRAM_EFFECT_2_ADDRESS: Address = PROGRAM_EFFECTS_ADDRESS.with_group(0x04);
pub const PROGRAM_DELAY_ADDRESS: Address = PROGRAM_EFFECTS_ADDRESS.with_group(0x06);
pub const PROGRAM_REVERB_ADDRESS: Address = PROGRAM_EFFECTS_ADDRESS.with_group(0x08);

const JD_XI_BLOCKS: &[Block] = &[
    Block {
        address: PROGRAM_VOCAL_EFFECT_ADDRESS,
        name: "Program Vocal Effect",
        size: 24,
    },
    Block {
        address: PROGRAM_EFFECT_1_ADDRESS,
        name: "Program Effect 1",
        size: 145,
    },
    Block {
        address: PROGRAM_EFFECT_2_ADDRESS,
        name: "Program Effect 2",
        size: 145,
    },
    Block {
        address: PROGRAM_DELAY_ADDRESS,
        name: "Program Delay",
        size: 100,
    },
    Block {
        address: PROGRAM_REVERB_ADDRESS,
        name: "Program Reverb",
        size: 99,
    },
    Block {
        address: ANALOG_TONE_ADDRESS,
        name: "Analog Synth Tone",
        size: 64,
    },
];
