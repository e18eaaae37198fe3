/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
// This crate will be called XiPalette whether Rust likes it or not.
#![allow(non_snake_case)]

//! Reading, editing and writing Roland JD-Xi patches over MIDI System
//! Exclusive.
//!
//! [patch] holds the editable patch models and their binary form, [sysex]
//! frames and inspects messages, and [transfer] runs the request/response
//! conversation with a device over whatever [transport] provides.

pub mod codec;
pub mod patch;
pub mod sysex;
pub mod transfer;
pub mod transport;
pub mod ui;
