/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! Roland SysEx framing and parsing.
//!
//! Roland's exclusive messages all follow what the manuals call "Type IV":
//! manufacturer, device ID, model ID, command, then a command-specific body
//! that ends in a checksum. The JD-Xi uses a four-byte model ID and
//! four-byte addresses, and only two commands matter to it: DT1 (data set),
//! which carries parameter data, and RQ1 (data request), which asks the device
//! to send a DT1 back.

use super::{format_bytes, MaybeParsed, SYSEX_END, SYSEX_START};
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

pub use super::MF_ID_ROLAND;

pub type DeviceId = u8;

pub type ModelId = &'static [u8];

pub type CommandId = u8;

/// "Data set 1" aka "DT1".
pub const CM_ID_DT1: CommandId = 0x12;
/// "Data request 1" aka "RQ1".
pub const CM_ID_RQ1: CommandId = 0x11;

/// JD-Xi model ID.
pub const MODEL_ID_JD_XI: [u8; 4] = [0x00, 0x00, 0x00, 0x0E];

/// The JD-Xi's factory device ID. It answers to this unless it was changed on
/// the device.
pub const DEFAULT_DEVICE_ID: DeviceId = 0x10;

pub const ADDRESS_SIZE: usize = 4;

/// `F0h`, manufacturer, device, four model ID bytes, command.
pub const HEADER_LENGTH: usize = 8;

/// Everything in a JD-Xi DT1 except the payload: header, address, checksum and
/// `F7h`.
pub const FRAMING_LENGTH: usize = HEADER_LENGTH + ADDRESS_SIZE + 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("not a SysEx message")]
    NotSysEx,
    #[error("message is only {length} bytes long")]
    Truncated { length: usize },
    #[error("not a JD-Xi data set message")]
    UnexpectedHeader,
    #[error("byte {byte:02X}h at position {position} is not a data byte")]
    NotDataByte { position: usize, byte: u8 },
    #[error("checksum is {actual:02X}h but should be {expected:02X}h")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// A JD-Xi parameter address: model area, section, group, offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    pub const fn new(area: u8, section: u8, group: u8, offset: u8) -> Address {
        Address([area, section, group, offset])
    }

    /// The same address with a different group byte, e.g. to go from the
    /// program effects' base address to one effect block.
    pub const fn with_group(self, group: u8) -> Address {
        let [area, section, _, offset] = self.0;
        Address([area, section, group, offset])
    }

    pub const fn group(&self) -> u8 {
        self.0[2]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", format_bytes(&self.0))
    }
}

/// Roland checksum: the value that brings the sum of address, data and
/// checksum to a multiple of 128.
///
/// The sum is taken modulo 128, so two bytes that differ by exactly 128 sum
/// the same. Only 7-bit bytes can appear in a valid message though, and
/// [validate_and_unwrap] rejects any byte with the top bit set before it
/// looks at the checksum.
pub fn checksum(address: &[u8], data: &[u8]) -> u8 {
    let sum = address
        .iter()
        .chain(data)
        .fold(0u8, |sum, &byte| sum.wrapping_add(byte) & 0x7F);
    (0x80 - sum) & 0x7F
}

/// Checks a checksum that is already at the end of `data_including_checksum`.
pub fn validate_checksum(data_including_checksum: &[u8]) -> bool {
    let mut sum: u8 = 0;
    for &byte in data_including_checksum {
        if byte > 0x7F {
            return false;
        }
        sum = (sum + byte) & 0x7F;
    }
    sum == 0
}

/// Encodes an RQ1 size as four 7-bit bytes, most significant first.
pub fn encode_size(size: usize) -> [u8; 4] {
    [
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]
}

pub fn decode_size(bytes: [u8; 4]) -> usize {
    bytes
        .iter()
        .fold(0, |size, &byte| (size << 7) | (byte & 0x7F) as usize)
}

fn build_message(
    device_id: DeviceId,
    command_id: CommandId,
    address: &Address,
    body: &[u8],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(FRAMING_LENGTH + body.len());
    message.push(SYSEX_START);
    message.push(MF_ID_ROLAND);
    message.push(device_id);
    message.extend_from_slice(&MODEL_ID_JD_XI);
    message.push(command_id);
    message.extend_from_slice(address.bytes());
    message.extend_from_slice(body);
    message.push(checksum(address.bytes(), body));
    message.push(SYSEX_END);
    message
}

/// Builds a DT1 message carrying `payload` for `address`.
pub fn build_data_message(device_id: DeviceId, address: &Address, payload: &[u8]) -> Vec<u8> {
    build_message(device_id, CM_ID_DT1, address, payload)
}

/// Builds an RQ1 message asking for `length` bytes starting at `address`.
pub fn build_request_message(device_id: DeviceId, address: &Address, length: usize) -> Vec<u8> {
    build_message(device_id, CM_ID_RQ1, address, &encode_size(length))
}

/// Strictly validates a JD-Xi DT1 message and returns its address and payload.
///
/// The device ID isn't checked, since a device set to a different ID still
/// answers requests sent to it.
pub fn validate_and_unwrap(raw: &[u8]) -> Result<(Address, &[u8]), FramingError> {
    if raw.first() != Some(&SYSEX_START) || raw.last() != Some(&SYSEX_END) {
        return Err(FramingError::NotSysEx);
    }
    if raw.len() < FRAMING_LENGTH {
        return Err(FramingError::Truncated { length: raw.len() });
    }

    let header = &raw[..HEADER_LENGTH];
    if header[1] != MF_ID_ROLAND || header[3..7] != MODEL_ID_JD_XI || header[7] != CM_ID_DT1 {
        return Err(FramingError::UnexpectedHeader);
    }

    let inner = &raw[1..raw.len() - 1];
    for (i, &byte) in inner.iter().enumerate() {
        if wmidi::U7::new(byte).is_err() {
            return Err(FramingError::NotDataByte {
                position: i + 1,
                byte,
            });
        }
    }

    let body = &raw[HEADER_LENGTH..raw.len() - 1];
    let (address, rest) = body.split_at(ADDRESS_SIZE);
    let (payload, &[actual]) = rest.split_at(rest.len() - 1) else {
        return Err(FramingError::Truncated { length: raw.len() });
    };
    let expected = checksum(address, payload);
    if expected != actual {
        return Err(FramingError::ChecksumMismatch { expected, actual });
    }

    let mut address_bytes = [0; ADDRESS_SIZE];
    address_bytes.copy_from_slice(address);
    Ok((Address(address_bytes), payload))
}

#[derive(Debug)]
pub enum ParsedRolandSysExBody<'a> {
    /// The "Type IV" format described in the module docs.
    ///
    /// The `device_id`, `model_id` and `command_id` are raw parsing results.
    /// The `model_name` is an interpretation that is the result of a lookup.
    /// `command` is a hybrid of course.
    TypeIV {
        device_id: DeviceId,
        model_id: &'a [u8],
        model_name: Option<&'static str>,
        command_id: CommandId,
        command: MaybeParsed<'a, ParsedRolandSysExCommand<'a>>,
    },
}
impl Display for ParsedRolandSysExBody<'_> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            &ParsedRolandSysExBody::TypeIV {
                device_id,
                model_id,
                model_name,
                command_id,
                ref command,
            } => {
                write!(f, "Device {:02X}h, ", device_id)?;
                match model_name {
                    Some(model_name) => write!(f, "{}", model_name)?,
                    _ => write!(f, "Model {}", format_bytes(model_id))?,
                }
                if let MaybeParsed::Unknown(_) = command {
                    write!(f, ", Command {:02X}h", command_id)?
                }
                write!(f, ": {}", command)?;
            }
        }
        Ok(())
    }
}

#[allow(clippy::result_unit_err)] // not much explanation can be given really
pub fn parse_sysex_body(body: &[u8]) -> Result<ParsedRolandSysExBody, ()> {
    let &[device_id, ref body @ ..] = body else {
        return Err(());
    };

    let model_info = MODELS
        .iter()
        .find(|model| body.starts_with(model.model_id));

    // Without knowing the model, we can't tell where the model ID ends. The
    // older Roland devices all used one byte, so assume that.
    let Some(model_info) = model_info else {
        let &[_, command_id, ref rest @ ..] = body else {
            return Err(());
        };
        return Ok(ParsedRolandSysExBody::TypeIV {
            device_id,
            model_id: &body[..1],
            model_name: None,
            command_id,
            command: MaybeParsed::Unknown(rest),
        });
    };

    let body = &body[model_info.model_id.len()..];
    let &[command_id, ref body @ ..] = body else {
        return Err(());
    };

    let command = match parse_sysex_command(model_info, command_id, body) {
        Ok(parsed) => MaybeParsed::Parsed(parsed),
        Err(()) => MaybeParsed::Unknown(body),
    };

    Ok(ParsedRolandSysExBody::TypeIV {
        device_id,
        model_id: model_info.model_id,
        model_name: Some(model_info.name),
        command_id,
        command,
    })
}

#[derive(Debug)]
pub enum ParsedRolandSysExCommand<'a> {
    /// "Data set 1" aka "DT1". The `address` and `data` are the raw parsing
    /// results, whereas the other fields are interpretation.
    DT1 {
        address: &'a [u8],
        data: &'a [u8],
        /// Was the checksum correct? Wrong checksums are tolerated because this
        /// is more helpful in MIDI debugging than displaying no info.
        valid_checksum: bool,
        /// The block the address falls in, if it could be found.
        block: Option<&'static Block>,
        /// If the block is known, whether the data is a complete dump of it.
        /// Tolerated for the same reason as invalid checksums.
        invalid_size: bool,
    },
    /// "Data request 1" aka "RQ1".
    RQ1 {
        address: &'a [u8],
        size: usize,
        valid_checksum: bool,
        block: Option<&'static Block>,
    },
}

fn write_block_and_address(
    f: &mut Formatter,
    block: Option<&'static Block>,
    address: &[u8],
) -> FmtResult {
    match block {
        Some(block) => write!(f, "{} § {}", block.name, format_bytes(address)),
        None => write!(f, "(unknown) {}", format_bytes(address)),
    }
}

impl Display for ParsedRolandSysExCommand<'_> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            &ParsedRolandSysExCommand::DT1 {
                address,
                data,
                valid_checksum,
                block,
                invalid_size,
            } => {
                write!(f, "Data set 1: ")?;
                write_block_and_address(f, block, address)?;
                write!(
                    f,
                    " => {} bytes{}{}",
                    data.len(),
                    if invalid_size { " (WRONG SIZE)" } else { "" },
                    if valid_checksum {
                        ""
                    } else {
                        " (WRONG CHECKSUM)"
                    }
                )
            }
            &ParsedRolandSysExCommand::RQ1 {
                address,
                size,
                valid_checksum,
                block,
            } => {
                write!(f, "Data request 1: ")?;
                write_block_and_address(f, block, address)?;
                write!(
                    f,
                    ", {} bytes{}",
                    size,
                    if valid_checksum {
                        ""
                    } else {
                        " (WRONG CHECKSUM)"
                    }
                )
            }
        }
    }
}

#[allow(clippy::result_unit_err)] // not much explanation can be given really
pub fn parse_sysex_command<'a>(
    model_info: &ModelInfo,
    command_id: CommandId,
    body: &'a [u8],
) -> Result<ParsedRolandSysExCommand<'a>, ()> {
    // Both commands need an address and a checksum byte.
    let address_end = model_info.address_size as usize;
    if body.len() < address_end + 1 {
        return Err(());
    }
    let checksum_begin = body.len() - 1;
    let address = &body[..address_end];
    let data = &body[address_end..checksum_begin];
    let valid_checksum = validate_checksum(body);
    let block = look_up_block(model_info, address);

    match command_id {
        CM_ID_DT1 => Ok(ParsedRolandSysExCommand::DT1 {
            address,
            data,
            valid_checksum,
            block,
            invalid_size: block.is_some_and(|block| block.size != data.len()),
        }),
        CM_ID_RQ1 => {
            let &[a, b, c, d] = data else {
                return Err(());
            };
            Ok(ParsedRolandSysExCommand::RQ1 {
                address,
                size: decode_size([a, b, c, d]),
                valid_checksum,
                block,
            })
        }
        _ => Err(()),
    }
}

/// Uses the model's block table to find the block an address starts.
pub fn look_up_block(model_info: &ModelInfo, address: &[u8]) -> Option<&'static Block> {
    model_info
        .blocks
        .iter()
        .find(|block| block.address.bytes() == address)
}

/// Model-specific information.
///
/// `address_size` is the number of bytes used by an address for a DT1 or RQ1
/// command. This is constant for a particular model, but varies between
/// models.
pub struct ModelInfo {
    pub model_id: ModelId,
    pub name: &'static str,
    pub address_size: u8,
    pub blocks: &'static [Block],
}

/// A dumpable parameter block: where it starts, what it's called and how many
/// bytes a complete dump of it has.
#[derive(Debug)]
pub struct Block {
    pub address: Address,
    pub name: &'static str,
    pub size: usize,
}

// The maps are in their own module to keep this one small.
pub mod maps;
pub use maps::MODELS;
