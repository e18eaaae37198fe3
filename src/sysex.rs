/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! MIDI System Exclusive message (SysEx) parsing and framing.
//!
//! SysExes are an extensibility feature of the MIDI standard and almost always
//! vendor-specific, so a fully general parser is not possible. The only
//! dialect understood here is Roland's, and for anything else a generic
//! "unknown" kind is given back. Building and strict validation of the
//! messages the JD-Xi exchanges lives in [roland].
//!
//! The main reference here was the _MIDI 1.0 Detailed Specification_.

pub mod roland;

use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, PartialEq, Eq)]
pub enum ParseFailure {
    NotSysEx,
    IncompleteSysEx,
    /// A byte between `F0h` and `F7h` had its top bit set.
    NotDataByte { position: usize, byte: u8 },
}

pub type ManufacturerId = u8;
pub const MF_ID_ROLAND: ManufacturerId = 0x41;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// Hex dump in the usual `F0 41 10 ...` style.
pub fn format_bytes(bytes: &[u8]) -> FormattedBytes<'_> {
    FormattedBytes(bytes)
}

pub struct FormattedBytes<'a>(&'a [u8]);
impl Display for FormattedBytes<'_> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        for (i, byte) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ParsedSysEx<'a> {
    pub manufacturer_id: ManufacturerId,
    pub content: MaybeParsed<'a, ParsedSysExBody<'a>>,
}
impl Display for ParsedSysEx<'_> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self.manufacturer_id {
            MF_ID_ROLAND => write!(f, "Roland")?,
            other => write!(f, "Manufacturer {:02X}h", other)?,
        }
        write!(f, ": {}", self.content)?;
        Ok(())
    }
}

/// Contains a parsed version of something, if it was understood, or otherwise
/// the unparsed form, if it wasn't.
#[derive(Debug)]
pub enum MaybeParsed<'a, T> {
    Parsed(T),
    Unknown(&'a [u8]),
}
impl<T> Display for MaybeParsed<'_, T>
where
    T: Display,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            MaybeParsed::Parsed(parsed) => write!(f, "{}", parsed),
            MaybeParsed::Unknown(bytes) => write!(f, "(unknown) {}", format_bytes(bytes)),
        }
    }
}

#[derive(Debug)]
pub enum ParsedSysExBody<'a> {
    Roland(roland::ParsedRolandSysExBody<'a>),
}
impl Display for ParsedSysExBody<'_> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            ParsedSysExBody::Roland(parsed) => write!(f, "{}", parsed),
        }
    }
}

/// Interprets one complete SysEx for display. Unlike
/// [roland::validate_and_unwrap] this is lenient: anything framed correctly
/// parses, and what isn't understood is kept as raw bytes.
pub fn parse_sysex(data: &[u8]) -> Result<ParsedSysEx, ParseFailure> {
    let &[SYSEX_START, ref data @ ..] = data else {
        return Err(ParseFailure::NotSysEx);
    };
    let &[ref data @ .., SYSEX_END] = data else {
        return Err(ParseFailure::IncompleteSysEx);
    };

    if let Some((position, &byte)) = data.iter().enumerate().find(|(_, &byte)| byte > 0x7F) {
        return Err(ParseFailure::NotDataByte {
            position: position + 1,
            byte,
        });
    }

    let &[manufacturer_id, ref data @ ..] = data else {
        return Err(ParseFailure::IncompleteSysEx);
    };

    let content = match (manufacturer_id, data) {
        (MF_ID_ROLAND, body) => roland::parse_sysex_body(body).map(ParsedSysExBody::Roland),
        _ => Err(()),
    }
    .map_or(MaybeParsed::Unknown(data), |parsed| {
        MaybeParsed::Parsed(parsed)
    });

    Ok(ParsedSysEx {
        manufacturer_id,
        content,
    })
}

/// Splits a `.syx`-style stream of back-to-back SysExes into messages.
///
/// Each message runs from an `F0h` to the next `F7h`. Bytes outside a message
/// are skipped. A trailing message with no `F7h` is returned as-is so the
/// caller can report it as incomplete.
pub fn split_sysex_stream(stream: &[u8]) -> Vec<&[u8]> {
    let mut messages = Vec::new();
    let mut rest = stream;
    while let Some(start) = rest.iter().position(|&byte| byte == SYSEX_START) {
        rest = &rest[start..];
        // A new F0h before any F7h means the previous message was cut off.
        let end = rest[1..]
            .iter()
            .position(|&byte| byte == SYSEX_END || byte == SYSEX_START)
            .map(|i| i + 1);
        match end {
            Some(end) if rest[end] == SYSEX_END => {
                messages.push(&rest[..=end]);
                rest = &rest[end + 1..];
            }
            Some(end) => {
                messages.push(&rest[..end]);
                rest = &rest[end..];
            }
            None => {
                messages.push(rest);
                break;
            }
        }
    }
    messages
}
