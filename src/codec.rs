/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! Per-field byte encodings used by the JD-Xi parameter maps.
//!
//! Every parameter in a JD-Xi dump is a run of 7-bit data bytes. Most are a
//! single byte, either taken as-is, shifted by an offset so that a signed
//! value fits (the manual writes these as e.g. "1 - 127 (-63 - +63)"), a
//! 0/1 switch, or an index into a list. The effect parameters are the odd ones
//! out: four bytes, one nibble each.

use std::fmt::Debug;
use thiserror::Error;

/// The offset the JD-Xi uses for almost all of its bipolar parameters.
pub const SIGNED_OFFSET: u8 = 64;

/// The offset used by the four-nibble effect parameters.
pub const NIBBLES_OFFSET: i32 = 32768;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("byte {0:02X}h is not a valid switch value (expected 00h or 01h)")]
    MalformedBool(u8),
    #[error("byte {byte:02X}h is not a known {enumeration}")]
    UnknownVariant {
        enumeration: &'static str,
        byte: u8,
    },
    #[error("value {value} is outside {min}..={max}")]
    OutOfRange { value: i32, min: i32, max: i32 },
    #[error("byte {0:02X}h is not a MIDI data byte")]
    NotDataByte(u8),
    #[error("character {0:02X}h can't be used in a name")]
    InvalidCharacter(u8),
}

/// One parameter's value together with the rule for turning it into bytes.
///
/// `decode` is always given exactly `SIZE` bytes.
pub trait Field: Sized + Clone + PartialEq + Debug {
    /// What getters hand out and setters take.
    type Value;
    /// Number of bytes this field occupies in a dump.
    const SIZE: usize;

    /// Validates `value`. Out-of-range values are rejected, not clamped.
    fn new(value: Self::Value) -> Result<Self, FieldError>;
    fn get(&self) -> Self::Value;
    fn encode(&self, out: &mut Vec<u8>);
    fn decode(bytes: &[u8]) -> Result<Self, FieldError>;
}

fn data_byte(byte: u8) -> Result<u8, FieldError> {
    wmidi::U7::new(byte)
        .map(u8::from)
        .map_err(|_| FieldError::NotDataByte(byte))
}

fn check_range(value: i32, min: i32, max: i32) -> Result<(), FieldError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(FieldError::OutOfRange { value, min, max })
    }
}

pub fn encode_signed_offset(value: i8, offset: u8) -> Result<u8, FieldError> {
    let shifted = value as i32 + offset as i32;
    check_range(shifted, 0x00, 0x7F).map_err(|_| FieldError::OutOfRange {
        value: value as i32,
        min: -(offset as i32),
        max: 0x7F - offset as i32,
    })?;
    Ok(shifted as u8)
}

pub fn decode_signed_offset(byte: u8, offset: u8) -> Result<i8, FieldError> {
    let value = data_byte(byte)? as i32 - offset as i32;
    i8::try_from(value).map_err(|_| FieldError::OutOfRange {
        value,
        min: i8::MIN as i32,
        max: i8::MAX as i32,
    })
}

pub fn encode_bool(value: bool) -> u8 {
    if value {
        0x01
    } else {
        0x00
    }
}

pub fn decode_bool(byte: u8) -> Result<bool, FieldError> {
    match byte {
        0x00 => Ok(false),
        0x01 => Ok(true),
        _ => Err(FieldError::MalformedBool(byte)),
    }
}

/// Splits `value + 32768` into four nibbles, most significant first.
pub fn encode_nibbles(value: i32) -> [u8; 4] {
    let raw = (value + NIBBLES_OFFSET) as u16;
    [
        ((raw >> 12) & 0xF) as u8,
        ((raw >> 8) & 0xF) as u8,
        ((raw >> 4) & 0xF) as u8,
        (raw & 0xF) as u8,
    ]
}

pub fn decode_nibbles(bytes: [u8; 4]) -> Result<i32, FieldError> {
    let mut raw: i32 = 0;
    for byte in bytes {
        if byte > 0xF {
            return Err(FieldError::OutOfRange {
                value: byte as i32,
                min: 0x0,
                max: 0xF,
            });
        }
        raw = (raw << 4) | byte as i32;
    }
    Ok(raw - NIBBLES_OFFSET)
}

/// Plain value, stored as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsigned<const MIN: u8, const MAX: u8>(u8);

impl<const MIN: u8, const MAX: u8> Field for Unsigned<MIN, MAX> {
    type Value = u8;
    const SIZE: usize = 1;

    fn new(value: u8) -> Result<Self, FieldError> {
        check_range(value as i32, MIN as i32, MAX as i32)?;
        Ok(Self(value))
    }
    fn get(&self) -> u8 {
        self.0
    }
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.0);
    }
    fn decode(bytes: &[u8]) -> Result<Self, FieldError> {
        Self::new(data_byte(bytes[0])?)
    }
}

/// Bipolar value, stored as `value + OFFSET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signed<const MIN: i8, const MAX: i8, const OFFSET: u8 = 64>(i8);

impl<const MIN: i8, const MAX: i8, const OFFSET: u8> Field for Signed<MIN, MAX, OFFSET> {
    type Value = i8;
    const SIZE: usize = 1;

    fn new(value: i8) -> Result<Self, FieldError> {
        check_range(value as i32, MIN as i32, MAX as i32)?;
        Ok(Self(value))
    }
    fn get(&self) -> i8 {
        self.0
    }
    fn encode(&self, out: &mut Vec<u8>) {
        let byte = (self.0 as i16 + OFFSET as i16) as u8;
        // new() keeps this inside 00h..=7Fh for every range declared here.
        debug_assert!(byte <= 0x7F, "{} + {} is not a data byte", self.0, OFFSET);
        out.push(byte);
    }
    fn decode(bytes: &[u8]) -> Result<Self, FieldError> {
        Self::new(decode_signed_offset(bytes[0], OFFSET)?)
    }
}

impl Field for bool {
    type Value = bool;
    const SIZE: usize = 1;

    fn new(value: bool) -> Result<Self, FieldError> {
        Ok(value)
    }
    fn get(&self) -> bool {
        *self
    }
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(encode_bool(*self));
    }
    fn decode(bytes: &[u8]) -> Result<Self, FieldError> {
        decode_bool(bytes[0])
    }
}

/// Effect parameter in the four-nibble format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nibbles<const MIN: i32, const MAX: i32>(i32);

/// The range every JD-Xi effect parameter slot can hold.
pub type EffectValue = Nibbles<-20000, 20000>;

impl<const MIN: i32, const MAX: i32> Field for Nibbles<MIN, MAX> {
    type Value = i32;
    const SIZE: usize = 4;

    fn new(value: i32) -> Result<Self, FieldError> {
        check_range(value, MIN, MAX)?;
        Ok(Self(value))
    }
    fn get(&self) -> i32 {
        self.0
    }
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&encode_nibbles(self.0));
    }
    fn decode(bytes: &[u8]) -> Result<Self, FieldError> {
        let &[a, b, c, d] = bytes else {
            unreachable!("Nibbles::decode is always given SIZE bytes");
        };
        Self::new(decode_nibbles([a, b, c, d])?)
    }
}

/// Fixed-width ASCII name, padded with spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Name<const N: usize>([u8; N]);

impl<const N: usize> Field for Name<N> {
    type Value = String;
    const SIZE: usize = N;

    fn new(value: String) -> Result<Self, FieldError> {
        if value.len() > N {
            return Err(FieldError::OutOfRange {
                value: value.len() as i32,
                min: 0,
                max: N as i32,
            });
        }
        let mut bytes = [b' '; N];
        for (slot, byte) in bytes.iter_mut().zip(value.bytes()) {
            if !(0x20..=0x7E).contains(&byte) {
                return Err(FieldError::InvalidCharacter(byte));
            }
            *slot = byte;
        }
        Ok(Self(bytes))
    }
    fn get(&self) -> String {
        // Only printable ASCII gets in, so this is lossless.
        String::from_utf8_lossy(&self.0).trim_end().to_owned()
    }
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
    fn decode(bytes: &[u8]) -> Result<Self, FieldError> {
        let mut name = [b' '; N];
        for (slot, &byte) in name.iter_mut().zip(bytes) {
            if !(0x20..=0x7E).contains(&byte) {
                return Err(FieldError::InvalidCharacter(byte));
            }
            *slot = byte;
        }
        Ok(Self(name))
    }
}

/// Declares an enumeration stored as one byte per variant.
///
/// Each variant gets an explicit byte and a display name, e.g.
/// `Triangle = 0x00 => "TRI"`. Decoding a byte that no variant uses is an
/// error, never a wrap-around.
macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $byte:literal => $label:literal,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $byte,
            )*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub const fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                }
            }
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::codec::FieldError;
            fn try_from(byte: u8) -> Result<Self, Self::Error> {
                match byte {
                    $($byte => Ok($name::$variant),)*
                    _ => Err($crate::codec::FieldError::UnknownVariant {
                        enumeration: stringify!($name),
                        byte,
                    }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl $crate::codec::Field for $name {
            type Value = $name;
            const SIZE: usize = 1;

            fn new(value: $name) -> Result<Self, $crate::codec::FieldError> {
                Ok(value)
            }
            fn get(&self) -> $name {
                *self
            }
            fn encode(&self, out: &mut Vec<u8>) {
                out.push(u8::from(*self));
            }
            fn decode(bytes: &[u8]) -> Result<Self, $crate::codec::FieldError> {
                $name::try_from(bytes[0])
            }
        }
    };
}
pub(crate) use byte_enum;
