/*
 * Part of XiPalette by hikari_no_yume.
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */
//! The patch model: parameter groups, patches built from them, and change
//! notification.
//!
//! A parameter group is a fixed-length run of fields, e.g. the LFO section of
//! an analog tone. A patch is a fixed sequence of groups and reserved bytes
//! that together make up one device dump. The order and sizes are the wire
//! format, so they live in the types and never depend on the bytes being
//! decoded.

pub mod analog;
pub mod effects;
pub mod vocal_effect;

use crate::codec::{Field, FieldError};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("bad value for {field}: {source}")]
    Field {
        field: &'static str,
        source: FieldError,
    },
    #[error("can't copy a {from} into a {target}")]
    UnsupportedCopy {
        target: &'static str,
        from: &'static str,
    },
}

/// A fixed-length cluster of fields.
///
/// Decoding always produces a fresh value which is then copied in, so a
/// failed decode never leaves a group half-updated.
pub trait ParameterGroup: Default + Clone + PartialEq + Debug {
    /// Number of bytes in this group's dump.
    const LENGTH: usize;

    fn write_bytes(&self, out: &mut Vec<u8>);

    /// Decodes a detached group (no change notifications) from exactly
    /// [Self::LENGTH] bytes.
    fn decode(bytes: &[u8]) -> Result<Self, PatchError>;

    /// Copies every field from `other`, notifying for each one that changed.
    fn copy_from(&mut self, other: &Self);

    /// Scopes this group's change notifications to a node of a patch.
    fn attach(&mut self, notifier: ChangeNotifier);

    fn get_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LENGTH);
        self.write_bytes(&mut out);
        debug_assert_eq!(out.len(), Self::LENGTH);
        out
    }

    fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<(), PatchError> {
        let decoded = Self::decode(bytes)?;
        self.copy_from(&decoded);
        Ok(())
    }

    /// Restores the factory defaults.
    fn reset(&mut self) {
        self.copy_from(&Self::default());
    }
}

/// A complete, independently dumpable set of parameters.
pub trait Patch: Any + Debug + Send {
    /// Number of bytes [Patch::get_bytes] produces.
    fn dump_length(&self) -> usize;

    fn get_bytes(&self) -> Vec<u8>;

    /// Replaces every parameter with the ones in `bytes`, or changes nothing
    /// if `bytes` is the wrong size or contains an invalid value.
    fn copy_from_bytes(&mut self, bytes: &[u8]) -> Result<(), PatchError>;

    fn reset(&mut self);

    /// Deep copy from another patch of the same kind.
    fn copy_from_patch(&mut self, other: &dyn Patch) -> Result<(), PatchError>;

    /// Bus carrying this patch's change notifications.
    fn changes(&self) -> &ChangeBus;

    fn as_any(&self) -> &dyn Any;

    fn kind_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Downcasts `other` for [Patch::copy_from_patch] implementations.
pub(crate) fn same_kind<'a, P: Patch>(
    target: &P,
    other: &'a dyn Patch,
) -> Result<&'a P, PatchError> {
    other
        .as_any()
        .downcast_ref::<P>()
        .ok_or(PatchError::UnsupportedCopy {
            target: target.kind_name(),
            from: other.kind_name(),
        })
}

type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Returned by [ChangeBus::subscribe], for [ChangeBus::unsubscribe].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscriptions {
    next_id: u64,
    entries: Vec<(SubscriptionId, String, Listener)>,
}

/// Change events for one patch, keyed by node path.
///
/// Paths look like `lfo.rate` or `effect1.parameters.param3`. A listener
/// subscribed to a prefix hears about every change underneath it, so
/// subscribing to `effect1` is the same as subscribing to each of its groups.
#[derive(Clone, Default)]
pub struct ChangeBus {
    subscriptions: Arc<Mutex<Subscriptions>>,
}
impl Debug for ChangeBus {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let count = self.subscriptions.lock().entries.len();
        write!(f, "ChangeBus({} listeners)", count)
    }
}
impl ChangeBus {
    pub fn new() -> ChangeBus {
        ChangeBus::default()
    }

    /// Calls `listener` with the full path of every change under `prefix`
    /// until it is unsubscribed. An empty prefix matches everything.
    pub fn subscribe(
        &self,
        prefix: &str,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut subscriptions = self.subscriptions.lock();
        let id = SubscriptionId(subscriptions.next_id);
        subscriptions.next_id += 1;
        subscriptions
            .entries
            .push((id, prefix.to_owned(), Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    ///
    /// A change being delivered on another thread at the same moment may
    /// still reach it once.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subscriptions = self.subscriptions.lock();
            let index = subscriptions
                .entries
                .iter()
                .position(|(entry_id, _, _)| *entry_id == id);
            index.map(|index| subscriptions.entries.remove(index))
        };
        // Dropping the closure runs its destructors, so not under the lock.
        removed.is_some()
    }

    /// Notifier for the node at `path`.
    pub fn scope(&self, path: &str) -> ChangeNotifier {
        ChangeNotifier {
            bus: Some(self.clone()),
            path: path.to_owned(),
        }
    }

    fn emit(&self, path: &str) {
        let matching: Vec<Listener> = self
            .subscriptions
            .lock()
            .entries
            .iter()
            .filter(|(_, prefix, _)| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| prefix.is_empty() || rest.is_empty() || rest.starts_with('.'))
            })
            .map(|(_, _, listener)| listener.clone())
            .collect();
        // Listeners may well edit the patch, so the lock must be gone by now.
        for listener in matching {
            listener(path);
        }
    }
}

/// A group's handle on its patch's [ChangeBus]. Groups that aren't part of a
/// patch (e.g. freshly decoded ones) have a detached notifier that does
/// nothing.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    bus: Option<ChangeBus>,
    path: String,
}
impl Debug for ChangeNotifier {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self.bus {
            Some(_) => write!(f, "ChangeNotifier({:?})", self.path),
            None => write!(f, "ChangeNotifier(detached)"),
        }
    }
}
impl ChangeNotifier {
    pub fn notify(&self, field: &str) {
        if let Some(bus) = &self.bus {
            bus.emit(&format!("{}.{}", self.path, field));
        }
    }

    /// Notifier for a node nested under this one.
    pub fn child(&self, name: &str) -> ChangeNotifier {
        ChangeNotifier {
            bus: self.bus.clone(),
            path: format!("{}.{}", self.path, name),
        }
    }
}

/// Slices a dump into fixed-size pieces, front to back.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
}
impl<'a> ByteReader<'a> {
    /// Fails unless `bytes` is exactly `expected` long.
    pub fn new(bytes: &'a [u8], expected: usize) -> Result<ByteReader<'a>, PatchError> {
        if bytes.len() != expected {
            return Err(PatchError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(ByteReader { bytes })
    }

    fn take(&mut self, count: usize) -> &'a [u8] {
        // The layouts are constant and add up to the length checked in new(),
        // so running short here is a bug in a layout, not bad input.
        let (head, rest) = self.bytes.split_at(count);
        self.bytes = rest;
        head
    }

    pub fn field<F: Field>(&mut self, name: &'static str) -> Result<F, PatchError> {
        F::decode(self.take(F::SIZE)).map_err(|source| PatchError::Field {
            field: name,
            source,
        })
    }

    pub fn group<G: ParameterGroup>(&mut self) -> Result<G, PatchError> {
        G::decode(self.take(G::LENGTH))
    }

    /// Raw bytes, e.g. one component of a multi-part patch.
    pub fn bytes(&mut self, count: usize) -> &'a [u8] {
        self.take(count)
    }

    /// Skips reserved bytes. Their content is ignored.
    pub fn reserved(&mut self, count: usize) {
        self.take(count);
    }

}

/// Appends `count` reserved bytes.
pub fn write_reserved(out: &mut Vec<u8>, count: usize) {
    out.resize(out.len() + count, 0x00);
}

/// Declares a [ParameterGroup] made of [Field]s.
///
/// Each line is `getter / setter: FieldType = factory default,`. The group's
/// length is the sum of its fields' sizes and the byte order is the order the
/// fields are listed in.
macro_rules! parameter_group {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident / $setter:ident : $ty:ty = $default:expr,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        $vis struct $name {
            $($field: $ty,)*
            notifier: $crate::patch::ChangeNotifier,
        }

        impl $name {
            $(
                $(#[$fmeta])*
                pub fn $field(&self) -> <$ty as $crate::codec::Field>::Value {
                    $crate::codec::Field::get(&self.$field)
                }

                pub fn $setter(
                    &mut self,
                    value: <$ty as $crate::codec::Field>::Value,
                ) -> Result<(), $crate::codec::FieldError> {
                    let value = <$ty as $crate::codec::Field>::new(value)?;
                    if value != self.$field {
                        self.$field = value;
                        self.notifier.notify(stringify!($field));
                    }
                    Ok(())
                }
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                $name {
                    $(
                        $field: <$ty as $crate::codec::Field>::new($default)
                            .expect(concat!("factory default of ", stringify!($field))),
                    )*
                    notifier: $crate::patch::ChangeNotifier::default(),
                }
            }
        }

        /// The copy is detached: it doesn't notify the original's patch.
        impl Clone for $name {
            fn clone(&self) -> Self {
                $name {
                    $($field: self.$field.clone(),)*
                    notifier: $crate::patch::ChangeNotifier::default(),
                }
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                true $(&& self.$field == other.$field)*
            }
        }

        impl $crate::patch::ParameterGroup for $name {
            const LENGTH: usize = 0 $(+ <$ty as $crate::codec::Field>::SIZE)*;

            fn write_bytes(&self, out: &mut Vec<u8>) {
                $($crate::codec::Field::encode(&self.$field, out);)*
            }

            fn decode(bytes: &[u8]) -> Result<Self, $crate::patch::PatchError> {
                #[allow(unused_mut)]
                let mut reader = $crate::patch::ByteReader::new(bytes, Self::LENGTH)?;
                Ok($name {
                    $($field: reader.field(stringify!($field))?,)*
                    notifier: $crate::patch::ChangeNotifier::default(),
                })
            }

            fn copy_from(&mut self, other: &Self) {
                $(
                    if self.$field != other.$field {
                        self.$field = other.$field.clone();
                        self.notifier.notify(stringify!($field));
                    }
                )*
            }

            fn attach(&mut self, notifier: $crate::patch::ChangeNotifier) {
                self.notifier = notifier;
            }
        }
    };
}
pub(crate) use parameter_group;
