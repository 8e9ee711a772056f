//! Dispatch keys and key sets.

use std::fmt;
use std::ops::{BitAnd, BitOr};

/// A capability tag attached to a value.
///
/// Discriminant order is priority order: a larger discriminant is consulted
/// first by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DispatchKey {
    Cpu = 0,
    Cuda,
    Xla,
    AutogradCpu,
    AutogradCuda,
    AutogradXla,
    /// Marks a value as a `TensorWrapper`.
    GradWrapper,
    /// Marks a value as a `BatchedTensor`.
    Batched,
    /// Entry point for an active transformation layer. Never carried by a
    /// value; enters the key set through the dispatcher's local include set.
    DynamicLayerFront,
}

impl DispatchKey {
    /// All keys, lowest priority first.
    pub const ALL: [DispatchKey; 9] = [
        DispatchKey::Cpu,
        DispatchKey::Cuda,
        DispatchKey::Xla,
        DispatchKey::AutogradCpu,
        DispatchKey::AutogradCuda,
        DispatchKey::AutogradXla,
        DispatchKey::GradWrapper,
        DispatchKey::Batched,
        DispatchKey::DynamicLayerFront,
    ];

    #[inline]
    const fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

/// A device tag. Selects the backend and autograd keys of a plain tensor.
///
/// All kernels in this crate run on host memory; the device only changes
/// routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
    Xla,
}

impl Device {
    pub fn backend_key(self) -> DispatchKey {
        match self {
            Device::Cpu => DispatchKey::Cpu,
            Device::Cuda => DispatchKey::Cuda,
            Device::Xla => DispatchKey::Xla,
        }
    }

    pub fn autograd_key(self) -> DispatchKey {
        match self {
            Device::Cpu => DispatchKey::AutogradCpu,
            Device::Cuda => DispatchKey::AutogradCuda,
            Device::Xla => DispatchKey::AutogradXla,
        }
    }
}

/// An unordered set of [`DispatchKey`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DispatchKeySet {
    bits: u32,
}

impl DispatchKeySet {
    pub const EMPTY: DispatchKeySet = DispatchKeySet { bits: 0 };

    /// Build a set from a slice of keys (usable in constants).
    pub const fn from_keys(keys: &[DispatchKey]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < keys.len() {
            bits |= keys[i].bit();
            i += 1;
        }
        Self { bits }
    }

    pub const fn single(key: DispatchKey) -> Self {
        Self { bits: key.bit() }
    }

    #[must_use]
    pub const fn add(self, key: DispatchKey) -> Self {
        Self {
            bits: self.bits | key.bit(),
        }
    }

    #[must_use]
    pub const fn remove(self, key: DispatchKey) -> Self {
        Self {
            bits: self.bits & !key.bit(),
        }
    }

    #[inline]
    pub const fn has(self, key: DispatchKey) -> bool {
        self.bits & key.bit() != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub const fn len(self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Keys not in `other`.
    #[must_use]
    pub const fn difference(self, other: DispatchKeySet) -> Self {
        Self {
            bits: self.bits & !other.bits,
        }
    }

    /// Keys of strictly lower priority than `key`.
    #[must_use]
    pub const fn below(self, key: DispatchKey) -> Self {
        Self {
            bits: self.bits & (key.bit() - 1),
        }
    }

    pub fn highest_priority_key(self) -> Option<DispatchKey> {
        self.iter().next()
    }

    /// Iterate keys from highest to lowest priority.
    pub fn iter(self) -> impl Iterator<Item = DispatchKey> {
        DispatchKey::ALL
            .into_iter()
            .rev()
            .filter(move |&key| self.has(key))
    }
}

impl BitOr for DispatchKeySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl BitAnd for DispatchKeySet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self {
            bits: self.bits & rhs.bits,
        }
    }
}

impl FromIterator<DispatchKey> for DispatchKeySet {
    fn from_iter<I: IntoIterator<Item = DispatchKey>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, |set, key| set.add(key))
    }
}

impl fmt::Debug for DispatchKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
