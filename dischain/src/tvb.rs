//! Read-only views into packet bytes, and the unsigned decoder built on top of them.

use std::ops::BitOr;
use std::sync::Arc;

use crate::error::BoundsError;

/// Encoding flags for a field. Only the little endian bit changes how integers are decoded; the
/// remaining values exist so that chains can carry the same flag words a renderer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Encoding(pub u32);

impl Encoding {
    pub const BIG_ENDIAN: Self = Self(0x0000_0000);
    pub const LITTLE_ENDIAN: Self = Self(0x8000_0000);
    pub const NA: Self = Self(0x0000_0000);
    pub const ASCII: Self = Self(0x0000_0000);
    pub const UTF_8: Self = Self(0x0000_0002);

    pub const fn is_little_endian(self) -> bool {
        self.0 & Self::LITTLE_ENDIAN.0 != 0
    }
}

impl BitOr for Encoding {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Identifies which buffer a byte range lives in. `Frame` is the packet handed to
/// [`Engine::dissect`](crate::Engine::dissect); `Derived(i)` is the `i`th data source registered in
/// [`PacketInfo`](crate::PacketInfo) by a pushed sub-buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Frame,
    Derived(usize),
}

#[derive(Debug, Clone)]
enum Backing<'p> {
    Borrowed(&'p [u8]),
    Owned(Arc<[u8]>),
}

/// A window onto a buffer. Cloning is cheap: borrowed frames are a slice, pushed sub-buffers are
/// reference counted.
///
/// Offsets passed to the accessors are relative to the window, while [`Tvb::start`] reports where
/// the window begins inside its source. Tree items are recorded in source coordinates.
#[derive(Debug, Clone)]
pub struct Tvb<'p> {
    backing: Backing<'p>,
    source: SourceId,
    start: usize,
    len: usize,
}

impl<'p> Tvb<'p> {
    /// Wraps the packet bytes.
    pub fn new(data: &'p [u8]) -> Self {
        Self {
            backing: Backing::Borrowed(data),
            source: SourceId::Frame,
            start: 0,
            len: data.len(),
        }
    }

    /// Wraps an independently owned buffer, e.g. a pushed sub-buffer.
    pub(crate) fn owned(data: Arc<[u8]>, source: SourceId) -> Self {
        let len = data.len();
        Self {
            backing: Backing::Owned(data),
            source,
            start: 0,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Position of the first byte of this window inside its source.
    pub fn start(&self) -> usize {
        self.start
    }

    /// All bytes visible through this window.
    pub fn bytes(&self) -> &[u8] {
        let all: &[u8] = match &self.backing {
            Backing::Borrowed(data) => data,
            Backing::Owned(data) => data,
        };
        &all[self.start..self.start + self.len]
    }

    /// Whether both windows cover the same range of the same source.
    pub fn same_as(&self, other: &Tvb) -> bool {
        self.source == other.source && self.start == other.start && self.len == other.len
    }

    pub fn ensure(&self, offset: usize, length: usize) -> Result<(), BoundsError> {
        let err = BoundsError {
            offset,
            length,
            available: self.len,
        };
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(err),
        }
    }

    /// Number of bytes from `offset` to the end of the window.
    pub fn remaining(&self, offset: usize) -> Result<usize, BoundsError> {
        self.ensure(offset, 0)?;
        Ok(self.len - offset)
    }

    pub fn get_bytes(&self, offset: usize, length: usize) -> Result<&[u8], BoundsError> {
        self.ensure(offset, length)?;
        Ok(&self.bytes()[offset..offset + length])
    }

    /// A new window over `[offset, offset + length)` of this one.
    pub fn subset(&self, offset: usize, length: usize) -> Result<Tvb<'p>, BoundsError> {
        self.ensure(offset, length)?;
        Ok(Tvb {
            backing: self.backing.clone(),
            source: self.source,
            start: self.start + offset,
            len: length,
        })
    }

    pub fn decode_unsigned(
        &self,
        offset: usize,
        length: usize,
        encoding: Encoding,
    ) -> Result<u32, BoundsError> {
        decode_unsigned(self.bytes(), offset, length, encoding)
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8, BoundsError> {
        Ok(self.decode_unsigned(offset, 1, Encoding::BIG_ENDIAN)? as u8)
    }

    pub fn get_ntohs(&self, offset: usize) -> Result<u16, BoundsError> {
        Ok(self.decode_unsigned(offset, 2, Encoding::BIG_ENDIAN)? as u16)
    }

    pub fn get_letohs(&self, offset: usize) -> Result<u16, BoundsError> {
        Ok(self.decode_unsigned(offset, 2, Encoding::LITTLE_ENDIAN)? as u16)
    }

    pub fn get_ntoh24(&self, offset: usize) -> Result<u32, BoundsError> {
        self.decode_unsigned(offset, 3, Encoding::BIG_ENDIAN)
    }

    pub fn get_letoh24(&self, offset: usize) -> Result<u32, BoundsError> {
        self.decode_unsigned(offset, 3, Encoding::LITTLE_ENDIAN)
    }

    pub fn get_ntohl(&self, offset: usize) -> Result<u32, BoundsError> {
        self.decode_unsigned(offset, 4, Encoding::BIG_ENDIAN)
    }

    pub fn get_letohl(&self, offset: usize) -> Result<u32, BoundsError> {
        self.decode_unsigned(offset, 4, Encoding::LITTLE_ENDIAN)
    }
}

/// Reads `length` bytes at `offset` as an unsigned integer, zero extended to 32 bits.
///
/// Only lengths 1 to 4 are decoded. Any other length yields `Ok(0)` without touching the buffer;
/// compiled chains depend on this, so it is kept rather than reported as an error.
pub fn decode_unsigned(
    buf: &[u8],
    offset: usize,
    length: usize,
    encoding: Encoding,
) -> Result<u32, BoundsError> {
    if !(1..=4).contains(&length) {
        return Ok(0);
    }
    let bytes = offset
        .checked_add(length)
        .and_then(|end| buf.get(offset..end))
        .ok_or(BoundsError {
            offset,
            length,
            available: buf.len(),
        })?;

    let fold = |acc: u32, b: &u8| (acc << 8) | *b as u32;
    let value = if encoding.is_little_endian() {
        bytes.iter().rev().fold(0, fold)
    } else {
        bytes.iter().fold(0, fold)
    };
    Ok(value)
}

/// Reads the 2-byte big endian length which prefixes a message, so that a framing layer knows how
/// many bytes to hand to [`Engine::dissect`](crate::Engine::dissect).
pub fn message_length(bytes: &[u8], offset: usize) -> Result<u16, BoundsError> {
    Ok(decode_unsigned(bytes, offset, 2, Encoding::BIG_ENDIAN)? as u16)
}
