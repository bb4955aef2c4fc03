// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoded frames and the generic buffer allocator used when no accelerator is involved.

use bitflags::bitflags;
use thiserror::Error;

use crate::PixelFormat;
use crate::Resolution;

/// Stride alignment, in bytes, of the CPU planes allocated by [`default_get_buffer`].
pub const STRIDE_ALIGNMENT: usize = 32;

/// Error returned by frame buffer allocation.
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("{0} frames have no CPU layout")]
    UnsupportedFormat(PixelFormat),
    #[error("cannot allocate a frame of resolution {0:?}")]
    InvalidResolution(Resolution),
    #[error("not enough memory to allocate {0} bytes")]
    OutOfMemory(usize),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

bitflags! {
    /// Flags passed along with a buffer request.
    #[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct BufferFlags: u32 {
        /// The decoder will keep the frame as a reference for future frames.
        const REF = 1 << 0;
    }
}

/// Opaque handle to a surface owned by an accelerator backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// One CPU plane of a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
}

/// A frame being decoded, or decoded.
///
/// Software frames carry their content in `planes`. Frames in a hardware format carry a `surface`
/// instead, until they are retrieved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub format: PixelFormat,
    pub resolution: Resolution,
    pub timestamp: u64,
    pub planes: Vec<Plane>,
    pub surface: Option<SurfaceId>,
}

impl Frame {
    /// Creates a frame with no memory attached yet.
    pub fn new(format: PixelFormat, resolution: Resolution) -> Self {
        Self { format, resolution, timestamp: 0, planes: Vec::new(), surface: None }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether memory has been attached to this frame.
    pub fn is_allocated(&self) -> bool {
        self.surface.is_some() || !self.planes.is_empty()
    }
}

fn align_up(value: usize, alignment: usize) -> Option<usize> {
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Allocates zeroed CPU planes for `frame` according to its format and resolution.
///
/// Any memory previously attached to `frame` is released first. Hardware formats have no CPU
/// layout and cannot be served by this allocator. Resolutions whose planes cannot be addressed
/// are rejected with [`BufferError::InvalidResolution`].
pub fn default_get_buffer(frame: &mut Frame, _flags: BufferFlags) -> Result<(), BufferError> {
    let descriptor = frame.format.descriptor();
    if descriptor.is_hwaccel() {
        return Err(BufferError::UnsupportedFormat(frame.format));
    }
    if frame.resolution.is_empty() {
        return Err(BufferError::InvalidResolution(frame.resolution));
    }

    let resolution = frame.resolution;
    let invalid = || BufferError::InvalidResolution(resolution);
    let mut planes = Vec::with_capacity(descriptor.planes.len());
    for plane in descriptor.planes {
        let stride = plane
            .row_bytes(resolution.width)
            .and_then(|row_bytes| align_up(row_bytes, STRIDE_ALIGNMENT))
            .ok_or_else(invalid)?;
        let size = plane
            .rows(resolution.height)
            .and_then(|rows| stride.checked_mul(rows))
            .ok_or_else(invalid)?;

        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| BufferError::OutOfMemory(size))?;
        data.resize(size, 0);

        planes.push(Plane { data, stride });
    }

    frame.planes = planes;
    frame.surface = None;

    Ok(())
}
