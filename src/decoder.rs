// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoder-side entry points.
//!
//! A [`DecoderContext`] stands for the host decoder's per-stream context. [`DecoderContext::init`]
//! attaches the hardware acceleration state to it and installs the negotiation and allocation
//! callbacks, after which the host forwards its callbacks to [`DecoderContext::get_format`],
//! [`DecoderContext::get_buffer`] and [`DecoderContext::retrieve_frame`].
//!
//! Negotiation needs exclusive access to the context while allocation and retrieval only need a
//! shared one, so the latter can run from several worker threads at once but never while a
//! negotiation is in progress.

use std::sync::Arc;

use thiserror::Error;

use crate::accelerator::AcceleratorRegistry;
use crate::dispatch;
use crate::frame::BufferError;
use crate::frame::BufferFlags;
use crate::frame::Frame;
use crate::negotiator::FormatNegotiator;
use crate::negotiator::NegotiationError;
use crate::stream::ConfigError;
use crate::stream::HwStreamState;
use crate::PixelFormat;
use crate::Resolution;
use crate::StreamId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no hardware acceleration state attached to stream {0}")]
    NotInitialized(StreamId),
    #[error("hardware acceleration state already attached to stream {0}")]
    AlreadyInitialized(StreamId),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to retrieve frame: {0:#}")]
    Retrieve(anyhow::Error),
}

/// Callbacks installed on a stream by [`DecoderContext::init`].
#[derive(Debug)]
struct HwAccel {
    negotiator: FormatNegotiator,
    state: HwStreamState,
}

/// Per-stream decoder context.
#[derive(Debug)]
pub struct DecoderContext {
    stream: StreamId,
    coded_resolution: Resolution,
    hwaccel: Option<HwAccel>,
    thread_safe_callbacks: bool,
    refcounted_frames: bool,
}

impl DecoderContext {
    pub fn new(stream: StreamId, coded_resolution: Resolution) -> Self {
        Self {
            stream,
            coded_resolution,
            hwaccel: None,
            thread_safe_callbacks: false,
            refcounted_frames: false,
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn coded_resolution(&self) -> Resolution {
        self.coded_resolution
    }

    /// Updates the coded resolution, e.g. when the stream changes format mid-way.
    pub fn set_coded_resolution(&mut self, resolution: Resolution) {
        self.coded_resolution = resolution;
    }

    /// Whether the host may invoke the allocation and retrieval callbacks from several threads.
    pub fn thread_safe_callbacks(&self) -> bool {
        self.thread_safe_callbacks
    }

    /// Whether decoded frames are reference counted, so the client may keep them around.
    pub fn refcounted_frames(&self) -> bool {
        self.refcounted_frames
    }

    pub fn is_initialized(&self) -> bool {
        self.hwaccel.is_some()
    }

    /// Attaches a fresh hardware acceleration state using the default configuration, with
    /// accelerators picked from `registry`.
    pub fn init(&mut self, registry: Arc<AcceleratorRegistry>) -> Result<()> {
        if self.hwaccel.is_some() {
            return Err(Error::AlreadyInitialized(self.stream));
        }

        self.hwaccel = Some(HwAccel {
            negotiator: FormatNegotiator::new(registry),
            state: HwStreamState::default(),
        });
        self.thread_safe_callbacks = true;
        self.refcounted_frames = true;
        log::debug!("stream {}: hwaccel state attached", self.stream);

        Ok(())
    }

    /// Releases the hardware acceleration state, if any. Calling this more than once is harmless.
    pub fn deinit(&mut self) {
        if self.hwaccel.take().is_some() {
            log::debug!("stream {}: hwaccel state released", self.stream);
        }
    }

    /// Hardware acceleration state of the stream, if attached.
    pub fn hw_state(&self) -> Option<&HwStreamState> {
        self.hwaccel.as_ref().map(|h| &h.state)
    }

    /// Mutable access to the state, for configuring it before decoding starts.
    pub fn hw_state_mut(&mut self) -> Option<&mut HwStreamState> {
        self.hwaccel.as_mut().map(|h| &mut h.state)
    }

    fn state(&self) -> Result<&HwStreamState> {
        self.hw_state().ok_or(Error::NotInitialized(self.stream))
    }

    /// Format negotiation callback. See [`FormatNegotiator::get_format`].
    pub fn get_format(&mut self, candidates: &[PixelFormat]) -> Result<Option<PixelFormat>> {
        let hwaccel = self.hwaccel.as_mut().ok_or(Error::NotInitialized(self.stream))?;
        let format = hwaccel.negotiator.get_format(
            &mut hwaccel.state,
            self.stream,
            self.coded_resolution,
            candidates,
        )?;

        Ok(format)
    }

    /// Buffer allocation callback. See [`dispatch::get_buffer`].
    pub fn get_buffer(&self, frame: &mut Frame, flags: BufferFlags) -> Result<()> {
        dispatch::get_buffer(self.state()?, frame, flags)?;
        Ok(())
    }

    /// Post-decode retrieval. See [`dispatch::retrieve_frame`].
    pub fn retrieve_frame(&self, frame: &mut Frame) -> Result<()> {
        dispatch::retrieve_frame(self.state()?, frame).map_err(Error::Retrieve)
    }
}
