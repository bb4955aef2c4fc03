// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-stream hardware acceleration state.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::accelerator::AcceleratorHooks;
use crate::accelerator::AcceleratorId;
use crate::accelerator::AcceleratorParams;
use crate::accelerator::HwAccelSelection;
use crate::accelerator::SurfaceAllocator;
use crate::accelerator::SurfaceRetriever;
use crate::PixelFormat;
use crate::Resolution;
use crate::StreamId;

/// Device selector handed to backends unless the host configures another one.
pub const DEFAULT_HWACCEL_DEVICE: &str = "android";

/// Software format requested from backends unless the host configures another one.
pub const DEFAULT_OUTPUT_FORMAT: PixelFormat = PixelFormat::Yuv420p;

const UNSET_FORMAT: u32 = u32::MAX;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} accelerator is already active on this stream")]
    AcceleratorActive(AcceleratorId),
}

/// Hardware acceleration settings of a stream, set by the host before decoding starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HwAccelConfig {
    pub selection: HwAccelSelection,
    pub device: String,
    pub output_format: PixelFormat,
    pub lax_profile_check: bool,
}

impl Default for HwAccelConfig {
    fn default() -> Self {
        Self {
            selection: HwAccelSelection::Auto,
            device: DEFAULT_HWACCEL_DEVICE.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT,
            lax_profile_check: false,
        }
    }
}

/// The accelerator a stream has been pinned to.
#[derive(Debug)]
struct ActiveAccelerator {
    id: AcceleratorId,
    format: PixelFormat,
    hooks: AcceleratorHooks,
}

/// Hardware acceleration state of one decode stream.
///
/// The active accelerator and the negotiated format are set together by a successful
/// negotiation, and the accelerator can never change afterwards.
#[derive(Debug)]
pub struct HwStreamState {
    config: HwAccelConfig,
    active: Option<ActiveAccelerator>,
    /// Format of the last retrieved frame, or `UNSET_FORMAT`.
    retrieved_format: AtomicU32,
}

impl Default for HwStreamState {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl HwStreamState {
    pub fn new(config: HwAccelConfig) -> Self {
        Self { config, active: None, retrieved_format: AtomicU32::new(UNSET_FORMAT) }
    }

    pub fn config(&self) -> &HwAccelConfig {
        &self.config
    }

    pub fn selection(&self) -> HwAccelSelection {
        self.config.selection
    }

    pub fn device(&self) -> &str {
        &self.config.device
    }

    pub fn output_format(&self) -> PixelFormat {
        self.config.output_format
    }

    fn ensure_configurable(&self) -> Result<(), ConfigError> {
        match &self.active {
            Some(active) => Err(ConfigError::AcceleratorActive(active.id)),
            None => Ok(()),
        }
    }

    /// Replaces the whole configuration. Only possible until an accelerator is active.
    pub fn configure(&mut self, config: HwAccelConfig) -> Result<(), ConfigError> {
        self.ensure_configurable()?;
        self.config = config;
        Ok(())
    }

    pub fn set_selection(&mut self, selection: HwAccelSelection) -> Result<(), ConfigError> {
        self.ensure_configurable()?;
        self.config.selection = selection;
        Ok(())
    }

    pub fn set_device(&mut self, device: impl Into<String>) -> Result<(), ConfigError> {
        self.ensure_configurable()?;
        self.config.device = device.into();
        Ok(())
    }

    pub fn set_output_format(&mut self, format: PixelFormat) -> Result<(), ConfigError> {
        self.ensure_configurable()?;
        self.config.output_format = format;
        Ok(())
    }

    /// The accelerator this stream is pinned to, if negotiation succeeded.
    pub fn active_id(&self) -> Option<AcceleratorId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// The hardware format chosen by negotiation, if any.
    pub fn negotiated_format(&self) -> Option<PixelFormat> {
        self.active.as_ref().map(|a| a.format)
    }

    /// Format of the last frame that went through retrieval.
    pub fn retrieved_format(&self) -> Option<PixelFormat> {
        PixelFormat::n(self.retrieved_format.load(Ordering::Acquire))
    }

    pub(crate) fn set_retrieved_format(&self, format: PixelFormat) {
        self.retrieved_format.store(format as u32, Ordering::Release);
    }

    pub(crate) fn allocator(&self) -> Option<&dyn SurfaceAllocator> {
        self.active.as_ref()?.hooks.allocator.as_deref()
    }

    pub(crate) fn retriever(&self) -> Option<&dyn SurfaceRetriever> {
        self.active.as_ref()?.hooks.retriever.as_deref()
    }

    /// Pins the stream to accelerator `id`, producing `format`.
    ///
    /// Activating the already active accelerator again replaces its hooks.
    pub(crate) fn activate(
        &mut self,
        id: AcceleratorId,
        format: PixelFormat,
        hooks: AcceleratorHooks,
    ) -> Result<(), ConfigError> {
        if let Some(active) = &self.active {
            if active.id != id {
                return Err(ConfigError::AcceleratorActive(active.id));
            }
        }

        self.active = Some(ActiveAccelerator { id, format, hooks });
        Ok(())
    }

    /// Parameters describing this stream to a backend's `init`.
    pub fn accelerator_params(
        &self,
        stream: StreamId,
        coded_resolution: Resolution,
    ) -> AcceleratorParams<'_> {
        AcceleratorParams {
            stream,
            coded_resolution,
            device: &self.config.device,
            output_format: self.config.output_format,
            lax_profile_check: self.config.lax_profile_check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let state = HwStreamState::default();
        assert_eq!(state.selection(), HwAccelSelection::Auto);
        assert_eq!(state.device(), "android");
        assert_eq!(state.output_format(), PixelFormat::Yuv420p);
        assert_eq!(state.active_id(), None);
        assert_eq!(state.negotiated_format(), None);
        assert_eq!(state.retrieved_format(), None);
        assert!(state.allocator().is_none());
        assert!(state.retriever().is_none());
    }

    #[test]
    fn accelerator_is_write_once() {
        let mut state = HwStreamState::default();
        state.activate(AcceleratorId::Vaapi, PixelFormat::Vaapi, AcceleratorHooks::new()).unwrap();
        // Renegotiating the same backend is allowed.
        state.activate(AcceleratorId::Vaapi, PixelFormat::Vaapi, AcceleratorHooks::new()).unwrap();

        assert_eq!(
            state.activate(AcceleratorId::Vdpau, PixelFormat::Vdpau, AcceleratorHooks::new()),
            Err(ConfigError::AcceleratorActive(AcceleratorId::Vaapi))
        );
        assert_eq!(state.active_id(), Some(AcceleratorId::Vaapi));
        assert_eq!(state.negotiated_format(), Some(PixelFormat::Vaapi));
    }

    #[test]
    fn configuration_locked_after_activation() {
        let mut state = HwStreamState::default();
        state.set_selection(HwAccelSelection::Backend(AcceleratorId::Qsv)).unwrap();
        state.set_device("/dev/dri/renderD129").unwrap();
        state.set_output_format(PixelFormat::Nv12).unwrap();

        let params = state.accelerator_params(StreamId::new(1, 2), Resolution::from((64, 48)));
        assert_eq!(params.device, "/dev/dri/renderD129");
        assert_eq!(params.output_format, PixelFormat::Nv12);
        assert_eq!(params.stream, StreamId::new(1, 2));

        state.activate(AcceleratorId::Qsv, PixelFormat::Qsv, AcceleratorHooks::new()).unwrap();
        assert!(state.set_device("other").is_err());
        assert!(state.configure(HwAccelConfig::default()).is_err());
        assert_eq!(state.device(), "/dev/dri/renderD129");
    }

    #[test]
    fn retrieved_format_round_trips() {
        let state = HwStreamState::default();
        state.set_retrieved_format(PixelFormat::Nv12);
        assert_eq!(state.retrieved_format(), Some(PixelFormat::Nv12));
    }
}
