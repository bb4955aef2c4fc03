// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Output format negotiation.
//!
//! The decoder proposes its candidate formats, hardware surfaces first, and the
//! [`FormatNegotiator`] picks the first one whose accelerator can be initialized for the stream.
//! Once an accelerator has been activated the stream is pinned to it: later negotiations can only
//! pick that same accelerator again, or a software format.

use std::sync::Arc;

use thiserror::Error;

use crate::accelerator::AcceleratorRegistry;
use crate::stream::ConfigError;
use crate::stream::HwStreamState;
use crate::PixelFormat;
use crate::Resolution;
use crate::StreamId;

/// Error returned when negotiation cannot select any format.
#[derive(Error, Debug)]
pub enum NegotiationError {
    /// The user explicitly requested an accelerator that failed to initialize.
    #[error("{name} hwaccel requested for input stream {stream}, but cannot be initialized: {source:#}")]
    AcceleratorUnavailable { name: &'static str, stream: StreamId, source: anyhow::Error },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Chooses the output format of streams among the candidates proposed by their decoder.
#[derive(Clone, Debug)]
pub struct FormatNegotiator {
    registry: Arc<AcceleratorRegistry>,
}

impl FormatNegotiator {
    pub fn new(registry: Arc<AcceleratorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AcceleratorRegistry {
        &self.registry
    }

    /// Selects a format among `candidates` for the stream whose state is `state`.
    ///
    /// `candidates` must list hardware formats before software ones: scanning stops at the first
    /// software format, which is returned as is. A hardware format is returned only if its
    /// accelerator has been initialized successfully, in which case the stream gets pinned to
    /// that accelerator.
    ///
    /// Returns `Ok(None)` if no candidate is acceptable, and an error if the accelerator
    /// explicitly requested for the stream could not be initialized. In the latter case no
    /// further candidate is considered.
    pub fn get_format(
        &self,
        state: &mut HwStreamState,
        stream: StreamId,
        coded_resolution: Resolution,
        candidates: &[PixelFormat],
    ) -> Result<Option<PixelFormat>, NegotiationError> {
        for &candidate in candidates {
            if !candidate.descriptor().is_hwaccel() {
                log::debug!("stream {}: selecting software format {}", stream, candidate);
                return Ok(Some(candidate));
            }

            let Some(accel) = self.registry.lookup(candidate) else {
                log::debug!("stream {}: no accelerator produces {}", stream, candidate);
                continue;
            };

            if let Some(active) = state.active_id() {
                if active != accel.id {
                    log::debug!("stream {}: skipping {}, pinned to {}", stream, accel.name, active);
                    continue;
                }
            }

            let selection = state.selection();
            if !selection.allows(accel.id) {
                log::debug!("stream {}: skipping {}, hwaccel is {}", stream, accel.name, selection);
                continue;
            }

            let params = state.accelerator_params(stream, coded_resolution);
            match accel.init(&params) {
                Ok(hooks) => {
                    state.activate(accel.id, candidate, hooks)?;
                    log::info!("stream {}: using {} hwaccel ({})", stream, accel.name, candidate);
                    return Ok(Some(candidate));
                }
                Err(source) if selection.is_explicit(accel.id) => {
                    let err = NegotiationError::AcceleratorUnavailable {
                        name: accel.name,
                        stream,
                        source,
                    };
                    log::error!("{}", err);
                    return Err(err);
                }
                Err(cause) => {
                    log::warn!(
                        "stream {}: {} hwaccel cannot be initialized, trying next format: {:#}",
                        stream,
                        accel.name,
                        cause
                    );
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::AcceleratorDescriptor;
    use crate::accelerator::AcceleratorHooks;
    use crate::accelerator::AcceleratorId;
    use crate::accelerator::HwAccelSelection;
    use crate::backend::dummy::Backend;
    use crate::stream::HwAccelConfig;

    const STREAM: StreamId = StreamId { file_index: 0, stream_index: 1 };
    const RESOLUTION: Resolution = Resolution { width: 320, height: 200 };

    fn negotiator(backends: &[(AcceleratorId, &Backend)]) -> FormatNegotiator {
        let registry: AcceleratorRegistry = backends
            .iter()
            .map(|(id, backend)| AcceleratorDescriptor::new(*id, Arc::new((*backend).clone())))
            .collect();
        FormatNegotiator::new(Arc::new(registry))
    }

    fn negotiate(
        negotiator: &FormatNegotiator,
        state: &mut HwStreamState,
        candidates: &[PixelFormat],
    ) -> Result<Option<PixelFormat>, NegotiationError> {
        negotiator.get_format(state, STREAM, RESOLUTION, candidates)
    }

    #[test]
    fn auto_selects_working_backend() {
        let _ = env_logger::try_init();
        let vaapi = Backend::new();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        let format =
            negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Yuv420p]);

        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));
        assert_eq!(state.active_id(), Some(AcceleratorId::Vaapi));
        assert_eq!(state.negotiated_format(), Some(PixelFormat::Vaapi));
        assert_eq!(vaapi.init_count(), 1);
    }

    #[test]
    fn auto_falls_back_to_software() {
        let _ = env_logger::try_init();
        let vaapi = Backend::failing();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        let format =
            negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Yuv420p]);

        assert_eq!(format.unwrap(), Some(PixelFormat::Yuv420p));
        assert_eq!(state.active_id(), None);
        assert_eq!(state.negotiated_format(), None);
        assert_eq!(vaapi.init_count(), 1);
    }

    #[test]
    fn auto_tries_next_backend_after_failure() {
        let vdpau = Backend::failing();
        let vaapi = Backend::new();
        let negotiator =
            negotiator(&[(AcceleratorId::Vdpau, &vdpau), (AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        let format = negotiate(
            &negotiator,
            &mut state,
            &[PixelFormat::Vdpau, PixelFormat::Vaapi, PixelFormat::Yuv420p],
        );

        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));
        assert_eq!(state.active_id(), Some(AcceleratorId::Vaapi));
        assert_eq!((vdpau.init_count(), vaapi.init_count()), (1, 1));
    }

    #[test]
    fn explicit_backend_failure_is_fatal() {
        let _ = env_logger::try_init();
        let vaapi = Backend::failing();
        let cuvid = Backend::new();
        let negotiator =
            negotiator(&[(AcceleratorId::Vaapi, &vaapi), (AcceleratorId::Cuvid, &cuvid)]);
        let mut state = HwStreamState::default();
        state.set_selection(HwAccelSelection::Backend(AcceleratorId::Vaapi)).unwrap();

        let err = negotiate(
            &negotiator,
            &mut state,
            &[PixelFormat::Vaapi, PixelFormat::Cuda, PixelFormat::Yuv420p],
        )
        .unwrap_err();

        match &err {
            NegotiationError::AcceleratorUnavailable { name, stream, .. } => {
                assert_eq!(*name, "vaapi");
                assert_eq!(*stream, STREAM);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().starts_with("vaapi hwaccel requested for input stream #0:1"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "no usable device at android");
        assert_eq!(state.active_id(), None);
        assert_eq!(cuvid.init_count(), 0);
    }

    #[test]
    fn explicit_backend_ignores_others() {
        let vdpau = Backend::new();
        let vaapi = Backend::new();
        let negotiator =
            negotiator(&[(AcceleratorId::Vdpau, &vdpau), (AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();
        state.set_selection(HwAccelSelection::Backend(AcceleratorId::Vaapi)).unwrap();

        let format = negotiate(
            &negotiator,
            &mut state,
            &[PixelFormat::Vdpau, PixelFormat::Vaapi, PixelFormat::Nv12],
        );

        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));
        assert_eq!(vdpau.init_count(), 0);
    }

    #[test]
    fn explicit_backend_absent_from_candidates() {
        let vdpau = Backend::new();
        let negotiator = negotiator(&[(AcceleratorId::Vdpau, &vdpau)]);
        let mut state = HwStreamState::default();
        state.set_selection(HwAccelSelection::Backend(AcceleratorId::Qsv)).unwrap();

        let format = negotiate(&negotiator, &mut state, &[PixelFormat::Vdpau, PixelFormat::Nv12]);

        assert_eq!(format.unwrap(), Some(PixelFormat::Nv12));
        assert_eq!(vdpau.init_count(), 0);
    }

    #[test]
    fn disabled_hwaccel_never_initializes() {
        let vaapi = Backend::new();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();
        state.set_selection(HwAccelSelection::None).unwrap();

        let format =
            negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Yuv420p]);

        assert_eq!(format.unwrap(), Some(PixelFormat::Yuv420p));
        assert_eq!(vaapi.init_count(), 0);
    }

    #[test]
    fn software_candidate_stops_scanning() {
        let vaapi = Backend::new();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        // Hardware formats after a software one are never considered.
        let format =
            negotiate(&negotiator, &mut state, &[PixelFormat::Nv12, PixelFormat::Vaapi]);

        assert_eq!(format.unwrap(), Some(PixelFormat::Nv12));
        assert_eq!(vaapi.init_count(), 0);
        assert_eq!(state.active_id(), None);
    }

    #[test]
    fn registry_miss_is_skipped() {
        let vaapi = Backend::new();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        let format = negotiate(
            &negotiator,
            &mut state,
            &[PixelFormat::D3d11, PixelFormat::DrmPrime, PixelFormat::Vaapi],
        );

        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));
    }

    #[test]
    fn exhausted_candidates_select_nothing() {
        let vaapi = Backend::failing();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        assert_eq!(negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi]).unwrap(), None);
        assert_eq!(negotiate(&negotiator, &mut state, &[]).unwrap(), None);
        assert_eq!(state.active_id(), None);
    }

    #[test]
    fn stream_stays_pinned() {
        let vdpau = Backend::new();
        let vaapi = Backend::new();
        let negotiator =
            negotiator(&[(AcceleratorId::Vdpau, &vdpau), (AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        let format = negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Nv12]);
        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));

        // A mid-stream format change cannot move the stream to another accelerator.
        let format = negotiate(&negotiator, &mut state, &[PixelFormat::Vdpau, PixelFormat::Nv12]);
        assert_eq!(format.unwrap(), Some(PixelFormat::Nv12));
        assert_eq!(vdpau.init_count(), 0);
        assert_eq!(state.active_id(), Some(AcceleratorId::Vaapi));
        assert_eq!(state.negotiated_format(), Some(PixelFormat::Vaapi));

        // But the pinned accelerator can be initialized again.
        let format = negotiate(&negotiator, &mut state, &[PixelFormat::Vdpau, PixelFormat::Vaapi]);
        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));
        assert_eq!(vaapi.init_count(), 2);
    }

    #[test]
    fn pinned_backend_failing_later_is_soft_in_auto_mode() {
        let vaapi = Backend::new();
        let negotiator = negotiator(&[(AcceleratorId::Vaapi, &vaapi)]);
        let mut state = HwStreamState::default();

        negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi]).unwrap();
        vaapi.set_init_fails(true);

        let format = negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Nv12]);
        assert_eq!(format.unwrap(), Some(PixelFormat::Nv12));
        // The failed attempt does not unpin the stream.
        assert_eq!(state.active_id(), Some(AcceleratorId::Vaapi));
    }

    #[test]
    fn stream_configuration_reaches_backend() {
        let descriptor = AcceleratorDescriptor::from_fn(AcceleratorId::Vaapi, |params| {
            anyhow::ensure!(params.lax_profile_check, "profile not supported");
            anyhow::ensure!(params.device == "/dev/dri/renderD128", "no device {}", params.device);
            anyhow::ensure!(params.coded_resolution == RESOLUTION, "wrong resolution");
            Ok(AcceleratorHooks::new())
        });
        let registry: AcceleratorRegistry = std::iter::once(descriptor).collect();
        let negotiator = FormatNegotiator::new(Arc::new(registry));
        assert_eq!(negotiator.registry().len(), 1);

        let mut state = HwStreamState::default();
        let format =
            negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Yuv420p]);
        assert_eq!(format.unwrap(), Some(PixelFormat::Yuv420p));

        state
            .configure(HwAccelConfig {
                device: "/dev/dri/renderD128".into(),
                lax_profile_check: true,
                ..Default::default()
            })
            .unwrap();
        assert!(state.config().lax_profile_check);

        let format =
            negotiate(&negotiator, &mut state, &[PixelFormat::Vaapi, PixelFormat::Yuv420p]);
        assert_eq!(format.unwrap(), Some(PixelFormat::Vaapi));
        assert_eq!(state.active_id(), Some(AcceleratorId::Vaapi));
    }
}
