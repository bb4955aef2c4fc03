// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Accelerator backends and their descriptors.
//!
//! An accelerator backend is a hardware-specific decode path such as VAAPI or VDPAU. This crate
//! does not know how any of them decode: it only needs an [`AcceleratorBackend::init`] entry point
//! per backend, and optionally the allocation and retrieval hooks that a successful `init`
//! returns.

pub mod registry;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::frame::BufferFlags;
use crate::frame::Frame;
use crate::PixelFormat;
use crate::Resolution;
use crate::StreamId;

pub use registry::AcceleratorRegistry;

/// Identifies an accelerator backend.
///
/// The declaration order is the precedence order used when the platform table is built.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AcceleratorId {
    Vdpau,
    Dxva2,
    Vda,
    VideoToolbox,
    Qsv,
    Vaapi,
    Cuvid,
}

impl AcceleratorId {
    pub const ALL: [AcceleratorId; 7] = [
        AcceleratorId::Vdpau,
        AcceleratorId::Dxva2,
        AcceleratorId::Vda,
        AcceleratorId::VideoToolbox,
        AcceleratorId::Qsv,
        AcceleratorId::Vaapi,
        AcceleratorId::Cuvid,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AcceleratorId::Vdpau => "vdpau",
            AcceleratorId::Dxva2 => "dxva2",
            AcceleratorId::Vda => "vda",
            AcceleratorId::VideoToolbox => "videotoolbox",
            AcceleratorId::Qsv => "qsv",
            AcceleratorId::Vaapi => "vaapi",
            AcceleratorId::Cuvid => "cuvid",
        }
    }

    /// Pixel format of the surfaces produced by this backend.
    pub fn target_format(&self) -> PixelFormat {
        match self {
            AcceleratorId::Vdpau => PixelFormat::Vdpau,
            AcceleratorId::Dxva2 => PixelFormat::Dxva2Vld,
            AcceleratorId::Vda => PixelFormat::Vda,
            AcceleratorId::VideoToolbox => PixelFormat::VideoToolbox,
            AcceleratorId::Qsv => PixelFormat::Qsv,
            AcceleratorId::Vaapi => PixelFormat::Vaapi,
            AcceleratorId::Cuvid => PixelFormat::Cuda,
        }
    }

    /// Whether support for this backend has been enabled at build time.
    pub fn is_compiled_in(&self) -> bool {
        match self {
            AcceleratorId::Vdpau => cfg!(feature = "vdpau"),
            AcceleratorId::Dxva2 => cfg!(feature = "dxva2"),
            AcceleratorId::Vda => cfg!(feature = "vda"),
            AcceleratorId::VideoToolbox => cfg!(feature = "videotoolbox"),
            AcceleratorId::Qsv => cfg!(feature = "qsv"),
            AcceleratorId::Vaapi => cfg!(feature = "vaapi"),
            AcceleratorId::Cuvid => cfg!(feature = "cuvid"),
        }
    }

    /// Returns the backends enabled at build time, in precedence order.
    pub fn compiled_in() -> Vec<AcceleratorId> {
        Self::ALL.into_iter().filter(AcceleratorId::is_compiled_in).collect()
    }
}

impl fmt::Display for AcceleratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AcceleratorId {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|id| id.name() == s).ok_or(
            "unrecognized accelerator. Valid values: vdpau, dxva2, vda, videotoolbox, qsv, vaapi, \
             cuvid",
        )
    }
}

/// Which accelerator a stream is allowed to use.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HwAccelSelection {
    /// Hardware decoding is disabled, only software formats are selected.
    None,
    /// Try every registered backend in table order.
    #[default]
    Auto,
    /// Only the given backend may be used, and failing to initialize it is fatal.
    Backend(AcceleratorId),
}

impl HwAccelSelection {
    /// Whether a backend with `id` may be tried under this selection.
    pub fn allows(&self, id: AcceleratorId) -> bool {
        match self {
            HwAccelSelection::None => false,
            HwAccelSelection::Auto => true,
            HwAccelSelection::Backend(requested) => *requested == id,
        }
    }

    /// Whether `id` has been explicitly requested by the user.
    pub fn is_explicit(&self, id: AcceleratorId) -> bool {
        matches!(self, HwAccelSelection::Backend(requested) if *requested == id)
    }
}

impl fmt::Display for HwAccelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HwAccelSelection::None => f.write_str("none"),
            HwAccelSelection::Auto => f.write_str("auto"),
            HwAccelSelection::Backend(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl FromStr for HwAccelSelection {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(HwAccelSelection::None),
            "auto" => Ok(HwAccelSelection::Auto),
            _ => s.parse().map(HwAccelSelection::Backend),
        }
    }
}

/// Parameters passed to a backend when it is initialized for a stream.
#[derive(Copy, Clone, Debug)]
pub struct AcceleratorParams<'a> {
    pub stream: StreamId,
    pub coded_resolution: Resolution,
    /// Platform device selector, e.g. a DRM render node.
    pub device: &'a str,
    /// Software format frames should be converted to when they are retrieved.
    pub output_format: PixelFormat,
    /// Let the backend attempt decoding of profiles it does not officially support.
    pub lax_profile_check: bool,
}

/// Allocates backend surfaces for frames in the negotiated format.
pub trait SurfaceAllocator: Send + Sync {
    fn get_buffer(&self, frame: &mut Frame, flags: BufferFlags) -> anyhow::Result<()>;
}

/// Makes the content of a decoded backend surface available to the client.
///
/// Implementations typically download the surface into CPU planes and change the format of
/// `frame` accordingly.
pub trait SurfaceRetriever: Send + Sync {
    fn retrieve(&self, frame: &mut Frame) -> anyhow::Result<()>;
}

impl<F> SurfaceAllocator for F
where
    F: Fn(&mut Frame, BufferFlags) -> anyhow::Result<()> + Send + Sync,
{
    fn get_buffer(&self, frame: &mut Frame, flags: BufferFlags) -> anyhow::Result<()> {
        self(frame, flags)
    }
}

impl<F> SurfaceRetriever for F
where
    F: Fn(&mut Frame) -> anyhow::Result<()> + Send + Sync,
{
    fn retrieve(&self, frame: &mut Frame) -> anyhow::Result<()> {
        self(frame)
    }
}

/// Hooks installed on a stream after its accelerator has been successfully initialized.
#[derive(Default)]
pub struct AcceleratorHooks {
    pub allocator: Option<Box<dyn SurfaceAllocator>>,
    pub retriever: Option<Box<dyn SurfaceRetriever>>,
}

impl AcceleratorHooks {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_allocator(mut self, allocator: impl SurfaceAllocator + 'static) -> Self {
        self.allocator = Some(Box::new(allocator));
        self
    }

    pub fn with_retriever(mut self, retriever: impl SurfaceRetriever + 'static) -> Self {
        self.retriever = Some(Box::new(retriever));
        self
    }
}

impl fmt::Debug for AcceleratorHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceleratorHooks")
            .field("allocator", &self.allocator.is_some())
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

/// Entry point of an accelerator backend.
pub trait AcceleratorBackend: Send + Sync {
    /// Prepare the backend for decoding the stream described by `params`.
    ///
    /// This is called at most once per successful negotiation. An error means the backend cannot
    /// be used for this stream.
    fn init(&self, params: &AcceleratorParams) -> anyhow::Result<AcceleratorHooks>;
}

impl<F> AcceleratorBackend for F
where
    F: Fn(&AcceleratorParams) -> anyhow::Result<AcceleratorHooks> + Send + Sync,
{
    fn init(&self, params: &AcceleratorParams) -> anyhow::Result<AcceleratorHooks> {
        self(params)
    }
}

/// One row of the accelerator table.
#[derive(Clone)]
pub struct AcceleratorDescriptor {
    pub name: &'static str,
    pub id: AcceleratorId,
    pub target_format: PixelFormat,
    pub backend: Arc<dyn AcceleratorBackend>,
}

impl AcceleratorDescriptor {
    /// Creates the descriptor of `backend`, using the canonical name and format of `id`.
    pub fn new(id: AcceleratorId, backend: Arc<dyn AcceleratorBackend>) -> Self {
        Self { name: id.name(), id, target_format: id.target_format(), backend }
    }

    /// Creates the descriptor of a backend implemented by a plain function or closure.
    pub fn from_fn<F>(id: AcceleratorId, init: F) -> Self
    where
        F: Fn(&AcceleratorParams) -> anyhow::Result<AcceleratorHooks> + Send + Sync + 'static,
    {
        Self::new(id, Arc::new(init))
    }

    pub fn init(&self, params: &AcceleratorParams) -> anyhow::Result<AcceleratorHooks> {
        self.backend.init(params)
    }
}

impl fmt::Debug for AcceleratorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceleratorDescriptor")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("target_format", &self.target_format)
            .finish_non_exhaustive()
    }
}
