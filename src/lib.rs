// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware accelerator selection for video decoders.
//!
//! A decoder proposes a ranked list of output pixel formats, hardware surfaces first and plain
//! software layouts last. This crate picks the best usable one, initializes the matching
//! [accelerator backend](accelerator::AcceleratorBackend) once per stream, and then routes frame
//! buffer allocation and frame retrieval through that backend for as long as the stream lives.
//!
//! The [`decoder::DecoderContext`] type is the entry point used by the host decoder. It owns the
//! per-stream [`stream::HwStreamState`] and forwards its callbacks to the
//! [`negotiator::FormatNegotiator`] and the [`dispatch`] functions.

pub mod accelerator;
pub mod backend;
pub mod decoder;
pub mod dispatch;
pub mod frame;
pub mod negotiator;
pub mod stream;

use std::fmt;
use std::str::FromStr;

use enumn::N;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Whether `self` can hold at least one pixel.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self { width: value.0, height: value.1 }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(value: Resolution) -> Self {
        (value.width, value.height)
    }
}

/// Identifies a decoded stream as `#<file index>:<stream index>`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub file_index: usize,
    pub stream_index: usize,
}

impl StreamId {
    pub fn new(file_index: usize, stream_index: usize) -> Self {
        Self { file_index, stream_index }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.file_index, self.stream_index)
    }
}

/// Layout of one plane of a software pixel format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneDescriptor {
    /// Bytes used by one sample group of this plane.
    pub bytes_per_sample: u8,
    /// Horizontal subsampling of the plane, as a power of two.
    pub log2_subsample_x: u8,
    /// Vertical subsampling of the plane, as a power of two.
    pub log2_subsample_y: u8,
}

impl PlaneDescriptor {
    const fn new(bytes_per_sample: u8, log2_subsample_x: u8, log2_subsample_y: u8) -> Self {
        Self { bytes_per_sample, log2_subsample_x, log2_subsample_y }
    }

    /// Number of meaningful bytes in one row of this plane for a picture `width` pixels wide, or
    /// `None` if it does not fit in a `usize`.
    pub fn row_bytes(&self, width: u32) -> Option<usize> {
        let samples = subsampled(width, self.log2_subsample_x)?;
        samples.checked_mul(self.bytes_per_sample as usize)
    }

    /// Number of rows of this plane for a picture `height` pixels high, or `None` if it does not
    /// fit in a `usize`.
    pub fn rows(&self, height: u32) -> Option<usize> {
        subsampled(height, self.log2_subsample_y)
    }
}

fn subsampled(len: u32, log2_subsample: u8) -> Option<usize> {
    let len = usize::try_from(len).ok()?;
    Some(len.checked_add((1 << log2_subsample) - 1)? >> log2_subsample)
}

const LUMA: PlaneDescriptor = PlaneDescriptor::new(1, 0, 0);
const CHROMA_420: PlaneDescriptor = PlaneDescriptor::new(1, 1, 1);
const CHROMA_422: PlaneDescriptor = PlaneDescriptor::new(1, 1, 0);
const UV_420: PlaneDescriptor = PlaneDescriptor::new(2, 1, 1);

const YUV420_PLANES: &[PlaneDescriptor] = &[LUMA, CHROMA_420, CHROMA_420];
const YUV422_PLANES: &[PlaneDescriptor] = &[LUMA, CHROMA_422, CHROMA_422];
const YUV444_PLANES: &[PlaneDescriptor] = &[LUMA, LUMA, LUMA];
const SEMI_PLANAR_420_PLANES: &[PlaneDescriptor] = &[LUMA, UV_420];
const P010_PLANES: &[PlaneDescriptor] =
    &[PlaneDescriptor::new(2, 0, 0), PlaneDescriptor::new(4, 1, 1)];
const GRAY8_PLANES: &[PlaneDescriptor] = &[LUMA];
const RGB24_PLANES: &[PlaneDescriptor] = &[PlaneDescriptor::new(3, 0, 0)];
const RGBA_PLANES: &[PlaneDescriptor] = &[PlaneDescriptor::new(4, 0, 0)];

/// Static properties of a [`PixelFormat`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    pub name: &'static str,
    /// Set for formats whose frames live in an accelerator surface rather than in CPU memory.
    pub hwaccel: bool,
    /// CPU planes of the format. Empty for hardware formats.
    pub planes: &'static [PlaneDescriptor],
}

impl PixelFormatDescriptor {
    pub fn is_hwaccel(&self) -> bool {
        self.hwaccel
    }
}

/// Output pixel formats a decoder can propose.
///
/// Discriminants are stable so the format can be stored in an atomic and recovered with
/// [`PixelFormat::n`].
#[derive(N, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
    Yuv420p = 0,
    Nv12 = 1,
    Nv21 = 2,
    Yuv422p = 3,
    Yuv444p = 4,
    P010 = 5,
    Gray8 = 6,
    Rgb24 = 7,
    Rgba = 8,
    Vdpau = 64,
    Dxva2Vld = 65,
    D3d11 = 66,
    Vda = 67,
    VideoToolbox = 68,
    Qsv = 69,
    Vaapi = 70,
    Cuda = 71,
    DrmPrime = 72,
}

impl PixelFormat {
    pub fn descriptor(&self) -> PixelFormatDescriptor {
        const fn sw(
            name: &'static str,
            planes: &'static [PlaneDescriptor],
        ) -> PixelFormatDescriptor {
            PixelFormatDescriptor { name, hwaccel: false, planes }
        }
        const fn hw(name: &'static str) -> PixelFormatDescriptor {
            PixelFormatDescriptor { name, hwaccel: true, planes: &[] }
        }

        match self {
            PixelFormat::Yuv420p => sw("yuv420p", YUV420_PLANES),
            PixelFormat::Nv12 => sw("nv12", SEMI_PLANAR_420_PLANES),
            PixelFormat::Nv21 => sw("nv21", SEMI_PLANAR_420_PLANES),
            PixelFormat::Yuv422p => sw("yuv422p", YUV422_PLANES),
            PixelFormat::Yuv444p => sw("yuv444p", YUV444_PLANES),
            PixelFormat::P010 => sw("p010", P010_PLANES),
            PixelFormat::Gray8 => sw("gray8", GRAY8_PLANES),
            PixelFormat::Rgb24 => sw("rgb24", RGB24_PLANES),
            PixelFormat::Rgba => sw("rgba", RGBA_PLANES),
            PixelFormat::Vdpau => hw("vdpau"),
            PixelFormat::Dxva2Vld => hw("dxva2_vld"),
            PixelFormat::D3d11 => hw("d3d11"),
            PixelFormat::Vda => hw("vda"),
            PixelFormat::VideoToolbox => hw("videotoolbox_vld"),
            PixelFormat::Qsv => hw("qsv"),
            PixelFormat::Vaapi => hw("vaapi"),
            PixelFormat::Cuda => hw("cuda"),
            PixelFormat::DrmPrime => hw("drm_prime"),
        }
    }

    pub fn is_hwaccel(&self) -> bool {
        self.descriptor().is_hwaccel()
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yuv420p" | "i420" | "I420" => Ok(PixelFormat::Yuv420p),
            "nv12" | "NV12" => Ok(PixelFormat::Nv12),
            "nv21" | "NV21" => Ok(PixelFormat::Nv21),
            "yuv422p" | "i422" | "I422" => Ok(PixelFormat::Yuv422p),
            "yuv444p" | "i444" | "I444" => Ok(PixelFormat::Yuv444p),
            "p010" | "P010" => Ok(PixelFormat::P010),
            "gray8" | "gray" => Ok(PixelFormat::Gray8),
            "rgb24" => Ok(PixelFormat::Rgb24),
            "rgba" => Ok(PixelFormat::Rgba),
            "vdpau" => Ok(PixelFormat::Vdpau),
            "dxva2_vld" | "dxva2" => Ok(PixelFormat::Dxva2Vld),
            "d3d11" => Ok(PixelFormat::D3d11),
            "vda" => Ok(PixelFormat::Vda),
            "videotoolbox_vld" | "videotoolbox" => Ok(PixelFormat::VideoToolbox),
            "qsv" => Ok(PixelFormat::Qsv),
            "vaapi" => Ok(PixelFormat::Vaapi),
            "cuda" => Ok(PixelFormat::Cuda),
            "drm_prime" => Ok(PixelFormat::DrmPrime),
            _ => Err("unrecognized pixel format"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hwaccel_flag_splits_formats() {
        assert!(PixelFormat::Vaapi.is_hwaccel());
        assert!(PixelFormat::DrmPrime.is_hwaccel());
        assert!(PixelFormat::Vaapi.descriptor().planes.is_empty());
        assert!(!PixelFormat::Yuv420p.is_hwaccel());
        assert!(!PixelFormat::P010.is_hwaccel());
    }

    #[test]
    fn discriminant_recovers_format() {
        for format in [PixelFormat::Yuv420p, PixelFormat::Rgba, PixelFormat::Cuda] {
            assert_eq!(PixelFormat::n(format as u32), Some(format));
        }
        assert_eq!(PixelFormat::n(9), None);
    }

    #[test]
    fn names_parse_back() {
        for format in [
            PixelFormat::Yuv420p,
            PixelFormat::Nv12,
            PixelFormat::VideoToolbox,
            PixelFormat::Dxva2Vld,
            PixelFormat::DrmPrime,
        ] {
            assert_eq!(format.to_string().parse::<PixelFormat>(), Ok(format));
        }
        assert!("yuv411p".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn odd_dimensions_round_chroma_up() {
        let chroma = PixelFormat::Yuv420p.descriptor().planes[1];
        assert_eq!(chroma.row_bytes(321), Some(161));
        assert_eq!(chroma.rows(201), Some(101));

        let uv = PixelFormat::Nv12.descriptor().planes[1];
        assert_eq!(uv.row_bytes(321), Some(322));
    }

    #[test]
    fn resolution_converts_to_tuple() {
        let resolution = Resolution::from((320, 200));
        assert_eq!(<(u32, u32)>::from(resolution), (320, 200));
        assert!(!resolution.is_empty());
        assert!(Resolution::from((320, 0)).is_empty());
    }

    #[test]
    fn stream_id_display() {
        assert_eq!(StreamId::new(0, 3).to_string(), "#0:3");
    }
}
