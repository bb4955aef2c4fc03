// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! negotiate, a small program running format negotiation for one stream against dummy backends.
//! Useful to check which accelerator a given hwaccel setting and candidate list end up with.

use std::sync::Arc;

use argh::FromArgs;

use cros_hwaccel::accelerator::AcceleratorBackend;
use cros_hwaccel::accelerator::AcceleratorDescriptor;
use cros_hwaccel::accelerator::AcceleratorId;
use cros_hwaccel::accelerator::AcceleratorRegistry;
use cros_hwaccel::accelerator::HwAccelSelection;
use cros_hwaccel::backend::dummy::Backend;
use cros_hwaccel::decoder::DecoderContext;
use cros_hwaccel::frame::BufferFlags;
use cros_hwaccel::frame::Frame;
use cros_hwaccel::PixelFormat;
use cros_hwaccel::Resolution;
use cros_hwaccel::StreamId;

/// Run hwaccel format negotiation against dummy backends
#[derive(Debug, FromArgs)]
struct Args {
    /// accelerator to use (none, auto, or a backend name). Default: auto
    #[argh(option, default = "HwAccelSelection::Auto")]
    hwaccel: HwAccelSelection,

    /// candidate format proposed by the decoder, in order. May be repeated.
    /// Default: vaapi, yuv420p
    #[argh(option)]
    candidate: Vec<PixelFormat>,

    /// backend whose initialization should fail. May be repeated.
    #[argh(option)]
    unavailable: Vec<AcceleratorId>,

    /// register every known backend instead of only the compiled-in ones
    #[argh(switch)]
    all_backends: bool,

    /// device selector handed to the backends
    #[argh(option)]
    device: Option<String>,

    /// software format hardware frames are retrieved into. Default: yuv420p
    #[argh(option, default = "PixelFormat::Yuv420p")]
    output_format: PixelFormat,
}

fn dummy_backend(id: AcceleratorId, unavailable: &[AcceleratorId]) -> Arc<dyn AcceleratorBackend> {
    let backend = Backend::new().with_allocator().with_retriever();
    backend.set_init_fails(unavailable.contains(&id));
    Arc::new(backend)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();
    let candidates = if args.candidate.is_empty() {
        vec![PixelFormat::Vaapi, PixelFormat::Yuv420p]
    } else {
        args.candidate.clone()
    };

    let registry: AcceleratorRegistry = if args.all_backends {
        AcceleratorId::ALL
            .into_iter()
            .map(|id| AcceleratorDescriptor::new(id, dummy_backend(id, &args.unavailable)))
            .collect()
    } else {
        AcceleratorRegistry::platform(|id| Some(dummy_backend(id, &args.unavailable)))
    };
    println!(
        "registered backends: {}",
        registry.iter().map(|d| d.name).collect::<Vec<_>>().join(", ")
    );

    let mut ctx = DecoderContext::new(StreamId::new(0, 0), Resolution::from((1280, 720)));
    ctx.init(Arc::new(registry))?;
    if let Some(state) = ctx.hw_state_mut() {
        state.set_selection(args.hwaccel)?;
        state.set_output_format(args.output_format)?;
        if let Some(device) = &args.device {
            state.set_device(device.as_str())?;
        }
    }

    let format = match ctx.get_format(&candidates)? {
        Some(format) => format,
        None => {
            println!("no acceptable format among {:?}", candidates);
            return Ok(());
        }
    };

    let active = ctx.hw_state().and_then(|s| s.active_id());
    match active {
        Some(id) => println!("selected {} using the {} accelerator", format, id),
        None => println!("selected {} (software decoding)", format),
    }

    let mut frame = Frame::new(format, ctx.coded_resolution());
    ctx.get_buffer(&mut frame, BufferFlags::REF)?;
    ctx.retrieve_frame(&mut frame)?;
    println!("first frame retrieved as {} with {} plane(s)", frame.format, frame.planes.len());

    ctx.deinit();

    Ok(())
}
