#![no_main]

use std::sync::Arc;

use cros_hwaccel::accelerator::AcceleratorDescriptor;
use cros_hwaccel::accelerator::AcceleratorId;
use cros_hwaccel::accelerator::AcceleratorRegistry;
use cros_hwaccel::accelerator::HwAccelSelection;
use cros_hwaccel::backend::dummy::Backend;
use cros_hwaccel::decoder::DecoderContext;
use cros_hwaccel::PixelFormat;
use cros_hwaccel::Resolution;
use cros_hwaccel::StreamId;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let [selection, failures, candidates @ ..] = data else {
        return;
    };

    let registry: AcceleratorRegistry = AcceleratorId::ALL
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let backend = Backend::new().with_allocator();
            backend.set_init_fails(failures & (1 << i) != 0);
            AcceleratorDescriptor::new(id, Arc::new(backend))
        })
        .collect();

    let selection = match *selection as usize % (AcceleratorId::ALL.len() + 2) {
        0 => HwAccelSelection::None,
        1 => HwAccelSelection::Auto,
        n => HwAccelSelection::Backend(AcceleratorId::ALL[n - 2]),
    };

    let candidates = candidates
        .iter()
        .filter_map(|b| PixelFormat::n(*b as u32 % 80))
        .collect::<Vec<_>>();

    let mut ctx = DecoderContext::new(StreamId::new(0, 0), Resolution::from((64, 64)));
    ctx.init(Arc::new(registry)).unwrap();
    ctx.hw_state_mut().unwrap().set_selection(selection).unwrap();

    for _ in 0..2 {
        let before = ctx.hw_state().unwrap().active_id();
        if let Ok(Some(format)) = ctx.get_format(&candidates) {
            assert!(candidates.contains(&format));
        }
        let after = ctx.hw_state().unwrap().active_id();
        if before.is_some() {
            assert_eq!(before, after);
        }
    }

    ctx.deinit();
});
