// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a dummy backend whose only purpose is to let the negotiator and the
//! dispatch functions run so we can test them in isolation.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::anyhow;

use crate::accelerator::AcceleratorBackend;
use crate::accelerator::AcceleratorHooks;
use crate::accelerator::AcceleratorParams;
use crate::accelerator::SurfaceAllocator;
use crate::accelerator::SurfaceRetriever;
use crate::frame::default_get_buffer;
use crate::frame::BufferFlags;
use crate::frame::Frame;
use crate::frame::SurfaceId;
use crate::PixelFormat;

#[derive(Default)]
struct Counters {
    inits: AtomicUsize,
    allocations: AtomicUsize,
    retrievals: AtomicUsize,
    next_surface: AtomicU32,
    fail_init: AtomicBool,
    fail_retrieve: AtomicBool,
}

struct Allocator(Arc<Counters>);

impl SurfaceAllocator for Allocator {
    fn get_buffer(&self, frame: &mut Frame, _: BufferFlags) -> anyhow::Result<()> {
        self.0.allocations.fetch_add(1, Ordering::SeqCst);
        frame.planes.clear();
        frame.surface = Some(SurfaceId(self.0.next_surface.fetch_add(1, Ordering::SeqCst)));
        Ok(())
    }
}

struct Retriever {
    counters: Arc<Counters>,
    output_format: PixelFormat,
}

impl SurfaceRetriever for Retriever {
    fn retrieve(&self, frame: &mut Frame) -> anyhow::Result<()> {
        self.counters.retrievals.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_retrieve.load(Ordering::SeqCst) {
            return Err(anyhow!("failed to download surface {:?}", frame.surface));
        }

        frame.format = self.output_format;
        default_get_buffer(frame, BufferFlags::empty())?;
        Ok(())
    }
}

/// Dummy backend that can stand in for any accelerator.
///
/// Clones share their counters and failure switches, so a test can keep a clone around to
/// inspect a backend it has handed over to a registry.
#[derive(Clone, Default)]
pub struct Backend {
    counters: Arc<Counters>,
    allocator: bool,
    retriever: bool,
}

impl Backend {
    /// A backend whose `init` succeeds and installs no hooks.
    pub fn new() -> Self {
        Default::default()
    }

    /// A backend whose `init` always fails.
    pub fn failing() -> Self {
        let backend = Self::new();
        backend.set_init_fails(true);
        backend
    }

    /// Install a surface allocator on successful `init`.
    pub fn with_allocator(mut self) -> Self {
        self.allocator = true;
        self
    }

    /// Install a retriever converting surfaces to the stream's output format on successful
    /// `init`.
    pub fn with_retriever(mut self) -> Self {
        self.retriever = true;
        self
    }

    pub fn set_init_fails(&self, fail: bool) {
        self.counters.fail_init.store(fail, Ordering::SeqCst);
    }

    pub fn set_retrieve_fails(&self, fail: bool) {
        self.counters.fail_retrieve.store(fail, Ordering::SeqCst);
    }

    /// Number of times `init` has been called, successfully or not.
    pub fn init_count(&self) -> usize {
        self.counters.inits.load(Ordering::SeqCst)
    }

    pub fn allocation_count(&self) -> usize {
        self.counters.allocations.load(Ordering::SeqCst)
    }

    pub fn retrieval_count(&self) -> usize {
        self.counters.retrievals.load(Ordering::SeqCst)
    }
}

impl AcceleratorBackend for Backend {
    fn init(&self, params: &AcceleratorParams) -> anyhow::Result<AcceleratorHooks> {
        self.counters.inits.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_init.load(Ordering::SeqCst) {
            return Err(anyhow!("no usable device at {}", params.device));
        }

        let mut hooks = AcceleratorHooks::new();
        if self.allocator {
            hooks = hooks.with_allocator(Allocator(Arc::clone(&self.counters)));
        }
        if self.retriever {
            hooks = hooks.with_retriever(Retriever {
                counters: Arc::clone(&self.counters),
                output_format: params.output_format,
            });
        }

        Ok(hooks)
    }
}
