// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared code for accelerator backends.
//!
//! Concrete backends (VAAPI, VDPAU, ...) live with the platform layer and are handed to this
//! crate through an [`AcceleratorRegistry`](crate::accelerator::AcceleratorRegistry). This module
//! only contains a dummy backend that lets hosts and tests exercise negotiation and dispatch
//! without any hardware.

pub mod dummy;
