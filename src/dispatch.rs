// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Routing of buffer allocation and frame retrieval to the negotiated accelerator.
//!
//! Both functions only read the stream state and may be called concurrently from the decoder's
//! worker threads once negotiation is done.

use crate::frame::default_get_buffer;
use crate::frame::BufferError;
use crate::frame::BufferFlags;
use crate::frame::Frame;
use crate::stream::HwStreamState;

/// Attaches memory to `frame`.
///
/// Frames in the negotiated format are allocated by the accelerator if it installed an
/// allocator. Every other frame goes through [`default_get_buffer`].
pub fn get_buffer(
    state: &HwStreamState,
    frame: &mut Frame,
    flags: BufferFlags,
) -> Result<(), BufferError> {
    match state.allocator() {
        Some(allocator) if state.negotiated_format() == Some(frame.format) => {
            allocator.get_buffer(frame, flags).map_err(BufferError::Backend)
        }
        _ => default_get_buffer(frame, flags),
    }
}

/// Makes a decoded `frame` usable by the client.
///
/// Frames in the negotiated format go through the accelerator's retriever if it installed one,
/// and an error from it is returned unchanged. In every other case the frame is left untouched.
/// The format of the frame after retrieval is recorded as the stream's retrieved format.
pub fn retrieve_frame(state: &HwStreamState, frame: &mut Frame) -> anyhow::Result<()> {
    if let Some(retriever) = state.retriever() {
        if state.negotiated_format() == Some(frame.format) {
            retriever.retrieve(frame)?;
        }
    }

    state.set_retrieved_format(frame.format);

    Ok(())
}
