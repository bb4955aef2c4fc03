// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use crate::accelerator::AcceleratorBackend;
use crate::accelerator::AcceleratorDescriptor;
use crate::accelerator::AcceleratorId;
use crate::PixelFormat;

/// Ordered table of the accelerator backends available to the negotiator.
///
/// The table is built once by the platform layer and is read-only afterwards, so it can be shared
/// between streams behind an [`Arc`].
#[derive(Clone, Debug, Default)]
pub struct AcceleratorRegistry {
    descriptors: Vec<AcceleratorDescriptor>,
}

impl AcceleratorRegistry {
    /// Creates a registry from `descriptors`. Their order defines precedence.
    pub fn new(descriptors: Vec<AcceleratorDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Builds the table of the backends enabled at build time, in precedence order.
    ///
    /// `factory` provides the implementation of each compiled-in backend, and may return `None`
    /// for backends the platform cannot offer.
    pub fn platform<F>(mut factory: F) -> Self
    where
        F: FnMut(AcceleratorId) -> Option<Arc<dyn AcceleratorBackend>>,
    {
        let descriptors = AcceleratorId::compiled_in()
            .into_iter()
            .filter_map(|id| match factory(id) {
                Some(backend) => Some(AcceleratorDescriptor::new(id, backend)),
                None => {
                    log::debug!("{} backend is compiled in but not provided", id);
                    None
                }
            })
            .collect();

        Self::new(descriptors)
    }

    /// Returns the first descriptor producing `format`, if any.
    pub fn lookup(&self, format: PixelFormat) -> Option<&AcceleratorDescriptor> {
        self.descriptors.iter().find(|d| d.target_format == format)
    }

    /// Returns the first descriptor registered for `id`, if any.
    pub fn get(&self, id: AcceleratorId) -> Option<&AcceleratorDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AcceleratorDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl FromIterator<AcceleratorDescriptor> for AcceleratorRegistry {
    fn from_iter<I: IntoIterator<Item = AcceleratorDescriptor>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
