// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded, insertion-ordered buffer of one-way delay samples which keeps
//! track of the position of its minimum and maximum sample.
//!
//! Appending a sample updates the extrema in constant time. Once the buffer
//! fills up, the oldest sample is evicted and both extrema are recomputed by
//! a linear scan, which is cheap because the buffers used by the delay
//! estimator only hold a handful of samples.
//!
//! Ties are always resolved in favour of the oldest extremal sample.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DelayBuffer {
    /// Delay samples, oldest first.
    samples: VecDeque<u32>,

    /// The configured maximum length.
    capacity: usize,

    /// Index of the minimum sample.
    min: usize,

    /// Index of the maximum sample.
    max: usize,
}

impl DelayBuffer {
    /// Create an empty buffer. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            min: 0,
            max: 0,
        }
    }

    /// Append a sample, evicting the oldest one if the buffer is full.
    pub fn insert(&mut self, sample: u32) {
        if self.samples.is_empty() {
            self.samples.push_back(sample);
            self.min = 0;
            self.max = 0;
            return;
        }

        self.samples.push_back(sample);
        let last = self.samples.len() - 1;
        if sample < self.samples[self.min] {
            self.min = last;
        }
        if sample > self.samples[self.max] {
            self.max = last;
        }

        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.min = 0;
            self.max = 0;

            // The rescan stops before `capacity - 1`. After an eviction the
            // buffer holds exactly `capacity - 1` samples, so every retained
            // sample is visited.
            let end = (self.capacity - 1).min(self.samples.len());
            for i in 1..end {
                if self.samples[i] < self.samples[self.min] {
                    self.min = i;
                }
                if self.samples[i] > self.samples[self.max] {
                    self.max = i;
                }
            }
        }
    }

    /// Overwrite the newest sample if `sample` is smaller.
    ///
    /// Only the minimum index is retargeted. The maximum index is left as is
    /// and may refer to a sample that has since been lowered.
    pub(super) fn tighten_last(&mut self, sample: u32) {
        let last = match self.samples.len().checked_sub(1) {
            Some(last) => last,
            None => return,
        };

        if sample < self.samples[last] {
            self.samples[last] = sample;
            if sample < self.samples[self.min] {
                self.min = last;
            }
        }
    }

    /// Return the minimum sample, or `u32::MAX` if the buffer is empty.
    pub fn min(&self) -> u32 {
        self.samples.get(self.min).copied().unwrap_or(u32::MAX)
    }

    /// Return the maximum sample, or zero if the buffer is empty.
    pub fn max(&self) -> u32 {
        self.samples.get(self.max).copied().unwrap_or(0)
    }

    /// Return the newest sample.
    pub fn last(&self) -> Option<u32> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over the samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.samples.iter()
    }
}
