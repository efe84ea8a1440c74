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

//! One-way delay tracking in the style of LEDBAT.
//!
//! Every acknowledgment carrying a timestamp echo yields a one-way delay
//! (OWD) sample. Samples feed two windows:
//!
//!  * the noise filter, a short window of the most recent samples, whose
//!    minimum is the current delay and whose maximum bounds the spread;
//!  * the base history, a longer window holding one sample per rollover
//!    epoch, each tightened to the smallest delay seen during that epoch.
//!    Its minimum estimates the delay of an empty bottleneck queue.
//!
//! The gap between the two is the queueing delay. The largest queueing delay
//! ever observed, relative to the current spread, scales the slow start
//! threshold down before the queue grows without bound.
//!
//! See <https://www.rfc-editor.org/rfc/rfc6817.html>.

use std::cmp;

use log::*;
use serde::Serialize;

use super::DelayBuffer;
use super::SsthreshPolicy;

/// Selects which extremum of the noise filter is read.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DelayFilter {
    Min,
    Max,
}

/// A snapshot of the estimator state.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DelayStats {
    /// Minimum of the base history, `u32::MAX` before the first sample.
    pub base_delay: u32,

    /// Minimum of the noise filter.
    pub current_delay_min: u32,

    /// Maximum of the noise filter.
    pub current_delay_max: u32,

    /// Current queueing delay.
    pub queueing_delay: u32,

    /// Largest queueing delay observed so far.
    pub max_observed_queueing_delay: u32,

    /// Whether the latest acknowledgment carried both timestamps.
    pub timestamps_valid: bool,
}

/// Delay estimator for one connection.
///
/// Cloning the estimator forks it: the copy holds its own buffers and
/// evolves independently.
#[derive(Debug, Clone)]
pub struct DelayEstimator {
    /// Short window of recent OWD samples.
    noise_filter: DelayBuffer,

    /// Long window of per-epoch minimum OWD samples.
    base_history: DelayBuffer,

    /// Epoch duration in seconds.
    rollover_interval: u64,

    /// Time of the last rollover in seconds.
    last_rollover: u64,

    /// Largest queueing delay observed. Never decreases.
    max_observed: u32,

    /// Whether both timestamps of the latest acknowledgment were non-zero.
    timestamps_valid: bool,

    /// Upper bound policy for the derived threshold.
    policy: SsthreshPolicy,
}

impl DelayEstimator {
    pub fn new(noise_filter_len: usize, base_history_len: usize, policy: SsthreshPolicy) -> Self {
        Self {
            noise_filter: DelayBuffer::new(noise_filter_len),
            base_history: DelayBuffer::new(base_history_len),
            rollover_interval: crate::DEFAULT_BASE_ROLLOVER_INTERVAL.as_secs(),
            last_rollover: 0,
            max_observed: 0,
            timestamps_valid: false,
            policy,
        }
    }

    /// Set the base delay epoch duration in seconds.
    pub fn set_rollover_interval(&mut self, secs: u64) -> &mut Self {
        self.rollover_interval = secs;
        self
    }

    /// Process the timestamps carried by an acknowledgment.
    ///
    /// `now` is the current time in whole seconds. Acknowledgments without
    /// both timestamps, or without a positive RTT sample, leave the delay
    /// windows untouched.
    pub fn on_ack(&mut self, ts_value: u32, ts_echo_reply: u32, rtt_positive: bool, now: u64) {
        self.timestamps_valid = ts_value != 0 && ts_echo_reply != 0;
        if !self.timestamps_valid || !rtt_positive {
            return;
        }

        let owd = ts_value.wrapping_sub(ts_echo_reply);
        self.update_current_delay(owd);
        self.update_base_delay(owd, now);

        let queueing_delay = self.queueing_delay();
        if queueing_delay > self.max_observed {
            self.max_observed = queueing_delay;
        }

        trace!(
            "owd={} current={} base={} queueing={} max_observed={}",
            owd,
            self.current_delay(DelayFilter::Min),
            self.base_delay(),
            queueing_delay,
            self.max_observed
        );
    }

    fn update_current_delay(&mut self, owd: u32) {
        self.noise_filter.insert(owd);
    }

    fn update_base_delay(&mut self, owd: u32, now: u64) {
        if self.base_history.is_empty() {
            self.base_history.insert(owd);
            return;
        }

        if now.saturating_sub(self.last_rollover) > self.rollover_interval {
            debug!(
                "base delay rollover at {}s, last rollover {}s",
                now, self.last_rollover
            );
            self.last_rollover = now;
            self.base_history.insert(owd);
        } else {
            self.base_history.tighten_last(owd);
        }
    }

    /// Estimated delay of the path with an empty queue.
    pub fn base_delay(&self) -> u32 {
        self.base_history.min()
    }

    /// The minimum or maximum of the recent delay samples.
    pub fn current_delay(&self, filter: DelayFilter) -> u32 {
        match filter {
            DelayFilter::Min => self.noise_filter.min(),
            DelayFilter::Max => self.noise_filter.max(),
        }
    }

    /// Current queueing delay, zero when the recent minimum is below the
    /// base delay.
    pub fn queueing_delay(&self) -> u32 {
        self.current_delay(DelayFilter::Min)
            .saturating_sub(self.base_delay())
    }

    pub fn max_observed_queueing_delay(&self) -> u32 {
        self.max_observed
    }

    pub fn timestamps_valid(&self) -> bool {
        self.timestamps_valid
    }

    pub fn policy(&self) -> SsthreshPolicy {
        self.policy
    }

    pub fn noise_filter(&self) -> &DelayBuffer {
        &self.noise_filter
    }

    pub fn base_history(&self) -> &DelayBuffer {
        &self.base_history
    }

    /// Derive a slow start threshold in bytes.
    ///
    /// Without a queueing delay signal this falls back to half the bytes in
    /// flight. Otherwise the bytes in flight are scaled by the ratio between
    /// the largest observed queueing delay and twice the current delay
    /// spread, bounded according to the configured policy.
    ///
    /// Products wrap at 32 bits like the host transport's arithmetic.
    pub fn ssthresh(&self, segment_size: u32, bytes_in_flight: u32, prior_ssthresh: u32) -> u32 {
        let min_ssthresh = segment_size.wrapping_mul(2);

        if !self.timestamps_valid || self.max_observed == 0 {
            return cmp::max(min_ssthresh, bytes_in_flight / 2);
        }

        let upper_bound = match self.policy {
            SsthreshPolicy::RetainPrior => prior_ssthresh,
            SsthreshPolicy::BytesInFlightPlusSegment => bytes_in_flight.wrapping_add(segment_size),
        };

        let spread = match self
            .current_delay(DelayFilter::Max)
            .checked_sub(self.base_delay())
        {
            Some(spread) if spread > 0 => spread,
            _ => return upper_bound,
        };

        let scaled = bytes_in_flight
            .wrapping_mul(self.max_observed)
            .checked_div(spread.wrapping_mul(2))
            .unwrap_or(upper_bound);

        cmp::max(min_ssthresh, cmp::min(scaled, upper_bound))
    }

    /// Return a snapshot of the estimator state.
    pub fn stats(&self) -> DelayStats {
        DelayStats {
            base_delay: self.base_delay(),
            current_delay_min: self.current_delay(DelayFilter::Min),
            current_delay_max: self.current_delay(DelayFilter::Max),
            queueing_delay: self.queueing_delay(),
            max_observed_queueing_delay: self.max_observed,
            timestamps_valid: self.timestamps_valid,
        }
    }
}

impl Default for DelayEstimator {
    fn default() -> Self {
        Self::new(
            crate::DEFAULT_NOISE_FILTER_LEN,
            crate::DEFAULT_BASE_HISTORY_LEN,
            SsthreshPolicy::default(),
        )
    }
}
