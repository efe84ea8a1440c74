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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use strum_macros::EnumIter;

use crate::segment::AckInfo;
use crate::segment::SentSegment;
use crate::Error;
use crate::RecoveryConfig;
use crate::Result;
pub use delay_buffer::DelayBuffer;
pub use delay_estimator::DelayEstimator;
pub use delay_estimator::DelayFilter;
pub use delay_estimator::DelayStats;
pub use ledbat::Ledbat;
pub use ledbat::LedbatConfig;

/// Upper bound used when deriving a slow start threshold from a measured
/// delay spread.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, EnumIter)]
pub enum SsthreshPolicy {
    /// Never raise the threshold above its previous value. When there is no
    /// spread between the current and the base delay, the previous threshold
    /// is kept unchanged.
    RetainPrior,

    /// Allow the threshold to reach one segment above the bytes in flight,
    /// which is also the value used when there is no delay spread.
    #[default]
    BytesInFlightPlusSegment,
}

impl FromStr for SsthreshPolicy {
    type Err = Error;

    fn from_str(policy: &str) -> Result<SsthreshPolicy> {
        if policy.eq_ignore_ascii_case("retain-prior") {
            Ok(SsthreshPolicy::RetainPrior)
        } else if policy.eq_ignore_ascii_case("bif-plus-segment") {
            Ok(SsthreshPolicy::BytesInFlightPlusSegment)
        } else {
            Err(Error::InvalidConfig("unknown ssthresh policy".into()))
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CongestionStats {
    /// Bytes in flight.
    pub bytes_in_flight: u64,

    /// Total bytes sent in slow start.
    pub bytes_sent_in_slow_start: u64,

    /// Total bytes acked in slow start.
    pub bytes_acked_in_slow_start: u64,

    /// Total bytes lost in slow start.
    pub bytes_lost_in_slow_start: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,
}

/// Congestion control interfaces the host transport drives.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback after a segment was sent out.
    fn on_sent(&mut self, now: Instant, segment: &SentSegment, bytes_in_flight: u64);

    /// Callback for each acknowledgment, before the segments it covers are
    /// processed.
    fn begin_ack(&mut self, now: Instant, ack: &AckInfo, bytes_in_flight: u64) {}

    /// Callback for processing each acknowledged segment.
    fn on_ack(
        &mut self,
        segment: &SentSegment,
        now: Instant,
        app_limited: bool,
        bytes_in_flight: u64,
    ) {
    }

    /// Callback for updating states after all acknowledged segments are
    /// processed.
    fn end_ack(&mut self) {}

    /// Congestion event.
    fn on_congestion_event(
        &mut self,
        now: Instant,
        segment: &SentSegment,
        is_persistent_congestion: bool,
        lost_bytes: u64,
        bytes_in_flight: u64,
    ) {
    }

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        false
    }

    /// Check if in recovery mode.
    fn in_recovery(&self, sent_time: Instant) -> bool {
        false
    }

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Current slow start threshold.
    fn slow_start_threshold(&self) -> u64;

    /// Initial congestion window.
    fn initial_window(&self) -> u64;

    /// Minimal congestion window.
    fn minimal_window(&self) -> u64;

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &RecoveryConfig) -> Box<dyn CongestionController> {
    Box::new(Ledbat::new(LedbatConfig::from(conf)))
}


mod delay_buffer;
mod delay_estimator;
mod ledbat;
