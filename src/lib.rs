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

//! A delay-based congestion control estimator in the style of
//! [LEDBAT](https://www.rfc-editor.org/rfc/rfc6817.html) for TCP-like
//! transports.
//!
//! The estimator derives one-way delay samples from the timestamp echoes of
//! acknowledged segments. It keeps a short window of recent samples and a
//! long, epoch-based history of minimum samples, and uses the spread between
//! the two to bound the slow start threshold before queueing delay grows
//! without bound.
//!
//! ## Components
//!
//! * [`DelayBuffer`]: a bounded window of delay samples with constant time
//!   access to its minimum and maximum.
//! * [`DelayEstimator`]: the delay tracking and threshold derivation.
//! * [`Ledbat`]: a NewReno-style congestion controller whose slow start
//!   threshold comes from the delay estimator.
//!
//! ## Example
//!
//! ```
//! use ledbat::DelayEstimator;
//!
//! let mut estimator = DelayEstimator::default();
//! // No timestamps yet: fall back to half the bytes in flight.
//! assert_eq!(estimator.ssthresh(1460, 20000, 15000), 10000);
//!
//! estimator.on_ack(1100, 1000, true, 0);
//! assert_eq!(estimator.base_delay(), 100);
//! ```
//!
//! ## Feature flags
//!
//! * `ffi`: Build and expose the C API.

use std::time::Duration;

/// Default segment size in bytes.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 1460;

/// Default length of the noise filter, in samples.
pub const DEFAULT_NOISE_FILTER_LEN: usize = 8;

/// Default length of the base delay history, in samples.
pub const DEFAULT_BASE_HISTORY_LEN: usize = 10;

/// The base delay history accepts a fresh sample once per interval.
pub const DEFAULT_BASE_ROLLOVER_INTERVAL: Duration = Duration::from_secs(60);

/// Result type for estimator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about congestion control.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// The segment size in bytes.
    pub max_datagram_size: usize,

    /// The minimal congestion window in packets.
    pub min_congestion_window: u64,

    /// The initial congestion window in packets.
    pub initial_congestion_window: u64,

    /// The threshold for slow start in packets.
    pub slow_start_thresh: u64,

    /// The number of recent delay samples used to filter out noise.
    noise_filter_len: usize,

    /// The number of epochs kept in the base delay history.
    base_history_len: usize,

    /// The duration of a base delay epoch.
    pub base_rollover_interval: Duration,

    /// Upper bound policy for the delay-derived slow start threshold.
    pub ssthresh_policy: SsthreshPolicy,
}

impl RecoveryConfig {
    /// Set the length of the noise filter. The default value is `8`.
    pub fn set_noise_filter_len(&mut self, v: usize) -> Result<()> {
        if v == 0 {
            return Err(Error::InvalidConfig("noise filter length".into()));
        }
        self.noise_filter_len = v;
        Ok(())
    }

    /// Set the length of the base delay history. The default value is `10`.
    pub fn set_base_history_len(&mut self, v: usize) -> Result<()> {
        if v == 0 {
            return Err(Error::InvalidConfig("base history length".into()));
        }
        self.base_history_len = v;
        Ok(())
    }

    /// Set the duration of a base delay epoch in seconds. The default value
    /// is `60`.
    pub fn set_base_rollover_interval(&mut self, v: u64) {
        self.base_rollover_interval = Duration::from_secs(v);
    }

    pub fn noise_filter_len(&self) -> usize {
        self.noise_filter_len
    }

    pub fn base_history_len(&self) -> usize {
        self.base_history_len
    }
}

impl Default for RecoveryConfig {
    fn default() -> RecoveryConfig {
        RecoveryConfig {
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            min_congestion_window: 2_u64,
            initial_congestion_window: 10_u64,
            slow_start_thresh: u64::MAX,
            noise_filter_len: DEFAULT_NOISE_FILTER_LEN,
            base_history_len: DEFAULT_BASE_HISTORY_LEN,
            base_rollover_interval: DEFAULT_BASE_ROLLOVER_INTERVAL,
            ssthresh_policy: SsthreshPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .init();
    }

    #[test]
    fn recovery_config_default() {
        let conf = RecoveryConfig::default();
        assert_eq!(conf.max_datagram_size, 1460);
        assert_eq!(conf.noise_filter_len(), 8);
        assert_eq!(conf.base_history_len(), 10);
        assert_eq!(conf.base_rollover_interval, Duration::from_secs(60));
        assert_eq!(
            conf.ssthresh_policy,
            SsthreshPolicy::BytesInFlightPlusSegment
        );
    }

    #[test]
    fn recovery_config_buffer_len() -> Result<()> {
        let mut conf = RecoveryConfig::default();

        conf.set_noise_filter_len(4)?;
        assert_eq!(conf.noise_filter_len(), 4);
        assert_eq!(
            conf.set_noise_filter_len(0),
            Err(Error::InvalidConfig("noise filter length".into()))
        );
        assert_eq!(conf.noise_filter_len(), 4);

        conf.set_base_history_len(20)?;
        assert_eq!(conf.base_history_len(), 20);
        assert!(conf.set_base_history_len(0).is_err());
        assert_eq!(conf.base_history_len(), 20);

        conf.set_base_rollover_interval(30);
        assert_eq!(conf.base_rollover_interval, Duration::from_secs(30));

        Ok(())
    }
}

pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::DelayBuffer;
pub use crate::congestion_control::DelayEstimator;
pub use crate::congestion_control::DelayFilter;
pub use crate::congestion_control::DelayStats;
pub use crate::congestion_control::Ledbat;
pub use crate::congestion_control::LedbatConfig;
pub use crate::congestion_control::SsthreshPolicy;
pub use crate::error::Error;
pub use crate::segment::AckInfo;
pub use crate::segment::SentSegment;

#[path = "congestion_control/congestion_control.rs"]
mod congestion_control;

#[cfg(feature = "ffi")]
mod ffi;

pub mod error;
mod segment;
