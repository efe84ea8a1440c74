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

use std::cmp;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::CongestionController;
use super::CongestionStats;
use super::DelayEstimator;
use super::DelayStats;
use super::SsthreshPolicy;
use crate::segment::AckInfo;
use crate::segment::SentSegment;
use crate::RecoveryConfig;

/// Ledbat Configuration.
#[derive(Debug, Clone)]
pub struct LedbatConfig {
    /// Minimal congestion window in bytes.
    min_congestion_window: u64,

    /// Initial congestion window in bytes.
    initial_congestion_window: u64,

    /// The threshold for slow start in bytes.
    slow_start_thresh: u64,

    /// Max datagram size in bytes.
    max_datagram_size: u64,

    /// Length of the noise filter.
    noise_filter_len: usize,

    /// Length of the base delay history.
    base_history_len: usize,

    /// Duration of a base delay epoch.
    base_rollover_interval: Duration,

    /// Upper bound policy for the derived slow start threshold.
    ssthresh_policy: SsthreshPolicy,
}

impl LedbatConfig {
    pub fn from(conf: &RecoveryConfig) -> Self {
        let max_datagram_size = conf.max_datagram_size as u64;
        let min_congestion_window = conf.min_congestion_window.saturating_mul(max_datagram_size);
        let initial_congestion_window = conf
            .initial_congestion_window
            .saturating_mul(max_datagram_size);
        let slow_start_thresh = conf.slow_start_thresh.saturating_mul(max_datagram_size);

        Self {
            min_congestion_window,
            initial_congestion_window,
            slow_start_thresh,
            max_datagram_size,
            noise_filter_len: conf.noise_filter_len(),
            base_history_len: conf.base_history_len(),
            base_rollover_interval: conf.base_rollover_interval,
            ssthresh_policy: conf.ssthresh_policy,
        }
    }

    /// Update min congestion window.
    pub fn set_min_congestion_window(&mut self, min_congestion_window: u64) -> &mut Self {
        self.min_congestion_window = min_congestion_window;
        self
    }

    /// Update initial congestion window.
    pub fn set_initial_congestion_window(&mut self, initial_congestion_window: u64) -> &mut Self {
        self.initial_congestion_window = initial_congestion_window;
        self
    }

    /// Update slow start threshold.
    pub fn set_slow_start_thresh(&mut self, slow_start_thresh: u64) -> &mut Self {
        self.slow_start_thresh = slow_start_thresh;
        self
    }

    /// Update max datagram size.
    pub fn set_max_datagram_size(&mut self, max_datagram_size: u64) -> &mut Self {
        self.max_datagram_size = max_datagram_size;
        self
    }

    /// Update ssthresh policy.
    pub fn set_ssthresh_policy(&mut self, policy: SsthreshPolicy) -> &mut Self {
        self.ssthresh_policy = policy;
        self
    }
}

impl Default for LedbatConfig {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

/// Ledbat congestion control algorithm.
///
/// The window grows like NewReno: by the acknowledged bytes during slow
/// start, and by one segment per window of acknowledged bytes during
/// congestion avoidance. On a congestion event the slow start threshold is
/// derived from the one-way delay estimator instead of halving the window.
///
/// Cloning the controller forks it, including the delay estimator state.
#[derive(Debug, Clone)]
pub struct Ledbat {
    /// Configuration.
    config: LedbatConfig,

    /// One-way delay estimator.
    estimator: DelayEstimator,

    /// Congestion window in bytes.
    cwnd: u64,

    /// Slow start thresh in bytes.
    ssthresh: u64,

    /// Bytes acknowledged in congestion avoidance since the last increase.
    acked_bytes: u64,

    /// Time of the last recovery event starts.
    recovery_epoch_start: Option<Instant>,

    /// Time of the first event seen, the origin of the estimator clock.
    epoch: Option<Instant>,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Ledbat {
    pub fn new(config: LedbatConfig) -> Self {
        let mut estimator = DelayEstimator::new(
            config.noise_filter_len,
            config.base_history_len,
            config.ssthresh_policy,
        );
        estimator.set_rollover_interval(config.base_rollover_interval.as_secs());

        Self {
            cwnd: config.initial_congestion_window,
            ssthresh: config.slow_start_thresh,
            estimator,
            acked_bytes: 0,
            recovery_epoch_start: None,
            epoch: None,
            stats: Default::default(),
            config,
        }
    }

    /// The one-way delay estimator.
    pub fn estimator(&self) -> &DelayEstimator {
        &self.estimator
    }

    /// A snapshot of the delay estimator state.
    pub fn delay_stats(&self) -> DelayStats {
        self.estimator.stats()
    }

    /// Whole seconds elapsed since the first event seen by the controller.
    fn elapsed_secs(&mut self, now: Instant) -> u64 {
        let epoch = *self.epoch.get_or_insert(now);
        now.saturating_duration_since(epoch).as_secs()
    }
}

/// Narrow a byte count to the 32-bit arithmetic of the estimator.
fn saturate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl CongestionController for Ledbat {
    fn name(&self) -> &str {
        "LEDBAT"
    }

    fn on_sent(&mut self, now: Instant, segment: &SentSegment, bytes_in_flight: u64) {
        self.elapsed_secs(now);

        // Statistics.
        let sent_bytes = segment.sent_size as u64;

        self.stats.bytes_in_flight = bytes_in_flight;
        self.stats.bytes_sent_in_total = self.stats.bytes_sent_in_total.saturating_add(sent_bytes);

        if self.in_slow_start() {
            self.stats.bytes_sent_in_slow_start = self
                .stats
                .bytes_sent_in_slow_start
                .saturating_add(sent_bytes);
        }
    }

    fn begin_ack(&mut self, now: Instant, ack: &AckInfo, bytes_in_flight: u64) {
        let now = self.elapsed_secs(now);
        self.estimator
            .on_ack(ack.ts_value, ack.ts_echo_reply, !ack.rtt.is_zero(), now);
    }

    fn on_ack(
        &mut self,
        segment: &SentSegment,
        now: Instant,
        app_limited: bool,
        bytes_in_flight: u64,
    ) {
        // Statistics.
        let mut acked_bytes = segment.sent_size as u64;

        self.stats.bytes_in_flight = bytes_in_flight;
        self.stats.bytes_acked_in_total =
            self.stats.bytes_acked_in_total.saturating_add(acked_bytes);
        if self.in_slow_start() {
            self.stats.bytes_acked_in_slow_start = self
                .stats
                .bytes_acked_in_slow_start
                .saturating_add(acked_bytes);
        }

        if app_limited || self.in_recovery(segment.time_sent) {
            return;
        }

        if self.in_slow_start() {
            // Bytes beyond the threshold count towards congestion avoidance.
            let increase = cmp::min(acked_bytes, self.ssthresh - self.cwnd);
            self.cwnd += increase;
            acked_bytes -= increase;
        }

        if acked_bytes > 0 {
            // Congestion avoidance.
            self.acked_bytes = self.acked_bytes.saturating_add(acked_bytes);
            if self.acked_bytes >= self.cwnd {
                self.acked_bytes -= self.cwnd;
                self.cwnd = self.cwnd.saturating_add(self.config.max_datagram_size);
            }
        }
    }

    fn on_congestion_event(
        &mut self,
        now: Instant,
        segment: &SentSegment,
        is_persistent_congestion: bool,
        lost_bytes: u64,
        bytes_in_flight: u64,
    ) {
        // Statistics.
        self.stats.bytes_lost_in_total = self.stats.bytes_lost_in_total.saturating_add(lost_bytes);
        self.stats.bytes_in_flight = bytes_in_flight;

        if self.in_slow_start() {
            self.stats.bytes_lost_in_slow_start = self
                .stats
                .bytes_lost_in_slow_start
                .saturating_add(lost_bytes);
        }

        if self.in_recovery(segment.time_sent) {
            return;
        }

        // Enter recovery mode.
        self.recovery_epoch_start = Some(now);

        self.ssthresh = self.estimator.ssthresh(
            saturate_u32(self.config.max_datagram_size),
            saturate_u32(bytes_in_flight),
            saturate_u32(self.ssthresh),
        ) as u64;

        // A congestion event never grows the window.
        self.cwnd = cmp::min(self.cwnd, self.ssthresh).max(self.config.min_congestion_window);
        self.acked_bytes = 0;

        trace!(
            "{} congestion event, bytes_in_flight={} ssthresh={} cwnd={} {:?}",
            self.name(),
            bytes_in_flight,
            self.ssthresh,
            self.cwnd,
            self.estimator.stats()
        );

        // When persistent congestion is declared, the sender's congestion
        // window is reduced to the minimum congestion window.
        if is_persistent_congestion {
            self.recovery_epoch_start = None;
            self.cwnd = self.config.min_congestion_window;
        }
    }

    fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    fn in_recovery(&self, sent_time: Instant) -> bool {
        self.recovery_epoch_start.map_or(false, |t| sent_time <= t)
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd.max(self.config.min_congestion_window)
    }

    fn slow_start_threshold(&self) -> u64 {
        self.ssthresh
    }

    fn initial_window(&self) -> u64 {
        self.config.initial_congestion_window
    }

    fn minimal_window(&self) -> u64 {
        self.config.min_congestion_window
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DelayFilter;

    const MSS: u64 = 1460;

    fn segment(seq: u64, time_sent: Instant) -> SentSegment {
        SentSegment {
            seq,
            time_sent,
            sent_size: MSS as usize,
        }
    }

    /// An acknowledgment whose one-way delay is `owd`.
    fn ack_info(owd: u32) -> AckInfo {
        AckInfo {
            ts_value: 1000 + owd,
            ts_echo_reply: 1000,
            rtt: Duration::from_millis(20),
        }
    }

    /// Drive the estimator to base delay 100, current max 160 and a max
    /// observed queueing delay of 60.
    fn congest(cc: &mut Ledbat, now: Instant) {
        cc.begin_ack(now, &ack_info(100), 0);
        cc.end_ack();
        cc.begin_ack(now + Duration::from_secs(61), &ack_info(130), 0);
        cc.end_ack();
        for _ in 0..8 {
            cc.begin_ack(now + Duration::from_secs(62), &ack_info(160), 0);
            cc.end_ack();
        }
    }

    #[test]
    fn ledbat_init() {
        let cc = Ledbat::new(LedbatConfig::default());
        assert_eq!(cc.name(), "LEDBAT");
        assert_eq!(cc.congestion_window(), 10 * MSS);
        assert_eq!(cc.initial_window(), 10 * MSS);
        assert_eq!(cc.minimal_window(), 2 * MSS);
        assert_eq!(cc.slow_start_threshold(), u64::MAX);
        assert!(cc.in_slow_start());
        assert!(!cc.in_recovery(Instant::now()));
        assert_eq!(cc.stats().bytes_in_flight, 0);
        assert_eq!(cc.delay_stats(), DelayEstimator::default().stats());
    }

    #[test]
    fn ledbat_config() {
        let mut conf = RecoveryConfig::default();
        conf.set_noise_filter_len(4).unwrap();
        conf.set_base_history_len(3).unwrap();
        conf.set_base_rollover_interval(10);
        conf.ssthresh_policy = SsthreshPolicy::RetainPrior;

        let cc = Ledbat::new(LedbatConfig::from(&conf));
        assert_eq!(cc.estimator().noise_filter().capacity(), 4);
        assert_eq!(cc.estimator().base_history().capacity(), 3);
        assert_eq!(cc.estimator().policy(), SsthreshPolicy::RetainPrior);

        let mut cc = cc;
        let now = Instant::now();
        cc.begin_ack(now, &ack_info(100), 0);
        cc.begin_ack(now + Duration::from_secs(11), &ack_info(100), 0);
        assert_eq!(cc.estimator().base_history().len(), 2);

        let mut conf = LedbatConfig::default();
        conf.set_min_congestion_window(4 * 1000)
            .set_initial_congestion_window(8 * 1000)
            .set_slow_start_thresh(16 * 1000)
            .set_max_datagram_size(1000)
            .set_ssthresh_policy(SsthreshPolicy::RetainPrior);
        assert_eq!(conf.min_congestion_window, 4000);
        assert_eq!(conf.initial_congestion_window, 8000);
        assert_eq!(conf.slow_start_thresh, 16000);
        assert_eq!(conf.max_datagram_size, 1000);
        assert_eq!(conf.ssthresh_policy, SsthreshPolicy::RetainPrior);
    }

    #[test]
    fn ledbat_on_sent() {
        let mut cc = Ledbat::new(LedbatConfig::default());
        let now = Instant::now();
        let mut bytes_in_flight = 0;

        for n in 0..4 {
            bytes_in_flight += MSS;
            cc.on_sent(now, &segment(n * MSS, now), bytes_in_flight);
        }
        assert_eq!(cc.epoch, Some(now));
        assert_eq!(cc.stats().bytes_sent_in_total, 4 * MSS);
        assert_eq!(cc.stats().bytes_sent_in_slow_start, 4 * MSS);
        assert_eq!(cc.stats().bytes_in_flight, 4 * MSS);
    }

    #[test]
    fn ledbat_slow_start() {
        let mut cc = Ledbat::new(LedbatConfig::default());
        let now = Instant::now();
        let n_segments = 6;
        let segments: Vec<SentSegment> = (0..n_segments).map(|n| segment(n * MSS, now)).collect();

        let time_acked = now + Duration::from_millis(20);
        cc.begin_ack(time_acked, &AckInfo::default(), 0);
        for s in &segments {
            cc.on_ack(s, time_acked, false, 0);
        }
        cc.end_ack();

        assert!(!cc.estimator().timestamps_valid());
        assert!(cc.in_slow_start());
        assert_eq!(cc.congestion_window(), (10 + n_segments) * MSS);
        assert_eq!(cc.stats().bytes_acked_in_total, n_segments * MSS);
        assert_eq!(cc.stats().bytes_acked_in_slow_start, n_segments * MSS);

        // App limited acknowledgments do not grow the window.
        cc.on_ack(&segment(0, now), time_acked, true, 0);
        assert_eq!(cc.congestion_window(), (10 + n_segments) * MSS);
    }

    #[test]
    fn ledbat_slow_start_exit() {
        let mut conf = RecoveryConfig::default();
        conf.slow_start_thresh = 11;
        let mut cc = Ledbat::new(LedbatConfig::from(&conf));
        let now = Instant::now();

        cc.on_ack(&segment(0, now), now, false, 0);
        assert_eq!(cc.congestion_window(), 11 * MSS);
        assert!(!cc.in_slow_start());

        cc.on_ack(&segment(MSS, now), now, false, 0);
        assert_eq!(cc.congestion_window(), 11 * MSS);
        assert_eq!(cc.acked_bytes, MSS);
    }

    #[test]
    fn ledbat_congestion_event_without_timestamps() {
        let mut cc = Ledbat::new(LedbatConfig::default());
        let now = Instant::now();

        cc.begin_ack(now, &AckInfo::default(), 20000);
        cc.on_congestion_event(now, &segment(0, now), false, MSS, 20000);

        // max(2 * 1460, 20000 / 2)
        assert_eq!(cc.slow_start_threshold(), 10000);
        assert_eq!(cc.congestion_window(), 10000);
        assert!(!cc.in_slow_start());
        assert_eq!(cc.stats().bytes_lost_in_total, MSS);
        assert_eq!(cc.stats().bytes_lost_in_slow_start, MSS);
    }

    #[test]
    fn ledbat_congestion_event_with_delay() {
        let mut cc = Ledbat::new(LedbatConfig::default());
        let now = Instant::now();

        congest(&mut cc, now);
        assert_eq!(cc.estimator().base_delay(), 100);
        assert_eq!(cc.estimator().current_delay(DelayFilter::Max), 160);
        assert_eq!(cc.delay_stats().max_observed_queueing_delay, 60);

        // 20000 * 60 / (2 * 60)
        let t = now + Duration::from_secs(63);
        cc.on_congestion_event(t, &segment(0, now + Duration::from_secs(62)), false, MSS, 20000);
        assert_eq!(cc.slow_start_threshold(), 10000);
        assert_eq!(cc.congestion_window(), 10000);
        assert!(cc.in_recovery(t));

        // Losses of segments sent before the recovery epoch are ignored.
        cc.on_congestion_event(
            t + Duration::from_millis(10),
            &segment(MSS, now + Duration::from_secs(62)),
            false,
            MSS,
            4000,
        );
        assert_eq!(cc.slow_start_threshold(), 10000);
        assert_eq!(cc.stats().bytes_lost_in_total, 2 * MSS);

        // So are their acknowledgments.
        cc.on_ack(&segment(2 * MSS, t), t, false, 0);
        assert_eq!(cc.acked_bytes, 0);

        // Congestion avoidance: one segment per window of acked bytes.
        let sent = t + Duration::from_millis(1);
        for n in 0..6 {
            cc.on_ack(&segment(n * MSS, sent), sent, false, 0);
        }
        assert_eq!(cc.congestion_window(), 10000);
        cc.on_ack(&segment(6 * MSS, sent), sent, false, 0);
        assert_eq!(cc.congestion_window(), 10000 + MSS);
        assert_eq!(cc.acked_bytes, 7 * MSS - 10000);
    }

    #[test]
    fn ledbat_congestion_event_policy() {
        let mut conf = RecoveryConfig::default();
        conf.ssthresh_policy = SsthreshPolicy::RetainPrior;
        conf.slow_start_thresh = 6;
        let mut cc = Ledbat::new(LedbatConfig::from(&conf));
        let now = Instant::now();

        congest(&mut cc, now);
        let t = now + Duration::from_secs(63);
        cc.on_congestion_event(t, &segment(0, t), false, MSS, 20000);

        // Bounded by the prior threshold of 6 * 1460.
        assert_eq!(cc.slow_start_threshold(), 6 * MSS);
        assert_eq!(cc.congestion_window(), 6 * MSS);
    }

    #[test]
    fn ledbat_persistent_congestion() {
        let mut cc = Ledbat::new(LedbatConfig::default());
        let now = Instant::now();

        cc.on_congestion_event(now, &segment(0, now), true, MSS, 20000);
        assert_eq!(cc.slow_start_threshold(), 10000);
        assert_eq!(cc.congestion_window(), cc.minimal_window());
        assert!(!cc.in_recovery(now));
        assert!(cc.in_slow_start());
    }

    #[test]
    fn ledbat_fork() {
        let mut cc = Ledbat::new(LedbatConfig::default());
        let now = Instant::now();
        congest(&mut cc, now);

        let mut forked = cc.clone();
        let mut t = now + Duration::from_secs(62);
        for n in 0..200_u64 {
            t += Duration::from_millis(300);
            let s = segment(n * MSS, t);
            let ack = ack_info(100 + (n % 50) as u32);
            let bytes_in_flight = 10 * MSS + (n % 7) * MSS;

            for c in [&mut cc, &mut forked] {
                c.on_sent(t, &s, bytes_in_flight);
                c.begin_ack(t, &ack, bytes_in_flight);
                c.on_ack(&s, t, false, bytes_in_flight);
                c.end_ack();
                if n % 20 == 0 {
                    c.on_congestion_event(t, &s, false, MSS, bytes_in_flight);
                }
            }

            assert_eq!(cc.congestion_window(), forked.congestion_window());
            assert_eq!(cc.slow_start_threshold(), forked.slow_start_threshold());
            assert_eq!(cc.delay_stats(), forked.delay_stats());
        }
    }
}
