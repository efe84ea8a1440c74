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

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::*;
use serde::Serialize;

use ledbat::CongestionController;
use ledbat::DelayStats;
use ledbat::Ledbat;
use ledbat::LedbatConfig;
use ledbat::RecoveryConfig;
use ledbat::SentSegment;
use ledbat::SsthreshPolicy;
use ledbat_tools::parse_trace;
use ledbat_tools::Result;
use ledbat_tools::TraceEvent;
use ledbat_tools::TraceRecord;

#[derive(Parser, Debug)]
#[clap(name = "ledbat_replay")]
pub struct ReplayOpt {
    /// Trace file to replay.
    #[clap(value_name = "FILE")]
    pub trace: PathBuf,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO")]
    pub log_level: log::LevelFilter,

    /// Print one JSON object per event instead of plain columns.
    #[clap(long)]
    pub json: bool,

    /// Segment size in bytes.
    #[clap(long, default_value = "1460", value_name = "NUM")]
    pub max_datagram_size: usize,

    /// Upper bound policy for the slow start threshold, support
    /// retain-prior/bif-plus-segment.
    #[clap(long, default_value = "bif-plus-segment", value_name = "STR")]
    pub ssthresh_policy: SsthreshPolicy,

    /// Length of the noise filter in samples.
    #[clap(long, default_value = "8", value_name = "NUM")]
    pub noise_filter_len: usize,

    /// Length of the base delay history in samples.
    #[clap(long, default_value = "10", value_name = "NUM")]
    pub base_history_len: usize,

    /// Duration of a base delay epoch in seconds.
    #[clap(long, default_value = "60", value_name = "SECS")]
    pub rollover_interval: u64,

    /// Initial congestion window in packets.
    #[clap(long, default_value = "10", value_name = "NUM")]
    pub initial_congestion_window: u64,
}

/// Controller state printed after each trace event.
#[derive(Serialize)]
struct ReplayState {
    time_ms: u128,
    event: &'static str,
    bytes_in_flight: u64,
    cwnd: u64,
    ssthresh: u64,
    delay: DelayStats,
}

/// Feeds trace events to a controller, pairing acknowledgments and losses
/// with outstanding segments in send order.
struct Replayer {
    cc: Ledbat,
    start: Instant,
    outstanding: VecDeque<SentSegment>,
    next_seq: u64,
    bytes_in_flight: u64,
}

impl Replayer {
    fn new(conf: &RecoveryConfig) -> Self {
        Replayer {
            cc: Ledbat::new(LedbatConfig::from(conf)),
            start: Instant::now(),
            outstanding: VecDeque::new(),
            next_seq: 0,
            bytes_in_flight: 0,
        }
    }

    /// Take the oldest outstanding segment, or a fresh one when the trace
    /// refers to bytes it never sent.
    fn take_segment(&mut self, now: Instant, bytes: u64) -> SentSegment {
        match self.outstanding.pop_front() {
            Some(segment) => {
                self.bytes_in_flight = self
                    .bytes_in_flight
                    .saturating_sub(segment.sent_size as u64);
                segment
            }
            None => {
                warn!("no outstanding segment for {} bytes", bytes);
                SentSegment {
                    seq: self.next_seq,
                    time_sent: now,
                    sent_size: bytes as usize,
                }
            }
        }
    }

    fn replay(&mut self, record: &TraceRecord) -> ReplayState {
        let now = self.start + record.time;

        let event = match record.event {
            TraceEvent::Send { bytes } => {
                let segment = SentSegment {
                    seq: self.next_seq,
                    time_sent: now,
                    sent_size: bytes as usize,
                };
                self.next_seq += bytes;
                self.bytes_in_flight += bytes;
                self.cc.on_sent(now, &segment, self.bytes_in_flight);
                self.outstanding.push_back(segment);
                "send"
            }
            TraceEvent::Ack { bytes, ack } => {
                self.cc.begin_ack(now, &ack, self.bytes_in_flight);
                let mut segment = self.take_segment(now, bytes);
                segment.sent_size = bytes as usize;
                self.cc.on_ack(&segment, now, false, self.bytes_in_flight);
                self.cc.end_ack();
                "ack"
            }
            TraceEvent::Loss { bytes } | TraceEvent::Timeout { bytes } => {
                let persistent = matches!(record.event, TraceEvent::Timeout { .. });
                // The threshold is derived from the flight before the loss.
                let bytes_in_flight = self.bytes_in_flight;
                let segment = self.take_segment(now, bytes);
                self.cc
                    .on_congestion_event(now, &segment, persistent, bytes, bytes_in_flight);
                if persistent {
                    "timeout"
                } else {
                    "loss"
                }
            }
        };

        debug!(
            "{:?} {} cwnd={} ssthresh={}",
            record.time,
            event,
            self.cc.congestion_window(),
            self.cc.slow_start_threshold()
        );

        ReplayState {
            time_ms: record.time.as_millis(),
            event,
            bytes_in_flight: self.bytes_in_flight,
            cwnd: self.cc.congestion_window(),
            ssthresh: self.cc.slow_start_threshold(),
            delay: self.cc.delay_stats(),
        }
    }
}

fn main() -> Result<()> {
    let option = ReplayOpt::parse();

    // Initialize logging.
    env_logger::builder().filter_level(option.log_level).init();

    let mut conf = RecoveryConfig::default();
    conf.max_datagram_size = option.max_datagram_size;
    conf.initial_congestion_window = option.initial_congestion_window;
    conf.ssthresh_policy = option.ssthresh_policy;
    conf.set_noise_filter_len(option.noise_filter_len)?;
    conf.set_base_history_len(option.base_history_len)?;
    conf.set_base_rollover_interval(option.rollover_interval);

    let trace = std::fs::read_to_string(&option.trace)
        .map_err(|e| format!("read {}: {}", option.trace.display(), e))?;
    let records = parse_trace(&trace)?;
    info!(
        "replay {} events from {}",
        records.len(),
        option.trace.display()
    );

    let mut replayer = Replayer::new(&conf);
    if !option.json {
        println!("time cwnd ssthresh queueing_delay");
    }
    for record in &records {
        let state = replayer.replay(record);
        if option.json {
            println!("{}", serde_json::to_string(&state)?);
        } else {
            println!(
                "{} {} {} {}",
                state.time_ms, state.cwnd, state.ssthresh, state.delay.queueing_delay
            );
        }
    }

    let stats = replayer.cc.stats();
    info!(
        "sent {} bytes, acked {} bytes, lost {} bytes",
        stats.bytes_sent_in_total, stats.bytes_acked_in_total, stats.bytes_lost_in_total
    );

    Ok(())
}
