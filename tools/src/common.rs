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

use std::str::FromStr;
use std::time::Duration;

use ledbat::AckInfo;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// An event of a congestion control trace.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TraceEvent {
    /// A segment of the given size was sent.
    Send { bytes: u64 },

    /// A segment of the given size was acknowledged.
    Ack { bytes: u64, ack: AckInfo },

    /// A segment of the given size was declared lost.
    Loss { bytes: u64 },

    /// A retransmission timeout fired for a segment of the given size.
    Timeout { bytes: u64 },
}

/// A timestamped trace event.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TraceRecord {
    /// Time since the start of the trace.
    pub time: Duration,

    pub event: TraceEvent,
}

fn field<T: FromStr>(fields: &[&str], idx: usize, name: &str) -> Result<T> {
    let v = fields
        .get(idx)
        .ok_or_else(|| format!("missing field {}", name))?;
    v.parse::<T>()
        .map_err(|_| format!("invalid {} {:?}", name, v).into())
}

/// Parse one trace line.
///
/// ```text
/// <time_ms> send <bytes>
/// <time_ms> ack <bytes> <ts_value> <ts_echo_reply> <rtt_ms>
/// <time_ms> loss <bytes>
/// <time_ms> timeout <bytes>
/// ```
///
/// Blank lines and `#` comments yield `None`.
pub fn parse_trace_line(line: &str) -> Result<Option<TraceRecord>> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(None);
    }

    let time = Duration::from_millis(field(&fields, 0, "time")?);
    let kind: &str = fields.get(1).ok_or("missing event")?;
    let bytes = field(&fields, 2, "bytes")?;

    let (event, len) = match kind {
        "send" => (TraceEvent::Send { bytes }, 3),
        "loss" => (TraceEvent::Loss { bytes }, 3),
        "timeout" => (TraceEvent::Timeout { bytes }, 3),
        "ack" => {
            let ack = AckInfo {
                ts_value: field(&fields, 3, "ts_value")?,
                ts_echo_reply: field(&fields, 4, "ts_echo_reply")?,
                rtt: Duration::from_millis(field(&fields, 5, "rtt")?),
            };
            (TraceEvent::Ack { bytes, ack }, 6)
        }
        _ => return Err(format!("unknown event {:?}", kind).into()),
    };

    if fields.len() > len {
        return Err(format!("unexpected field {:?}", fields[len]).into());
    }

    Ok(Some(TraceRecord { time, event }))
}

/// Parse a whole trace, reporting the line number of the first error.
pub fn parse_trace(trace: &str) -> Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    for (n, line) in trace.lines().enumerate() {
        match parse_trace_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => (),
            Err(e) => return Err(format!("line {}: {}", n + 1, e).into()),
        }
    }
    Ok(records)
}
