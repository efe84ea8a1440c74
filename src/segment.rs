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

use std::time::Duration;
use std::time::Instant;

/// Metadata of a segment handed to the congestion controller.
#[derive(Clone, Debug)]
pub struct SentSegment {
    /// The sequence number of the first byte in the segment.
    pub seq: u64,

    /// The time the segment was sent.
    pub time_sent: Instant,

    /// The segment size in bytes.
    pub sent_size: usize,
}

impl Default for SentSegment {
    fn default() -> Self {
        SentSegment {
            seq: 0,
            time_sent: Instant::now(),
            sent_size: 0,
        }
    }
}

/// Timestamp and RTT information carried by an acknowledgment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AckInfo {
    /// The peer's timestamp value (TSval), zero if absent.
    pub ts_value: u32,

    /// The echoed timestamp (TSecr), zero if absent.
    pub ts_echo_reply: u32,

    /// The RTT sample taken from this acknowledgment.
    pub rtt: Duration,
}

impl AckInfo {
    /// Whether both timestamp fields are populated.
    pub fn has_timestamps(&self) -> bool {
        self.ts_value != 0 && self.ts_echo_reply != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_info_timestamps() {
        let ack = AckInfo::default();
        assert!(!ack.has_timestamps());

        let ack = AckInfo {
            ts_value: 10,
            ..AckInfo::default()
        };
        assert!(!ack.has_timestamps());

        let ack = AckInfo {
            ts_value: 10,
            ts_echo_reply: 4,
            rtt: Duration::from_millis(10),
        };
        assert!(ack.has_timestamps());
    }
}
