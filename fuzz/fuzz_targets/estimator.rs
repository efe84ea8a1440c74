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

#![no_main]

use libfuzzer_sys::fuzz_target;

use ledbat::DelayEstimator;
use ledbat::SsthreshPolicy;

/// Each record: ts_value (4), ts_echo_reply (4), rtt flag (1), seconds
/// elapsed since the previous record (1), bytes in flight (4).
const RECORD_LEN: usize = 14;

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let policy = if data[0] & 1 == 0 {
        SsthreshPolicy::RetainPrior
    } else {
        SsthreshPolicy::BytesInFlightPlusSegment
    };
    let noise_filter_len = (data[1] & 0x0f) as usize + 1;
    let base_history_len = (data[1] >> 4) as usize + 1;

    let mut estimator = DelayEstimator::new(noise_filter_len, base_history_len, policy);
    let mut now = 0;
    let mut ssthresh = u32::MAX;

    for record in data[2..].chunks_exact(RECORD_LEN) {
        let max_observed = estimator.max_observed_queueing_delay();

        now += record[9] as u64;
        estimator.on_ack(
            read_u32(&record[0..]),
            read_u32(&record[4..]),
            record[8] & 1 == 1,
            now,
        );

        assert!(estimator.max_observed_queueing_delay() >= max_observed);
        assert!(estimator.noise_filter().len() <= estimator.noise_filter().capacity());
        assert!(estimator.base_history().len() <= estimator.base_history().capacity());

        ssthresh = estimator.ssthresh(1460, read_u32(&record[10..]), ssthresh);
    }
});
