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

//! C API for embedding the delay estimator in a host transport or a network
//! simulator.
//!
//! Note: The API is not stable and may change in future versions.

use std::ptr;
use std::sync::atomic;

use libc::c_void;
use libc::size_t;
use libc::ssize_t;

use crate::error::Error;
use crate::DelayEstimator;
use crate::Result;
use crate::SsthreshPolicy;

struct LogWriter {
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: atomic::AtomicPtr<c_void>,
}

impl log::Log for LogWriter {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!("{}: {}\n", record.target(), record.args());
        (self.cb)(
            line.as_ptr(),
            line.len(),
            self.argp.load(atomic::Ordering::Relaxed),
        );
    }

    fn flush(&self) {}
}

fn check_buffer_len(name: &str, len: size_t) -> Result<()> {
    if len == 0 {
        return Err(Error::InvalidConfig(format!("{} is zero", name)));
    }
    Ok(())
}

/// Create a delay estimator.
/// The caller is responsible for the memory of the estimator and should
/// properly destroy it by calling `ledbat_estimator_free`. Return NULL if
/// either buffer length is zero.
#[no_mangle]
pub extern "C" fn ledbat_estimator_new(
    noise_filter_len: size_t,
    base_history_len: size_t,
    policy: SsthreshPolicy,
) -> *mut DelayEstimator {
    let valid = check_buffer_len("noise filter length", noise_filter_len)
        .and_then(|_| check_buffer_len("base history length", base_history_len));
    match valid {
        Ok(_) => Box::into_raw(Box::new(DelayEstimator::new(
            noise_filter_len,
            base_history_len,
            policy,
        ))),
        Err(e) => {
            log::error!("create estimator failed: {:?}", e);
            ptr::null_mut()
        }
    }
}

/// Destroy a delay estimator.
#[no_mangle]
pub extern "C" fn ledbat_estimator_free(estimator: *mut DelayEstimator) {
    if estimator.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(estimator);
    };
}

/// Fork a delay estimator, for example when a connection is duplicated.
/// The copy must be destroyed by calling `ledbat_estimator_free`.
#[no_mangle]
pub extern "C" fn ledbat_estimator_clone(estimator: &DelayEstimator) -> *mut DelayEstimator {
    Box::into_raw(Box::new(estimator.clone()))
}

/// Set the base delay epoch duration in seconds.
#[no_mangle]
pub extern "C" fn ledbat_estimator_set_rollover_interval(
    estimator: &mut DelayEstimator,
    secs: u64,
) {
    estimator.set_rollover_interval(secs);
}

/// Process the timestamps of an acknowledgment. `now_secs` is the current
/// time in whole seconds.
#[no_mangle]
pub extern "C" fn ledbat_estimator_on_ack(
    estimator: &mut DelayEstimator,
    ts_value: u32,
    ts_echo_reply: u32,
    rtt_positive: bool,
    now_secs: u64,
) {
    estimator.on_ack(ts_value, ts_echo_reply, rtt_positive, now_secs);
}

/// Derive a slow start threshold in bytes.
#[no_mangle]
pub extern "C" fn ledbat_estimator_ssthresh(
    estimator: &DelayEstimator,
    segment_size: u32,
    bytes_in_flight: u32,
    prior_ssthresh: u32,
) -> u32 {
    estimator.ssthresh(segment_size, bytes_in_flight, prior_ssthresh)
}

/// Return the base delay, `UINT32_MAX` before the first sample.
#[no_mangle]
pub extern "C" fn ledbat_estimator_base_delay(estimator: &DelayEstimator) -> u32 {
    estimator.base_delay()
}

/// Return the current queueing delay.
#[no_mangle]
pub extern "C" fn ledbat_estimator_queueing_delay(estimator: &DelayEstimator) -> u32 {
    estimator.queueing_delay()
}

/// Parse a ssthresh policy name into `policy`.
/// Return 0 on success or a negative error number.
#[no_mangle]
pub extern "C" fn ledbat_ssthresh_policy_from_str(
    name: *const libc::c_char,
    policy: &mut SsthreshPolicy,
) -> ssize_t {
    if name.is_null() {
        return Error::InvalidArgument("policy name is null".into()).to_errno();
    }

    let name = unsafe { std::ffi::CStr::from_ptr(name) };
    let parsed = match name.to_str() {
        Ok(v) => v
            .parse::<SsthreshPolicy>()
            .map_err(|e| e.to_errno()),
        Err(_) => Err(Error::InvalidArgument("policy name is not utf-8".into()).to_errno()),
    };

    match parsed {
        Ok(v) => {
            *policy = v;
            0
        }
        Err(errno) => errno,
    }
}

/// Set logger.
/// `cb` is a callback function that will be called for each log message.
/// `data` is a '\n' terminated log message and `argp` is user-defined data
/// that will be passed to the callback.
/// `level` represents the log level.
#[no_mangle]
pub extern "C" fn ledbat_set_logger(
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: *mut c_void,
    level: log::LevelFilter,
) {
    let argp = atomic::AtomicPtr::new(argp);
    let logger = Box::new(LogWriter { cb, argp });
    let _ = log::set_boxed_logger(logger);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn estimator_lifecycle() {
        assert!(ledbat_estimator_new(0, 10, SsthreshPolicy::RetainPrior).is_null());
        assert!(ledbat_estimator_new(8, 0, SsthreshPolicy::RetainPrior).is_null());

        let e = ledbat_estimator_new(8, 10, SsthreshPolicy::RetainPrior);
        assert!(!e.is_null());
        let estimator = unsafe { &mut *e };

        assert_eq!(ledbat_estimator_base_delay(estimator), u32::MAX);
        assert_eq!(ledbat_estimator_ssthresh(estimator, 1460, 20000, 15000), 10000);

        ledbat_estimator_set_rollover_interval(estimator, 30);
        ledbat_estimator_on_ack(estimator, 1100, 1000, true, 0);
        ledbat_estimator_on_ack(estimator, 1150, 1000, true, 31);
        assert_eq!(estimator.base_history().len(), 2);
        assert_eq!(ledbat_estimator_base_delay(estimator), 100);
        assert_eq!(ledbat_estimator_queueing_delay(estimator), 0);

        let forked = ledbat_estimator_clone(estimator);
        assert_eq!(unsafe { &*forked }.stats(), estimator.stats());

        ledbat_estimator_free(forked);
        ledbat_estimator_free(e);
        ledbat_estimator_free(ptr::null_mut());
    }

    #[test]
    fn policy_from_str() {
        let mut policy = SsthreshPolicy::BytesInFlightPlusSegment;

        let name = CString::new("retain-prior").unwrap();
        assert_eq!(ledbat_ssthresh_policy_from_str(name.as_ptr(), &mut policy), 0);
        assert_eq!(policy, SsthreshPolicy::RetainPrior);

        let name = CString::new("unknown").unwrap();
        assert_eq!(ledbat_ssthresh_policy_from_str(name.as_ptr(), &mut policy), -1);
        assert_eq!(policy, SsthreshPolicy::RetainPrior);

        assert_eq!(
            ledbat_ssthresh_policy_from_str(ptr::null(), &mut policy),
            -2
        );
    }
}
