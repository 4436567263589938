//! Console loops for exercising a serial device.
//!
//! These are the cores of `sproxy-reader` and `sproxy-writer`: a one-byte
//! read loop that discards whatever arrives, and a line-at-a-time write loop
//! fed by operator input. A transport failure is reported and the loop keeps
//! going; only the stop flag (or exhausted input) ends it.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};

use crate::transport::Transport;

/// Poll granularity of the read loop. Short enough that a stop request is
/// honored promptly, long enough not to spin.
const READ_TIMEOUT_MS: u32 = 200;

/// Read one byte per iteration and discard it until `stop` is set.
///
/// Timeouts print nothing; a transport failure is reported and the loop
/// continues. Returns the number of bytes consumed.
pub fn read_loop<T: Transport>(transport: &mut T, stop: &AtomicBool) -> u64 {
    let mut total = 0u64;
    let mut buf = [0u8; 1];

    while !stop.load(Ordering::SeqCst) {
        match transport.read(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => {}
            Ok(n) => total += n as u64,
            Err(e) => error!("read failure: {e:?}"),
        }
    }

    total
}

/// Write each line of operator input to the transport until `stop` is set
/// or the input is exhausted.
///
/// A transport failure is reported and the loop moves on to the next line.
/// Returns the number of lines fully written.
pub fn write_loop<T, I>(transport: &mut T, lines: I, stop: &AtomicBool) -> u64
where
    T: Transport,
    I: IntoIterator<Item = String>,
{
    let mut sent = 0u64;

    for line in lines {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match transport.write(line.as_bytes()) {
            Ok(n) => {
                debug!("wrote {n} bytes");
                sent += 1;
            }
            Err(e) => error!("write failure: {e:?}"),
        }
    }

    sent
}
