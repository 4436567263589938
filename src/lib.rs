//! Serial port proxy with console tools.
//!
//! `sproxyd` opens *master* serial devices and exposes each one as a set of
//! *virtual* devices backed by pseudo-terminal pairs: everything the master
//! produces is broadcast to every virtual, and one designated writer
//! virtual may send data back. `sproxy-reader` and `sproxy-writer` are the
//! matching console tools for exercising either side of a link byte by
//! byte and line by line.
//!
//! # Features
//!
//! - `serial` (default) - real device transport using the serialport crate
//!
//! # Example
//!
//! ```ignore
//! use std::sync::atomic::AtomicBool;
//! use sproxy::{SerialTransport, read_loop};
//!
//! let mut transport = SerialTransport::new("/dev/ttyUSB0", 9600)?;
//! let stop = AtomicBool::new(false);
//! read_loop(&mut transport, &stop);
//! ```

mod config;
mod console;
mod logging;
mod transport;
mod types;

#[cfg(feature = "serial")]
mod serial;

#[cfg(all(unix, feature = "serial"))]
mod link;
#[cfg(all(unix, feature = "serial"))]
mod node;
#[cfg(all(unix, feature = "serial"))]
mod server;

// Re-exports
pub use config::{
    DEFAULT_BAUDRATE, DeviceConfig, LogLevel, LoggingConfig, SerialConfig, ServerConfig,
    SystemConfig, virtual_path,
};
pub use console::{read_loop, write_loop};
pub use logging::{init_console, init_daemon};
pub use transport::Transport;
pub use types::SproxyError;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(all(unix, feature = "serial"))]
pub use link::{MasterLink, VirtualLink};
#[cfg(all(unix, feature = "serial"))]
pub use node::{MasterNode, SerialState, VirtualNode};
#[cfg(all(unix, feature = "serial"))]
pub use server::Server;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    enum ReadStep {
        Data(Vec<u8>),
        Timeout,
        Fail,
    }

    /// Mock transport driven by a scripted sequence of read outcomes. Once
    /// the script runs dry it raises the shared stop flag, ending the loop
    /// under test the same way an interrupt would.
    struct ScriptedTransport {
        reads: VecDeque<ReadStep>,
        write_failures: VecDeque<bool>,
        writes: Vec<Vec<u8>>,
        stop: Arc<AtomicBool>,
    }

    impl ScriptedTransport {
        fn new(reads: Vec<ReadStep>, stop: Arc<AtomicBool>) -> Self {
            Self {
                reads: reads.into(),
                write_failures: VecDeque::new(),
                writes: Vec::new(),
                stop,
            }
        }

        fn with_write_failures(failures: Vec<bool>, stop: Arc<AtomicBool>) -> Self {
            Self {
                reads: VecDeque::new(),
                write_failures: failures.into(),
                writes: Vec::new(),
                stop,
            }
        }
    }

    impl Transport for ScriptedTransport {
        type Error = io::Error;

        fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
            if self.write_failures.pop_front().unwrap_or(false) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
            }
            self.writes.push(data.to_vec());
            Ok(data.len())
        }

        fn read(&mut self, buf: &mut [u8], _timeout_ms: u32) -> Result<usize, Self::Error> {
            match self.reads.pop_front() {
                None => {
                    self.stop.store(true, Ordering::SeqCst);
                    Ok(0)
                }
                Some(ReadStep::Data(data)) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                Some(ReadStep::Timeout) => Ok(0),
                Some(ReadStep::Fail) => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "read failed"))
                }
            }
        }
    }

    // ===================
    // read_loop tests
    // ===================

    #[test]
    fn test_read_loop_consumes_one_byte_per_iteration() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(
            vec![
                ReadStep::Data(vec![0x41]),
                ReadStep::Timeout,
                ReadStep::Data(vec![0x42]),
            ],
            Arc::clone(&stop),
        );

        let total = read_loop(&mut transport, &stop);
        assert_eq!(total, 2);
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_loop_continues_after_failure() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(
            vec![
                ReadStep::Fail,
                ReadStep::Data(vec![0x01]),
                ReadStep::Fail,
                ReadStep::Fail,
                ReadStep::Data(vec![0x02]),
            ],
            Arc::clone(&stop),
        );

        // Failures are reported but never end the loop.
        let total = read_loop(&mut transport, &stop);
        assert_eq!(total, 2);
    }

    #[test]
    fn test_read_loop_timeouts_are_not_failures() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::new(
            vec![ReadStep::Timeout, ReadStep::Timeout, ReadStep::Timeout],
            Arc::clone(&stop),
        );

        let total = read_loop(&mut transport, &stop);
        assert_eq!(total, 0);
    }

    #[test]
    fn test_read_loop_honors_stop_before_reading() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut transport =
            ScriptedTransport::new(vec![ReadStep::Data(vec![0xFF])], Arc::clone(&stop));

        let total = read_loop(&mut transport, &stop);
        assert_eq!(total, 0);
        // The transport was never touched.
        assert_eq!(transport.reads.len(), 1);
    }

    // ===================
    // write_loop tests
    // ===================

    #[test]
    fn test_write_loop_writes_every_line() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::with_write_failures(vec![], Arc::clone(&stop));

        let lines = vec!["hello".to_string(), "world".to_string()];
        let sent = write_loop(&mut transport, lines, &stop);

        assert_eq!(sent, 2);
        assert_eq!(transport.writes, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn test_write_loop_does_not_append_newlines() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::with_write_failures(vec![], Arc::clone(&stop));

        write_loop(&mut transport, vec!["at+reset".to_string()], &stop);
        assert_eq!(transport.writes, vec![b"at+reset".to_vec()]);
    }

    #[test]
    fn test_write_loop_continues_after_failure() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport =
            ScriptedTransport::with_write_failures(vec![true, false], Arc::clone(&stop));

        let lines = vec!["lost".to_string(), "kept".to_string()];
        let sent = write_loop(&mut transport, lines, &stop);

        assert_eq!(sent, 1);
        assert_eq!(transport.writes, vec![b"kept".to_vec()]);
    }

    #[test]
    fn test_write_loop_ends_when_input_is_exhausted() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::with_write_failures(vec![], Arc::clone(&stop));

        let sent = write_loop(&mut transport, Vec::<String>::new(), &stop);
        assert_eq!(sent, 0);
        assert!(transport.writes.is_empty());
    }

    #[test]
    fn test_write_loop_honors_stop() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut transport = ScriptedTransport::with_write_failures(vec![], Arc::clone(&stop));

        let sent = write_loop(&mut transport, vec!["ignored".to_string()], &stop);
        assert_eq!(sent, 0);
        assert!(transport.writes.is_empty());
    }

    #[test]
    fn test_write_loop_accepts_empty_lines() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut transport = ScriptedTransport::with_write_failures(vec![], Arc::clone(&stop));

        let sent = write_loop(&mut transport, vec![String::new()], &stop);
        assert_eq!(sent, 1);
        assert_eq!(transport.writes, vec![Vec::<u8>::new()]);
    }

    // ===================
    // SproxyError tests
    // ===================

    #[test]
    fn test_error_display() {
        let err = SproxyError::Transport("/dev/ttyUSB0: no such device".into());
        assert_eq!(
            err.to_string(),
            "transport error: /dev/ttyUSB0: no such device"
        );

        let err = SproxyError::Config("bad loglevel".into());
        assert_eq!(err.to_string(), "configuration error: bad loglevel");
    }

    #[test]
    fn test_error_from_io() {
        let err = SproxyError::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(matches!(err, SproxyError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
