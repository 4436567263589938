//! Connection links: open master devices and pseudo-terminal virtuals.
//!
//! A master link is the real serial device. A virtual link is a
//! pseudo-terminal pair whose slave end is published through a symlink at
//! the virtual device path; clients open the symlink while the daemon moves
//! data through the master end of the pair.

use std::fs;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serialport::{SerialPort, TTYPort};

use crate::types::SproxyError;

/// Read timeout on link ports. Reads happen only after poll() reports the
/// descriptor readable, so this only bounds pathological races.
const LINK_TIMEOUT: Duration = Duration::from_millis(20);

pub struct MasterLink {
    port: TTYPort,
}

impl MasterLink {
    /// Open and configure the device in raw mode at the given baud rate.
    pub fn open(path: &str, baudrate: u32) -> Result<Self, SproxyError> {
        let port = serialport::new(path, baudrate)
            .timeout(LINK_TIMEOUT)
            .open_native()
            .map_err(|e| SproxyError::Transport(format!("{path}: {e}")))?;

        Ok(Self { port })
    }

    pub fn fd(&self) -> RawFd {
        self.port.as_raw_fd()
    }
}

impl Read for MasterLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for MasterLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

pub struct VirtualLink {
    pty: TTYPort,
    /// Keeping our own handle on the slave end stops the pair from
    /// signalling hangup whenever the last client disconnects.
    _slave: TTYPort,
    symlink: PathBuf,
}

impl VirtualLink {
    /// Allocate a pseudo-terminal pair and publish the slave end at `path`.
    pub fn open(path: &str) -> Result<Self, SproxyError> {
        let (mut pty, slave) =
            TTYPort::pair().map_err(|e| SproxyError::Transport(format!("{path}: {e}")))?;
        pty.set_timeout(LINK_TIMEOUT)
            .map_err(|e| SproxyError::Transport(format!("{path}: {e}")))?;

        let slave_path = slave
            .name()
            .ok_or_else(|| SproxyError::Transport(format!("{path}: unnamed pseudo-terminal")))?;

        let symlink = PathBuf::from(path);
        // Replace a stale node left over from a previous run.
        let _ = fs::remove_file(&symlink);
        std::os::unix::fs::symlink(&slave_path, &symlink)?;
        debug!("virtual {path} -> {slave_path}");

        Ok(Self {
            pty,
            _slave: slave,
            symlink,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.pty.as_raw_fd()
    }
}

impl Drop for VirtualLink {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.symlink);
    }
}

impl Read for VirtualLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pty.read(buf)
    }
}

impl Write for VirtualLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pty.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.pty.flush()
    }
}
