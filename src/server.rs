//! The daemon core: a single-threaded poll loop bridging master devices and
//! their virtuals.
//!
//! Every byte a master produces is broadcast to all of its connected
//! virtuals; bytes arriving on the writer virtual are forwarded to the
//! master. A failing link is dropped and reopened on a later reconnect
//! pass, never taking the daemon down with it.

use std::fs;
use std::io::{self, Read, Write};
use std::os::fd::{BorrowedFd, RawFd};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use nix::poll::{PollFd, PollFlags, poll};

use crate::config::ServerConfig;
use crate::link::{MasterLink, VirtualLink};
use crate::node::SerialState;
use crate::types::SproxyError;

const READ_CHUNK: usize = 4096;

#[derive(Clone, Copy)]
enum Source {
    Master(usize),
    Virtual(usize, usize),
}

pub struct Server {
    config: ServerConfig,
    state: SerialState,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: ServerConfig, state: SerialState) -> Self {
        Self {
            config,
            state,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the interrupt handler: the first signal requests a clean
    /// stop, a second one aborts immediately.
    pub fn install_signal_handler(&self) -> Result<(), SproxyError> {
        let flag = Arc::clone(&self.shutdown);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                process::exit(1);
            }
        })
        .map_err(|e| SproxyError::Config(format!("signal handler: {e}")))
    }

    /// Run until shutdown is requested. Device failures are survived; only
    /// the interrupt signal ends the loop.
    pub fn run(&mut self) -> Result<(), SproxyError> {
        self.write_pidfile();
        self.reconnect();
        info!(
            "Proxying {} serial device(s), {} virtual(s)",
            self.state.master_count(),
            self.state.virtual_count()
        );

        let tick = self.config.system.tick();
        let reconnect_interval = self.config.system.reconnect_interval();
        let mut last_reconnect = Instant::now();

        while !self.shutdown.load(Ordering::SeqCst) {
            self.poll_once(tick);

            if last_reconnect.elapsed() >= reconnect_interval {
                self.reconnect();
                last_reconnect = Instant::now();
            }
        }

        info!("User requested shutdown...");
        self.close_all();
        self.remove_pidfile();
        Ok(())
    }

    /// Wait up to `timeout` for readable links and service every event.
    fn poll_once(&mut self, timeout: Duration) {
        let mut sources: Vec<(Source, RawFd)> = Vec::new();
        for (i, master) in self.state.masters.iter().enumerate() {
            if let Some(link) = &master.link {
                sources.push((Source::Master(i), link.fd()));
            }
            for (j, virt) in master.virtuals.iter().enumerate() {
                if let Some(link) = &virt.link {
                    sources.push((Source::Virtual(i, j), link.fd()));
                }
            }
        }

        if sources.is_empty() {
            std::thread::sleep(timeout);
            return;
        }

        let mut fds: Vec<PollFd> = sources
            .iter()
            // Links are not touched again until poll() returns.
            .map(|(_, fd)| PollFd::new(unsafe { BorrowedFd::borrow_raw(*fd) }, PollFlags::POLLIN))
            .collect();

        let timeout_ms = timeout.as_millis().min(u128::from(u16::MAX)) as u16;
        match poll(&mut fds, timeout_ms) {
            Ok(0) => return,
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => return,
            Err(e) => {
                error!("poll: {e}");
                return;
            }
        }

        let ready: Vec<(usize, PollFlags)> = fds
            .iter()
            .enumerate()
            .filter_map(|(k, fd)| fd.revents().map(|revents| (k, revents)))
            .filter(|(_, revents)| !revents.is_empty())
            .collect();
        drop(fds);

        for (k, revents) in ready {
            let (source, _) = sources[k];
            if revents.contains(PollFlags::POLLIN) {
                match source {
                    Source::Master(i) => self.service_master(i),
                    Source::Virtual(i, j) => self.service_virtual(i, j),
                }
            } else if revents.intersects(
                PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL,
            ) {
                self.drop_link(source, "hangup");
            }
        }
    }

    /// Read a chunk from the master and broadcast it to every connected
    /// virtual. A failing virtual loses only its own link.
    fn service_master(&mut self, i: usize) {
        let mut buf = [0u8; READ_CHUNK];
        let master = &mut self.state.masters[i];

        let Some(link) = master.link.as_mut() else {
            return;
        };
        let n = match link.read(&mut buf) {
            Ok(0) => {
                error!("I/O error reading from {}: device closed", master.path);
                master.link = None;
                return;
            }
            Ok(n) => n,
            Err(e) if spurious(&e) => return,
            Err(e) => {
                error!("I/O error reading from {}: {e}", master.path);
                master.link = None;
                return;
            }
        };
        debug!("read {n} bytes from {}", master.path);

        let mut targets: Vec<usize> = Vec::new();
        let mut sinks: Vec<&mut dyn Write> = Vec::new();
        for (j, virt) in master.virtuals.iter_mut().enumerate() {
            if let Some(link) = virt.link.as_mut() {
                targets.push(j);
                sinks.push(link);
            }
        }

        let failed = fan_out(&buf[..n], &mut sinks);
        drop(sinks);
        for k in failed {
            let virt = &mut master.virtuals[targets[k]];
            error!("I/O error writing to {}", virt.path);
            virt.link = None;
        }
    }

    /// Read a chunk from a virtual. Writer virtuals forward to the master;
    /// anything else is drained so the pseudo-terminal stays usable.
    fn service_virtual(&mut self, i: usize, j: usize) {
        let mut buf = [0u8; READ_CHUNK];
        let master = &mut self.state.masters[i];

        let n = {
            let virt = &mut master.virtuals[j];
            let Some(link) = virt.link.as_mut() else {
                return;
            };
            match link.read(&mut buf) {
                Ok(0) => {
                    error!("I/O error reading from {}: closed", virt.path);
                    virt.link = None;
                    return;
                }
                Ok(n) => n,
                Err(e) if spurious(&e) => return,
                Err(e) => {
                    error!("I/O error reading from {}: {e}", virt.path);
                    virt.link = None;
                    return;
                }
            }
        };

        if !master.virtuals[j].writer {
            debug!("discarded {n} bytes from {}", master.virtuals[j].path);
            return;
        }

        match master.link.as_mut() {
            Some(link) => {
                if let Err(e) = link.write_all(&buf[..n]) {
                    error!("I/O error writing to {}: {e}", master.path);
                    master.link = None;
                } else {
                    debug!("wrote {n} bytes from {} to {}", master.virtuals[j].path, master.path);
                }
            }
            None => debug!(
                "{}: master not connected, dropped {n} bytes",
                master.virtuals[j].path
            ),
        }
    }

    fn drop_link(&mut self, source: Source, reason: &str) {
        match source {
            Source::Master(i) => {
                let master = &mut self.state.masters[i];
                if master.link.take().is_some() {
                    error!("I/O error on {}: {reason}", master.path);
                }
            }
            Source::Virtual(i, j) => {
                let virt = &mut self.state.masters[i].virtuals[j];
                if virt.link.take().is_some() {
                    error!("I/O error on {}: {reason}", virt.path);
                }
            }
        }
    }

    /// Open every node that currently has no link. A master that fails to
    /// open keeps its virtuals down as well.
    fn reconnect(&mut self) {
        for master in &mut self.state.masters {
            if master.link.is_none() {
                match MasterLink::open(&master.path, master.baudrate) {
                    Ok(link) => {
                        info!("Connected serial: {} ({})", master.path, link.fd());
                        master.link = Some(link);
                    }
                    Err(e) => {
                        warn!("Problem connecting serial device {}: {e}", master.path);
                        continue;
                    }
                }
            }

            for virt in &mut master.virtuals {
                if virt.link.is_none() {
                    match VirtualLink::open(&virt.path) {
                        Ok(link) => {
                            info!("Connected virtual: {} ({})", virt.path, link.fd());
                            virt.link = Some(link);
                        }
                        Err(e) => warn!("Problem connecting virtual device {}: {e}", virt.path),
                    }
                }
            }
        }
    }

    fn close_all(&mut self) {
        for master in &mut self.state.masters {
            for virt in &mut master.virtuals {
                if virt.link.take().is_some() {
                    info!("Closing virtual: {}", virt.path);
                }
            }
            if master.link.take().is_some() {
                info!("Closing serial: {}", master.path);
            }
        }
    }

    fn write_pidfile(&self) {
        if let Some(path) = &self.config.system.pidfile {
            match fs::write(path, format!("{}\n", process::id())) {
                Ok(()) => debug!("pid {} written to {}", process::id(), path.display()),
                Err(e) => warn!("Can't write pid file {}: {e}", path.display()),
            }
        }
    }

    fn remove_pidfile(&self) {
        if let Some(path) = &self.config.system.pidfile {
            let _ = fs::remove_file(path);
        }
    }
}

/// True for errors that mean "nothing to do right now" rather than a broken
/// device.
fn spurious(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Write the chunk to every sink, returning the indices whose write failed.
fn fan_out(data: &[u8], sinks: &mut [&mut dyn Write]) -> Vec<usize> {
    let mut failed = Vec::new();
    for (k, sink) in sinks.iter_mut().enumerate() {
        if let Err(e) = sink.write_all(data) {
            debug!("fan-out write: {e}");
            failed.push(k);
        }
    }
    failed
}
