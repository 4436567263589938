//! Console tool: read a serial device one byte at a time.
//!
//! Nothing is printed for data; read failures are reported and the loop
//! keeps going until interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use sproxy::{SerialTransport, read_loop};

#[derive(Debug, Parser)]
#[command(name = "sproxy-reader", about = "Serial port reader", version)]
struct Cli {
    /// Serial device to read from (e.g. /dev/ttyUSB0)
    device: Option<String>,

    /// Baud rate for the connection
    #[arg(default_value_t = sproxy::DEFAULT_BAUDRATE)]
    baudrate: u32,
}

fn main() -> Result<()> {
    sproxy::init_console();
    let cli = Cli::parse();

    let Some(device) = cli.device else {
        bail!("a serial device path is required");
    };

    let mut transport = SerialTransport::new(&device, cli.baudrate)
        .with_context(|| format!("opening {device}"))?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst))
        .context("installing interrupt handler")?;

    let total = read_loop(&mut transport, &stop);
    info!("{total} byte(s) read from {device}");
    println!("Quitting...");
    Ok(())
}
