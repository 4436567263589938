//! Console tool: write operator-entered lines to a serial device.
//!
//! Prompts for one line at a time; write failures are reported and the
//! prompt returns until interrupted or stdin is closed.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use sproxy::{SerialTransport, write_loop};

#[derive(Debug, Parser)]
#[command(name = "sproxy-writer", about = "Serial port writer", version)]
struct Cli {
    /// Serial device to write to (e.g. /dev/ttyUSB0)
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

    let lines = prompted_lines(format!("{device}> "), Arc::clone(&stop));
    let sent = write_loop(&mut transport, lines, &stop);
    info!("{sent} line(s) written to {device}");
    println!("Quitting...");
    Ok(())
}

/// Prompt on stdout, then block for one line of stdin. Ends on end-of-file
/// or a stop request; the line terminator is stripped before transmission.
fn prompted_lines(prompt: String, stop: Arc<AtomicBool>) -> impl Iterator<Item = String> {
    std::iter::from_fn(move || {
        if stop.load(Ordering::SeqCst) {
            return None;
        }

        print!("{prompt}");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Some(line)
            }
        }
    })
}
