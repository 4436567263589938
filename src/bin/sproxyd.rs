//! The serial proxy daemon.

#[cfg(unix)]
mod daemon {
    use anyhow::{Context, Result};
    use clap::Parser;
    use log::info;

    use sproxy::{SerialConfig, SerialState, Server, ServerConfig};

    #[derive(Debug, Parser)]
    #[command(name = "sproxyd", about = "Serial proxy daemon", version)]
    struct Cli {
        /// Server configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<std::path::PathBuf>,

        /// Serial device configuration file (overrides the server config)
        #[arg(short = 's', long = "serial-config")]
        serial_config: Option<std::path::PathBuf>,
    }

    pub fn run() -> Result<()> {
        let cli = Cli::parse();

        let config = match &cli.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        sproxy::init_daemon(&config.logging).context("initializing logging")?;

        let serial_path = cli
            .serial_config
            .unwrap_or_else(|| config.system.serial_configfile.clone());
        let serial_config = SerialConfig::load(&serial_path)
            .with_context(|| format!("loading {}", serial_path.display()))?;

        let state = SerialState::from_config(&serial_config);
        let mut server = Server::new(config, state);
        server.install_signal_handler().context("installing signal handler")?;

        info!("Server started, sproxy version {}", env!("CARGO_PKG_VERSION"));
        server.run()?;
        Ok(())
    }
}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    daemon::run()
}

#[cfg(not(unix))]
fn main() {
    eprintln!("sproxyd requires a Unix host");
    std::process::exit(1);
}
