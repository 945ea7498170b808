use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Discover, test and configure sensors on an RS-485 bus", long_about = None)]
pub struct Args {
    /// Path to config directory
    #[arg(long, default_value = "config")]
    pub config_dir: String,

    /// Talk to an in-memory bus instead of a serial port
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Verbose logging (ignored when RUST_LOG is set)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports; the last one is preselected
    Ports,
    /// List built-in sensor models
    Sensors,
    /// Find the address the sensor answers to
    Discover(Target),
    /// Poll the sensor until interrupted or `--count` readings arrived
    Test {
        #[command(flatten)]
        target: Target,
        /// Stop after this many readings
        #[arg(long)]
        count: Option<usize>,
    },
    /// Give the sensor a new address and, where supported, new line settings
    Configure {
        #[command(flatten)]
        target: Target,
        /// Address to assign
        new_address: String,
        /// Baudrate the sensor switches to
        #[arg(long)]
        new_baudrate: Option<u32>,
        /// Parity the sensor switches to (N, E, O)
        #[arg(long)]
        new_parity: Option<String>,
    },
}

/// Which sensor, and where
#[derive(ClapArgs, Debug, Clone)]
pub struct Target {
    /// Sensor model, as listed by `sensors`
    #[arg(long, short)]
    pub sensor: Option<String>,

    /// Serial port (defaults to config, then the last enumerated port)
    #[arg(long, short)]
    pub port: Option<String>,

    /// Override baudrate
    #[arg(long)]
    pub baudrate: Option<u32>,

    /// Override parity (N, E, O)
    #[arg(long)]
    pub parity: Option<String>,

    /// Bus preset of the sensor model, e.g. `factory`
    #[arg(long)]
    pub preset: Option<String>,

    /// Address believed current; verified before any scan
    #[arg(long, short)]
    pub address: Option<String>,
}
