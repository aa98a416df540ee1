#![deny(clippy::all)]

//! # boardctl-cli
//!
//! A small bring-up tool: open a real serial port, issue one command against the
//! board, print the result. Not part of the library's core contract — useful for
//! manual testing against real hardware.

use std::io;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use boardctl::config::Config;
use boardctl::driver::{Driver, PinMode, SignalLevel};
use boardctl::pin::PinId;
use boardctl::transport::SerialPort;

/// Bring-up CLI for a serial-attached I/O board.
#[derive(Parser)]
#[command(name = "boardctl", version)]
struct Cli {
    /// Serial device path, e.g. /dev/ttyUSB0.
    #[arg(long)]
    device: String,

    /// Baud rate.
    #[arg(long, default_value_t = 19200)]
    baud: u32,

    /// Path to a TOML config file (defaults compiled in if omitted).
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the current signal level on a pin.
    Get { pin: String },
    /// Write a signal level to a pin (`HIGH`, `LOW`, or an integer DAC level).
    Set { pin: String, level: String },
    /// Configure a pin's direction (`INPUT` or `OUTPUT`).
    Mode { pin: String, mode: String },
    /// Trigger a momentary pulse on a pin.
    Pulse { pin: String },
    /// Start a logging subscription and print samples until Ctrl-C.
    Log { pin: String, period_ms: u64 },
}

struct RealPort(Box<dyn serialport::SerialPort>);

impl io::Read for RealPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl io::Write for RealPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl SerialPort for RealPort {
    fn flush_input(&mut self) -> io::Result<()> {
        self.0
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

fn parse_pin(s: &str) -> PinId {
    PinId::parse(s).unwrap_or_else(|| {
        eprintln!("error: `{s}` is not a valid pin id (expected D<n>, A<n>, or DAC<n>)");
        std::process::exit(2);
    })
}

fn main() {
    let cli = Cli::parse();

    let config = cli
        .config
        .as_deref()
        .map(|path| Config::load(path).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(2);
        }))
        .unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        )
        .init();

    let port = serialport::new(&cli.device, cli.baud)
        .timeout(Duration::from_millis(config.io.read_timeout_ms))
        .open()
        .unwrap_or_else(|e| {
            eprintln!("error: failed to open {}: {e}", cli.device);
            std::process::exit(1);
        });
    let clone_or_exit = |p: &dyn serialport::SerialPort| {
        p.try_clone().unwrap_or_else(|e| {
            eprintln!("error: failed to clone serial handle: {e}");
            std::process::exit(1);
        })
    };
    let reader_half = RealPort(clone_or_exit(&*port));
    let writer_half = RealPort(clone_or_exit(&*port));
    let mut flush_handle = RealPort(port);

    let driver = Driver::new(reader_half, writer_half, config.clone());

    if let Err(e) = driver.open_blocking(&mut flush_handle) {
        eprintln!("error: open failed: {e}");
        std::process::exit(1);
    }
    info!("session opened");

    let open_timeout = Some(Duration::from_millis(config.io.open_timeout_ms.max(2000)));

    match cli.command {
        Commands::Get { pin } => {
            let pin = parse_pin(&pin);
            match driver.get_signal_blocking(pin, open_timeout) {
                Ok(SignalLevel::High) => println!("HIGH"),
                Ok(SignalLevel::Low) => println!("LOW"),
                Ok(SignalLevel::Analog(v)) => println!("{v}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Set { pin, level } => {
            let pin = parse_pin(&pin);
            let signal = match level.to_uppercase().as_str() {
                "HIGH" => SignalLevel::High,
                "LOW" => SignalLevel::Low,
                other => match other.parse::<i64>() {
                    Ok(v) => SignalLevel::Analog(v),
                    Err(_) => {
                        eprintln!("error: `{level}` is not HIGH, LOW, or an integer level");
                        std::process::exit(2);
                    }
                },
            };
            match driver.set_signal(pin, signal).and_then(|h| {
                if h.wait(open_timeout) {
                    h.result()
                } else {
                    Err(boardctl::DriverError::NotReady)
                }
            }) {
                Ok(_) => println!("ok"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Mode { pin, mode } => {
            let pin = parse_pin(&pin);
            let mode = match mode.to_uppercase().as_str() {
                "INPUT" => PinMode::Input,
                "OUTPUT" => PinMode::Output,
                _ => {
                    eprintln!("error: mode must be INPUT or OUTPUT");
                    std::process::exit(2);
                }
            };
            match driver.set_pin_mode(pin, mode).and_then(|h| {
                if h.wait(open_timeout) {
                    h.result()
                } else {
                    Err(boardctl::DriverError::NotReady)
                }
            }) {
                Ok(_) => println!("ok"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Pulse { pin } => {
            let pin = parse_pin(&pin);
            match driver.trigger_pulse(pin).and_then(|h| {
                if h.wait(open_timeout) {
                    h.result()
                } else {
                    Err(boardctl::DriverError::NotReady)
                }
            }) {
                Ok(_) => println!("ok"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Log { pin, period_ms } => {
            let pin = parse_pin(&pin);
            let (handle, recording) = driver.log_signal(pin, period_ms).unwrap_or_else(|e| {
                eprintln!("error: {e}");
                std::process::exit(1);
            });
            if !handle.wait(open_timeout) {
                eprintln!("error: logging-start timed out");
                std::process::exit(1);
            }
            if let Err(e) = handle.result() {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
            println!("logging started on {pin}, press Enter to stop");
            let mut discard = String::new();
            let _ = io::stdin().read_line(&mut discard);
            let end = driver.end_log_signal(pin).unwrap_or_else(|e| {
                eprintln!("error: {e}");
                std::process::exit(1);
            });
            end.wait(open_timeout);
            recording.wait(open_timeout);
            if let Ok(snapshot) = recording.result() {
                for sample in snapshot.values {
                    println!("{sample:?}");
                }
            }
        }
    }

    driver.kill();
}
