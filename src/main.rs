//! WS2812 command-line tool
//!
//! # Usage
//!
//! ```bash
//! # Fill a 60 LED strip on a Pi 3 with dim red
//! sudo ws2812-rpi --board rpi3 --leds 60 --brightness 0.2 fill 255 0 0
//!
//! # Run the effects demo until Ctrl-C
//! sudo ws2812-rpi --config strip.toml demo --repeat
//!
//! # Dump registers and the encoded waveform without touching hardware
//! ws2812-rpi --simulate --leds 2 dump
//!
//! # Print the default configuration
//! ws2812-rpi config > strip.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use ws2812_rpi::diag::{describe_control_block, dump_waveform, RegisterSnapshot};
use ws2812_rpi::hal::StdDelay;
use ws2812_rpi::{board, effects, shutdown, Color, DriverConfig, Error, Ws2812};

/// WS2812 LED driver for Raspberry Pi
#[derive(Parser)]
#[command(name = "ws2812-rpi")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Drive WS2812 LEDs through the Raspberry Pi PWM serializer and DMA")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Number of LEDs (overrides the configuration)
    #[arg(short, long, global = true)]
    leds: Option<usize>,

    /// Brightness in [0, 1] (overrides the configuration)
    #[arg(short, long, global = true)]
    brightness: Option<f32>,

    /// Board profile (overrides the configuration)
    #[arg(long, global = true)]
    board: Option<String>,

    /// Use anonymous memory instead of the hardware
    #[arg(long, global = true)]
    simulate: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set every LED to one color
    Fill {
        r: u8,
        g: u8,
        b: u8,
    },

    /// Turn every LED off
    Clear,

    /// Run the canned effects
    Demo {
        /// Loop until interrupted
        #[arg(long)]
        repeat: bool,
    },

    /// Transmit one test frame and print registers, control block and waveform
    Dump,

    /// Print the effective configuration as TOML
    Config,

    /// List board profiles
    Boards,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = run(cli);
    if let Err(e) = &result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        if let Some(driver_err) = e.downcast_ref::<Error>() {
            if driver_err.is_fatal() {
                eprintln!("{}", "Fatal hardware fault; DMA and PWM were stopped".yellow());
            }
        }
    }
    ExitCode::from(exit_status(&result, shutdown::requested()))
}

/// Non-zero on error, and after a signal cut the run short
fn exit_status(result: &Result<()>, interrupted: bool) -> u8 {
    u8::from(result.is_err() || interrupted)
}

fn load_config(cli: &Cli) -> Result<DriverConfig> {
    let mut config = match &cli.config {
        Some(path) => DriverConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => DriverConfig::default(),
    };
    if let Some(leds) = cli.leds {
        config = config.with_led_count(leds);
    }
    if let Some(brightness) = cli.brightness {
        config = config.with_brightness(brightness);
    }
    if let Some(board) = &cli.board {
        config = config.with_board(board.clone());
    }
    if cli.simulate {
        config = config.simulated(true);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_strip(config: DriverConfig) -> Result<Ws2812> {
    shutdown::install_signal_handlers().context("Failed to install signal handlers")?;
    Ws2812::new(config).context("Failed to initialize the LED hardware")
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Fill { r, g, b } => {
            let mut strip = open_strip(config)?;
            strip.fill(Color::new(r, g, b));
            strip.transmit()?;
            println!(
                "{} {} LEDs set to ({}, {}, {})",
                "✓".green().bold(),
                strip.len(),
                r,
                g,
                b
            );
            strip.release();
            Ok(())
        }
        Commands::Clear => {
            let mut strip = open_strip(config)?;
            strip.shutdown()?;
            println!("{} Strip cleared", "✓".green().bold());
            Ok(())
        }
        Commands::Demo { repeat } => {
            let mut strip = open_strip(config)?;
            let mut delay = StdDelay;
            println!("{}", "Running effects demo (Ctrl-C to stop)".cyan().bold());
            loop {
                effects::demo(&mut strip, &mut delay)?;
                if !repeat || shutdown::requested() {
                    break;
                }
            }
            if shutdown::requested() {
                println!("\n{}", "Interrupted, shutting down".yellow());
            }
            strip.shutdown()?;
            Ok(())
        }
        Commands::Dump => {
            let mut strip = open_strip(config)?;
            for i in 0..strip.len() {
                strip.set_pixel(i, effects::wheel((i * 40 % 256) as u8))?;
            }
            strip.transmit()?;

            println!("{}", "=".repeat(60));
            println!("{}", "Registers".cyan().bold());
            println!("{}", "=".repeat(60));
            if let Some(hw) = strip.peripherals() {
                let snapshot = RegisterSnapshot::capture(hw);
                println!("{}", snapshot);
                if snapshot.has_errors() {
                    println!("{}", "DMA reports errors".red().bold());
                }
            }
            if let Some(cb) = strip.control_block() {
                println!("\n{}", describe_control_block(cb));
            }

            println!("{}", "=".repeat(60));
            println!("{}", "Waveform".cyan().bold());
            println!("{}", "=".repeat(60));
            print!("{}", dump_waveform(strip.waveform(), strip.len()));

            strip.shutdown()?;
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Boards => {
            println!("{}", "Supported Boards".cyan().bold());
            for name in board::board_names() {
                if let Some(b) = board::get_board(name) {
                    println!(
                        "  {} ({:?})  peripherals 0x{:08x}  bus alias 0x{:08x}",
                        name.white().bold(),
                        b.soc,
                        b.peripheral_base,
                        b.bus_alias
                    );
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&Ok(()), false), 0);
        assert_eq!(exit_status(&Ok(()), true), 1);
        assert_eq!(exit_status(&Err(anyhow::anyhow!("mmap failed")), false), 1);
    }
}
