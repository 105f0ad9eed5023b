mod filter;
mod frame;
mod gpio;
mod level;
mod metrics;
mod pipeline;
mod renderer;
mod sampler;
mod service;
mod transmitter;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::gpio::BackendKind;
use crate::level::{DEFAULT_SHM_NAME, LevelRegion};
use crate::service::ServiceConfig;
use crate::transmitter::ShiftRegister;

#[derive(Parser)]
#[command(name = "ledbarmon")]
#[command(about = "LED bar-graph system health monitor for single-board computers")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor service (metrics sampler + PWM renderer)
    Service {
        /// GPIO backend matching the board
        #[arg(long, value_enum, default_value = "pi4")]
        backend: BackendKind,

        /// Display refresh rate in Hz
        #[arg(long, default_value = "10.0")]
        refresh_rate: f32,

        /// Re-read raw metric sources every Nth refresh cycle
        #[arg(long, default_value = "5")]
        sample_divider: u32,

        /// PWM bit depth (2-16)
        #[arg(long, default_value = "6")]
        pwm_res: u8,

        /// Hold time of the least significant PWM plane, in microseconds.
        /// Keep under 20000/2^pwm_res for flicker-free operation above 50 Hz.
        #[arg(long, default_value = "250")]
        lsb_period_us: u64,

        /// LED response curve exponent (0 = linear duty cycle)
        #[arg(long, default_value = "2.8")]
        gamma: f32,

        /// Global brightness scale applied to all channels
        #[arg(long, default_value = "1.0")]
        brightness: f32,

        /// Name of the shared-memory region holding the user level
        #[arg(long, default_value = DEFAULT_SHM_NAME)]
        shm_name: String,
    },

    /// Light every channel at full brightness and exit
    AllOn {
        /// GPIO backend matching the board
        #[arg(long, value_enum, default_value = "pi4")]
        backend: BackendKind,
    },

    /// Turn every channel off and exit
    AllOff {
        /// GPIO backend matching the board
        #[arg(long, value_enum, default_value = "pi4")]
        backend: BackendKind,
    },

    /// Write the user level (0.0 to 1.0) read by a running service
    SetLevel {
        /// Level value; out-of-range values are clamped
        value: f32,

        /// Name of the shared-memory region holding the user level
        #[arg(long, default_value = DEFAULT_SHM_NAME)]
        shm_name: String,
    },
}

/// Transmit a single fixed frame and exit without restoring pin modes, so
/// the display keeps showing it. Diagnostic aid for checking the wiring.
fn diagnostic_frame(backend: BackendKind, bits: u16) -> anyhow::Result<()> {
    let gpio = gpio::open_backend(backend).context("opening GPIO backend")?;
    let mut sr = ShiftRegister::new(gpio);
    sr.init();
    sr.send_frame(bits);
    sr.commit_frame();
    sr.unblank();
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Service {
            backend,
            refresh_rate,
            sample_divider,
            pwm_res,
            lsb_period_us,
            gamma,
            brightness,
            shm_name,
        } => service::run(ServiceConfig {
            backend,
            refresh_hz: refresh_rate,
            sample_divider,
            pwm_res,
            lsb_period_us,
            gamma,
            brightness,
            shm_name,
        }),

        Commands::AllOn { backend } => diagnostic_frame(backend, u16::MAX),

        Commands::AllOff { backend } => diagnostic_frame(backend, 0),

        Commands::SetLevel { value, shm_name } => {
            let region = LevelRegion::open(&shm_name)?;
            region.write(value);
            println!("level set to {}", region.read());
            Ok(())
        }
    }
}
