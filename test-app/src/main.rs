// Scaffold test application -- CLI tool for exercising a Scaffold board
// over its serial link.
//
// Usage:
//   scaffold-test-app registers
//   scaffold-test-app signals
//   scaffold-test-app --port /dev/ttyUSB0 version
//   scaffold-test-app --port /dev/ttyUSB0 read power.control
//   scaffold-test-app --port /dev/ttyUSB0 read 0x0404 --size 16 --poll 0x0400:0x04:0x00
//   scaffold-test-app --port /dev/ttyUSB0 write leds.brightness 60
//   scaffold-test-app --port /dev/ttyUSB0 connect /io/d0 /uart0/tx
//   scaffold-test-app --port /dev/ttyUSB0 timeout 0.5
//   scaffold-test-app -vv --port /dev/ttyUSB0 --no-reset read io0.value

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scaffold::builder::ScaffoldBuilder;
use scaffold::map::{DEFAULTS, REGISTERS};
use scaffold::matrix::{left_crossbar, right_crossbar};
use scaffold::{Poll, Scaffold};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Scaffold test application -- talks to a Scaffold board from the command line.
#[derive(Parser)]
#[command(name = "scaffold-test-app", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0, COM3).
    /// Required for every command except `registers` and `signals`.
    #[arg(long, env = "SCAFFOLD_PORT")]
    port: Option<String>,

    /// Override the link baud rate.
    #[arg(long, default_value_t = scaffold_transport::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Give up when the board stays silent this many milliseconds
    /// (default: wait forever).
    #[arg(long)]
    response_timeout_ms: Option<u64>,

    /// Skip restoring the default peripheral configuration on connect.
    #[arg(long)]
    no_reset: bool,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the hardware version string.
    Version,

    /// List every register of the board.
    Registers,

    /// List every crossbar destination and the sources it accepts.
    Signals,

    /// Read a register by name, or raw bytes from an address.
    Read {
        /// Register name (e.g. uart0.status) or hex address (e.g. 0x0404).
        target: String,

        /// Raw read of this many bytes instead of a register value.
        #[arg(long)]
        size: Option<usize>,

        /// Poll condition ADDR:MASK:VALUE, in hex.
        #[arg(long, value_parser = parse_poll)]
        poll: Option<Poll>,
    },

    /// Write a value to a register by name.
    Write {
        /// Register name (e.g. leds.brightness).
        name: String,

        /// Value, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_u64)]
        value: u64,

        /// Poll condition ADDR:MASK:VALUE, in hex.
        #[arg(long, value_parser = parse_poll)]
        poll: Option<Poll>,
    },

    /// Route a signal through the crossbars.
    Connect {
        /// Destination path (e.g. /io/d0 or /uart0/rx).
        destination: String,
        /// Source path (e.g. /uart0/tx, /io/a0, 0, 1 or z).
        source: String,
    },

    /// Set the device polling timeout in seconds (0 disables it).
    Timeout { seconds: f64 },
}

fn parse_hex(s: &str) -> std::result::Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

fn parse_u64(s: &str) -> std::result::Result<u64, String> {
    if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex(s)
    } else {
        s.parse().map_err(|e| format!("invalid value '{s}': {e}"))
    }
}

fn parse_address(s: &str) -> std::result::Result<u16, String> {
    let value = parse_hex(s)?;
    u16::try_from(value).map_err(|_| format!("address '{s}' out of range"))
}

/// Parse a poll condition "ADDR:MASK:VALUE" (hex fields).
fn parse_poll(s: &str) -> std::result::Result<Poll, String> {
    let fields: Vec<&str> = s.split(':').collect();
    let [address, mask, value] = fields.as_slice() else {
        return Err(format!("expected ADDR:MASK:VALUE, got '{s}'"));
    };
    let byte = |field: &str| -> std::result::Result<u8, String> {
        u8::try_from(parse_hex(field)?).map_err(|_| format!("'{field}' does not fit a byte"))
    };
    Ok(Poll::on(parse_address(address)?)
        .mask(byte(*mask)?)
        .value(byte(*value)?))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_registers() {
    println!("{:<20} {:>6}  {:<4} {:>5}", "NAME", "ADDR", "MODE", "BYTES");
    for spec in REGISTERS {
        println!(
            "{:<20} {:#06x}  {:<4} {:>5}",
            spec.name,
            spec.address,
            spec.mode.to_string(),
            spec.wideness
        );
    }
    println!();
    println!("Defaults applied on connect:");
    for setting in DEFAULTS {
        println!("  {:<20} = {}", setting.register, setting.value);
    }
}

fn cmd_signals() {
    for crossbar in [right_crossbar(), left_crossbar()] {
        println!("Crossbar at {:#06x}", crossbar.base());
        for destination in crossbar.outputs() {
            println!("  {destination} <- {}", crossbar.inputs().join(" "));
        }
    }
}

async fn cmd_read(
    board: &Scaffold,
    target: &str,
    size: Option<usize>,
    poll: Option<Poll>,
) -> Result<()> {
    if let Ok(register) = board.register(target) {
        match size {
            Some(size) => {
                let data = register.read(size, poll.as_ref()).await?;
                println!("{target}: {}", hex(&data));
            }
            None => {
                let value = register.get().await?;
                println!("{target}: {value} ({value:#x}, {value:#010b})");
            }
        }
        return Ok(());
    }

    let address = parse_address(target)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("'{target}' is neither a register name nor an address"))?;
    let data = board
        .bus()
        .read(address, size.unwrap_or(1), poll.as_ref())
        .await?;
    println!("{address:#06x}: {}", hex(&data));
    Ok(())
}

async fn cmd_write(board: &Scaffold, name: &str, value: u64, poll: Option<Poll>) -> Result<()> {
    let register = board.register(name)?;
    register.set(value, poll.as_ref()).await?;
    println!("{name}: set to {value} ({value:#x})");
    Ok(())
}

async fn cmd_connect(board: &Scaffold, destination: &str, source: &str) -> Result<()> {
    board.matrix().connect(destination, source).await?;
    println!("{destination} <- {source}");
    Ok(())
}

async fn cmd_timeout(board: &Scaffold, seconds: f64) -> Result<()> {
    board.timeouts().set(seconds).await?;
    println!(
        "timeout: {} units ({:.9} s)",
        board.timeouts().units()?,
        board.timeouts().get()?
    );
    Ok(())
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "scaffold=debug,info",
        _ => "scaffold=trace,scaffold_transport=trace,debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn open_board(cli: &Cli) -> Result<Scaffold> {
    let Some(port) = cli.port.as_deref() else {
        bail!("--port is required for this command");
    };
    let board = ScaffoldBuilder::new()
        .serial_port(port)
        .baud_rate(cli.baud)
        .response_timeout(cli.response_timeout_ms.map(Duration::from_millis))
        .reset_defaults(!cli.no_reset)
        .build()
        .await
        .with_context(|| format!("failed to connect to Scaffold on {port}"))?;
    println!("Connected to {port} at {} baud -- {}", cli.baud, board.version()?);
    Ok(board)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that only print static tables.
    match &cli.command {
        Command::Registers => {
            cmd_registers();
            return Ok(());
        }
        Command::Signals => {
            cmd_signals();
            return Ok(());
        }
        _ => {}
    }

    let board = open_board(&cli).await?;
    let result = match &cli.command {
        Command::Version => {
            println!("{}", board.version()?);
            Ok(())
        }
        Command::Read { target, size, poll } => cmd_read(&board, target, *size, *poll).await,
        Command::Write { name, value, poll } => cmd_write(&board, name, *value, *poll).await,
        Command::Connect {
            destination,
            source,
        } => cmd_connect(&board, destination, source).await,
        Command::Timeout { seconds } => cmd_timeout(&board, *seconds).await,
        Command::Registers | Command::Signals => Ok(()),
    };
    board.close().await.ok();
    result
}
