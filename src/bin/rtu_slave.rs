//! Voltage RTU Slave
//!
//! Serves a register database as a Modbus RTU slave on a serial port.
//! The local operator can nudge register 0 from the console:
//!
//! - `+` / `-`: increment / decrement register 0 (wrapping)
//! - `p`: print registers 0..10
//! - `q`: quit
//!
//! Usage: cargo run --bin rtu_slave -- --port /dev/ttyUSB0 --baud 9600 --parity even

use std::io::BufRead;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use voltage_rtu_slave::{
    FrameTiming, ModbusRtuSlave, RegisterStore, SerialConfig, SerialTransport, SharedRegisterBank,
    SlaveConfig, SystemClock,
};

/// Register the operator console adjusts
const OPERATOR_REGISTER: u16 = 0;

/// Registers shown by the `p` command
const PRINT_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for tokio_serial::Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => tokio_serial::Parity::None,
            ParityArg::Odd => tokio_serial::Parity::Odd,
            ParityArg::Even => tokio_serial::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlowControlArg {
    None,
    Software,
    Hardware,
}

impl From<FlowControlArg> for tokio_serial::FlowControl {
    fn from(arg: FlowControlArg) -> Self {
        match arg {
            FlowControlArg::None => tokio_serial::FlowControl::None,
            FlowControlArg::Software => tokio_serial::FlowControl::Software,
            FlowControlArg::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Modbus RTU slave serving holding/input registers over a serial line
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Serial port name
    #[arg(long, default_value = default_port())]
    port: String,

    /// Baud rate
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Parity
    #[arg(long, value_enum, default_value_t = ParityArg::None)]
    parity: ParityArg,

    /// Data bits
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=8))]
    data_bits: u8,

    /// Stop bits
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    stop_bits: u8,

    /// Flow control
    #[arg(long, value_enum, default_value_t = FlowControlArg::None)]
    flow_control: FlowControlArg,

    /// Unit address to answer (1-247)
    #[arg(long, default_value_t = 1)]
    unit_id: u8,

    /// Number of registers served
    #[arg(long, default_value_t = 5000)]
    registers: usize,

    /// Bounded wait for one serial read
    #[arg(long, default_value_t = 10)]
    read_timeout_ms: u64,

    /// Single frame gap instead of t1.5/t3.5 timing (for USB adapters)
    #[arg(long)]
    frame_gap_ms: Option<u64>,

    /// Log every frame as hex
    #[arg(long)]
    packet_log: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM1"
    } else {
        "/dev/ttyUSB0"
    }
}

/// Operator console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Increment,
    Decrement,
    Print,
    Quit,
    Help,
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "+" | "u" | "up" => Self::Increment,
            "-" | "d" | "down" => Self::Decrement,
            "p" | "print" => Self::Print,
            "q" | "quit" => Self::Quit,
            _ => Self::Help,
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  +   increment register {}", OPERATOR_REGISTER);
    println!("  -   decrement register {}", OPERATOR_REGISTER);
    println!("  p   print registers 0..{}", PRINT_COUNT);
    println!("  q   quit");
}

fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Forward stdin lines from a plain thread so a pending read never holds up exit
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Apply one console command. Returns `false` when the operator quits.
fn apply_command(command: Command, bank: &SharedRegisterBank) -> bool {
    match command {
        Command::Increment | Command::Decrement => {
            let result = if command == Command::Increment {
                bank.increment(OPERATOR_REGISTER)
            } else {
                bank.decrement(OPERATOR_REGISTER)
            };
            match result {
                Ok((before, after)) => info!(
                    "Register {}: {} -> {}",
                    OPERATOR_REGISTER, before, after
                ),
                Err(e) => error!("Cannot adjust register {}: {}", OPERATOR_REGISTER, e),
            }
        }
        Command::Print => {
            let count = PRINT_COUNT.min(bank.size());
            match bank.snapshot(0, count) {
                Ok(values) => {
                    for (address, value) in values.iter().enumerate() {
                        println!("  [{:5}] 0x{:04X} ({})", address, value, value);
                    }
                }
                Err(e) => error!("Cannot read registers: {}", e),
            }
        }
        Command::Quit => return false,
        Command::Help => print_help(),
    }
    true
}

async fn operator_console(bank: SharedRegisterBank, stop: broadcast::Sender<()>) {
    let mut lines = spawn_stdin_reader();
    while let Some(line) = lines.recv().await {
        if !apply_command(Command::parse(&line), &bank) {
            info!("Quit requested from console");
            let _ = stop.send(());
            return;
        }
    }
    // stdin closed: keep serving until Ctrl-C
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level);

    if args.list_ports {
        let ports = tokio_serial::available_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port.port_name);
        }
        return Ok(());
    }

    let serial = SerialConfig::new(args.port.clone(), args.baud)
        .with_parity(args.parity.into())
        .with_data_bits(match args.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        })
        .with_stop_bits(if args.stop_bits == 2 {
            tokio_serial::StopBits::Two
        } else {
            tokio_serial::StopBits::One
        })
        .with_flow_control(args.flow_control.into());

    let line_timing = serial.frame_timing()?;
    let timing = match args.frame_gap_ms {
        Some(ms) => FrameTiming::relaxed(Duration::from_millis(ms))?
            .with_char_time(line_timing.char_time),
        None => line_timing,
    };

    let config = SlaveConfig::new()
        .with_unit_id(args.unit_id)
        .with_register_count(args.registers)
        .with_read_timeout(Duration::from_millis(args.read_timeout_ms))
        .with_timing(timing)
        .with_packet_logging(args.packet_log);
    config.validate()?;

    info!("{}", voltage_rtu_slave::info());
    info!(
        "Serving unit {} with {} registers on {} at {} baud",
        config.unit_id, config.register_count, serial.port, serial.baud_rate
    );

    let bank = SharedRegisterBank::new(config.register_count);
    let transport = SerialTransport::open(&serial)?;
    let mut slave = ModbusRtuSlave::new(config, transport, SystemClock, bank.clone())?;

    let (stop_tx, stop_rx) = broadcast::channel(1);

    let ctrl_c_tx = stop_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            let _ = ctrl_c_tx.send(());
        }
    });

    print_help();
    let console = tokio::spawn(operator_console(bank, stop_tx));

    let result = slave.run(stop_rx).await;
    console.abort();
    result?;
    Ok(())
}
