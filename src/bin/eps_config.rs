//! eps_config - Read the identity of an MQB EPS and toggle heading control assist

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use eps_config::{
    channel::IsoTPSettings,
    eps::{EpsConfigurator, EpsError, FeatureChange, IdentitySet, ReadError, WriteError},
    hardware::{Hardware, HardwareError},
    session::{SessionError, TargetDescriptor},
};
use log::{debug, LevelFilter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Print the identity and coding of the EPS
    Show,
    /// Enable heading control assist
    Enable,
    /// Disable heading control assist
    Disable,
}

#[derive(Parser, Debug)]
#[command(name = "eps_config")]
#[command(author, version, about = "Enable or disable heading control assist on MQB EPS units")]
struct Cli {
    /// What to do
    #[arg(value_enum, default_value = "show")]
    action: Action,

    /// SocketCAN interface. Give twice when the EPS sits on a second bus
    #[arg(short, long = "interface", default_value = "can0")]
    interfaces: Vec<String>,

    /// CAN ID requests are sent to (hex)
    #[arg(long, value_parser = parse_can_id)]
    tx_id: Option<u32>,

    /// CAN ID the EPS responds on (hex)
    #[arg(long, value_parser = parse_can_id)]
    rx_id: Option<u32>,

    /// Per request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Do not read the coding back after writing it
    #[arg(long)]
    no_verify: bool,

    /// Debug logging of every request and response
    #[arg(short, long)]
    debug: bool,
}

fn parse_can_id(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is not a hex CAN ID: {e}"))
}

#[cfg(all(feature = "socketcan", target_os = "linux"))]
fn open_hardware(interfaces: &[String]) -> Result<Box<dyn Hardware>, HardwareError> {
    Ok(Box::new(eps_config::hardware::socketcan::SocketCanDevice::open(interfaces)?))
}

#[cfg(not(all(feature = "socketcan", target_os = "linux")))]
fn open_hardware(_interfaces: &[String]) -> Result<Box<dyn Hardware>, HardwareError> {
    Err(HardwareError::DeviceNotFound)
}

fn run(cli: &Cli) -> Result<(), EpsError> {
    let mut hw = open_hardware(&cli.interfaces)?;
    let info = hw.get_info();
    debug!("Using adapter {} (secondary bus: {})", info.name, info.capabilities.secondary_bus);
    hw.enter_diagnostic_mode()?;

    let mut target = TargetDescriptor::for_hardware(&*hw);
    if let Some(id) = cli.tx_id {
        target.request_address = id;
    }
    if let Some(id) = cli.rx_id {
        target.response_address = id;
    }
    if let Some(ms) = cli.timeout_ms {
        target.timeout_ms = ms;
    }
    debug!("Target: {target:?}");

    let mut eps = EpsConfigurator::new(&mut *hw, target, IsoTPSettings::default())?;
    match cli.action {
        Action::Show => print_identity(&eps.show()?),
        Action::Enable | Action::Disable => {
            let enable = cli.action == Action::Enable;
            let change = eps.set_feature(enable, !cli.no_verify)?;
            print_change(&change, enable);
        }
    }
    Ok(())
}

fn print_identity(identity: &IdentitySet) {
    println!("EPS identity:");
    println!("{identity}");
}

fn print_change(change: &FeatureChange, enable: bool) {
    print_identity(&change.identity);
    println!();
    println!(
        "Heading control assist {}: coding {} -> {}{}",
        if enable { "enabled" } else { "disabled" },
        change.previous,
        change.written,
        if change.verified { " (verified)" } else { "" }
    );
    if change.unchanged() {
        println!("Coding was already in the requested state");
    }
}

/// One line per failure, specific enough to tell vehicle side and client side problems apart
fn describe(e: &EpsError) -> String {
    match e {
        EpsError::Hardware(HardwareError::DeviceNotFound) => {
            "No usable CAN interface found. Is the adapter connected and the interface up?".into()
        }
        EpsError::Hardware(e) => format!("Diagnostic adapter error: {e}"),
        EpsError::Channel(e) => format!("Could not open ISO-TP channel to the EPS: {e}"),
        EpsError::Session(SessionError::Timeout(s)) => {
            format!("EPS did not answer when opening the {s} session. Is the ignition on?")
        }
        EpsError::Session(SessionError::Failed { session, source }) => {
            format!("Could not open {session} session: {source}")
        }
        EpsError::Read(ReadError::Timeout { identifier }) => format!(
            "Timeout reading {identifier} (0x{:04X}), nothing was changed",
            identifier.did()
        ),
        EpsError::Read(e @ ReadError::Rejected { .. }) => format!("{e}, nothing was changed"),
        EpsError::Read(ReadError::Protocol { identifier, source }) => format!(
            "Invalid response reading {identifier} (0x{:04X}): {source}",
            identifier.did()
        ),
        EpsError::UnsupportedVariant { dataset } => format!(
            "This EPS (dataset {dataset:?}) is not supported, its coding was not changed"
        ),
        EpsError::Write(e @ WriteError::SecurityAccessDenied { .. }) => {
            format!("{e}. Coding was not written. Wait before trying again")
        }
        EpsError::Write(WriteError::Protocol { stage, source }) => {
            format!("Invalid response from EPS while {stage}: {source}")
        }
        EpsError::Write(e) => e.to_string(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", describe(&e));
            ExitCode::FAILURE
        }
    }
}
