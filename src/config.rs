// Configuration for the policy route simulator
// Supports CLI arguments, config file (TOML), and environment variables

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::Level;

use crate::error::{AppError, AppResult};
use crate::routing::{parse_u32, IpFamily, Packet, Protocol};

/// Policy Route Simulator - replay the kernel's policy-routing decision
/// against a snapshot of `ip rule` / `ip route` output
#[derive(Parser, Debug, Clone)]
#[command(name = "policy-route-simulator")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Destination IP address of the simulated packet
    #[arg(short, long, env = "PRS_DESTINATION")]
    pub destination: Option<String>,

    /// Source IP address of the simulated packet
    #[arg(short, long, env = "PRS_SOURCE")]
    pub source: Option<String>,

    /// Transport protocol (tcp, udp, icmp)
    #[arg(short, long, default_value = "icmp", env = "PRS_PROTOCOL")]
    pub protocol: String,

    /// Source port of the simulated packet
    #[arg(long, default_value = "0")]
    pub source_port: u16,

    /// Destination port of the simulated packet
    #[arg(long, default_value = "0")]
    pub destination_port: u16,

    /// Firewall mark carried by the packet, decimal or 0x-prefixed hex
    #[arg(long, default_value = "0", env = "PRS_FWMARK")]
    pub fwmark: String,

    /// Interface the packet arrived on
    #[arg(long, default_value = "", env = "PRS_IIF")]
    pub input_interface: String,

    /// Prompt for packet fields on stdin instead of taking them from flags
    #[arg(short, long)]
    pub interactive: bool,

    /// Print the decision trace as JSON
    #[arg(long)]
    pub json: bool,

    /// Load rule/route text from a captured directory instead of running ip
    #[arg(long, env = "PRS_SNAPSHOT_DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Capture this host's rule/route text into a directory for later use
    #[arg(long, env = "PRS_CAPTURE_DIR")]
    pub capture_dir: Option<PathBuf>,

    /// Path to the ip binary
    #[arg(long, env = "PRS_IP_BINARY")]
    pub ip_binary: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "PRS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Simulator settings
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Path to the ip binary
    #[serde(default = "default_ip_binary")]
    pub ip_binary: PathBuf,

    /// Captured snapshot directory to load instead of running ip
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_ip_binary() -> PathBuf {
    PathBuf::from("ip")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            ip_binary: default_ip_binary(),
            snapshot_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// The one-shot packet described on the command line
#[derive(Debug, Clone)]
pub struct PacketSpec {
    pub protocol: Protocol,
    pub source_ip: IpAddr,
    pub destination_ip: IpAddr,
    pub source_port: u16,
    pub destination_port: u16,
    pub fwmark: u32,
    pub input_interface: String,
}

impl PacketSpec {
    pub fn to_packet(&self) -> Packet {
        let mut packet = Packet::new(self.protocol, self.source_ip, self.destination_ip);
        packet.source_port = self.source_port;
        packet.destination_port = self.destination_port;
        packet.fwmark = self.fwmark;
        packet.input_interface = self.input_interface.clone();
        packet
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub ip_binary: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
    pub capture_dir: Option<PathBuf>,
    pub json_output: bool,
    pub interactive: bool,
    pub packet: Option<PacketSpec>,
}

impl Config {
    /// Load configuration from all sources
    /// Priority: CLI args > Config file > Defaults
    pub fn load() -> anyhow::Result<Self> {
        Self::from_cli(CliArgs::parse())
    }

    fn from_cli(cli_args: CliArgs) -> anyhow::Result<Self> {
        // Load config file if specified, else try default locations
        let config_file = if let Some(config_path) = &cli_args.config {
            let config_content = std::fs::read_to_string(config_path)?;
            toml::from_str::<ConfigFile>(&config_content)?
        } else {
            let default_paths = vec![
                PathBuf::from("config.toml"),
                PathBuf::from("policy-route-simulator.toml"),
            ];

            let mut loaded_config = None;
            for path in default_paths {
                if path.exists() {
                    let config_content = std::fs::read_to_string(&path)?;
                    loaded_config = Some(toml::from_str::<ConfigFile>(&config_content)?);
                    break;
                }
            }

            loaded_config.unwrap_or_default()
        };

        let log_level = parse_log_level(
            cli_args
                .log_level
                .as_deref()
                .unwrap_or(&config_file.logging.level),
        )?;
        let ip_binary = cli_args
            .ip_binary
            .clone()
            .unwrap_or(config_file.simulator.ip_binary);
        let snapshot_dir = cli_args
            .snapshot_dir
            .clone()
            .or(config_file.simulator.snapshot_dir);

        let packet = build_packet_spec(&cli_args)?;

        Ok(Config {
            log_level,
            ip_binary,
            snapshot_dir,
            capture_dir: cli_args.capture_dir,
            json_output: cli_args.json,
            interactive: cli_args.interactive,
            packet,
        })
    }
}

fn build_packet_spec(cli_args: &CliArgs) -> AppResult<Option<PacketSpec>> {
    let (destination, source) = match (&cli_args.destination, &cli_args.source) {
        (Some(destination), Some(source)) => (destination, source),
        (None, None) => return Ok(None),
        _ => {
            return Err(AppError::InvalidPacket(
                "destination and source must be given together".to_string(),
            ));
        }
    };

    let destination_ip: IpAddr = destination.parse().map_err(|_| {
        AppError::InvalidPacket(format!("bad destination address {:?}", destination))
    })?;
    let source_ip: IpAddr = source
        .parse()
        .map_err(|_| AppError::InvalidPacket(format!("bad source address {:?}", source)))?;
    if IpFamily::of(destination_ip) != IpFamily::of(source_ip) {
        return Err(AppError::InvalidPacket(
            "source and destination must share an address family".to_string(),
        ));
    }

    let protocol: Protocol = cli_args.protocol.parse()?;
    let fwmark = parse_u32(&cli_args.fwmark)
        .ok_or_else(|| AppError::InvalidPacket(format!("bad fwmark {:?}", cli_args.fwmark)))?;

    Ok(Some(PacketSpec {
        protocol,
        source_ip,
        destination_ip,
        source_port: cli_args.source_port,
        destination_port: cli_args.destination_port,
        fwmark,
        input_interface: cli_args.input_interface.clone(),
    }))
}

fn parse_log_level(level_str: &str) -> AppResult<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(AppError::Config(format!("invalid log level: {}", level_str))),
    }
}
