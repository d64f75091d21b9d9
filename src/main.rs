mod config;
mod error;
mod routing;
mod snapshot;

use std::io::{self, Write};

use anyhow::Context;
use serde::Serialize;

use config::Config;
use error::{AppError, AppResult};
use routing::decision::DecisionTrace;
use routing::manager::RouteManager;
use routing::{parse_u32, IpFamily, Packet, Protocol};
use snapshot::{FileSnapshot, IpCommand, SnapshotInfo, SnapshotSource};

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();
    tracing::info!("policy route simulator starting");

    let source: Box<dyn SnapshotSource> = match &config.snapshot_dir {
        Some(dir) => {
            tracing::info!("loading captured snapshot from {}", dir.display());
            Box::new(FileSnapshot::new(dir))
        }
        None => Box::new(IpCommand::new(&config.ip_binary)),
    };

    let info = SnapshotInfo::capture();
    tracing::info!("routing snapshot for {} taken at {}", info.hostname, info.taken_at);

    if let Some(dir) = &config.capture_dir {
        snapshot::capture_to_dir(source.as_ref(), dir)
            .context("failed to capture snapshot")?;
        tracing::info!("captured rule/route text into {}", dir.display());
    }

    let mut manager = RouteManager::new();
    manager
        .build_tables(source.as_ref())
        .context("failed to build routing tables")?;

    if config.interactive {
        run_interactive(&manager, &config)
    } else if let Some(spec) = &config.packet {
        let mut packet = spec.to_packet();
        let trace = manager.route_packet(&mut packet);
        print_decision(&trace, &packet, config.json_output)?;
        Ok(())
    } else if config.capture_dir.is_some() {
        // Capture-only invocation
        Ok(())
    } else {
        anyhow::bail!(
            "nothing to do: give --destination and --source, or --interactive, or --capture-dir"
        )
    }
}

fn run_interactive(manager: &RouteManager, config: &Config) -> anyhow::Result<()> {
    let stdin = io::stdin();
    println!("enter: <destination> <source> [iif] [fwmark]   (blank line quits)");
    loop {
        print!("packet> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        match parse_packet_line(line) {
            Ok(mut packet) => {
                let trace = manager.route_packet(&mut packet);
                print_decision(&trace, &packet, config.json_output)?;
            }
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }
    Ok(())
}

/// Parse an interactive `<destination> <source> [iif] [fwmark]` line into
/// an ICMP packet
fn parse_packet_line(line: &str) -> AppResult<Packet> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(AppError::InvalidPacket(
            "expected: <destination> <source> [iif] [fwmark]".to_string(),
        ));
    }

    let destination = parts[0].parse().map_err(|_| {
        AppError::InvalidPacket(format!("bad destination address {:?}", parts[0]))
    })?;
    let source = parts[1]
        .parse()
        .map_err(|_| AppError::InvalidPacket(format!("bad source address {:?}", parts[1])))?;
    if IpFamily::of(destination) != IpFamily::of(source) {
        return Err(AppError::InvalidPacket(
            "source and destination must share an address family".to_string(),
        ));
    }

    let mut packet = Packet::new(Protocol::Icmp, source, destination);
    if let Some(iif) = parts.get(2) {
        packet.input_interface = iif.to_string();
    }
    if let Some(mark) = parts.get(3) {
        packet.fwmark = parse_u32(mark)
            .ok_or_else(|| AppError::InvalidPacket(format!("bad fwmark {:?}", mark)))?;
    }
    Ok(packet)
}

#[derive(Serialize)]
struct DecisionReport<'a> {
    packet: &'a Packet,
    trace: &'a DecisionTrace,
}

fn print_decision(trace: &DecisionTrace, packet: &Packet, json: bool) -> AppResult<()> {
    if json {
        let report = DecisionReport { packet, trace };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", trace);
        if trace.selected_route().is_some() {
            println!("egress interface: {}", packet.output_interface);
        }
    }
    Ok(())
}
