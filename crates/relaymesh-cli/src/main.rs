//! relaymesh Command-Line Interface
//!
//! This CLI provides tools for:
//! - Simulating a relay session against a scripted uplink with random leaf traffic
//! - Classifying a single packet against a relay identity
//! - Deriving relay identities and spotting subnet collisions
//! - Printing and validating configuration files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relaymesh_core::simulation::{CollectReceived, SimPower, SimTransport};
use relaymesh_core::{
    derive_identity, find_subnet_collisions, Address, Datagram, ForwardDecision, Forwarder,
    NodeIdentity, Packet, PacketCodec, RelayConfig, RelaySession, SessionState,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "relaymesh")]
#[command(author, version, about = "Two-tier telemetry relay tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UplinkKind {
    /// The Root network is in range
    Root,
    /// Only another Relay is in range
    Relay,
    /// Nothing is in range
    None,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a relay session against a simulated uplink
    Simulate {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// What the simulated scan finds
        #[arg(short, long, value_enum, default_value = "root")]
        uplink: UplinkKind,

        /// Probability per loop iteration of an inbound packet
        #[arg(long, default_value = "0.05", value_parser = parse_probability)]
        leaf_rate: f64,

        /// Telemetry sends before sleeping (overrides config)
        #[arg(long)]
        max_sends: Option<u32>,

        /// Telemetry period in milliseconds (overrides config)
        #[arg(long)]
        period_ms: Option<u64>,

        /// Connect attempts that time out before the uplink accepts
        #[arg(long, default_value = "0")]
        connect_failures: u32,

        /// Random seed for reproducible traffic
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Classify one packet against a relay identity
    Classify {
        /// This relay's own address
        #[arg(long, default_value = "192.168.5.1")]
        own: String,

        /// Upstream neighbor address
        #[arg(long, default_value = "192.168.4.1")]
        upstream: String,

        /// Transport-layer sender address
        #[arg(short, long)]
        sender: String,

        /// Transport-layer sender port
        #[arg(short, long, default_value = "4210")]
        port: u16,

        /// Embedded destination address
        #[arg(short, long)]
        dest: String,

        /// Payload byte
        #[arg(long, default_value = "1")]
        payload: u8,
    },

    /// Derive relay identities from uplink addresses
    Derive {
        /// Locally assigned address (repeat for several relays)
        #[arg(short, long, required = true)]
        local: Vec<String>,

        /// Gateway address, paired with --local in order
        #[arg(short, long, required = true)]
        gateway: Vec<String>,
    },

    /// Print the default configuration, or validate a file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        validate: Option<PathBuf>,
    },
}

/// Parse a probability in `[0, 1]`
fn parse_probability(text: &str) -> std::result::Result<f64, String> {
    let value: f64 = text
        .parse()
        .map_err(|_| format!("`{}` is not a number", text))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not between 0 and 1", text))
    }
}

fn parse_address(text: &str) -> Result<Address> {
    text.parse::<Address>()
        .with_context(|| format!("Invalid address: {}", text))
}

fn cmd_simulate(
    config_path: Option<PathBuf>,
    uplink: UplinkKind,
    leaf_rate: f64,
    max_sends: Option<u32>,
    period_ms: Option<u64>,
    connect_failures: u32,
    seed: u64,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => RelayConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => RelayConfig::default()
            .with_max_sends(10)
            .with_telemetry_period(Duration::from_millis(200)),
    };
    if let Some(max_sends) = max_sends {
        config = config.with_max_sends(max_sends);
    }
    if let Some(period_ms) = period_ms {
        config = config.with_telemetry_period(Duration::from_millis(period_ms));
    }
    config.validate().context("Invalid configuration")?;

    let transport = match uplink {
        UplinkKind::Root => SimTransport::under_root(&config),
        UplinkKind::Relay => SimTransport::under_relay(&config, -55)
            .with_network(&config.relay_identity, -70)
            .with_network("Neighbour-WiFi", -30),
        UplinkKind::None => SimTransport::new().with_network("Neighbour-WiFi", -30),
    }
    .with_connect_failures(connect_failures);

    println!("=== Relay Session Simulation ===");
    println!();
    println!("Uplink:       {:?}", uplink);
    println!("Period:       {} ms", config.telemetry_period_ms);
    println!("Max sends:    {}", config.max_sends);
    println!("Leaf rate:    {:.2}", leaf_rate);
    println!("Seed:         {}", seed);
    println!();

    let codec = PacketCodec::new(config.payload_len);
    let port = config.port;
    let mut session = RelaySession::new(config, transport, SimPower::default(), CollectReceived::default())
        .context("Failed to create session")?;

    let identity = match session.start() {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Session ended during start: {}", e);
            println!("Session ended before linking: {}", e);
            println!("State: {:?}", session.state());
            println!("Sleep requests: {:?}", session.power().requests());
            return Ok(());
        }
    };

    println!("Decision:     {:?}", session.decision());
    println!("Own address:  {}", identity.own_address);
    println!("Subnet:       {}", identity.downstream);
    if let Some(upstream) = identity.upstream {
        println!("Upstream:     {}", upstream);
    }
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    let mut rng = StdRng::seed_from_u64(seed);
    let started = Instant::now();
    let mut injected = 0u64;

    let state = loop {
        if !running.load(Ordering::SeqCst) {
            info!("Interrupted");
            break session.state();
        }

        if rng.gen_bool(leaf_rate) {
            let datagram = random_traffic(&mut rng, &identity, &codec, port);
            session
                .transport_mut()
                .inject(datagram.bytes, datagram.source, datagram.port);
            injected += 1;
        }

        let state = session.step().context("Loop iteration failed")?;
        if state.is_sleeping() {
            break state;
        }
        std::thread::sleep(Duration::from_millis(1));
    };

    let stats = session.stats();
    println!("=== Simulation Results ===");
    println!();
    println!("Elapsed:             {:.2?}", started.elapsed());
    println!("Final state:         {:?}", state);
    println!("Packets injected:    {}", injected);
    println!();
    println!("{:<22} {:>8}", "Counter", "Value");
    println!("{}", "-".repeat(31));
    println!("{:<22} {:>8}", "connect attempts", stats.connect_attempts);
    println!("{:<22} {:>8}", "packets received", stats.packets_rx);
    println!("{:<22} {:>8}", "(a) upstream", stats.forwarded_upstream);
    println!("{:<22} {:>8}", "(b) delivered local", stats.delivered_local);
    println!("{:<22} {:>8}", "(c) downstream", stats.forwarded_downstream);
    println!("{:<22} {:>8}", "(d) broadcast", stats.broadcast);
    println!("{:<22} {:>8}", "malformed dropped", stats.malformed_dropped);
    println!("{:<22} {:>8}", "send failures", stats.send_failures);
    println!("{:<22} {:>8}", "telemetry sent", stats.telemetry_sent);
    println!();
    println!("Sleep requests: {:?}", session.power().requests());

    if matches!(state, SessionState::Active) {
        println!("Session interrupted while active");
    }

    Ok(())
}

/// One random inbound datagram for the simulated relay
fn random_traffic(
    rng: &mut StdRng,
    identity: &NodeIdentity,
    codec: &PacketCodec,
    port: u16,
) -> Datagram {
    let prefix = identity.downstream.prefix;
    let upstream = identity.upstream.unwrap_or(identity.own_address);
    let child = prefix.host(rng.gen_range(2..=254));
    let state_bit = [rng.gen_range(0..=1u8)];

    match rng.gen_range(0..10) {
        // Leaf report heading for the Root
        0..=4 => Datagram::new(
            codec.encode(&Packet::new(upstream, child, &state_bit)),
            child,
            port,
        ),
        // Root command for one of our leaves
        5..=6 => Datagram::new(
            codec.encode(&Packet::new(child, upstream, &state_bit)),
            upstream,
            port,
        ),
        // Command addressed to this relay
        7 => Datagram::new(
            codec.encode(&Packet::new(identity.own_address, upstream, &state_bit)),
            upstream,
            port,
        ),
        // Destination in a subnet we do not own
        8 => {
            let stray = Address::new(172, 16, rng.gen(), rng.gen_range(2..=254));
            Datagram::new(
                codec.encode(&Packet::new(stray, upstream, &state_bit)),
                upstream,
                port,
            )
        }
        // Truncated datagram
        _ => Datagram::new(vec![0xde, 0xad], child, port),
    }
}

fn cmd_classify(
    own: String,
    upstream: String,
    sender: String,
    port: u16,
    dest: String,
    payload: u8,
) -> Result<()> {
    let own = parse_address(&own)?;
    let upstream = parse_address(&upstream)?;
    let sender = parse_address(&sender)?;
    let dest = parse_address(&dest)?;

    let identity = NodeIdentity::relay(own, upstream);
    let codec = PacketCodec::default();
    let forwarder = Forwarder::new(identity, codec);
    let packet = Packet::new(dest, sender, &[payload]);
    let datagram = Datagram::new(codec.encode(&packet), sender, port);

    println!("Node:     {} (subnet {}, upstream {})", own, identity.downstream, upstream);
    println!("Sender:   {}:{}", sender, port);
    println!("Dest:     {}", dest);
    println!();

    let decision = forwarder
        .process(&datagram)
        .context("Failed to classify packet")?;
    println!("Case:     {:?}", decision.case());
    match &decision {
        ForwardDecision::DeliverLocal(_) => println!("Action:   deliver locally, nothing sent"),
        ForwardDecision::Upstream(out)
        | ForwardDecision::Downstream(out)
        | ForwardDecision::Broadcast(out) => {
            println!("Action:   send {} bytes to {}:{}", out.bytes.len(), out.destination, out.port)
        }
    }

    Ok(())
}

fn cmd_derive(locals: Vec<String>, gateways: Vec<String>) -> Result<()> {
    if locals.len() != gateways.len() {
        anyhow::bail!(
            "Got {} --local but {} --gateway values",
            locals.len(),
            gateways.len()
        );
    }

    let mut identities = Vec::with_capacity(locals.len());
    println!("{:<4} {:<16} {:<16} {:<16} {:<20}", "#", "Local", "Gateway", "Own", "Subnet");
    println!("{}", "-".repeat(76));
    for (i, (local, gateway)) in locals.iter().zip(gateways.iter()).enumerate() {
        let local = parse_address(local)?;
        let gateway = parse_address(gateway)?;
        let identity = derive_identity(local, gateway);
        println!(
            "{:<4} {:<16} {:<16} {:<16} {:<20}",
            i,
            local.to_string(),
            gateway.to_string(),
            identity.own_address.to_string(),
            identity.downstream.to_string()
        );
        identities.push(identity);
    }

    let collisions = find_subnet_collisions(&identities);
    println!();
    if collisions.is_empty() {
        println!("No subnet collisions");
    } else {
        for c in &collisions {
            warn!("Subnet collision between #{} and #{}", c.first, c.second);
            println!("COLLISION: #{} and #{} both own {}.0/24", c.first, c.second, c.prefix);
        }
    }

    Ok(())
}

fn cmd_config(validate: Option<PathBuf>) -> Result<()> {
    match validate {
        Some(path) => {
            let config = RelayConfig::from_json_file(&path)
                .with_context(|| format!("Invalid config {:?}", path))?;
            println!("{:?}: OK", path);
            println!("{}", config.to_json()?);
        }
        None => println!("{}", RelayConfig::default().to_json()?),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Simulate {
            config,
            uplink,
            leaf_rate,
            max_sends,
            period_ms,
            connect_failures,
            seed,
        } => cmd_simulate(config, uplink, leaf_rate, max_sends, period_ms, connect_failures, seed),

        Commands::Classify {
            own,
            upstream,
            sender,
            port,
            dest,
            payload,
        } => cmd_classify(own, upstream, sender, port, dest, payload),

        Commands::Derive { local, gateway } => cmd_derive(local, gateway),

        Commands::Config { validate } => cmd_config(validate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probability() {
        assert_eq!(parse_probability("0.25"), Ok(0.25));
        assert_eq!(parse_probability("0"), Ok(0.0));
        assert_eq!(parse_probability("1"), Ok(1.0));
        assert!(parse_probability("NaN").is_err());
        assert!(parse_probability("inf").is_err());
        assert!(parse_probability("-0.1").is_err());
        assert!(parse_probability("1.5").is_err());
        assert!(parse_probability("often").is_err());
    }

    #[test]
    fn test_cli_rejects_nan_leaf_rate() {
        let result = Cli::try_parse_from(["relaymesh", "simulate", "--leaf-rate", "NaN"]);
        assert!(result.is_err());
    }
}
