/*!
 * LoRaLink command line front-end.
 *
 * `loralink ports` lists candidate serial ports, `loralink monitor` connects to
 * a transceiver, prints what it reports and accepts commands on stdin.
 */
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use loralink_core::config::{Config, ConfigBuilder, SerialConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
use loralink_core::defines::{Defines, DEFAULT_DEFINES_FILE};
use loralink_core::logging;
use loralink_devices::{available_ports, preferred_port, SerialPortOpener};
use loralink_engine::{EventPump, ProtocolEngine};

mod intent;
mod printer;

use intent::Intent;
use printer::TerminalSink;

type Pump = EventPump<TerminalSink<Stdout>>;

#[derive(Parser, Debug)]
#[command(
    name = "loralink",
    version,
    about = "Control and monitor LoRaLink transceivers over serial",
    long_about = None
)]
struct Cli {
    /// Log filter, overrides the configured level
    #[arg(long, global = true, env = "LORALINK_LOG")]
    log_level: Option<String>,

    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports that look like transceivers
    Ports {
        /// Ignore the configured port filter
        #[arg(long)]
        all: bool,
    },
    /// Connect to a transceiver and accept commands on stdin
    Monitor {
        /// Serial port, defaults to the preferred discovered port
        #[arg(long)]
        port: Option<String>,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
        /// Show every line even when the configuration asks for the short log
        #[arg(long)]
        full_log: bool,
        /// Also print the debug channel
        #[arg(long)]
        debug_log: bool,
    },
    /// Show the mesh profile compiled into the firmware
    Defines {
        /// Firmware header to read
        #[arg(long, default_value = DEFAULT_DEFINES_FILE)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = ConfigBuilder::new()
        .with_config_file(&cli.config)
        .with_environment_prefix(ENV_PREFIX)
        .build();
    let (config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    match cli.log_level.as_deref() {
        Some(filter) => logging::init_with_filter(filter),
        None => logging::init_from_config(&config.logging),
    }
    .context("initializing logging")?;
    if let Some(e) = load_error {
        warn!("Ignoring configuration {}: {}", cli.config.display(), e);
    }
    loralink_engine::init()?;

    match cli.command {
        Commands::Ports { all } => list_ports(&config.serial, all),
        Commands::Monitor {
            port,
            json,
            full_log,
            debug_log,
        } => monitor(config, port, json, full_log, debug_log).await,
        Commands::Defines { file } => show_defines(&file),
    }
}

fn list_ports(serial: &SerialConfig, all: bool) -> Result<()> {
    let mut serial = serial.clone();
    if all {
        serial.port_filter.clear();
    }
    let ports = available_ports(&serial).context("listing serial ports")?;
    if ports.is_empty() {
        println!("No matching serial ports");
    }
    for port in ports {
        match port.description {
            Some(description) => println!("{}\t{}", port.name, description),
            None => println!("{}", port.name),
        }
    }
    Ok(())
}

fn show_defines(file: &Path) -> Result<()> {
    let defines = Defines::load(file).with_context(|| format!("reading {}", file.display()))?;
    match defines.mesh_profile() {
        Some(profile) => {
            println!("bandwidth    {} kHz", profile.bandwidth_khz);
            println!("sf           {}", profile.spreading_factor);
            println!("coding rate  4/{}", profile.coding_rate);
            println!("sync word    0x{:02X}", profile.sync_word);
            println!("frequency    {} MHz", profile.frequency_mhz);
        }
        None => println!("Firmware is not built mesh-compatible ({} defines read)", defines.len()),
    }
    Ok(())
}

fn pick_port(config: &Config, requested: Option<String>) -> String {
    if let Some(port) = requested {
        return port;
    }
    match available_ports(&config.serial) {
        Ok(ports) => preferred_port(&ports, &config.serial.default_port)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| config.serial.default_port.clone()),
        Err(e) => {
            warn!("Port discovery failed: {}", e);
            config.serial.default_port.clone()
        }
    }
}

async fn monitor(
    config: Config,
    port: Option<String>,
    json: bool,
    full_log: bool,
    debug_log: bool,
) -> Result<()> {
    let port = pick_port(&config, port);
    let (engine, events) = ProtocolEngine::new(&config, Arc::new(SerialPortOpener));
    let sink = TerminalSink::new(io::stdout(), json, debug_log);
    let mut pump = EventPump::new(config.initial_state(), sink, events)
        .with_short_log(config.log_short && !full_log);

    info!("Connecting to {}", port);
    if let Err(e) = connect(&engine, &mut pump, &port).await {
        pump.drain();
        return Err(e).with_context(|| format!("connecting to {}", port));
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let line = match line.context("reading stdin")? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                match intent::parse(&line) {
                    Ok(Intent::Quit) => break,
                    Ok(intent) => perform(&engine, &mut pump, &port, intent).await,
                    Err(e) => pump.sink_mut().say(&e.to_string()),
                }
            }
            alive = pump.step() => {
                if !alive {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.disconnect().await;
    pump.drain();
    Ok(())
}

/// Connect while keeping the event pump running
async fn connect(engine: &ProtocolEngine, pump: &mut Pump, port: &str) -> Result<()> {
    let connecting = engine.connect(port);
    tokio::pin!(connecting);
    loop {
        tokio::select! {
            result = &mut connecting => {
                pump.drain();
                return result.map_err(Into::into);
            }
            _ = pump.step() => {}
        }
    }
}

async fn perform(engine: &ProtocolEngine, pump: &mut Pump, port: &str, intent: Intent) {
    let result = match intent {
        Intent::Gain(gain) => engine.set_gain(gain).await,
        Intent::Frequency(mhz) => engine.set_frequency(mhz).await,
        Intent::SpreadingFactor(sf) => engine.set_spreading_factor(sf).await,
        Intent::Bandwidth(bw) => engine.set_bandwidth(bw).await,
        Intent::StatusEnabled(on) => engine.set_status_enabled(on).await,
        Intent::StatusInterval(interval) => engine.set_status_interval(interval).await,
        Intent::Wifi(on) => engine.set_wifi_enabled(on).await,
        Intent::PostMode(mode) => engine.set_post_mode(mode).await,
        Intent::Data(payload) => engine.send_data(&payload).await,
        Intent::Flash => engine.read_flash().await,
        Intent::Sync => engine.sync().await,
        Intent::RequestStatus => engine.request_status().await,
        Intent::ShowState => {
            let text = printer::describe_all(pump.store().state());
            pump.sink_mut().say(&text);
            Ok(())
        }
        Intent::ShortLog(short) => {
            pump.set_short_log(short);
            Ok(())
        }
        Intent::Reconnect => {
            if let Err(e) = connect(engine, pump, port).await {
                pump.sink_mut().say(&format!("Reconnect failed: {:#}", e));
            }
            Ok(())
        }
        Intent::Help => {
            pump.sink_mut().say(intent::HELP);
            Ok(())
        }
        Intent::Quit => Ok(()),
    };
    if let Err(e) = result {
        pump.sink_mut().say(&format!("Error: {}", e));
    }
}
