//! usb-hotplug watcher
//!
//! Command-line front end for the hotplug registry. Lists the currently
//! attached matching devices or follows connect/disconnect notifications
//! until interrupted.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use config::WatchConfig;
use hotplug::{
    DeviceEvent, DeviceFilter, DeviceInfo, GenericDevice, HotplugManager, UsbBackend,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-hotplug-watch")]
#[command(
    author,
    version,
    about = "Watch USB hot-plug events and list attached devices"
)]
#[command(long_about = "
Watches the USB bus for matching devices and reports connect/disconnect
events as they happen, or lists the devices currently attached.

EXAMPLES:
    # Watch every USB device
    usb-hotplug-watch --all

    # Watch a specific device
    usb-hotplug-watch --filter 0x04f9:0x0042

    # Watch all HID devices (class 0x03) as JSON lines
    usb-hotplug-watch --class 3 --json

    # List matching devices and exit
    usb-hotplug-watch --all --list-devices

CONFIGURATION:
    The watcher looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-hotplug/watch.toml
    3. /etc/usb-hotplug/watch.toml
    4. Built-in defaults

    Filters given on the command line take precedence over the
    configuration file.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List matching USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Print devices and events as JSON
    #[arg(long)]
    json: bool,

    /// Watch a specific device (0xVID:0xPID, repeatable)
    #[arg(short, long, value_name = "VID:PID")]
    filter: Vec<String>,

    /// Watch every attached USB device
    #[arg(long)]
    all: bool,

    /// Watch a USB device class code (repeatable)
    #[arg(long, value_name = "CODE")]
    class: Vec<u8>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = WatchConfig::default();
        let path = WatchConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        let path = PathBuf::from(shellexpand::tilde(path).as_ref());
        WatchConfig::load(Some(path)).context("Failed to load configuration")?
    } else {
        WatchConfig::load_or_default()
    };

    // Use CLI log level if specified, otherwise use config value
    let log_level = args.log_level.as_deref().unwrap_or(&config.watch.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-hotplug-watch v{}", env!("CARGO_PKG_VERSION"));

    let filters = build_filters(&args, &config)?;

    let backend = Arc::new(UsbBackend::new().context("Failed to initialize USB backend")?);
    let manager = HotplugManager::new(backend);

    // Subscribe before starting so the initial enumeration is visible too.
    let events = manager.subscribe();

    manager.start(filters).context("Failed to start device watch")?;

    let result = if args.list_devices {
        list_devices(&manager, args.json)
    } else {
        watch_events(&manager, events, args.json).await
    };

    manager.shutdown();
    result
}

/// Resolve the active filter set from CLI flags, falling back to the
/// configuration file. Matches are represented as `GenericDevice`.
fn build_filters(args: &Args, config: &WatchConfig) -> Result<Vec<DeviceFilter>> {
    let mut filters = Vec::new();

    if args.all {
        filters.push(DeviceFilter::match_all::<GenericDevice>());
    }
    for pattern in &args.filter {
        let (vendor_id, product_id) = config::parse_filter(pattern)
            .with_context(|| format!("Invalid --filter value '{}'", pattern))?;
        filters.push(DeviceFilter::match_product::<GenericDevice>(
            product_id, vendor_id,
        ));
    }
    for class in &args.class {
        filters.push(DeviceFilter::match_class::<GenericDevice>(*class));
    }

    // Nothing on the command line; use the configuration file.
    if filters.is_empty() {
        if config.usb.match_all {
            filters.push(DeviceFilter::match_all::<GenericDevice>());
        }
        for pattern in &config.usb.filters {
            let (vendor_id, product_id) = config::parse_filter(pattern)
                .with_context(|| format!("Invalid filter '{}' in configuration", pattern))?;
            filters.push(DeviceFilter::match_product::<GenericDevice>(
                product_id, vendor_id,
            ));
        }
        for class in &config.usb.classes {
            filters.push(DeviceFilter::match_class::<GenericDevice>(*class));
        }
    }

    // Still empty means the config disabled everything; watch the whole bus.
    if filters.is_empty() {
        filters.push(DeviceFilter::match_all::<GenericDevice>());
    }

    Ok(filters)
}

/// Print the registered devices and exit
fn list_devices(manager: &HotplugManager, json: bool) -> Result<()> {
    let devices = manager.devices();

    if json {
        let infos: Vec<&DeviceInfo> = devices.iter().map(|d| d.info()).collect();
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No matching USB devices found.");
    } else {
        println!("Found {} matching USB device(s):\n", devices.len());
        for device in devices {
            let info = device.info();
            println!(
                "  [{}] {:04x}:{:04x} - {} {}",
                device.id(),
                info.vendor_id,
                info.product_id,
                info.manufacturer
                    .as_deref()
                    .unwrap_or("Unknown Manufacturer"),
                info.product.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03} Speed: {:?}",
                info.bus_number, info.device_address, info.speed
            );
            if let Some(serial) = &info.serial_number {
                println!("      Serial: {}", serial);
            }
            println!();
        }
    }

    Ok(())
}

/// Follow notifications until Ctrl+C
async fn watch_events(
    manager: &HotplugManager,
    mut events: broadcast::Receiver<DeviceEvent>,
    json: bool,
) -> Result<()> {
    println!(
        "Watching USB hot-plug events ({} device(s) present); press Ctrl+C to stop.",
        manager.device_count()
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event, json),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Dropped {} notification(s), subscriber lagging", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn print_event(event: &DeviceEvent, json: bool) {
    let info = event.device().info();
    if json {
        // One JSON object per line
        let line = serde_json::json!({
            "event": event.name(),
            "id": event.id().as_str(),
            "vendor_id": info.vendor_id,
            "product_id": info.product_id,
            "manufacturer": info.manufacturer,
            "product": info.product,
        });
        println!("{}", line);
    } else {
        println!(
            "{:<19} [{}] {:04x}:{:04x} {}",
            event.name(),
            event.id(),
            info.vendor_id,
            info.product_id,
            info.product.as_deref().unwrap_or("")
        );
    }
}
