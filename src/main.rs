//! # niimbot CLI
//!
//! Command-line interface for NIIMBOT label printers.
//!
//! ## Usage
//!
//! ```bash
//! # Print over USB, auto-detecting the serial port
//! niimbot print -i label.png
//!
//! # Print on a B21 over BLE at higher density
//! niimbot print -m b21 -c ble -a 26:03:03:C3:F9:11 -d 5 -i label.png
//!
//! # Rotate a portrait image for a D110 label
//! niimbot print -m d110 -c bluetooth -a 03:26:03:C3:F9:11 -r 90 -i tag.png
//!
//! # Query the printer
//! niimbot info --json
//! niimbot heartbeat -c ble -a 26:03:03:C3:F9:11
//! niimbot rfid
//! ```
//!
//! Set `RUST_LOG=niimbot=trace` to see every frame on the wire.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use image::DynamicImage;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use niimbot::{
    NiimbotError, PrinterClient,
    printer::{PrintOptions, PrinterModel, print_image},
    protocol::InfoKey,
    render::{DitheringAlgorithm, MonoImage},
    transport::{self, ConnectionKind, Transport},
};

/// niimbot - Thermal label printer utility
#[derive(Parser, Debug)]
#[command(name = "niimbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the printer is
#[derive(Args, Debug)]
struct Connection {
    /// Connection type: usb, bluetooth, bluetooth-native or ble
    #[arg(short, long, default_value = "usb", value_parser = ConnectionKind::parse)]
    conn: ConnectionKind,

    /// MAC address (Bluetooth), MAC or UUID (BLE), or serial port (USB, default auto)
    #[arg(short, long)]
    addr: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an image as a label
    Print {
        #[command(flatten)]
        connection: Connection,

        /// Printer model
        #[arg(short, long, default_value = "d110", value_parser = PrinterModel::parse)]
        model: PrinterModel,

        /// Print density
        #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=5))]
        density: u8,

        /// Rotate the image clockwise by 0, 90, 180 or 270 degrees
        #[arg(short, long, default_value_t = 0, value_parser = parse_rotation)]
        rotate: u16,

        /// Image to print
        #[arg(short, long)]
        image: PathBuf,

        /// Row frames per write
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..=50))]
        batch_size: u16,

        /// 1-bit conversion: threshold, floyd-steinberg or bayer
        #[arg(long, default_value = "floyd-steinberg", value_parser = DitheringAlgorithm::parse)]
        dither: DitheringAlgorithm,
    },

    /// Show device information
    Info {
        #[command(flatten)]
        connection: Connection,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show lid, battery, paper and RFID state
    Heartbeat {
        #[command(flatten)]
        connection: Connection,
    },

    /// Show the loaded label roll's RFID data
    Rfid {
        #[command(flatten)]
        connection: Connection,
    },

    /// Show print progress
    Status {
        #[command(flatten)]
        connection: Connection,
    },
}

fn parse_rotation(s: &str) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(deg @ (0 | 90 | 180 | 270)) => Ok(deg),
        _ => Err(format!("Invalid rotation '{}'. Use 0, 90, 180 or 270", s)),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn connect(connection: &Connection) -> Result<PrinterClient<Box<dyn Transport>>, NiimbotError> {
    debug!("Opening {:?} connection", connection.conn);
    let transport = transport::open(connection.conn, connection.addr.as_deref())?;
    Ok(PrinterClient::new(transport))
}

fn run(command: Commands) -> Result<(), NiimbotError> {
    match command {
        Commands::Print {
            connection,
            model,
            density,
            rotate,
            image,
            batch_size,
            dither,
        } => {
            let config = model.config();
            let picture = load_image(&image, rotate)?;
            config.validate_width(picture.width() as usize)?;
            let label = MonoImage::from_image(&picture, dither);

            let options = PrintOptions {
                density,
                batch_size: batch_size as usize,
                ..PrintOptions::default()
            };

            let mut client = connect(&connection)?;
            let result = print_image(&mut client, &label, &config, &options);
            client.close()?;
            result?;
            println!("Printed successfully!");
        }

        Commands::Info { connection, json } => {
            let mut client = connect(&connection)?;
            let mut values = serde_json::Map::new();
            for key in InfoKey::ALL {
                let value = client.get_info(key)?;
                values.insert(
                    key.name().to_string(),
                    serde_json::to_value(&value).map_err(json_error)?,
                );
                if !json {
                    match value {
                        Some(v) => println!("{:<20} {}", key.name(), v),
                        None => println!("{:<20} -", key.name()),
                    }
                }
            }
            client.close()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&values).map_err(json_error)?
                );
            }
        }

        Commands::Heartbeat { connection } => {
            let mut client = connect(&connection)?;
            let heartbeat = client.heartbeat();
            client.close()?;
            print_json(&heartbeat?)?;
        }

        Commands::Rfid { connection } => {
            let mut client = connect(&connection)?;
            let rfid = client.get_rfid();
            client.close()?;
            match rfid? {
                Some(info) => print_json(&info)?,
                None => println!("No RFID tag detected"),
            }
        }

        Commands::Status { connection } => {
            let mut client = connect(&connection)?;
            let status = client.get_print_status();
            client.close()?;
            print_json(&status?)?;
        }
    }

    Ok(())
}

/// Load an image and apply the requested clockwise rotation
fn load_image(path: &PathBuf, rotate: u16) -> Result<DynamicImage, NiimbotError> {
    let image = image::open(path)
        .map_err(|e| NiimbotError::Image(format!("Failed to open {}: {}", path.display(), e)))?;
    let image = match rotate {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    };
    info!(
        "Loaded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}

fn json_error(e: serde_json::Error) -> NiimbotError {
    NiimbotError::InvalidArgument(format!("JSON encoding failed: {}", e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), NiimbotError> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(json_error)?
    );
    Ok(())
}
