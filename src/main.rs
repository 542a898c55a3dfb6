use anyhow::Context;
use clap::Parser;
use mbus_device::device::{DeviceIdentity, ResponsePayload, SlaveDevice, SlaveState};
use mbus_device::mbus::serial::{MBusDeviceHandle, SerialConfig};
use mbus_device::device::DEFAULT_RESPONSE;
use mbus_device::init_logger;
use mbus_device::util::hex::decode_hex;
use rand::SeedableRng;

#[derive(Parser)]
#[command(name = "mbus-device")]
#[command(about = "M-Bus slave device emulator")]
struct Cli {
    /// Serial port/pty to use
    device: String,

    /// Primary address
    #[arg(short, long, default_value_t = 0)]
    address: u8,

    /// Baud rate: 300, 2400, 9600
    #[arg(short, long, default_value_t = 2400)]
    baudrate: u32,

    /// Enable debug messages
    #[arg(short, long)]
    debug: bool,

    /// Hex-encoded response telegram to serve, simulating another product
    #[arg(short, long)]
    file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.debug);

    let raw = match &cli.file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed opening {path}"))?;
            decode_hex(&text).with_context(|| format!("Invalid hex payload in {path}"))?
        }
        None => DEFAULT_RESPONSE.to_vec(),
    };

    let payload = ResponsePayload::from_bytes(&raw, cli.address)
        .context("Invalid M-Bus response telegram")?;
    let identity = DeviceIdentity::from_response_frame(payload.frame(), cli.address)
        .context("Failed parsing device identity from response telegram")?;
    log::info!(
        "Starting up, primary addr {}, secondary addr {} ({} v{} medium 0x{:02X})",
        cli.address,
        identity.secondary_address_string(),
        identity.manufacturer_code(),
        identity.version,
        identity.medium
    );

    let mut transport = MBusDeviceHandle::connect(&cli.device)
        .await
        .with_context(|| format!("Failed opening serial port {}", cli.device))?;
    if cli.baudrate != SerialConfig::default().baudrate {
        transport.set_baud_rate(cli.baudrate).with_context(|| {
            format!(
                "Failed setting baud rate {} on serial port {}",
                cli.baudrate, cli.device
            )
        })?;
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let rng = rand::rngs::StdRng::from_entropy();
    let mut device = SlaveDevice::new(SlaveState::new(identity, payload), transport, rng);
    device.run(shutdown_rx).await;

    Ok(())
}
