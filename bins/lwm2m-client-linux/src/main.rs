use std::time::Duration;

use lwm2m_client::{ClientHandle, Lwm2mClient, ResourcePath, TokioScheduler};
use lwm2m_core::config::ClientConfig;
use lwm2m_core::{ActionError, ResourceContext};
use lwm2m_objects::{
    Device, DeviceControl, DeviceResource, DownloadOutcome, FirmwareUpdate, FirmwareUpdater,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CLOCK_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_CLOCK_PERIOD: Duration = Duration::from_millis(1000);

/// Device actions on a Linux host. Only logged, the process keeps running.
struct LinuxControl;

impl DeviceControl for LinuxControl {
    fn reboot(&mut self, _ctx: &mut ResourceContext<'_, DeviceResource>) -> Result<(), ActionError> {
        tracing::warn!("Reboot requested by server (not performed)");
        Ok(())
    }

    fn factory_reset(
        &mut self,
        ctx: &mut ResourceContext<'_, DeviceResource>,
    ) -> Result<(), ActionError> {
        tracing::warn!("Factory reset requested by server, clearing error code only");
        ctx.set(DeviceResource::ErrorCode, 0i64, true)
            .map_err(|e| ActionError::new(e.to_string()))
    }
}

/// Firmware hooks on a Linux host.
struct LinuxUpdater;

impl FirmwareUpdater for LinuxUpdater {
    fn download(&mut self, uri: &str) -> Result<DownloadOutcome, ActionError> {
        Err(ActionError::new(format!("downloads are not supported ({})", uri)))
    }

    fn update(&mut self, package: Option<&[u8]>) -> Result<(), ActionError> {
        let size = package.map(<[u8]>::len).unwrap_or(0);
        tracing::info!("Applying firmware package ({} bytes)", size);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,lwm2m_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("LWM2M client starting...");

    // Configuration
    let config = match std::env::var("LWM2M_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
    {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            ClientConfig::load(&path)?
        }
        None => ClientConfig::default(),
    };

    let mut client = Lwm2mClient::new();

    let device = Device::builder(LinuxControl)
        .identity(config.device.clone())
        .time(config.time.clone())
        .sink(client.sink())
        .build()?;
    let firmware = FirmwareUpdate::new(0, LinuxUpdater, client.sink())?;
    if let Some(version) = &config.device.firmware_version {
        firmware.set_package_info("installed", version)?;
    }

    client.register(device.enabler());
    client.register(firmware.enabler());

    let (delay, period) = config
        .current_time_notifier
        .as_ref()
        .map(|n| (n.delay(), n.period()))
        .unwrap_or((DEFAULT_CLOCK_DELAY, DEFAULT_CLOCK_PERIOD));
    let scheduler = TokioScheduler::current();
    let clock_notifier = device.start_clock_notifier(delay, period, &scheduler);

    let handle = client.handle();
    let mut notifications = client.notifications();

    // Spawn the client loop
    let client_handle = tokio::spawn(client.run());

    observe_defaults(&handle, &config.endpoint).await?;

    // Log notifications in place of a transport
    let notify_handle = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(n) => match &n.value {
                    Some(value) => tracing::info!("[{}] {} = {}", n.observer, n.path, value),
                    None => tracing::info!("[{}] {} changed", n.observer, n.path),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} notifications", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Start demo battery drain
    let battery = device.clone();
    let demo_handle = tokio::spawn(async move {
        simulate_battery(battery).await;
    });

    tracing::info!("LWM2M client '{}' ready", config.endpoint);
    tracing::info!("   Current Time notified every {:?}", period);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = client_handle => {
            tracing::warn!("Client loop stopped");
        }
        _ = notify_handle => {
            tracing::warn!("Notification logger stopped");
        }
        _ = demo_handle => {
            tracing::warn!("Battery simulation stopped");
        }
    }

    clock_notifier.stop();
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Observe the resources a server usually watches.
async fn observe_defaults(handle: &ClientHandle, observer: &str) -> anyhow::Result<()> {
    for path in ["/3/0/13", "/3/0/9", "/3/0/11", "/5/0/3", "/5/0/5"] {
        let path: ResourcePath = path.parse()?;
        handle.observe(observer, path).await?;
    }
    Ok(())
}

/// Drain the battery by one percent every ten seconds.
async fn simulate_battery(device: Device) {
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    let mut level = 100;

    loop {
        interval.tick().await;
        if let Err(e) = device.set_battery_level(level, true) {
            tracing::error!("Failed to update battery level: {}", e);
            break;
        }
        level = if level == 0 { 100 } else { level - 1 };
    }
}
