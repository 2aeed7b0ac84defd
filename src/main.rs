use color_eyre::{eyre::eyre, Result};
use padlink::config::PadlinkConfig;
use padlink::device::{Descriptor, DeviceState, GilrsRuntime, InputDevice};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config()?;
    let requested = std::env::args()
        .nth(1)
        .map(|name| Descriptor::new(name, "", "", 0))
        .or_else(|| config.device.clone())
        .ok_or_else(|| eyre!("No device requested: pass a name or set [device] in the config"))?;

    // gilrs calls block on their reply, keep them off the async workers
    let runtime_settings = config.runtime_settings();
    let (runtime, hotplug_events) =
        tokio::task::spawn_blocking(move || GilrsRuntime::spawn(Some(runtime_settings))).await??;

    let engine = Arc::new(
        InputDevice::spawn(Arc::new(runtime), Some(config.engine_settings()))
            .map_err(|e| eyre!("Failed to spawn input device engine: {}", e))?,
    );

    if config.engine.hotplug {
        engine.listen_hotplug(hotplug_events)?;
        info!("Hotplug handling enabled");
    }

    info!("Requesting {}", requested);
    engine.open_device_async(requested).await;
    while engine.is_opening_device() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    match engine.state() {
        DeviceState::Open => {
            info!("Opened {:?}", engine.get_handle());
            let pulse = engine.clone();
            let rumbled = tokio::task::spawn_blocking(move || {
                if !pulse.start_rumble() {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(500));
                pulse.stop_rumble()
            })
            .await?;
            info!("Rumble pulse {}", if rumbled { "done" } else { "not supported" });
        }
        state => warn!("No matching device right now ({:?}), waiting for hotplug", state),
    }

    watch_state(engine.clone()).await?;

    let closer = engine.clone();
    tokio::task::spawn_blocking(move || closer.close_device()).await?;
    info!("Shut down");
    Ok(())
}

async fn watch_state(engine: Arc<InputDevice>) -> Result<()> {
    let mut last = engine.state();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Ctrl-C received");
                return Ok(());
            }
            _ = ticker.tick() => {
                let state = engine.state();
                if state != last {
                    info!("Device state {:?} -> {:?} ({:?})", last, state, engine.get_handle());
                    last = state;
                }
            }
        }
    }
}

fn load_config() -> Result<PadlinkConfig> {
    match PadlinkConfig::default_path() {
        Some(path) => Ok(PadlinkConfig::load(&path)?),
        None => {
            warn!("No config directory on this platform, using defaults");
            Ok(PadlinkConfig::default())
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
