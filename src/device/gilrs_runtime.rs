//! Hardware runtime backed by gilrs
//!
//! The `Gilrs` context lives on its own thread. Trait calls are turned into
//! commands with a oneshot reply, and between commands the thread drains
//! gilrs events, forwarding connects and disconnects as [`HotplugEvent`]s.
//!
//! Calls block on the reply, so they must come from plain threads (the
//! engine's workers or a synchronous caller), not from inside an async task.

use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Repeat, Replay, Ticks};
use gilrs::{Event, EventType, Gamepad, GamepadId, Gilrs, MappingSource};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::descriptor::Descriptor;
use super::error::DeviceError;
use super::rumble::INDEFINITE_MS;
use super::runtime::{HandleKind, HardwareRuntime, HotplugEvent, RawHandle};

/// Configuration for the gilrs thread
///
/// # Performance Impact
///
/// - `event_poll_interval_ms`: bounds how late a command is answered and how
///   late a connect or disconnect is forwarded. Lower values cost more
///   wakeups on an otherwise idle thread
///
/// # Examples
///
/// ```rust,no_run
/// use padlink::device::{GilrsRuntime, GilrsSettings};
///
/// let (runtime, hotplug) = GilrsRuntime::spawn(Some(GilrsSettings {
///     event_poll_interval_ms: 10,
/// }))?;
/// # drop((runtime, hotplug));
/// # Ok::<(), padlink::device::DeviceError>(())
/// ```
#[derive(Clone, Debug)]
pub struct GilrsSettings {
    /// Sleep between event polls when no command is pending
    ///
    /// Every trait call waits up to this long for its reply, so scans and
    /// opens slow down linearly with it.
    pub event_poll_interval_ms: u64,
}

impl Default for GilrsSettings {
    /// 2ms, well below a human noticing a late rumble or reconnect
    fn default() -> Self {
        Self {
            event_poll_interval_ms: 2,
        }
    }
}

#[derive(Debug)]
enum GilrsCommand {
    Enumerate {
        reply: oneshot::Sender<Vec<Descriptor>>,
    },
    IsController {
        index: i32,
        reply: oneshot::Sender<bool>,
    },
    Open {
        index: i32,
        kind: HandleKind,
        reply: oneshot::Sender<Option<RawHandle>>,
    },
    Close {
        handle: RawHandle,
    },
    Rumble {
        handle: RawHandle,
        strong: u16,
        weak: u16,
        duration_ms: u32,
        reply: oneshot::Sender<bool>,
    },
}

/// [`HardwareRuntime`] talking to the gilrs thread
pub struct GilrsRuntime {
    commands: mpsc::UnboundedSender<GilrsCommand>,
}

impl GilrsRuntime {
    /// Starts the gilrs thread, returns the runtime and its hotplug stream
    pub fn spawn(
        settings: Option<GilrsSettings>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HotplugEvent>), DeviceError> {
        let settings = settings.unwrap_or_default();
        info!("Spawning gilrs runtime with settings: {:?}", settings);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (hotplug_tx, hotplug_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("padlink-gilrs".into())
            .spawn(move || {
                let gilrs = match Gilrs::new() {
                    Ok(g) => {
                        info!("Successfully initialized gilrs");
                        g
                    }
                    Err(e) => {
                        error!("Failed to initialize gilrs: {}", e);
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let mut worker = GilrsWorker {
                    gilrs,
                    open: HashMap::new(),
                    next_handle: 1,
                    hotplug: hotplug_tx,
                };
                worker.run(command_rx, Duration::from_millis(settings.event_poll_interval_ms));
            })
            .map_err(|source| DeviceError::ThreadSpawn {
                name: "gilrs",
                source,
            })?;

        match ready_rx.blocking_recv() {
            Ok(Ok(())) => Ok((Self { commands }, hotplug_rx)),
            Ok(Err(e)) => Err(DeviceError::RuntimeUnavailable(e)),
            Err(e) => Err(DeviceError::ChannelError(e.to_string())),
        }
    }

    fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> GilrsCommand) -> Option<T> {
        let (reply, reply_rx) = oneshot::channel();
        if let Err(e) = self.commands.send(build(reply)) {
            error!("gilrs thread unavailable: {}", e);
            return None;
        }
        reply_rx.blocking_recv().ok()
    }
}

impl HardwareRuntime for GilrsRuntime {
    fn enumerate_devices(&self) -> Vec<Descriptor> {
        self.request(|reply| GilrsCommand::Enumerate { reply })
            .unwrap_or_default()
    }

    fn is_controller(&self, index: i32) -> bool {
        self.request(|reply| GilrsCommand::IsController { index, reply })
            .unwrap_or(false)
    }

    fn open_joystick(&self, index: i32) -> Option<RawHandle> {
        self.request(|reply| GilrsCommand::Open {
            index,
            kind: HandleKind::Joystick,
            reply,
        })
        .flatten()
    }

    fn open_controller(&self, index: i32) -> Option<RawHandle> {
        self.request(|reply| GilrsCommand::Open {
            index,
            kind: HandleKind::Controller,
            reply,
        })
        .flatten()
    }

    fn close_joystick(&self, handle: RawHandle) {
        let _ = self.commands.send(GilrsCommand::Close { handle });
    }

    fn close_controller(&self, handle: RawHandle) {
        let _ = self.commands.send(GilrsCommand::Close { handle });
    }

    fn rumble_joystick(&self, handle: RawHandle, strong: u16, weak: u16, duration_ms: u32) -> bool {
        self.rumble_controller(handle, strong, weak, duration_ms)
    }

    fn rumble_controller(
        &self,
        handle: RawHandle,
        strong: u16,
        weak: u16,
        duration_ms: u32,
    ) -> bool {
        self.request(|reply| GilrsCommand::Rumble {
            handle,
            strong,
            weak,
            duration_ms,
            reply,
        })
        .unwrap_or(false)
    }
}

struct OpenPad {
    id: GamepadId,
    kind: HandleKind,
    effect: Option<Effect>,
}

struct GilrsWorker {
    gilrs: Gilrs,
    open: HashMap<RawHandle, OpenPad>,
    next_handle: u64,
    hotplug: mpsc::UnboundedSender<HotplugEvent>,
}

impl GilrsWorker {
    fn run(&mut self, mut commands: mpsc::UnboundedReceiver<GilrsCommand>, interval: Duration) {
        info!("gilrs runtime loop started");
        loop {
            loop {
                match commands.try_recv() {
                    Ok(command) => self.execute(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        info!("gilrs runtime dropped, stopping loop");
                        return;
                    }
                }
            }

            while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
                self.forward_event(id, event);
            }

            std::thread::sleep(interval);
        }
    }

    fn execute(&mut self, command: GilrsCommand) {
        match command {
            GilrsCommand::Enumerate { reply } => {
                let devices: Vec<Descriptor> = self
                    .gilrs
                    .gamepads()
                    .map(|(id, gamepad)| describe(id, &gamepad))
                    .collect();
                debug!("Enumerated {} gamepad(s)", devices.len());
                let _ = reply.send(devices);
            }
            GilrsCommand::IsController { index, reply } => {
                let is_controller = self
                    .find(index)
                    .and_then(|id| self.gilrs.connected_gamepad(id))
                    .is_some_and(|gamepad| gamepad.mapping_source() != MappingSource::None);
                let _ = reply.send(is_controller);
            }
            GilrsCommand::Open { index, kind, reply } => {
                let _ = reply.send(self.open(index, kind));
            }
            GilrsCommand::Close { handle } => {
                if let Some(pad) = self.open.remove(&handle) {
                    debug!("Closed {:?} handle {} for {}", pad.kind, handle, pad.id);
                }
            }
            GilrsCommand::Rumble {
                handle,
                strong,
                weak,
                duration_ms,
                reply,
            } => {
                let _ = reply.send(self.rumble(handle, strong, weak, duration_ms));
            }
        }
    }

    fn find(&self, index: i32) -> Option<GamepadId> {
        self.gilrs
            .gamepads()
            .map(|(id, _)| id)
            .find(|id| index_of(*id) == index)
    }

    fn open(&mut self, index: i32, kind: HandleKind) -> Option<RawHandle> {
        let Some(id) = self.find(index) else {
            warn!("No connected gamepad at #{}", index);
            return None;
        };
        let handle = RawHandle::new(self.next_handle)?;
        self.next_handle += 1;
        self.open.insert(
            handle,
            OpenPad {
                id,
                kind,
                effect: None,
            },
        );
        Some(handle)
    }

    fn rumble(&mut self, handle: RawHandle, strong: u16, weak: u16, duration_ms: u32) -> bool {
        let Some(pad) = self.open.get_mut(&handle) else {
            warn!("Rumble on unknown handle {}", handle);
            return false;
        };

        if strong == 0 && weak == 0 {
            return match pad.effect.take() {
                Some(effect) => effect.stop().is_ok(),
                None => true,
            };
        }

        let supported = self
            .gilrs
            .connected_gamepad(pad.id)
            .is_some_and(|gamepad| gamepad.is_ff_supported());
        if !supported {
            debug!("Gamepad {} has no force feedback", pad.id);
            return false;
        }

        let (play_for, repeat) = if duration_ms == INDEFINITE_MS {
            (Ticks::from_ms(1000), Repeat::Infinitely)
        } else {
            let ticks = Ticks::from_ms(duration_ms);
            (ticks, Repeat::For(ticks))
        };
        let scheduling = Replay {
            play_for,
            ..Default::default()
        };

        let effect = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong { magnitude: strong },
                scheduling,
                ..Default::default()
            })
            .add_effect(BaseEffect {
                kind: BaseEffectType::Weak { magnitude: weak },
                scheduling,
                ..Default::default()
            })
            .gamepads(&[pad.id])
            .repeat(repeat)
            .finish(&mut self.gilrs);

        match effect.and_then(|effect| effect.play().map(|()| effect)) {
            Ok(effect) => {
                pad.effect = Some(effect);
                true
            }
            Err(e) => {
                warn!("Failed to start force feedback on {}: {}", pad.id, e);
                false
            }
        }
    }

    fn forward_event(&mut self, id: GamepadId, event: EventType) {
        let event = match event {
            EventType::Connected => {
                let gamepad = self.gilrs.gamepad(id);
                info!("Gamepad connected: {} ({})", gamepad.name(), id);
                HotplugEvent::Added {
                    candidate: describe(id, &gamepad),
                    index: index_of(id),
                }
            }
            EventType::Disconnected => {
                warn!("Gamepad disconnected: {}", id);
                HotplugEvent::Removed { index: index_of(id) }
            }
            _ => return,
        };

        if self.hotplug.send(event).is_err() {
            debug!("No hotplug listener attached");
        }
    }
}

fn index_of(id: GamepadId) -> i32 {
    i32::try_from(usize::from(id)).unwrap_or(i32::MAX)
}

fn describe(id: GamepadId, gamepad: &Gamepad<'_>) -> Descriptor {
    let path = gamepad
        .uuid()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>();
    Descriptor::new(gamepad.name(), path, "", index_of(id))
}
