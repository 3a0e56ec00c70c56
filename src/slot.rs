use crate::error::SetProcessorError;
use crate::processor::{DeviceConfig, Processor, ProcessorData};
use std::sync::Mutex;

/// Holds the active processor and guards its replacement against the audio
/// callback.
///
/// Two locks, two roles. `control` serialises control-side operations (swap,
/// device start/stop) against each other and is never touched by the audio
/// thread. `active` is the lock shared with the audio thread: the control
/// side only ever holds it for a pointer swap, so the callback's acquisition
/// is bounded; the callback holds it for the duration of one process call,
/// so a concurrent swap waits at most one block. Prepare and release always
/// run outside the shared lock.
pub struct ProcessorSlot {
    control: Mutex<ControlState>,
    active: Mutex<ActiveState>,
}

struct ControlState {
    /// Present only while the device is streaming.
    config: Option<DeviceConfig>,
}

struct ActiveState {
    processor: Option<Box<dyn Processor>>,
    prepared: bool,
}

impl Default for ProcessorSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorSlot {
    pub fn new() -> Self {
        Self {
            control: Mutex::new(ControlState { config: None }),
            active: Mutex::new(ActiveState {
                processor: None,
                prepared: false,
            }),
        }
    }

    /// Replaces the active processor, returning the previous one to the
    /// caller. Safe to call from a non-real-time thread at any time,
    /// including while the device is streaming.
    ///
    /// If the device is streaming, the incoming processor is prepared before
    /// it becomes visible to the callback; if prepare fails, the previous
    /// processor stays active and the incoming one is handed back inside the
    /// error. The outgoing processor has its release hook called (if it was
    /// prepared) before being returned.
    pub fn set(
        &self,
        processor: Option<Box<dyn Processor>>,
    ) -> Result<Option<Box<dyn Processor>>, SetProcessorError> {
        let control = self.control.lock().unwrap();
        let config = control.config;

        let mut incoming = processor;
        if let Some(config) = config {
            if let Some(mut new) = incoming.take() {
                if let Err(source) = new.prepare(&config) {
                    return Err(SetProcessorError {
                        processor: new,
                        source,
                    });
                }
                incoming = Some(new);
            }
        }
        let incoming_prepared = config.is_some() && incoming.is_some();

        let (mut outgoing, was_prepared) = {
            let mut active = self.active.lock().unwrap();
            let was_prepared = active.prepared;
            active.prepared = incoming_prepared;
            (
                std::mem::replace(&mut active.processor, incoming),
                was_prepared,
            )
        };

        if let Some(old) = outgoing.as_mut() {
            if was_prepared {
                old.release();
            }
        }

        drop(control);
        Ok(outgoing)
    }

    /// Prepares the active processor for streaming and records the device
    /// configuration. A failed prepare is logged and leaves the processor
    /// set but unprepared; the callback degrades to silence.
    pub fn device_started(&self, config: DeviceConfig) {
        let mut control = self.control.lock().unwrap();

        let mut taken = {
            let mut active = self.active.lock().unwrap();
            active.prepared = false;
            active.processor.take()
        };

        let mut prepared = false;
        if let Some(processor) = taken.as_mut() {
            match processor.prepare(&config) {
                Ok(()) => prepared = true,
                Err(err) => log::error!("processor failed to prepare at device start: {err}"),
            }
        }

        {
            let mut active = self.active.lock().unwrap();
            active.processor = taken;
            active.prepared = prepared;
        }
        control.config = Some(config);
    }

    /// Releases the active processor and forgets the device configuration.
    /// The device abstraction guarantees no further callbacks are issued
    /// once it reports a stop.
    pub fn device_stopped(&self) {
        let mut control = self.control.lock().unwrap();

        let (mut taken, was_prepared) = {
            let mut active = self.active.lock().unwrap();
            let was_prepared = active.prepared;
            active.prepared = false;
            (active.processor.take(), was_prepared)
        };

        if let Some(processor) = taken.as_mut() {
            if was_prepared {
                processor.release();
            }
        }

        let mut active = self.active.lock().unwrap();
        active.processor = taken;
        control.config = None;
    }

    /// Runs the active processor over one block. Returns false when no
    /// prepared processor is available, in which case the caller silences
    /// its outputs. Callback-only.
    pub fn process_block(&self, data: ProcessorData) -> bool {
        let Ok(mut active) = self.active.lock() else {
            return false;
        };
        if !active.prepared {
            return false;
        }
        let Some(processor) = active.processor.as_mut() else {
            return false;
        };
        processor.process(data);
        true
    }

    /// The configuration of the currently streaming device, if any.
    pub fn config(&self) -> Option<DeviceConfig> {
        self.control.lock().unwrap().config
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().map(|a| a.processor.is_some()).unwrap_or(false)
    }

    /// Control-side access to the active processor. May wait for an
    /// in-flight process call to finish.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut dyn Processor) -> R) -> Option<R> {
        let mut active = self.active.lock().ok()?;
        active.processor.as_mut().map(|p| f(p.as_mut()))
    }
}
