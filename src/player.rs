use crate::adapter::ChannelBufferAdapter;
use crate::collector::MidiEventCollector;
use crate::error::SetProcessorError;
use crate::midi::{MidiEvent, TimedMidiEvent};
use crate::processor::{DeviceConfig, Processor, ProcessorData};
use crate::slot::ProcessorSlot;
use std::sync::Arc;

/// The contract an audio device abstraction drives.
///
/// `about_to_start` is called once before streaming, `io_callback`
/// repeatedly during streaming (never concurrently with itself), and
/// `stopped` once after the last callback has returned.
pub trait AudioIoCallback: Send {
    fn about_to_start(&mut self, config: DeviceConfig);

    fn io_callback(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], num_samples: usize);

    fn stopped(&mut self);
}

/// Streams audio and MIDI from a device callback through a swappable
/// [`Processor`].
///
/// The player itself lives with the device callback; [`PlayerControls`]
/// carries the thread-safe control surface (processor swap, MIDI injection)
/// anywhere else. Each callback drains the MIDI due in its sample window,
/// reshapes the device's channel slices through the
/// [`ChannelBufferAdapter`], and runs the processor held by the
/// [`ProcessorSlot`]. With no prepared processor the outputs are silenced.
pub struct AudioProcessorPlayer {
    slot: Arc<ProcessorSlot>,
    collector: Arc<MidiEventCollector>,
    adapter: ChannelBufferAdapter,
    /// Drained events for the current block; reserved at device start.
    midi_scratch: Vec<TimedMidiEvent>,
    config: Option<DeviceConfig>,
    /// Start of the current MIDI drain window, in collector-clock seconds.
    window_start: f64,
}

/// Cheap clonable handle to a player's control surface. All methods are safe
/// to call from non-real-time threads while the device is streaming.
#[derive(Clone)]
pub struct PlayerControls {
    slot: Arc<ProcessorSlot>,
    collector: Arc<MidiEventCollector>,
}

impl Default for AudioProcessorPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessorPlayer {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(ProcessorSlot::new()),
            collector: Arc::new(MidiEventCollector::new()),
            adapter: ChannelBufferAdapter::new(),
            midi_scratch: Vec::new(),
            config: None,
            window_start: 0.0,
        }
    }

    pub fn controls(&self) -> PlayerControls {
        PlayerControls {
            slot: Arc::clone(&self.slot),
            collector: Arc::clone(&self.collector),
        }
    }

    /// Sets the processor to play, returning the previous one. The player
    /// never destroys a processor: ownership of the outgoing unit always
    /// passes back to the caller. Pass `None` to stop anything playing.
    pub fn set_processor(
        &self,
        processor: Option<Box<dyn Processor>>,
    ) -> Result<Option<Box<dyn Processor>>, SetProcessorError> {
        self.slot.set(processor)
    }

    pub fn is_processor_set(&self) -> bool {
        self.slot.is_active()
    }

    /// The collector fed by [`Self::handle_incoming_midi_message`]; external
    /// components can push events into it directly.
    pub fn midi_collector(&self) -> Arc<MidiEventCollector> {
        Arc::clone(&self.collector)
    }

    /// MIDI input callback; safe from any thread. The event is stamped with
    /// the collector's clock and merged into the next audio block.
    pub fn handle_incoming_midi_message(&self, event: MidiEvent) {
        self.collector.push_now(event);
    }
}

impl AudioIoCallback for AudioProcessorPlayer {
    fn about_to_start(&mut self, config: DeviceConfig) {
        self.adapter.resize(config.total_channels(), config.block_size);
        self.midi_scratch.clear();
        self.midi_scratch.reserve(self.collector.capacity());
        self.collector.reset();
        self.window_start = self.collector.now();
        self.slot.device_started(config);
        self.config = Some(config);
    }

    fn io_callback(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], num_samples: usize) {
        let Some(config) = self.config else {
            // Tolerate being called while stopped
            silence(outputs);
            return;
        };

        let samples = num_samples.min(config.block_size);
        let block_duration = samples as f64 / config.sample_rate;

        self.midi_scratch.clear();
        self.collector.drain_into(
            self.window_start,
            samples,
            config.sample_rate,
            &mut self.midi_scratch,
        );
        self.window_start += block_duration;

        // Resync after a stall so queued events don't sit in a window that
        // lags arbitrarily far behind the clock they were stamped with.
        let now = self.collector.now();
        if now - self.window_start > 2.0 * block_duration {
            self.window_start = now;
        }

        let audio = self.adapter.adapt(inputs, outputs.len(), samples);
        let processed = self.slot.process_block(ProcessorData {
            samples,
            audio,
            midi: &self.midi_scratch,
        });

        if processed {
            self.adapter.write_back(outputs, samples);
        } else {
            silence(outputs);
        }
    }

    fn stopped(&mut self) {
        self.slot.device_stopped();
        self.config = None;
    }
}

impl PlayerControls {
    /// See [`AudioProcessorPlayer::set_processor`].
    pub fn set_processor(
        &self,
        processor: Option<Box<dyn Processor>>,
    ) -> Result<Option<Box<dyn Processor>>, SetProcessorError> {
        self.slot.set(processor)
    }

    pub fn is_processor_set(&self) -> bool {
        self.slot.is_active()
    }

    /// Runs `f` against the active processor, if any. May wait for an
    /// in-flight process call to finish.
    pub fn with_processor<R>(&self, f: impl FnOnce(&mut dyn Processor) -> R) -> Option<R> {
        self.slot.with_current(f)
    }

    pub fn midi_collector(&self) -> Arc<MidiEventCollector> {
        Arc::clone(&self.collector)
    }

    pub fn handle_incoming_midi_message(&self, event: MidiEvent) {
        self.collector.push_now(event);
    }
}

fn silence(outputs: &mut [&mut [f32]]) {
    for channel in outputs.iter_mut() {
        channel.fill(0.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::PrepareError;
    use std::sync::Mutex;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Prepare,
        Process,
        Release,
    }

    /// Shared record of everything the instrumented processors were asked
    /// to do.
    #[derive(Clone, Default)]
    struct Journal {
        calls: Arc<Mutex<Vec<(&'static str, Call)>>>,
        midi_offsets: Arc<Mutex<Vec<u32>>>,
        prepared_rate: Arc<Mutex<Option<f64>>>,
    }

    impl Journal {
        fn calls(&self) -> Vec<(&'static str, Call)> {
            self.calls.lock().unwrap().clone()
        }

        fn midi_offsets(&self) -> Vec<u32> {
            self.midi_offsets.lock().unwrap().clone()
        }
    }

    struct TestProcessor {
        name: &'static str,
        journal: Journal,
        fail_prepare: bool,
        invert: bool,
    }

    impl TestProcessor {
        fn new(name: &'static str, journal: &Journal) -> Box<Self> {
            Box::new(Self {
                name,
                journal: journal.clone(),
                fail_prepare: false,
                invert: false,
            })
        }
    }

    impl Processor for TestProcessor {
        fn prepare(&mut self, config: &DeviceConfig) -> Result<(), PrepareError> {
            if self.fail_prepare {
                return Err(PrepareError::UnsupportedSampleRate(config.sample_rate));
            }
            *self.journal.prepared_rate.lock().unwrap() = Some(config.sample_rate);
            self.journal.calls.lock().unwrap().push((self.name, Call::Prepare));
            Ok(())
        }

        fn process(&mut self, data: ProcessorData) {
            self.journal.calls.lock().unwrap().push((self.name, Call::Process));
            self.journal
                .midi_offsets
                .lock()
                .unwrap()
                .extend(data.midi.iter().map(|ev| ev.time));
            if self.invert {
                for channel in data.audio.iter_mut() {
                    for sample in channel.iter_mut() {
                        *sample = -*sample;
                    }
                }
            }
        }

        fn release(&mut self) {
            self.journal.calls.lock().unwrap().push((self.name, Call::Release));
        }
    }

    fn config() -> DeviceConfig {
        DeviceConfig {
            sample_rate: 44_100.0,
            block_size: 512,
            num_input_channels: 2,
            num_output_channels: 2,
        }
    }

    /// Runs one device callback with both input channels set to `input` and
    /// returns the produced output channels.
    fn run_block(player: &mut AudioProcessorPlayer, input: &[f32]) -> Vec<Vec<f32>> {
        let n = input.len();
        // Poison the outputs to catch missed writes
        let mut out = vec![vec![9.9f32; n]; 2];
        let inputs: Vec<&[f32]> = vec![input, input];
        let mut out_refs: Vec<&mut [f32]> = out.iter_mut().map(|c| c.as_mut_slice()).collect();
        player.io_callback(&inputs, &mut out_refs, n);
        out
    }

    fn note_on() -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        }
    }

    #[test]
    fn test_callback_while_stopped_writes_silence() {
        let mut player = AudioProcessorPlayer::new();
        let out = run_block(&mut player, &[1.0; 512]);
        assert!(out.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_no_processor_produces_silence() {
        let mut player = AudioProcessorPlayer::new();
        player.about_to_start(config());
        let out = run_block(&mut player, &[0.5; 512]);
        assert!(out.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_inverting_processor_negates_the_signal() {
        let journal = Journal::default();
        let mut processor = TestProcessor::new("inv", &journal);
        processor.invert = true;

        let mut player = AudioProcessorPlayer::new();
        player.set_processor(Some(processor)).unwrap();
        player.about_to_start(config());

        let input: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let out = run_block(&mut player, &input);

        for channel in &out {
            for (sample, expected) in channel.iter().zip(input.iter()) {
                assert_eq!(*sample, -expected);
            }
        }
    }

    #[test]
    fn test_prepare_called_once_before_first_process() {
        let journal = Journal::default();
        let mut player = AudioProcessorPlayer::new();
        player
            .set_processor(Some(TestProcessor::new("p", &journal)))
            .unwrap();
        player.about_to_start(config());
        run_block(&mut player, &[0.0; 512]);

        let calls = journal.calls();
        assert_eq!(calls, vec![("p", Call::Prepare), ("p", Call::Process)]);
        assert_eq!(*journal.prepared_rate.lock().unwrap(), Some(44_100.0));
    }

    #[test]
    fn test_swap_while_streaming() {
        let journal = Journal::default();
        let mut player = AudioProcessorPlayer::new();
        let controls = player.controls();

        player
            .set_processor(Some(TestProcessor::new("a", &journal)))
            .unwrap();
        player.about_to_start(config());
        run_block(&mut player, &[0.0; 512]);

        let old = controls
            .set_processor(Some(TestProcessor::new("b", &journal)))
            .unwrap();
        assert!(old.is_some());
        run_block(&mut player, &[0.0; 512]);

        let calls = journal.calls();
        let release_a = calls.iter().position(|c| *c == ("a", Call::Release)).unwrap();
        let prepare_b = calls.iter().position(|c| *c == ("b", Call::Prepare)).unwrap();
        let process_b = calls.iter().position(|c| *c == ("b", Call::Process)).unwrap();

        // New processor prepared before its first process call
        assert!(prepare_b < process_b);
        // Old processor never processes after its release
        assert!(!calls[release_a..].contains(&("a", Call::Process)));
    }

    #[test]
    fn test_failed_swap_keeps_old_processor_running() {
        let journal = Journal::default();
        let mut player = AudioProcessorPlayer::new();

        player
            .set_processor(Some(TestProcessor::new("a", &journal)))
            .unwrap();
        player.about_to_start(config());

        let mut bad = TestProcessor::new("b", &journal);
        bad.fail_prepare = true;
        let err = match player.set_processor(Some(bad)) {
            Err(err) => err,
            Ok(_) => panic!("swap should have failed"),
        };
        assert!(matches!(err.source, PrepareError::UnsupportedSampleRate(_)));

        run_block(&mut player, &[0.0; 512]);
        let calls = journal.calls();
        assert!(calls.contains(&("a", Call::Process)));
        assert!(!calls.contains(&("a", Call::Release)));
        assert!(!calls.contains(&("b", Call::Process)));
    }

    #[test]
    fn test_midi_event_delivered_exactly_once() {
        let journal = Journal::default();
        let mut player = AudioProcessorPlayer::new();
        player
            .set_processor(Some(TestProcessor::new("p", &journal)))
            .unwrap();
        player.about_to_start(config());

        // Stamped at the collector epoch, i.e. before the current window:
        // a late arrival, coalesced to the start of the next block.
        player.midi_collector().push(note_on(), 0.0);

        run_block(&mut player, &[0.0; 512]);
        assert_eq!(journal.midi_offsets(), vec![0]);

        run_block(&mut player, &[0.0; 512]);
        assert_eq!(journal.midi_offsets(), vec![0]);
    }

    #[test]
    fn test_stop_releases_and_silences() {
        let journal = Journal::default();
        let mut player = AudioProcessorPlayer::new();
        player
            .set_processor(Some(TestProcessor::new("p", &journal)))
            .unwrap();
        player.about_to_start(config());
        run_block(&mut player, &[1.0; 512]);
        player.stopped();

        assert!(journal.calls().contains(&("p", Call::Release)));
        let out = run_block(&mut player, &[1.0; 512]);
        assert!(out.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_swap_from_another_thread() {
        let journal = Journal::default();
        let mut player = AudioProcessorPlayer::new();
        let controls = player.controls();

        player.about_to_start(config());
        run_block(&mut player, &[0.0; 512]);

        let handle = {
            let journal = journal.clone();
            std::thread::spawn(move || {
                controls
                    .set_processor(Some(TestProcessor::new("t", &journal)))
                    .unwrap()
            })
        };
        assert!(handle.join().unwrap().is_none());

        run_block(&mut player, &[0.0; 512]);
        assert_eq!(
            journal.calls(),
            vec![("t", Call::Prepare), ("t", Call::Process)]
        );
    }
}
