//! In-memory capture card
//!
//! Behaves like a card with free-running hardware: vertical interrupts arrive on a fixed
//! frame period, latched input frames are filled with a per-frame stamp byte and running
//! audio systems write a little-endian u32 sample counter into their ring buffers. Signal
//! state (formats, VPIDs, HDMI color space, presence) is set from the outside.

use super::{Card, CardProbe, DeviceInfo};
use crate::error::{AjaError, Result};
use crate::ntv2::{
    AudioSystem, Channel, HdmiColorSpace, InputSource, PixelFormat, Reference, VideoFormat,
    VpidBitDepth, VpidData, VpidSampling, VpidStandard, XptInput, XptOutput,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Size of each audio system's input ring
pub const AUDIO_RING_SIZE: u32 = 0x8_0000;

const AUDIO_BASE: u32 = 0x0100_0000;
const AUDIO_STRIDE: u32 = 0x0010_0000;

/// 48 kHz, 8 channels of 32-bit samples over one 60 Hz frame
const DEFAULT_AUDIO_BYTES_PER_TICK: u32 = 800 * 32;

const MIN_FRAME_PERIOD: Duration = Duration::from_micros(100);

/// Ticks replayed in full when catching up; older ones only advance the counters
const MAX_REPLAYED_TICKS: u64 = 64;

/// Signal present on one physical connector
#[derive(Debug, Clone)]
struct SimSignal {
    format: Option<VideoFormat>,
    vpid: (u32, u32),
    hdmi_color: HdmiColorSpace,
}

impl Default for SimSignal {
    fn default() -> Self {
        Self {
            format: None,
            vpid: (0, 0),
            hdmi_color: HdmiColorSpace::YCbCr,
        }
    }
}

struct SimAudio {
    ring: Vec<u8>,
    last_in: u32,
    counter: u32,
    running: bool,
    source: Option<InputSource>,
}

impl SimAudio {
    fn new() -> Self {
        Self {
            ring: vec![0; AUDIO_RING_SIZE as usize],
            last_in: 0,
            counter: 0,
            running: false,
            source: None,
        }
    }

    fn write(&mut self, bytes: u32) {
        for _ in 0..bytes / 4 {
            let pos = self.last_in as usize;
            self.ring[pos..pos + 4].copy_from_slice(&self.counter.to_le_bytes());
            self.counter = self.counter.wrapping_add(1);
            self.last_in = (self.last_in + 4) % AUDIO_RING_SIZE;
        }
    }

    fn skip(&mut self, bytes: u64) {
        let words = bytes / 4;
        self.counter = self.counter.wrapping_add(words as u32);
        self.last_in = ((self.last_in as u64 + words * 4) % AUDIO_RING_SIZE as u64) as u32;
    }
}

struct SimState {
    present: bool,
    frame_period: Duration,
    epoch: Instant,
    epoch_ticks: u64,
    ticks: u64,
    audio_bytes_per_tick: u32,
    audio_busy: bool,
    signals: BTreeMap<InputSource, SimSignal>,
    enabled: BTreeSet<Channel>,
    transmitting: BTreeSet<Channel>,
    capturing: BTreeSet<Channel>,
    video_formats: BTreeMap<Channel, VideoFormat>,
    fb_formats: BTreeMap<Channel, PixelFormat>,
    input_frames: BTreeMap<Channel, u32>,
    active_frames: BTreeMap<Channel, u32>,
    frames: BTreeMap<u32, u8>,
    audio: BTreeMap<AudioSystem, SimAudio>,
    xpt: BTreeMap<XptInput, XptOutput>,
    reference: Reference,
}

impl SimState {
    fn due_ticks(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        self.epoch_ticks + (elapsed / self.frame_period.as_nanos()) as u64
    }

    fn next_boundary(&self) -> Instant {
        let ahead = (self.ticks + 1 - self.epoch_ticks) as u32;
        self.epoch + self.frame_period * ahead
    }

    fn catch_up(&mut self, now: Instant) {
        let due = self.due_ticks(now);
        if due <= self.ticks {
            return;
        }
        let skipped = (due - self.ticks).saturating_sub(MAX_REPLAYED_TICKS);
        if skipped > 0 {
            trace!("Simulated card skipping {} ticks", skipped);
            self.ticks += skipped;
            let bytes = self.audio_bytes_per_tick as u64 * skipped;
            for audio in self.audio.values_mut().filter(|a| a.running) {
                audio.skip(bytes);
            }
        }
        while self.ticks < due {
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.ticks += 1;
        let stamp = (self.ticks % 255) as u8 + 1;

        for channel in self.capturing.iter() {
            if let Some(active) = self.active_frames.get(channel) {
                self.frames.insert(*active, stamp);
            }
            if let Some(next) = self.input_frames.get(channel) {
                self.active_frames.insert(*channel, *next);
            }
        }

        let bytes = self.audio_bytes_per_tick;
        for audio in self.audio.values_mut().filter(|a| a.running) {
            audio.write(bytes);
        }
    }

    fn sdi_signal(&self, channel: Channel) -> Option<&SimSignal> {
        self.signals.get(&InputSource::Sdi(channel.index() as u8 + 1))
    }
}

/// Simulated capture card
pub struct SimulatedCard {
    info: DeviceInfo,
    state: Mutex<SimState>,
}

impl SimulatedCard {
    /// Four-channel card with four SDI inputs and one HDMI input
    pub fn new(card_id: &str) -> Arc<Self> {
        Self::with_info(DeviceInfo {
            card_id: card_id.to_string(),
            model: "Simulated Kona".to_string(),
            num_channels: 4,
            num_sdi_inputs: 4,
            num_hdmi_inputs: 1,
            hdmi_version: 2,
            bidirectional_sdi: true,
            output_only: false,
        })
    }

    /// Playout-only card without inputs
    pub fn output_only(card_id: &str) -> Arc<Self> {
        Self::with_info(DeviceInfo {
            card_id: card_id.to_string(),
            model: "Simulated T-TAP".to_string(),
            num_channels: 1,
            num_sdi_inputs: 0,
            num_hdmi_inputs: 0,
            hdmi_version: 0,
            bidirectional_sdi: false,
            output_only: true,
        })
    }

    pub fn with_info(info: DeviceInfo) -> Arc<Self> {
        let frame_period = VideoFormat::FALLBACK.frame_rate().frame_duration();
        Arc::new(Self {
            info,
            state: Mutex::new(SimState {
                present: true,
                frame_period,
                epoch: Instant::now(),
                epoch_ticks: 0,
                ticks: 0,
                audio_bytes_per_tick: DEFAULT_AUDIO_BYTES_PER_TICK,
                audio_busy: false,
                signals: BTreeMap::new(),
                enabled: BTreeSet::new(),
                transmitting: BTreeSet::new(),
                capturing: BTreeSet::new(),
                video_formats: BTreeMap::new(),
                fb_formats: BTreeMap::new(),
                input_frames: BTreeMap::new(),
                active_frames: BTreeMap::new(),
                frames: BTreeMap::new(),
                audio: BTreeMap::new(),
                xpt: BTreeMap::new(),
                reference: Reference::FreeRun,
            }),
        })
    }

    /// Interval between vertical interrupts
    pub fn set_frame_period(&self, period: Duration) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.catch_up(now);
        state.frame_period = period.max(MIN_FRAME_PERIOD);
        state.epoch = now;
        state.epoch_ticks = state.ticks;
    }

    /// Put a signal on `source`, or remove it with `None`
    ///
    /// SDI connectors get a matching 4:2:2 10-bit VPID.
    pub fn set_input_signal(&self, source: InputSource, format: Option<VideoFormat>) {
        let vpid = match (source, format) {
            (InputSource::Sdi(_), Some(vf)) => {
                let raw = VpidData::encode(
                    vpid_standard(vf),
                    vf.frame_rate(),
                    vf.is_progressive(),
                    VpidSampling::Yuv422,
                    VpidBitDepth::Bits10,
                );
                let link_b = if vf.is_3g_level_b() { raw } else { 0 };
                (raw, link_b)
            }
            _ => (0, 0),
        };
        debug!("Simulated {} signal on {}: {:?}", self.info.card_id, source, format);
        let mut state = self.state.lock();
        let signal = state.signals.entry(source).or_default();
        signal.format = format;
        signal.vpid = vpid;
    }

    /// Override the raw VPID pair of an SDI connector
    pub fn set_vpid(&self, source: InputSource, a: u32, b: u32) {
        self.state.lock().signals.entry(source).or_default().vpid = (a, b);
    }

    pub fn set_hdmi_color(&self, source: InputSource, color: HdmiColorSpace) {
        self.state.lock().signals.entry(source).or_default().hdmi_color = color;
    }

    /// Simulate unplugging or replugging the card
    pub fn set_present(&self, present: bool) {
        debug!("Simulated {} present: {}", self.info.card_id, present);
        self.state.lock().present = present;
    }

    pub fn set_audio_bytes_per_tick(&self, bytes: u32) {
        self.state.lock().audio_bytes_per_tick = bytes & !3;
    }

    /// Make `start_audio_input` fail while set
    pub fn set_audio_busy(&self, busy: bool) {
        self.state.lock().audio_busy = busy;
    }

    /// Deliver `count` vertical interrupts immediately
    pub fn advance_frames(&self, count: u64) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.tick();
        }
        state.epoch_ticks += count;
    }

    pub fn reference(&self) -> Reference {
        self.state.lock().reference
    }

    pub fn is_audio_running(&self, system: AudioSystem) -> bool {
        self.state.lock().audio.get(&system).is_some_and(|a| a.running)
    }

    pub fn audio_input_source(&self, system: AudioSystem) -> Option<InputSource> {
        self.state.lock().audio.get(&system).and_then(|a| a.source)
    }

    pub fn input_frame(&self, channel: Channel) -> Option<u32> {
        self.state.lock().input_frames.get(&channel).copied()
    }

    pub fn frame_buffer_format(&self, channel: Channel) -> Option<PixelFormat> {
        self.state.lock().fb_formats.get(&channel).copied()
    }

    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        self.state.lock().enabled.contains(&channel)
    }

    pub fn is_transmitting(&self, channel: Channel) -> bool {
        self.state.lock().transmitting.contains(&channel)
    }

    pub fn is_capturing(&self, channel: Channel) -> bool {
        self.state.lock().capturing.contains(&channel)
    }

    /// Number of crosspoint connections currently made
    pub fn num_connections(&self) -> usize {
        self.state.lock().xpt.len()
    }

    fn check_present(&self) -> Result<()> {
        if self.state.lock().present {
            Ok(())
        } else {
            Err(AjaError::DeviceDisconnected(self.info.card_id.clone()))
        }
    }
}

fn vpid_standard(vf: VideoFormat) -> VpidStandard {
    if vf.is_4k() {
        VpidStandard::Uhd2160_12G
    } else if vf.is_3g_level_b() {
        VpidStandard::Hd1080_3Gb
    } else if vf.is_3g() {
        VpidStandard::Hd1080_3Ga
    } else if vf.raster_height() == 720 {
        VpidStandard::Hd720
    } else if vf.raster_height() == 1080 {
        VpidStandard::Hd1080
    } else {
        VpidStandard::Sd483_576
    }
}

impl Card for SimulatedCard {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn model_name(&self) -> String {
        if self.state.lock().present {
            self.info.model.clone()
        } else {
            "(Not Found)".to_string()
        }
    }

    fn is_present(&self) -> bool {
        self.state.lock().present
    }

    fn is_open(&self) -> bool {
        true
    }

    fn enable_channel(&self, channel: Channel) -> Result<()> {
        self.check_present()?;
        self.state.lock().enabled.insert(channel);
        Ok(())
    }

    fn set_sdi_transmit_enable(&self, channel: Channel, enable: bool) -> Result<()> {
        self.check_present()?;
        let mut state = self.state.lock();
        if enable {
            state.transmitting.insert(channel);
        } else {
            state.transmitting.remove(&channel);
        }
        Ok(())
    }

    fn wait_for_input_vertical_interrupt(&self, _channel: Channel) -> bool {
        let (present, deadline, period) = {
            let mut state = self.state.lock();
            state.catch_up(Instant::now());
            (state.present, state.next_boundary(), state.frame_period)
        };
        if !present {
            thread::sleep(period);
            return false;
        }

        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        self.state.lock().catch_up(Instant::now().max(deadline));
        true
    }

    fn read_sdi_in_vpid(&self, channel: Channel) -> Result<(u32, u32)> {
        self.check_present()?;
        let state = self.state.lock();
        Ok(state.sdi_signal(channel).map_or((0, 0), |s| s.vpid))
    }

    fn hdmi_input_color(&self, channel: Channel) -> Result<HdmiColorSpace> {
        self.check_present()?;
        let state = self.state.lock();
        let source = InputSource::Hdmi(channel.index() as u8 + 1);
        Ok(state
            .signals
            .get(&source)
            .map_or(HdmiColorSpace::YCbCr, |s| s.hdmi_color))
    }

    fn input_video_format(&self, source: InputSource, level_b: bool) -> Option<VideoFormat> {
        let state = self.state.lock();
        if !state.present {
            return None;
        }
        let format = state.signals.get(&source)?.format?;
        Some(if level_b {
            format.level_b_equivalent()
        } else {
            format.level_a_equivalent()
        })
    }

    fn is_3g_level_b(&self, channel: Channel) -> bool {
        let state = self.state.lock();
        state
            .sdi_signal(channel)
            .and_then(|s| s.format)
            .is_some_and(VideoFormat::is_3g_level_b)
    }

    fn set_capture_mode(&self, channel: Channel) -> Result<()> {
        self.check_present()?;
        self.state.lock().capturing.insert(channel);
        Ok(())
    }

    fn set_video_format(&self, channel: Channel, format: VideoFormat) -> Result<()> {
        self.check_present()?;
        self.state.lock().video_formats.insert(channel, format);
        Ok(())
    }

    fn video_format(&self, channel: Channel) -> Option<VideoFormat> {
        self.state.lock().video_formats.get(&channel).copied()
    }

    fn set_frame_buffer_format(&self, channel: Channel, format: PixelFormat) -> Result<()> {
        self.check_present()?;
        self.state.lock().fb_formats.insert(channel, format);
        Ok(())
    }

    fn set_input_frame(&self, channel: Channel, frame: u32) -> Result<()> {
        self.check_present()?;
        self.state.lock().input_frames.insert(channel, frame);
        Ok(())
    }

    fn dma_read_frame(&self, frame: u32, dest: &mut [u8]) -> Result<()> {
        self.check_present()?;
        let stamp = self.state.lock().frames.get(&frame).copied().unwrap_or(0);
        dest.fill(stamp);
        Ok(())
    }

    fn set_reference(&self, reference: Reference) -> Result<()> {
        self.check_present()?;
        self.state.lock().reference = reference;
        Ok(())
    }

    fn audio_read_offset(&self, system: AudioSystem) -> u32 {
        AUDIO_BASE + system.0 as u32 * AUDIO_STRIDE
    }

    fn audio_wrap_address(&self, _system: AudioSystem) -> u32 {
        AUDIO_RING_SIZE
    }

    fn read_audio_last_in(&self, system: AudioSystem) -> u32 {
        self.state.lock().audio.get(&system).map_or(0, |a| a.last_in)
    }

    fn dma_read_audio(&self, system: AudioSystem, dest: &mut [u8], address: u32) -> Result<()> {
        self.check_present()?;
        let start = address
            .checked_sub(self.audio_read_offset(system))
            .map(|offset| offset as usize)
            .filter(|offset| offset + dest.len() <= AUDIO_RING_SIZE as usize)
            .ok_or_else(|| {
                AjaError::device_error(
                    &self.info.card_id,
                    format!("audio DMA outside ring: {:#x}+{}", address, dest.len()),
                )
            })?;

        let state = self.state.lock();
        match state.audio.get(&system) {
            Some(audio) => dest.copy_from_slice(&audio.ring[start..start + dest.len()]),
            None => dest.fill(0),
        }
        Ok(())
    }

    fn set_audio_input_source(&self, system: AudioSystem, source: InputSource) -> Result<()> {
        self.check_present()?;
        self.state
            .lock()
            .audio
            .entry(system)
            .or_insert_with(SimAudio::new)
            .source = Some(source);
        Ok(())
    }

    fn start_audio_input(&self, system: AudioSystem) -> Result<()> {
        self.check_present()?;
        let mut state = self.state.lock();
        if state.audio_busy {
            return Err(AjaError::device_error(&self.info.card_id, format!("{} busy", system)));
        }
        state
            .audio
            .entry(system)
            .or_insert_with(SimAudio::new)
            .running = true;
        Ok(())
    }

    fn stop_audio_input(&self, system: AudioSystem) -> Result<()> {
        self.check_present()?;
        if let Some(audio) = self.state.lock().audio.get_mut(&system) {
            audio.running = false;
        }
        Ok(())
    }

    fn connect(&self, input: XptInput, output: XptOutput) -> Result<()> {
        self.check_present()?;
        trace!("{}: {} <- {}", self.info.card_id, input, output);
        self.state.lock().xpt.insert(input, output);
        Ok(())
    }

    fn disconnect(&self, input: XptInput) -> Result<()> {
        self.check_present()?;
        self.state.lock().xpt.remove(&input);
        Ok(())
    }

    fn connection(&self, input: XptInput) -> Option<XptOutput> {
        self.state.lock().xpt.get(&input).copied()
    }
}

/// Probe returning a fixed, mutable set of simulated cards
#[derive(Clone, Default)]
pub struct SimulatedProbe {
    cards: Arc<Mutex<Vec<Arc<SimulatedCard>>>>,
}

impl SimulatedProbe {
    pub fn new(cards: Vec<Arc<SimulatedCard>>) -> Self {
        Self {
            cards: Arc::new(Mutex::new(cards)),
        }
    }

    pub fn attach(&self, card: Arc<SimulatedCard>) {
        self.cards.lock().push(card);
    }

    /// Unplug a card: it stops answering and disappears from the next probe
    pub fn detach(&self, card_id: &str) {
        self.cards.lock().retain(|card| {
            let keep = card.info.card_id != card_id;
            if !keep {
                card.set_present(false);
            }
            keep
        });
    }
}

impl CardProbe for SimulatedProbe {
    fn probe(&self) -> Result<Vec<Arc<dyn Card>>> {
        Ok(self
            .cards
            .lock()
            .iter()
            .map(|card| Arc::clone(card) as Arc<dyn Card>)
            .collect())
    }
}
