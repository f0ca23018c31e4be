//! Capture thread: per-frame acquisition of video rasters and embedded audio

use super::buffer::{CaptureBuffers, FrameSlots};
use super::clock::monotonic_ns;
use super::offsets::{AudioOffsets, AudioPoll, AudioRegisters, AudioSpan};
use super::props::{handle_special_case_formats, SourceProps};
use super::sink::{
    AudioFormat, AudioPacket, ColorParams, FrameKind, FrameSink, HostVideoFormat, VideoFrame,
};
use crate::device::Card;
use crate::error::{AjaError, Result};
use crate::ntv2::{AudioSystem, Channel, InputSource, PixelFormat, VideoFormat};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Nothing configured yet
    #[default]
    Idle,
    /// Resolving formats and programming routes
    Configuring,
    /// Capture thread running
    Running,
    /// Auto-detect saw a different format; waiting for the owner to rebuild
    FormatChanged,
    /// Card went away while capturing
    DeviceLost,
    /// Stopped on request
    Stopped,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Configuring => "configuring",
            CaptureState::Running => "running",
            CaptureState::FormatChanged => "format changed",
            CaptureState::DeviceLost => "device lost",
            CaptureState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Capturing flag shared between the session and its capture thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    capturing: Arc<Mutex<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        *self.capturing.lock() = true;
    }

    pub fn cancel(&self) {
        *self.capturing.lock() = false;
    }

    pub fn is_capturing(&self) -> bool {
        *self.capturing.lock()
    }
}

/// Notification sent from a capture thread to the session owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The live format no longer matches the configured one
    FormatChanged {
        session: String,
        previous: Option<VideoFormat>,
        current: VideoFormat,
    },
    /// The card stopped answering
    DeviceLost { session: String, device_id: String },
}

impl SessionEvent {
    /// Name of the session the event belongs to
    pub fn session(&self) -> &str {
        match self {
            SessionEvent::FormatChanged { session, .. }
            | SessionEvent::DeviceLost { session, .. } => session,
        }
    }
}

/// Timing knobs of the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimings {
    /// Pause after a placeholder frame while no usable signal is present
    pub no_signal_backoff: Duration,
}

impl Default for CaptureTimings {
    fn default() -> Self {
        Self {
            no_signal_backoff: Duration::from_millis(250),
        }
    }
}

/// Everything a capture thread needs besides its buffers
pub struct CaptureContext {
    pub session: String,
    pub card: Arc<dyn Card>,
    pub props: SourceProps,
    pub sink: Arc<dyn FrameSink>,
    pub token: CancelToken,
    pub events: Sender<SessionEvent>,
    pub timings: CaptureTimings,
}

/// Result handed back through the capture thread's join handle
#[derive(Debug)]
pub struct CaptureExit {
    pub state: CaptureState,
    pub buffers: CaptureBuffers,
}

/// Why an iteration ended the loop
enum Halt {
    Cancelled,
    DeviceLost,
    FormatChanged(VideoFormat),
}

/// Capture thread body
///
/// Runs until the token is cancelled, the card disappears or (with auto-detect) the live
/// format changes. Every exit emits one black placeholder frame and hands the buffers back.
pub fn capture_thread(ctx: CaptureContext, mut buffers: CaptureBuffers) -> CaptureExit {
    let props = &ctx.props;
    let (Some(source), Some(pixel_format)) = (props.initial_input_source(), props.pixel_format)
    else {
        warn!("{}: capture started without a resolved selection", ctx.session);
        ctx.token.cancel();
        emit_placeholder(&ctx, &mut buffers, props.video_format);
        return CaptureExit {
            state: CaptureState::Stopped,
            buffers,
        };
    };
    let channel = source.channel();
    let system = channel.audio_system();

    info!(
        "{}: capture thread started on {} ({} / {})",
        ctx.session,
        props.io_select,
        props
            .video_format
            .map_or_else(|| "unknown".to_string(), |vf| vf.to_string()),
        pixel_format
    );

    let halt = match run_loop(&ctx, &mut buffers, source, channel, system, pixel_format) {
        Ok(halt) => halt,
        Err(e) => {
            warn!("{}: capture stopped: {}", ctx.session, e);
            if ctx.card.is_present() {
                Halt::Cancelled
            } else {
                Halt::DeviceLost
            }
        }
    };
    ctx.token.cancel();

    let state = match halt {
        Halt::Cancelled => {
            emit_placeholder(&ctx, &mut buffers, props.video_format);
            CaptureState::Stopped
        }
        Halt::DeviceLost => {
            warn!("{}: device {} lost", ctx.session, props.device_id);
            emit_placeholder(&ctx, &mut buffers, props.video_format);
            let _ = ctx.events.send(SessionEvent::DeviceLost {
                session: ctx.session.clone(),
                device_id: props.device_id.clone(),
            });
            CaptureState::DeviceLost
        }
        Halt::FormatChanged(current) => {
            info!(
                "{}: video format changed to {}, restarting capture",
                ctx.session, current
            );
            emit_placeholder(&ctx, &mut buffers, Some(current));
            let _ = ctx.events.send(SessionEvent::FormatChanged {
                session: ctx.session.clone(),
                previous: props.video_format,
                current,
            });
            CaptureState::FormatChanged
        }
    };

    info!("{}: capture thread stopped ({})", ctx.session, state);
    CaptureExit { state, buffers }
}

fn run_loop(
    ctx: &CaptureContext,
    buffers: &mut CaptureBuffers,
    source: InputSource,
    channel: Channel,
    system: AudioSystem,
    pixel_format: PixelFormat,
) -> Result<Halt> {
    let card = ctx.card.as_ref();
    let props = &ctx.props;

    if let Some(vf) = props.video_format {
        buffers.video.reset(vf, pixel_format);
    }
    buffers.audio.clear();

    let mut offsets = AudioOffsets::new(buffers.audio.capacity());
    offsets.reset(AudioRegisters::read(card, system));

    let mut slots = FrameSlots::new(channel);
    card.wait_for_input_vertical_interrupt(channel);
    card.set_input_frame(channel, slots.flip())?;

    while ctx.token.is_capturing() {
        if !card.is_present() {
            return Ok(Halt::DeviceLost);
        }

        if !card.wait_for_input_vertical_interrupt(channel) {
            if !card.is_present() {
                return Ok(Halt::DeviceLost);
            }
            trace!("{}: vertical interrupt wait timed out", ctx.session);
            continue;
        }

        let live = card
            .input_video_format(source, card.is_3g_level_b(channel))
            .map(|vf| handle_special_case_formats(props.io_select, vf));
        let Some(live) = live else {
            emit_placeholder(ctx, buffers, props.video_format);
            thread::sleep(ctx.timings.no_signal_backoff);
            continue;
        };

        if props.auto_detect && Some(live) != props.video_format {
            return Ok(Halt::FormatChanged(live));
        }

        if buffers.video.is_empty() {
            // configured without a known format: size from what arrives
            buffers.video.reset(live, pixel_format);
        }

        let frame = slots.flip();

        match offsets.advance(card.read_audio_last_in(system)) {
            AudioPoll::Empty => {}
            AudioPoll::Overrun { bytes } => {
                debug!(
                    "{}: {}",
                    ctx.session,
                    AjaError::AudioOverrun {
                        bytes: bytes as usize,
                        capacity: offsets.capacity() as usize,
                    }
                );
                offsets.reset(AudioRegisters::read(card, system));
            }
            AudioPoll::Ready(span) => read_audio(ctx, buffers, system, span)?,
        }

        card.dma_read_frame(frame, buffers.video.as_mut_slice())?;
        if let Some(desc) = buffers.video.desc() {
            ctx.sink.output_video(&VideoFrame {
                data: buffers.video.as_slice(),
                width: desc.width,
                height: desc.height,
                linesize: desc.bytes_per_row,
                format: HostVideoFormat::from(pixel_format),
                timestamp_ns: monotonic_ns(),
                color: ColorParams::bt709_full(),
                kind: FrameKind::Captured,
            });
        }

        card.set_input_frame(channel, frame)?;
    }

    Ok(Halt::Cancelled)
}

/// DMA one span of the ring into the local buffer and hand it to the sink
fn read_audio(
    ctx: &CaptureContext,
    buffers: &mut CaptureBuffers,
    system: AudioSystem,
    span: AudioSpan,
) -> Result<()> {
    buffers.audio.clear();
    for (address, len) in span.transfers() {
        if len == 0 {
            continue;
        }
        let Some(dest) = buffers.audio.reserve(len as usize) else {
            return Err(AjaError::AudioOverrun {
                bytes: span.len() as usize,
                capacity: buffers.audio.capacity(),
            });
        };
        ctx.card.dma_read_audio(system, dest, address)?;
    }

    let data = buffers.audio.filled();
    let format = AudioFormat::EMBEDDED;
    ctx.sink.output_audio(&AudioPacket {
        data,
        frames: format.bytes_to_frames(data.len()),
        format,
        timestamp_ns: monotonic_ns(),
    });
    Ok(())
}

fn emit_placeholder(
    ctx: &CaptureContext,
    buffers: &mut CaptureBuffers,
    video_format: Option<VideoFormat>,
) {
    let placeholder = buffers.pattern.black(video_format, ctx.props.pixel_format);
    ctx.sink.output_video(&VideoFrame {
        data: placeholder.data,
        width: placeholder.desc.width,
        height: placeholder.desc.height,
        linesize: placeholder.desc.bytes_per_row,
        format: HostVideoFormat::from(placeholder.pixel_format),
        timestamp_ns: monotonic_ns(),
        color: ColorParams::bt709_full(),
        kind: FrameKind::Placeholder,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::buffer::AUDIO_BUFFER_SIZE;
    use crate::capture::sink::{ChannelSink, SinkEvent, VideoSummary};
    use crate::device::sim::SimulatedCard;
    use crate::ntv2::IoSelection;
    use crate::routing::{configure_source_route, start_source_audio};
    use crossbeam_channel::Receiver;

    struct Harness {
        card: Arc<SimulatedCard>,
        token: CancelToken,
        frames: Receiver<SinkEvent>,
        events: Receiver<SessionEvent>,
        handle: thread::JoinHandle<CaptureExit>,
    }

    fn props(vf: VideoFormat, auto_detect: bool) -> SourceProps {
        SourceProps {
            device_id: "sim-0".into(),
            io_select: IoSelection::Sdi1,
            video_format: Some(vf),
            pixel_format: Some(PixelFormat::Ycbcr8),
            auto_detect,
            ..Default::default()
        }
    }

    fn spawn(card: Arc<SimulatedCard>, props: SourceProps) -> Harness {
        configure_source_route(&props, &*card).unwrap();
        start_source_audio(&props, &*card).unwrap();

        let (sink, frames) = ChannelSink::unbounded();
        let (tx, events) = crossbeam_channel::unbounded();
        let token = CancelToken::new();
        token.start();
        let ctx = CaptureContext {
            session: "test".into(),
            card: card.clone(),
            props,
            sink: Arc::new(sink),
            token: token.clone(),
            events: tx,
            timings: CaptureTimings {
                no_signal_backoff: Duration::from_millis(2),
            },
        };
        let handle = thread::spawn(move || capture_thread(ctx, CaptureBuffers::new()));
        Harness {
            card,
            token,
            frames,
            events,
            handle,
        }
    }

    fn sim_card() -> Arc<SimulatedCard> {
        let card = SimulatedCard::new("sim-0");
        card.set_frame_period(Duration::from_millis(1));
        card
    }

    fn videos(events: &[SinkEvent]) -> Vec<VideoSummary> {
        events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Video(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_cancel_emits_one_placeholder() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let h = spawn(card, props(VideoFormat::F720p50, true));

        thread::sleep(Duration::from_millis(40));
        h.token.cancel();
        let exit = h.handle.join().unwrap();
        assert_eq!(exit.state, CaptureState::Stopped);
        assert_eq!(exit.buffers.video.len(), 1280 * 2 * 720);

        let events: Vec<SinkEvent> = h.frames.try_iter().collect();
        let videos = videos(&events);
        let placeholders = videos
            .iter()
            .filter(|v| v.kind == FrameKind::Placeholder)
            .count();
        assert_eq!(placeholders, 1);
        assert_eq!(videos.last().map(|v| v.kind), Some(FrameKind::Placeholder));
        assert!(videos.len() > 1);
        assert!(videos.iter().all(|v| v.width == 1280 && v.height == 720));
        assert!(videos
            .windows(2)
            .all(|w| w[0].timestamp_ns <= w[1].timestamp_ns));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_frames_carry_card_data() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F1080i50));
        let h = spawn(card, props(VideoFormat::F1080i50, false));

        thread::sleep(Duration::from_millis(40));
        h.token.cancel();
        h.handle.join().unwrap();

        let captured: Vec<VideoSummary> = videos(&h.frames.try_iter().collect::<Vec<_>>())
            .into_iter()
            .filter(|v| v.kind == FrameKind::Captured)
            .collect();
        assert!(captured.len() > 2);
        assert!(captured.iter().skip(2).any(|v| v.first_byte != Some(0)));
        assert!(captured.iter().all(|v| v.format == HostVideoFormat::Uyvy));
    }

    #[test]
    fn test_no_signal_emits_placeholders() {
        let card = sim_card();
        let h = spawn(card, props(VideoFormat::F720p50, true));

        thread::sleep(Duration::from_millis(30));
        h.token.cancel();
        let exit = h.handle.join().unwrap();
        assert_eq!(exit.state, CaptureState::Stopped);
        assert_eq!(exit.buffers.pattern.generations(), 1);

        let videos = videos(&h.frames.try_iter().collect::<Vec<_>>());
        assert!(videos.len() >= 2);
        assert!(videos.iter().all(|v| v.kind == FrameKind::Placeholder));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_format_change_halts_once() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let h = spawn(card, props(VideoFormat::F720p50, true));

        thread::sleep(Duration::from_millis(20));
        h.card
            .set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F1080p30));
        let exit = h.handle.join().unwrap();
        assert_eq!(exit.state, CaptureState::FormatChanged);
        assert!(!h.token.is_capturing());

        let events: Vec<SessionEvent> = h.events.try_iter().collect();
        assert_eq!(
            events,
            vec![SessionEvent::FormatChanged {
                session: "test".into(),
                previous: Some(VideoFormat::F720p50),
                current: VideoFormat::F1080p30,
            }]
        );

        let videos = videos(&h.frames.try_iter().collect::<Vec<_>>());
        let last = videos.last().unwrap();
        assert_eq!(last.kind, FrameKind::Placeholder);
        assert_eq!((last.width, last.height), (1920, 1080));
        assert!(videos
            .iter()
            .filter(|v| v.kind == FrameKind::Captured)
            .all(|v| v.width == 1280));
    }

    #[test]
    fn test_format_change_ignored_without_auto_detect() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F1080p30));
        let h = spawn(card, props(VideoFormat::F720p50, false));

        thread::sleep(Duration::from_millis(20));
        assert!(h.token.is_capturing());
        h.token.cancel();
        assert_eq!(h.handle.join().unwrap().state, CaptureState::Stopped);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_device_loss() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let h = spawn(card, props(VideoFormat::F720p50, true));

        thread::sleep(Duration::from_millis(10));
        h.card.set_present(false);
        let exit = h.handle.join().unwrap();
        assert_eq!(exit.state, CaptureState::DeviceLost);
        assert_eq!(
            h.events.try_recv().unwrap(),
            SessionEvent::DeviceLost {
                session: "test".into(),
                device_id: "sim-0".into(),
            }
        );
        let videos = videos(&h.frames.try_iter().collect::<Vec<_>>());
        assert_eq!(videos.last().map(|v| v.kind), Some(FrameKind::Placeholder));
    }

    #[test]
    fn test_audio_units() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        card.set_audio_bytes_per_tick(64 * 32);
        let h = spawn(card, props(VideoFormat::F720p50, true));

        thread::sleep(Duration::from_millis(30));
        h.token.cancel();
        h.handle.join().unwrap();

        let mut samples = Vec::new();
        for event in h.frames.try_iter() {
            if let SinkEvent::Audio { data, frames, .. } = event {
                assert_eq!(frames as usize * 32, data.len());
                samples.extend(
                    data.chunks_exact(4)
                        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]])),
                );
            }
        }
        assert!(!samples.is_empty());
        assert!(samples.windows(2).all(|w| w[1] == w[0].wrapping_add(1)));
    }

    #[test]
    fn test_audio_overrun_resets_and_resumes() {
        let card = sim_card();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        card.set_audio_bytes_per_tick(64 * 32);
        let h = spawn(card, props(VideoFormat::F720p50, true));

        thread::sleep(Duration::from_millis(20));
        // more audio lands between two polls than the host buffer holds
        let stall = AUDIO_BUFFER_SIZE as u64 / (64 * 32) + 20;
        h.card.advance_frames(stall);
        thread::sleep(Duration::from_millis(20));
        h.token.cancel();
        h.handle.join().unwrap();

        let mut units: Vec<Vec<u32>> = Vec::new();
        let mut silent_cycles = 0;
        let mut heard = false;
        for event in h.frames.try_iter() {
            match event {
                SinkEvent::Audio { data, .. } => {
                    assert!(data.len() <= AUDIO_BUFFER_SIZE);
                    heard = true;
                    units.push(
                        data.chunks_exact(4)
                            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                            .collect(),
                    );
                }
                SinkEvent::Video(v) if v.kind == FrameKind::Captured => {
                    if !heard && !units.is_empty() {
                        silent_cycles += 1;
                    }
                    heard = false;
                }
                SinkEvent::Video(_) => {}
            }
        }
        assert!(silent_cycles >= 1, "overrun cycle still delivered audio");

        let dropped = (AUDIO_BUFFER_SIZE / 4) as u32;
        let reset_at = units
            .windows(2)
            .rposition(|w| w[1][0].wrapping_sub(w[0][w[0].len() - 1]) > dropped)
            .expect("stalled audio was not skipped")
            + 1;
        let resumed = &units[reset_at..];
        assert!(!resumed.is_empty());
        let words: Vec<u32> = resumed.iter().flatten().copied().collect();
        assert!(words.windows(2).all(|w| w[1] == w[0].wrapping_add(1)));
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_capturing());
        let shared = token.clone();
        token.start();
        assert!(shared.is_capturing());
        shared.cancel();
        assert!(!token.is_capturing());
    }
}
