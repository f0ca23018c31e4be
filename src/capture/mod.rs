//! Capture pipeline: format detection, per-session state and the capture thread

mod buffer;
mod clock;
mod offsets;
mod pattern;
mod props;
mod session;
mod sink;
mod wire;
mod worker;

pub use buffer::{AudioBuffer, CaptureBuffers, FrameSlots, VideoBuffer, AUDIO_BUFFER_SIZE};
pub use clock::monotonic_ns;
pub use offsets::{AudioOffsets, AudioPoll, AudioRegisters, AudioSpan};
pub use pattern::{black_raster, Placeholder, TestPatternCache};
pub use props::{guess_transport, handle_special_case_formats, SourceProps};
pub use session::{CaptureSession, SessionPhase};
pub use sink::{
    AudioFormat, AudioPacket, ChannelSink, ColorParams, FrameKind, FrameSink, HostVideoFormat,
    SinkEvent, VideoFrame, VideoSummary,
};
pub use wire::{resolve_wire_formats, WireFormats};
pub use worker::{
    capture_thread, CancelToken, CaptureContext, CaptureExit, CaptureState, CaptureTimings,
    SessionEvent,
};
