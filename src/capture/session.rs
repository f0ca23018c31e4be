//! Capture session: one client capturing one input selection of one card

use super::buffer::CaptureBuffers;
use super::props::SourceProps;
use super::sink::FrameSink;
use super::wire::resolve_wire_formats;
use super::worker::{
    capture_thread, CancelToken, CaptureContext, CaptureExit, CaptureState, CaptureTimings,
    SessionEvent,
};
use crate::config::SourceSettings;
use crate::device::{CardEntry, CardManager};
use crate::error::{AjaError, Result};
use crate::ntv2::{IoSelection, Reference, SdiTransport4K};
use crate::routing::{configure_source_route, start_source_audio, stop_source_audio};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Whether the card has been programmed for the current props
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Unconfigured,
    Configured,
}

/// A capture client
///
/// Owns its lease on the card's channels, the route programmed for it and the capture
/// thread. Dropping the session stops capture and releases everything.
pub struct CaptureSession {
    name: String,
    manager: Arc<CardManager>,
    sink: Arc<dyn FrameSink>,
    entry: Option<Arc<CardEntry>>,
    /// Selection whose channels this session holds on `entry`
    leased: IoSelection,
    props: SourceProps,
    settings: Option<SourceSettings>,
    phase: SessionPhase,
    state: CaptureState,
    visible: bool,
    timings: CaptureTimings,
    token: CancelToken,
    handle: Option<JoinHandle<CaptureExit>>,
    buffers: Option<CaptureBuffers>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl CaptureSession {
    pub fn new(name: &str, manager: Arc<CardManager>, sink: Arc<dyn FrameSink>) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            name: name.to_string(),
            manager,
            sink,
            entry: None,
            leased: IoSelection::Invalid,
            props: SourceProps::default(),
            settings: None,
            phase: SessionPhase::Unconfigured,
            state: CaptureState::Idle,
            visible: true,
            timings: CaptureTimings::default(),
            token: CancelToken::new(),
            handle: None,
            buffers: None,
            events_tx,
            events_rx,
        }
    }

    pub fn with_timings(mut self, timings: CaptureTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the client name before anything is leased
    pub fn set_name(&mut self, name: &str) {
        if self.entry.is_some() {
            self.rename(name);
        } else {
            self.name = name.to_string();
        }
    }

    /// Change the client name, moving lease ownership along with it
    pub fn rename(&mut self, name: &str) {
        if name == self.name {
            return;
        }
        if let Some(entry) = &self.entry {
            if entry.rename_owner(&self.name, name) {
                debug!("Leases of '{}' now owned by '{}'", self.name, name);
            }
        }
        info!("Session '{}' renamed to '{}'", self.name, name);
        self.name = name.to_string();
    }

    /// Format changes and device loss reported by the capture thread
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current lifecycle state; picks up a capture thread that ended on its own
    pub fn state(&mut self) -> CaptureState {
        self.reap();
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.token.is_capturing()
    }

    pub fn source_props(&self) -> &SourceProps {
        &self.props
    }

    pub fn set_source_props(&mut self, props: SourceProps) {
        self.props = props;
    }

    /// Size of the host video buffer while no capture thread holds it
    pub fn video_buffer_len(&self) -> Option<usize> {
        self.buffers.as_ref().map(|b| b.video.len())
    }

    /// Apply new settings: lease, probe the wire, route and start capturing
    ///
    /// Lease conflicts leave the session as it was. Probe failures release the selection
    /// and leave the session inactive.
    pub fn update(&mut self, settings: &SourceSettings) -> Result<()> {
        self.reap();
        let previous = self.state;
        self.state = CaptureState::Configuring;
        let result = self.apply(settings);
        match &result {
            Ok(()) => self.settings = Some(settings.clone()),
            Err(e) => {
                warn!("Session '{}' update failed: {}", self.name, e);
                self.state = if self.phase == SessionPhase::Configured {
                    previous
                } else if matches!(e, AjaError::DeviceDisconnected(_)) {
                    CaptureState::DeviceLost
                } else {
                    CaptureState::Idle
                };
            }
        }
        result
    }

    /// Re-run the last successful update, after a format change or device loss
    pub fn reconfigure(&mut self) -> Result<()> {
        match self.settings.clone() {
            Some(settings) => self.update(&settings),
            None => Err(AjaError::NoInputSelected),
        }
    }

    fn apply(&mut self, settings: &SourceSettings) -> Result<()> {
        if settings.device_id.is_empty() {
            return Err(AjaError::InvalidConfig("no device_id set".to_string()));
        }
        let entry = self.card_entry(&settings.device_id)?;

        if let Some(old) = self.entry.clone() {
            if old.card_id() != entry.card_id() {
                info!(
                    "Session '{}' moving from {} to {}",
                    self.name,
                    old.card_id(),
                    entry.card_id()
                );
                self.release_selection();
            }
        }

        let card = entry.card();
        if !card.is_present() {
            return Err(AjaError::DeviceDisconnected(entry.card_id().to_string()));
        }
        if !card.is_open() {
            return Err(AjaError::DeviceNotOpen(entry.card_id().to_string()));
        }

        if settings.input == IoSelection::Invalid {
            return Err(AjaError::NoInputSelected);
        }

        let mut io_select = settings.input;
        if settings.video_format.is_some_and(|vf| vf.is_4k())
            && settings.sdi_4k_transport == SdiTransport4K::Squares
        {
            io_select = io_select.squares_variant().unwrap_or(io_select);
        }

        entry.swap(self.leased, io_select, &self.name)?;
        self.entry = Some(entry.clone());
        self.leased = io_select;

        let wire = match resolve_wire_formats(
            card.as_ref(),
            entry.info(),
            io_select,
            settings.pixel_format,
        ) {
            Ok(wire) => wire,
            Err(e) => {
                self.release_selection();
                return Err(e);
            }
        };

        let video_format = settings.video_format.or(wire.video_format);
        let pixel_format = settings.pixel_format.or(wire.pixel_format);
        if video_format.is_none() || pixel_format.is_none() {
            self.release_selection();
            return Err(AjaError::UnresolvedFormat {
                video: video_format,
                pixel: pixel_format,
            });
        }

        let props = SourceProps {
            device_id: entry.card_id().to_string(),
            io_select,
            video_format,
            pixel_format,
            sdi_transport: settings.sdi_transport,
            sdi_4k_transport: settings.sdi_4k_transport,
            vpids: wire.vpids,
            auto_detect: settings.auto_detect(),
            deactivate_while_not_showing: settings.deactivate_while_not_showing,
        };

        if self.phase != SessionPhase::Configured || props != self.props {
            self.deactivate();
            if self.phase == SessionPhase::Configured
                && self.props.audio_system() != props.audio_system()
            {
                if let Err(e) = stop_source_audio(&self.props, card.as_ref()) {
                    self.release_selection();
                    return Err(e);
                }
            }
            if let Err(e) = configure_source_route(&props, card.as_ref()) {
                self.release_selection();
                return Err(e);
            }
        }

        let started = start_source_audio(&props, card.as_ref())
            .and_then(|()| card.set_reference(Reference::FreeRun));
        if let Err(e) = started {
            if let Err(stop) = stop_source_audio(&props, card.as_ref()) {
                debug!("Stopping audio for '{}': {}", self.name, stop);
            }
            self.release_selection();
            return Err(e);
        }
        self.props = props;
        self.phase = SessionPhase::Configured;

        if self.props.deactivate_while_not_showing && !self.visible {
            self.state = CaptureState::Stopped;
            return Ok(());
        }
        self.activate(true)
    }

    fn card_entry(&self, device_id: &str) -> Result<Arc<CardEntry>> {
        if let Some(entry) = self.manager.card_entry(device_id) {
            return Ok(entry);
        }
        self.manager.enumerate()?;
        self.manager
            .card_entry(device_id)
            .ok_or_else(|| AjaError::DeviceNotFound(device_id.to_string()))
    }

    /// Start (`true`) or stop (`false`) the capture thread
    pub fn activate(&mut self, enable: bool) -> Result<()> {
        if !enable {
            self.deactivate();
            return Ok(());
        }
        if self.is_capturing() {
            return Ok(());
        }
        self.reap();
        if self.phase != SessionPhase::Configured {
            return Err(AjaError::NoInputSelected);
        }
        let Some(entry) = &self.entry else {
            return Err(AjaError::NoInputSelected);
        };

        let ctx = CaptureContext {
            session: self.name.clone(),
            card: entry.card(),
            props: self.props.clone(),
            sink: self.sink.clone(),
            token: self.token.clone(),
            events: self.events_tx.clone(),
            timings: self.timings,
        };
        let buffers = self.buffers.take().unwrap_or_default();

        self.token.start();
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", self.name))
            .spawn(move || capture_thread(ctx, buffers));
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = CaptureState::Running;
                info!("Session '{}' capturing {}", self.name, self.props.io_select);
                Ok(())
            }
            Err(e) => {
                self.token.cancel();
                self.state = CaptureState::Stopped;
                Err(AjaError::ThreadSpawn(e))
            }
        }
    }

    /// Stop capturing and wait for the capture thread to finish
    pub fn deactivate(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            self.join(handle);
            debug!("Session '{}' deactivated", self.name);
        }
    }

    /// Show or hide the source; hidden sources stop capturing when configured to
    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.visible = visible;
        if !self.props.deactivate_while_not_showing || self.phase != SessionPhase::Configured {
            return Ok(());
        }
        self.activate(visible)
    }

    /// Collect a capture thread that has stopped by itself
    ///
    /// The thread clears the capturing flag before its final placeholder, so this may
    /// briefly block until it returns.
    fn reap(&mut self) {
        if self.token.is_capturing() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            self.join(handle);
        }
    }

    fn join(&mut self, handle: JoinHandle<CaptureExit>) {
        match handle.join() {
            Ok(exit) => {
                self.state = exit.state;
                self.buffers = Some(exit.buffers);
            }
            Err(_) => {
                warn!("Capture thread of '{}' panicked", self.name);
                self.state = CaptureState::Stopped;
            }
        }
    }

    /// Stop capture, stop audio and give back the leased channels
    fn release_selection(&mut self) {
        self.deactivate();
        if let Some(entry) = self.entry.take() {
            let card = entry.card();
            if self.phase == SessionPhase::Configured && card.is_present() {
                if let Err(e) = stop_source_audio(&self.props, card.as_ref()) {
                    debug!("Stopping audio for '{}': {}", self.name, e);
                }
            }
            if self.leased != IoSelection::Invalid
                && !entry.release(self.leased, entry.card_id(), &self.name)
            {
                debug!("'{}' held nothing to release on {}", self.name, entry.card_id());
            }
        }
        self.leased = IoSelection::Invalid;
        self.props = SourceProps::default();
        self.phase = SessionPhase::Unconfigured;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_selection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sink::ChannelSink;
    use crate::device::sim::{SimulatedCard, SimulatedProbe};
    use crate::ntv2::{Channel, InputSource, PixelFormat, VideoFormat};
    use std::time::Duration;

    fn setup() -> (Arc<SimulatedCard>, Arc<CardManager>) {
        let card = SimulatedCard::new("sim-0");
        card.set_frame_period(Duration::from_millis(1));
        let probe = SimulatedProbe::new(vec![card.clone()]);
        let manager = Arc::new(CardManager::new(probe));
        manager.enumerate().unwrap();
        (card, manager)
    }

    fn session(name: &str, manager: &Arc<CardManager>) -> CaptureSession {
        let (sink, _rx) = ChannelSink::unbounded();
        CaptureSession::new(name, manager.clone(), Arc::new(sink)).with_timings(CaptureTimings {
            no_signal_backoff: Duration::from_millis(2),
        })
    }

    fn settings(input: IoSelection) -> SourceSettings {
        SourceSettings {
            device_id: "sim-0".into(),
            input,
            ..Default::default()
        }
    }

    #[test]
    fn test_update_starts_capture() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F1080i5994));
        let mut s = session("a", &manager);

        s.update(&settings(IoSelection::Sdi1)).unwrap();
        assert!(s.is_capturing());
        assert_eq!(s.state(), CaptureState::Running);
        assert_eq!(s.phase(), SessionPhase::Configured);
        assert_eq!(s.source_props().video_format, Some(VideoFormat::F1080i5994));
        assert_eq!(s.source_props().pixel_format, Some(PixelFormat::Ycbcr8));
        assert!(s.source_props().auto_detect);
        assert_eq!(card.reference(), Reference::FreeRun);
        assert!(card.is_audio_running(Channel::Ch1.audio_system()));

        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch1).as_deref(), Some("a"));

        s.deactivate();
        assert!(!s.is_capturing());
        assert_eq!(s.state(), CaptureState::Stopped);
    }

    #[test]
    fn test_conflict_leaves_session_unchanged() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        card.set_input_signal(InputSource::Sdi(3), Some(VideoFormat::F720p50));
        let mut a = session("a", &manager);
        let mut b = session("b", &manager);
        a.update(&settings(IoSelection::Sdi1)).unwrap();
        b.update(&settings(IoSelection::Sdi3)).unwrap();

        let err = b.update(&settings(IoSelection::Sdi1_2)).unwrap_err();
        assert!(matches!(err, AjaError::ChannelConflict { ref owner, .. } if owner == "a"));
        assert_eq!(b.source_props().io_select, IoSelection::Sdi3);
        assert!(b.is_capturing());
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch3).as_deref(), Some("b"));
    }

    #[test]
    fn test_no_signal_releases_selection() {
        let (_card, manager) = setup();
        let mut s = session("a", &manager);
        let err = s.update(&settings(IoSelection::Sdi2)).unwrap_err();
        assert!(matches!(err, AjaError::UnresolvedFormat { video: None, .. }));
        assert!(!s.is_capturing());
        assert_eq!(s.phase(), SessionPhase::Unconfigured);
        assert_eq!(s.source_props(), &SourceProps::default());
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch2), None);
    }

    #[test]
    fn test_audio_start_failure_releases_selection() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        card.set_input_signal(InputSource::Sdi(2), Some(VideoFormat::F720p50));
        card.set_audio_busy(true);
        let mut s = session("a", &manager);

        let err = s.update(&settings(IoSelection::Sdi1)).unwrap_err();
        assert!(matches!(err, AjaError::DeviceError { .. }));
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch1), None);
        assert_eq!(s.state(), CaptureState::Idle);
        assert_eq!(s.phase(), SessionPhase::Unconfigured);
        assert_eq!(s.source_props(), &SourceProps::default());
        assert!(!s.is_capturing());

        card.set_audio_busy(false);
        s.update(&settings(IoSelection::Sdi1)).unwrap();
        assert!(s.is_capturing());

        card.set_audio_busy(true);
        assert!(s.update(&settings(IoSelection::Sdi2)).is_err());
        assert_eq!(entry.owner_of(Channel::Ch1), None);
        assert_eq!(entry.owner_of(Channel::Ch2), None);
        assert!(!card.is_audio_running(Channel::Ch1.audio_system()));
        assert_eq!(s.state(), CaptureState::Idle);
        assert!(!s.is_capturing());
    }

    #[test]
    fn test_invalid_selection_and_unknown_device() {
        let (_card, manager) = setup();
        let mut s = session("a", &manager);
        assert!(matches!(
            s.update(&settings(IoSelection::Invalid)),
            Err(AjaError::NoInputSelected)
        ));
        let mut other = settings(IoSelection::Sdi1);
        other.device_id = "sim-9".into();
        assert!(matches!(s.update(&other), Err(AjaError::DeviceNotFound(_))));
        assert_eq!(s.state(), CaptureState::Idle);
    }

    #[test]
    fn test_absent_card() {
        let (card, manager) = setup();
        card.set_present(false);
        let mut s = session("a", &manager);
        assert!(matches!(
            s.update(&settings(IoSelection::Sdi1)),
            Err(AjaError::DeviceDisconnected(_))
        ));
        assert_eq!(s.state(), CaptureState::DeviceLost);
    }

    #[test]
    fn test_rename_moves_leases() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let mut s = session("a", &manager);
        s.update(&settings(IoSelection::Sdi1)).unwrap();
        s.rename("renamed");
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch1).as_deref(), Some("renamed"));
        assert_eq!(s.name(), "renamed");
    }

    #[test]
    fn test_set_name_before_and_after_lease() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let mut s = session("a", &manager);
        s.set_name("b");
        s.update(&settings(IoSelection::Sdi1)).unwrap();
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch1).as_deref(), Some("b"));

        s.set_name("c");
        assert_eq!(entry.owner_of(Channel::Ch1).as_deref(), Some("c"));
    }

    #[test]
    fn test_set_source_props() {
        let (_card, manager) = setup();
        let mut s = session("a", &manager);
        let props = SourceProps {
            device_id: "sim-0".into(),
            io_select: IoSelection::Hdmi1,
            pixel_format: Some(PixelFormat::Bgr24),
            ..Default::default()
        };
        s.set_source_props(props.clone());
        assert_eq!(s.source_props(), &props);
        assert_eq!(s.phase(), SessionPhase::Unconfigured);
    }

    #[test]
    fn test_visibility_policy() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let mut s = session("a", &manager);
        let mut cfg = settings(IoSelection::Sdi1);
        cfg.deactivate_while_not_showing = true;
        s.update(&cfg).unwrap();
        assert!(s.is_capturing());

        s.set_visible(false).unwrap();
        assert!(!s.is_capturing());
        s.set_visible(true).unwrap();
        assert!(s.is_capturing());
    }

    #[test]
    fn test_hidden_stays_captured_without_policy() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F720p50));
        let mut s = session("a", &manager);
        s.update(&settings(IoSelection::Sdi1)).unwrap();
        s.set_visible(false).unwrap();
        assert!(s.is_capturing());
    }

    #[test]
    fn test_squares_remap() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(1), Some(VideoFormat::F2160p30));
        let mut s = session("a", &manager);
        let mut cfg = settings(IoSelection::Sdi1_2);
        cfg.video_format = Some(VideoFormat::F2160p30);
        cfg.pixel_format = Some(PixelFormat::Ycbcr8);
        cfg.sdi_4k_transport = SdiTransport4K::Squares;
        s.update(&cfg).unwrap();
        assert_eq!(s.source_props().io_select, IoSelection::Sdi1_2_Squares);
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch4).as_deref(), Some("a"));
    }

    #[test]
    fn test_drop_releases_everything() {
        let (card, manager) = setup();
        card.set_input_signal(InputSource::Sdi(2), Some(VideoFormat::F720p50));
        {
            let mut s = session("a", &manager);
            s.update(&settings(IoSelection::Sdi2)).unwrap();
        }
        let entry = manager.card_entry("sim-0").unwrap();
        assert_eq!(entry.owner_of(Channel::Ch2), None);
        assert!(!card.is_audio_running(Channel::Ch2.audio_system()));
    }

    #[test]
    fn test_reconfigure_without_settings() {
        let (_card, manager) = setup();
        let mut s = session("a", &manager);
        assert!(matches!(s.reconfigure(), Err(AjaError::NoInputSelected)));
    }
}
