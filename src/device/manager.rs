//! Card enumeration and per-card shared state

use super::{Card, CaptureFilter, ChannelLeases, DeviceInfo};
use crate::error::{AjaError, Result};
use crate::ntv2::{Channel, IoSelection, VideoFormat};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of card handles, e.g. the driver or a simulator
pub trait CardProbe: Send + Sync {
    /// Open every card currently attached
    fn probe(&self) -> Result<Vec<Arc<dyn Card>>>;
}

/// One physical card with its channel lease table
///
/// Shared through `Arc` by every session capturing from the card.
pub struct CardEntry {
    card: Arc<dyn Card>,
    leases: ChannelLeases,
}

impl CardEntry {
    pub fn new(card: Arc<dyn Card>) -> Self {
        Self {
            card,
            leases: ChannelLeases::new(),
        }
    }

    pub fn card(&self) -> Arc<dyn Card> {
        Arc::clone(&self.card)
    }

    pub fn info(&self) -> &DeviceInfo {
        self.card.info()
    }

    pub fn card_id(&self) -> &str {
        &self.card.info().card_id
    }

    /// Lease the channels of `selection` to `owner`
    ///
    /// `device_id` must name this card; a session holding a stale ID cannot lease here.
    pub fn acquire(&self, selection: IoSelection, device_id: &str, owner: &str) -> bool {
        if device_id != self.card_id() {
            warn!("Lease for {} requested with foreign device ID {}", self.card_id(), device_id);
            return false;
        }
        self.leases.acquire(selection, self.info(), owner)
    }

    pub fn release(&self, selection: IoSelection, device_id: &str, owner: &str) -> bool {
        if device_id != self.card_id() {
            warn!("Release on {} requested with foreign device ID {}", self.card_id(), device_id);
            return false;
        }
        self.leases.release(selection, owner)
    }

    /// Move `owner` from `old` to `new` without a window where either is half held
    pub fn swap(&self, old: IoSelection, new: IoSelection, owner: &str) -> Result<()> {
        if self.leases.swap(old, new, self.info(), owner) {
            return Ok(());
        }
        match self.leases.conflicting_owner(new, owner) {
            Some(holder) => Err(AjaError::ChannelConflict {
                selection: new,
                owner: holder,
            }),
            None => Err(AjaError::UnsupportedSelection {
                selection: new,
                device_id: self.card_id().to_string(),
            }),
        }
    }

    pub fn channel_ready(&self, channel: Channel, owner: &str) -> bool {
        self.leases.channel_ready(channel, owner)
    }

    pub fn rename_owner(&self, old: &str, new: &str) -> bool {
        self.leases.rename_owner(old, new)
    }

    pub fn owner_of(&self, channel: Channel) -> Option<String> {
        self.leases.owner_of(channel)
    }

    /// Input selections `owner` could switch to right now
    pub fn available_selections(&self, owner: &str) -> Vec<IoSelection> {
        let info = self.info();
        IoSelection::ALL
            .iter()
            .copied()
            .filter(|sel| {
                sel.input_sources().iter().all(|src| info.has_input(*src))
                    && sel.channels().iter().all(|ch| info.has_channel(*ch))
                    && sel.channels().iter().all(|ch| self.channel_ready(*ch, owner))
            })
            .collect()
    }

    /// Video formats `owner` may configure
    ///
    /// Channel 1 drives the card's free-run clock. While another client holds it, only
    /// formats of the same frame-rate family are offered.
    pub fn compatible_formats(&self, owner: &str) -> Vec<VideoFormat> {
        let clock_format = if self.channel_ready(Channel::Ch1, owner) {
            None
        } else {
            self.card.video_format(Channel::Ch1)
        };
        let supports_4k = self.info().num_channels >= 4;

        VideoFormat::ALL
            .iter()
            .copied()
            .filter(|vf| supports_4k || !vf.is_4k())
            .filter(|vf| {
                clock_format.map_or(true, |clock| {
                    vf.frame_rate().family() == clock.frame_rate().family()
                })
            })
            .collect()
    }
}

impl fmt::Debug for CardEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardEntry")
            .field("info", self.info())
            .field("leases", &self.leases)
            .finish()
    }
}

/// Arena of attached cards keyed by card ID
pub struct CardManager {
    probe: Box<dyn CardProbe>,
    entries: Mutex<BTreeMap<String, Arc<CardEntry>>>,
}

impl CardManager {
    pub fn new(probe: impl CardProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Re-probe attached cards
    ///
    /// Entries of cards still present are kept so their leases survive; cards that
    /// disappeared are dropped.
    pub fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let cards = self.probe.probe()?;
        debug!("Probe found {} cards", cards.len());

        let mut entries = self.entries.lock();
        let mut fresh = BTreeMap::new();
        for card in cards {
            let id = card.info().card_id.clone();
            let entry = match entries.remove(&id) {
                Some(existing) => existing,
                None => {
                    info!("Card attached: {}", card.info());
                    Arc::new(CardEntry::new(card))
                }
            };
            fresh.insert(id, entry);
        }
        for id in entries.keys() {
            info!("Card detached: {}", id);
        }
        *entries = fresh;

        Ok(entries.values().map(|e| e.info().clone()).collect())
    }

    /// Cards usable for capture, output-only models excluded
    pub fn capture_devices(&self) -> Vec<DeviceInfo> {
        self.entries
            .lock()
            .values()
            .map(|e| e.info().clone())
            .filter(CaptureFilter::is_capture_device)
            .collect()
    }

    pub fn card_entry(&self, card_id: &str) -> Option<Arc<CardEntry>> {
        self.entries.lock().get(card_id).cloned()
    }

    /// Find a card by exact ID, or a capture card by model/ID fragment
    ///
    /// An exact ID also finds output-only cards.
    pub fn find(&self, pattern: &str) -> Result<Arc<CardEntry>> {
        if let Some(entry) = self.card_entry(pattern) {
            return Ok(entry);
        }
        self.entries
            .lock()
            .values()
            .find(|e| {
                CaptureFilter::is_capture_device(e.info())
                    && CaptureFilter::matches(e.info(), pattern)
            })
            .cloned()
            .ok_or_else(|| AjaError::DeviceNotFound(pattern.to_string()))
    }

    pub fn num_entries(&self) -> usize {
        self.entries.lock().len()
    }
}
