//! Per-device channel ownership table

use super::DeviceInfo;
use crate::ntv2::{Channel, IoSelection};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Which client holds which channel of one card
///
/// Every operation runs under a single lock, so a check-then-modify sequence is never
/// interleaved with another client's acquire or release.
#[derive(Debug, Default)]
pub struct ChannelLeases {
    owners: Mutex<BTreeMap<Channel, String>>,
}

impl ChannelLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease every channel of `selection` to `owner`, or none of them
    ///
    /// Re-acquiring channels already held by `owner` succeeds without change.
    pub fn acquire(&self, selection: IoSelection, device: &DeviceInfo, owner: &str) -> bool {
        let channels = selection.channels();
        if !Self::usable(&channels, device) {
            debug!("{} is not available on {}", selection, device.card_id);
            return false;
        }

        let mut owners = self.owners.lock();
        if let Some((channel, holder)) = Self::first_conflict(&owners, &channels, owner) {
            debug!(
                "{} busy: {} is held by '{}' (wanted by '{}')",
                selection, channel, holder, owner
            );
            return false;
        }

        for channel in channels {
            owners.insert(channel, owner.to_string());
        }
        debug!("'{}' acquired {}", owner, selection);
        true
    }

    /// Release every channel of `selection` held by `owner`
    ///
    /// Fails with no change if any channel of the selection is not held by `owner`.
    pub fn release(&self, selection: IoSelection, owner: &str) -> bool {
        let channels = selection.channels();
        if channels.is_empty() {
            return false;
        }

        let mut owners = self.owners.lock();
        let all_owned = channels
            .iter()
            .all(|ch| owners.get(ch).is_some_and(|holder| holder == owner));
        if !all_owned {
            warn!("'{}' tried to release {} without owning it", owner, selection);
            return false;
        }

        for channel in &channels {
            owners.remove(channel);
        }
        debug!("'{}' released {}", owner, selection);
        true
    }

    /// Move `owner` from `old` to `new` in one step
    ///
    /// Channels only in `old` are freed, channels in `new` are taken. On conflict nothing
    /// changes and `owner` still holds `old`.
    pub fn swap(
        &self,
        old: IoSelection,
        new: IoSelection,
        device: &DeviceInfo,
        owner: &str,
    ) -> bool {
        let wanted = new.channels();
        if !Self::usable(&wanted, device) {
            debug!("{} is not available on {}", new, device.card_id);
            return false;
        }

        let mut owners = self.owners.lock();
        if let Some((channel, holder)) = Self::first_conflict(&owners, &wanted, owner) {
            debug!(
                "{} busy: {} is held by '{}' (wanted by '{}')",
                new, channel, holder, owner
            );
            return false;
        }

        for channel in old.channels().difference(&wanted) {
            if owners.get(channel).is_some_and(|holder| holder == owner) {
                owners.remove(channel);
            }
        }
        for channel in wanted {
            owners.insert(channel, owner.to_string());
        }
        debug!("'{}' moved from {} to {}", owner, old, new);
        true
    }

    /// Channel is free or already held by `owner`
    pub fn channel_ready(&self, channel: Channel, owner: &str) -> bool {
        self.owners
            .lock()
            .get(&channel)
            .map_or(true, |holder| holder == owner)
    }

    /// Transfer every channel held by `old` to `new`
    ///
    /// Returns false when `old` holds nothing.
    pub fn rename_owner(&self, old: &str, new: &str) -> bool {
        let mut owners = self.owners.lock();
        let mut renamed = false;
        for holder in owners.values_mut().filter(|holder| holder.as_str() == old) {
            *holder = new.to_string();
            renamed = true;
        }
        if renamed {
            debug!("Channel owner '{}' renamed to '{}'", old, new);
        }
        renamed
    }

    pub fn owner_of(&self, channel: Channel) -> Option<String> {
        self.owners.lock().get(&channel).cloned()
    }

    /// First client other than `owner` holding a channel of `selection`
    pub fn conflicting_owner(&self, selection: IoSelection, owner: &str) -> Option<String> {
        let owners = self.owners.lock();
        Self::first_conflict(&owners, &selection.channels(), owner)
            .map(|(_, holder)| holder.to_string())
    }

    /// Channels currently held by `owner`
    pub fn held_by(&self, owner: &str) -> Vec<Channel> {
        self.owners
            .lock()
            .iter()
            .filter(|(_, holder)| holder.as_str() == owner)
            .map(|(channel, _)| *channel)
            .collect()
    }

    fn usable(channels: &BTreeSet<Channel>, device: &DeviceInfo) -> bool {
        !channels.is_empty() && channels.iter().all(|ch| device.has_channel(*ch))
    }

    fn first_conflict<'a>(
        owners: &'a BTreeMap<Channel, String>,
        channels: &BTreeSet<Channel>,
        owner: &str,
    ) -> Option<(Channel, &'a str)> {
        channels.iter().find_map(|ch| {
            owners
                .get(ch)
                .filter(|holder| holder.as_str() != owner)
                .map(|holder| (*ch, holder.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(num_channels: u8) -> DeviceInfo {
        DeviceInfo {
            card_id: "test-card".into(),
            model: "Test".into(),
            num_channels,
            num_sdi_inputs: num_channels,
            num_hdmi_inputs: 1,
            hdmi_version: 2,
            bidirectional_sdi: true,
            output_only: false,
        }
    }

    #[test]
    fn test_mutual_exclusion() {
        let leases = ChannelLeases::new();
        let dev = device(4);

        assert!(leases.acquire(IoSelection::Sdi1, &dev, "A"));
        assert!(!leases.acquire(IoSelection::Sdi1_2, &dev, "B"));
        // all-or-nothing: Ch2 stays free after the failed attempt
        assert_eq!(leases.owner_of(Channel::Ch2), None);
        assert!(leases.acquire(IoSelection::Sdi2, &dev, "B"));
        assert_eq!(leases.owner_of(Channel::Ch1).as_deref(), Some("A"));
        assert_eq!(leases.owner_of(Channel::Ch2).as_deref(), Some("B"));
    }

    #[test]
    fn test_reacquire_is_idempotent() {
        let leases = ChannelLeases::new();
        let dev = device(4);

        assert!(leases.acquire(IoSelection::Sdi1_2, &dev, "A"));
        assert!(leases.acquire(IoSelection::Sdi1_2, &dev, "A"));
        assert_eq!(leases.held_by("A"), vec![Channel::Ch1, Channel::Ch2]);
    }

    #[test]
    fn test_non_owner_release_fails() {
        let leases = ChannelLeases::new();
        let dev = device(4);

        assert!(leases.acquire(IoSelection::Sdi3, &dev, "A"));
        assert!(!leases.release(IoSelection::Sdi3, "B"));
        assert_eq!(leases.owner_of(Channel::Ch3).as_deref(), Some("A"));

        // partially owned selection is not released either
        assert!(!leases.release(IoSelection::Sdi3_4, "A"));
        assert_eq!(leases.owner_of(Channel::Ch3).as_deref(), Some("A"));

        assert!(leases.release(IoSelection::Sdi3, "A"));
        assert_eq!(leases.owner_of(Channel::Ch3), None);
    }

    #[test]
    fn test_unavailable_channels() {
        let leases = ChannelLeases::new();
        let dev = device(2);

        assert!(!leases.acquire(IoSelection::Sdi3, &dev, "A"));
        assert!(!leases.acquire(IoSelection::Invalid, &dev, "A"));
        assert!(leases.held_by("A").is_empty());
    }

    #[test]
    fn test_channel_ready_and_rename() {
        let leases = ChannelLeases::new();
        let dev = device(4);

        assert!(leases.channel_ready(Channel::Ch1, "A"));
        assert!(leases.acquire(IoSelection::Sdi1, &dev, "A"));
        assert!(leases.channel_ready(Channel::Ch1, "A"));
        assert!(!leases.channel_ready(Channel::Ch1, "B"));

        assert!(leases.rename_owner("A", "A2"));
        assert!(!leases.rename_owner("A", "A3"));
        assert!(leases.channel_ready(Channel::Ch1, "A2"));
        assert_eq!(leases.conflicting_owner(IoSelection::Sdi1_2, "B").as_deref(), Some("A2"));
    }

    #[test]
    fn test_swap_selection() {
        let leases = ChannelLeases::new();
        let dev = device(4);

        assert!(leases.acquire(IoSelection::Sdi1_2, &dev, "A"));
        assert!(leases.acquire(IoSelection::Sdi4, &dev, "B"));

        // Sdi3_4 collides with B; A keeps its old selection
        assert!(!leases.swap(IoSelection::Sdi1_2, IoSelection::Sdi3_4, &dev, "A"));
        assert_eq!(leases.held_by("A"), vec![Channel::Ch1, Channel::Ch2]);

        assert!(leases.swap(IoSelection::Sdi1_2, IoSelection::Sdi2, &dev, "A"));
        assert_eq!(leases.held_by("A"), vec![Channel::Ch2]);
        assert_eq!(leases.owner_of(Channel::Ch1), None);
    }
}
