use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::DecodeError, id::ProviderId};

/// The most recent timestamp a given provider is known to have advanced to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClockItem {
    pub provider_id: ProviderId,
    pub timestamp: DateTime<Utc>,
}

impl VectorClockItem {
    pub fn new(provider_id: ProviderId, timestamp: DateTime<Utc>) -> Self { Self { provider_id, timestamp } }

    /// The zero-value item used for providers a clock has never seen.
    pub fn epoch(provider_id: ProviderId) -> Self { Self { provider_id, timestamp: DateTime::<Utc>::UNIX_EPOCH } }

    pub fn is_epoch(&self) -> bool { self.timestamp == DateTime::<Utc>::UNIX_EPOCH }
}

impl std::fmt::Display for VectorClockItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}@{}", self.provider_id, self.timestamp.to_rfc3339()) }
}

/// Per-provider high-water-mark timestamps, one entry per provider, kept in
/// insertion order.
///
/// Lookups are total: asking for a provider the clock has never seen yields an
/// epoch item without recording anything. Entries are replaced as values on
/// update rather than mutated in place, so cloned clocks never alias state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VectorClock {
    items: Vec<VectorClockItem>,
}

// Hand-rolled so deserialization goes through `from_items` and cannot smuggle
// in duplicate provider entries.
impl<'de> Deserialize<'de> for VectorClock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            items: Vec<VectorClockItem>,
        }

        let raw = Raw::deserialize(deserializer)?;
        VectorClock::from_items(raw.items).map_err(serde::de::Error::custom)
    }
}

impl VectorClock {
    pub fn new() -> Self { Self::default() }

    /// Build a clock from explicit items. Duplicate provider ids are a decode
    /// failure rather than a silent overwrite.
    pub fn from_items(items: impl IntoIterator<Item = VectorClockItem>) -> Result<Self, DecodeError> {
        let mut clock = Self::new();
        for item in items {
            if clock.items.iter().any(|existing| existing.provider_id == item.provider_id) {
                return Err(DecodeError::DuplicateProvider(item.provider_id));
            }
            clock.items.push(item);
        }
        Ok(clock)
    }

    /// Initialize a clock with explicit epoch entries for the given providers.
    pub fn create_empty<I>(provider_ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ProviderId>,
    {
        let mut clock = Self::new();
        for provider_id in provider_ids {
            let provider_id = provider_id.into();
            if !clock.items.iter().any(|existing| existing.provider_id == provider_id) {
                clock.items.push(VectorClockItem::epoch(provider_id));
            }
        }
        clock
    }

    /// Total lookup: the entry for `provider_id`, or an epoch item if the clock
    /// has no entry for it.
    pub fn get_item(&self, provider_id: &ProviderId) -> VectorClockItem {
        match self.items.iter().find(|item| &item.provider_id == provider_id) {
            Some(item) => item.clone(),
            None => VectorClockItem::epoch(provider_id.clone()),
        }
    }

    /// Advance the entry for `provider_id`, but only if `timestamp` is strictly
    /// greater than the current one. Returns the entry after the update.
    pub fn update(&mut self, provider_id: &ProviderId, timestamp: DateTime<Utc>) -> VectorClockItem {
        match self.items.iter_mut().find(|item| &item.provider_id == provider_id) {
            Some(item) => {
                if item.timestamp < timestamp {
                    *item = VectorClockItem::new(provider_id.clone(), timestamp);
                }
                item.clone()
            }
            None => {
                let item = if timestamp > DateTime::<Utc>::UNIX_EPOCH {
                    VectorClockItem::new(provider_id.clone(), timestamp)
                } else {
                    VectorClockItem::epoch(provider_id.clone())
                };
                self.items.push(item.clone());
                item
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VectorClockItem> { self.items.iter() }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

impl<'a> IntoIterator for &'a VectorClock {
    type Item = &'a VectorClockItem;
    type IntoIter = std::slice::Iter<'a, VectorClockItem>;

    fn into_iter(self) -> Self::IntoIter { self.items.iter() }
}

/// Two clocks are equal when every provider present in either carries the same
/// timestamp in both; providers absent from one side count as epoch.
impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        for item in &self.items {
            if other.get_item(&item.provider_id).timestamp != item.timestamp {
                return false;
            }
        }
        for item in &other.items {
            if self.get_item(&item.provider_id).timestamp != item.timestamp {
                return false;
            }
        }
        true
    }
}

impl Eq for VectorClock {}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let items: Vec<_> = self.items.iter().map(|item| item.to_string()).collect();
        write!(f, "[{}]", items.join(", "))
    }
}
