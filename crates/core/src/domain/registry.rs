//! Source registry
//!
//! Ordered, in-memory collection of the currently known audio sources. The
//! registry only stores and looks up records; the exclusive-output rule is
//! enforced by the routing resolver, never here.

use crate::domain::source::{AudioOutput, AudioSource, SourceId, SourceUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, trace, warn};

/// Ids that appeared or disappeared during [`SourceRegistry::replace_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshDiff {
    pub added: Vec<SourceId>,
    pub removed: Vec<SourceId>,
}

/// Ordered collection of audio sources keyed by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceRegistry {
    sources: Vec<AudioSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list, dropping duplicate ids
    pub fn from_sources(sources: Vec<AudioSource>) -> Self {
        let mut registry = Self::new();
        registry.replace_all(sources);
        registry
    }

    pub fn get(&self, id: &SourceId) -> Option<&AudioSource> {
        self.sources.iter().find(|s| &s.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &SourceId) -> Option<&mut AudioSource> {
        self.sources.iter_mut().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.get(id).is_some()
    }

    /// First playing source on `output` other than `excluding`
    pub fn find_by_output(&self, output: AudioOutput, excluding: &SourceId) -> Option<&AudioSource> {
        self.sources
            .iter()
            .find(|s| s.output == output && s.is_playing && &s.id != excluding)
    }

    /// Every playing source on `output` other than `excluding`
    pub fn playing_on(&self, output: AudioOutput, excluding: &SourceId) -> Vec<&AudioSource> {
        self.sources
            .iter()
            .filter(|s| s.output == output && s.is_playing && &s.id != excluding)
            .collect()
    }

    /// Apply a partial update. Unknown ids are a silent no-op.
    pub fn update(&mut self, id: &SourceId, update: SourceUpdate) -> Option<&AudioSource> {
        match self.get_mut(id) {
            Some(source) => {
                update.apply(source);
                trace!(id = %id, "Source updated");
                Some(&*source)
            }
            None => {
                debug!(id = %id, "Update for unknown source ignored");
                None
            }
        }
    }

    /// Replace the whole contents, keeping the first record of any duplicated id
    pub fn replace_all(&mut self, sources: Vec<AudioSource>) -> RefreshDiff {
        let previous: HashSet<SourceId> = self.sources.iter().map(|s| s.id.clone()).collect();

        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(sources.len());
        for source in sources {
            if seen.insert(source.id.clone()) {
                next.push(source);
            } else {
                warn!(id = %source.id, "Dropping duplicate source id from refresh");
            }
        }

        let added = next
            .iter()
            .filter(|s| !previous.contains(&s.id))
            .map(|s| s.id.clone())
            .collect();
        let removed = self
            .sources
            .iter()
            .filter(|s| !seen.contains(&s.id))
            .map(|s| s.id.clone())
            .collect();

        self.sources = next;
        debug!(count = self.sources.len(), "Registry replaced");

        RefreshDiff { added, removed }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioSource> {
        self.sources.iter()
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Copy of the current records, in registry order
    pub fn snapshot(&self) -> Vec<AudioSource> {
        self.sources.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::Volume;

    fn registry() -> SourceRegistry {
        SourceRegistry::from_sources(vec![
            AudioSource::new("1", "YouTube Music", AudioOutput::Speakers).playing(),
            AudioSource::new("2", "Chrome Browser", AudioOutput::Headphones),
            AudioSource::new("3", "Netflix", AudioOutput::Bluetooth).playing(),
        ])
    }

    #[test]
    fn test_get_and_order() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(&"2".into()).unwrap().name, "Chrome Browser");
        assert!(registry.get(&"42".into()).is_none());

        let names: Vec<_> = registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["YouTube Music", "Chrome Browser", "Netflix"]);
    }

    #[test]
    fn test_find_by_output_skips_excluded_and_paused() {
        let registry = registry();

        let holder = registry.find_by_output(AudioOutput::Speakers, &"2".into());
        assert_eq!(holder.map(|s| s.id.as_str()), Some("1"));

        assert!(registry.find_by_output(AudioOutput::Speakers, &"1".into()).is_none());
        // Chrome is on headphones but paused
        assert!(registry.find_by_output(AudioOutput::Headphones, &"1".into()).is_none());
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let mut registry = registry();
        let before = registry.snapshot();

        assert!(registry.update(&"missing".into(), SourceUpdate::volume(0.1)).is_none());
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn test_update_clamps_volume() {
        let mut registry = registry();
        let updated = registry.update(&"2".into(), SourceUpdate::volume(7.0)).unwrap();
        assert_eq!(updated.volume, Volume::FULL);
    }

    #[test]
    fn test_replace_all_reports_diff() {
        let mut registry = registry();

        let diff = registry.replace_all(vec![
            AudioSource::new("1", "YouTube Music", AudioOutput::Speakers),
            AudioSource::new("4", "Podcasts", AudioOutput::Headphones),
            AudioSource::new("4", "Podcasts (dup)", AudioOutput::Bluetooth),
        ]);

        assert_eq!(diff.added, vec![SourceId::new("4")]);
        assert_eq!(diff.removed, vec![SourceId::new("2"), SourceId::new("3")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&"4".into()).unwrap().name, "Podcasts");
    }
}
