/// Bounded per-address debounce cache.
///
/// Remembers when each address last raised an alert and when it was last
/// heard at all. A repeat sighting inside the window is suppressed and does
/// not move the alert time, so a device seen continuously alerts once per
/// window. When the cache is full the entry with the oldest `last_seen`
/// (any sighting, suppressed or not) is replaced, so a device that is still
/// around outlives one that went quiet.
use heapless::Vec;

/// Maximum tracked addresses
pub const DEBOUNCE_CAPACITY: usize = 50;

/// Suppression window (ms)
pub const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceEntry {
    pub mac: [u8; 6],
    /// Time of the last allowed alert; the window runs from here
    pub last_alert: u64,
    /// Time of the most recent sighting; the eviction key
    pub last_seen: u64,
    /// Sightings (allowed or suppressed) since the entry was created
    pub hit_count: u32,
}

pub struct DebounceCache<const N: usize> {
    entries: Vec<DebounceEntry, N>,
    window_ms: u64,
}

impl<const N: usize> DebounceCache<N> {
    pub const fn new(window_ms: u64) -> Self {
        Self {
            entries: Vec::new(),
            window_ms,
        }
    }

    /// Record a sighting and decide whether it may raise an alert.
    pub fn should_alert(&mut self, mac: &[u8; 6], now: u64) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.mac == mac) {
            entry.hit_count = entry.hit_count.saturating_add(1);
            entry.last_seen = entry.last_seen.max(now);
            if now.saturating_sub(entry.last_alert) < self.window_ms {
                return false;
            }
            entry.last_alert = now;
            return true;
        }

        let entry = DebounceEntry {
            mac: *mac,
            last_alert: now,
            last_seen: now,
            hit_count: 1,
        };
        if let Err(entry) = self.entries.push(entry) {
            if let Some(oldest) = self.entries.iter_mut().min_by_key(|e| e.last_seen) {
                *oldest = entry;
            }
        }
        true
    }

    pub fn get(&self, mac: &[u8; 6]) -> Option<&DebounceEntry> {
        self.entries.iter().find(|e| &e.mac == mac)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn window(&self) -> u64 {
        self.window_ms
    }

    pub fn set_window(&mut self, window_ms: u64) {
        self.window_ms = window_ms;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> [u8; 6] {
        [0x02, 0, 0, 0, 0, n]
    }

    #[test]
    fn suppresses_inside_window() {
        let mut cache = DebounceCache::<DEBOUNCE_CAPACITY>::new(DEFAULT_DEBOUNCE_WINDOW_MS);
        let a = mac(1);
        assert!(cache.should_alert(&a, 0));
        assert!(!cache.should_alert(&a, 10_000));
        assert!(cache.should_alert(&a, 31_000));
        assert_eq!(cache.get(&a).unwrap().hit_count, 3);
        assert_eq!(cache.get(&a).unwrap().last_alert, 31_000);
        assert_eq!(cache.get(&a).unwrap().last_seen, 31_000);
    }

    #[test]
    fn suppressed_sighting_does_not_extend_window() {
        let mut cache = DebounceCache::<4>::new(30_000);
        let a = mac(1);
        assert!(cache.should_alert(&a, 0));
        assert!(!cache.should_alert(&a, 29_999));
        assert_eq!(cache.get(&a).unwrap().last_alert, 0);
        assert_eq!(cache.get(&a).unwrap().last_seen, 29_999);
        assert!(cache.should_alert(&a, 30_000));
    }

    #[test]
    fn addresses_are_independent() {
        let mut cache = DebounceCache::<4>::new(30_000);
        assert!(cache.should_alert(&mac(1), 0));
        assert!(cache.should_alert(&mac(2), 100));
        assert!(!cache.should_alert(&mac(1), 200));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let mut cache = DebounceCache::<DEBOUNCE_CAPACITY>::new(DEFAULT_DEBOUNCE_WINDOW_MS);
        for i in 0..50u8 {
            assert!(cache.should_alert(&mac(i), 1_000 + i as u64));
        }
        assert_eq!(cache.len(), 50);

        assert!(cache.should_alert(&mac(200), 2_000));
        assert_eq!(cache.len(), 50);
        assert!(cache.get(&mac(0)).is_none());
        assert!(cache.get(&mac(1)).is_some());
        assert!(cache.get(&mac(200)).is_some());

        // The evicted address is new again
        assert!(cache.should_alert(&mac(0), 2_001));
        assert!(cache.get(&mac(1)).is_none());
    }

    #[test]
    fn realerted_address_survives_eviction() {
        let mut cache = DebounceCache::<3>::new(50);
        assert!(cache.should_alert(&mac(0), 0));
        assert!(cache.should_alert(&mac(1), 1));
        assert!(cache.should_alert(&mac(2), 2));
        // Window has passed: mac 0 alerts again and becomes the newest
        assert!(cache.should_alert(&mac(0), 100));

        assert!(cache.should_alert(&mac(3), 101));
        assert!(cache.get(&mac(0)).is_some());
        assert!(cache.get(&mac(1)).is_none());
        assert!(cache.get(&mac(2)).is_some());
        assert!(cache.get(&mac(3)).is_some());
    }

    #[test]
    fn suppressed_sighting_protects_from_eviction() {
        let mut cache = DebounceCache::<3>::new(30_000);
        assert!(cache.should_alert(&mac(0), 0));
        assert!(cache.should_alert(&mac(1), 1_000));
        assert!(cache.should_alert(&mac(2), 2_000));
        // mac 0 is still in range; suppressed, but heard most recently
        assert!(!cache.should_alert(&mac(0), 5_000));

        assert!(cache.should_alert(&mac(3), 6_000));
        assert!(cache.get(&mac(1)).is_none());
        // mac 0 kept, and its window still runs from the alert at 0
        assert!(!cache.should_alert(&mac(0), 29_999));
        assert!(cache.should_alert(&mac(0), 30_000));
    }

    #[test]
    fn clear_and_window() {
        let mut cache = DebounceCache::<4>::new(1_000);
        assert_eq!(cache.capacity(), 4);
        assert!(cache.should_alert(&mac(1), 0));
        cache.set_window(5_000);
        assert!(!cache.should_alert(&mac(1), 2_000));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.should_alert(&mac(1), 2_500));
    }
}
