/// Configuration shared by every channel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Segment size as power of 2 (default: 15 = 32K slots)
    pub segment_bits: u8,
    /// Segments linked into every new ring up front (default: 1)
    pub initial_segments: usize,
    /// Granularity of the producer registry table (default: 32)
    pub registry_quantum: usize,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Largest accepted `segment_bits`.
    pub const MAX_SEGMENT_BITS: u8 = 30;

    /// Creates a new configuration with custom settings.
    ///
    /// Out-of-range values are clamped: `segment_bits` to
    /// [`MAX_SEGMENT_BITS`](Self::MAX_SEGMENT_BITS), `initial_segments` and
    /// `registry_quantum` to at least one.
    pub const fn new(
        segment_bits: u8,
        initial_segments: usize,
        registry_quantum: usize,
        enable_metrics: bool,
    ) -> Self {
        Self {
            segment_bits: if segment_bits > Self::MAX_SEGMENT_BITS {
                Self::MAX_SEGMENT_BITS
            } else {
                segment_bits
            },
            initial_segments: if initial_segments == 0 { 1 } else { initial_segments },
            registry_quantum: if registry_quantum == 0 { 1 } else { registry_quantum },
            enable_metrics,
        }
    }

    /// Default configuration with the segment capacity rounded up to the next
    /// power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::default().segment_capacity(capacity)
    }

    /// Returns the number of slots in one segment.
    #[inline]
    pub const fn capacity(&self) -> usize {
        1 << self.segment_bits
    }

    /// Sets the segment capacity, rounded up to a power of two.
    pub fn segment_capacity(mut self, capacity: usize) -> Self {
        let bits = capacity.max(1).next_power_of_two().trailing_zeros() as u8;
        self.segment_bits = bits.min(Self::MAX_SEGMENT_BITS);
        self
    }

    /// Sets how many segments a fresh ring starts with.
    pub fn initial_segments(mut self, segments: usize) -> Self {
        self.initial_segments = segments.max(1);
        self
    }

    /// Sets the registry table quantum.
    pub fn registry_quantum(mut self, quantum: usize) -> Self {
        self.registry_quantum = quantum.max(1);
        self
    }

    /// Turns metrics collection on or off.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_bits: 15, // 32K slots
            initial_segments: 1,
            registry_quantum: 32,
            enable_metrics: false,
        }
    }
}

/// Low latency configuration (4K-slot segments, fits in L1 cache)
pub const LOW_LATENCY_CONFIG: Config = Config::new(12, 1, 32, false);

/// High throughput configuration (64K-slot segments, 4 pre-linked per ring)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(16, 4, 32, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_capacity_rounds_up() {
        assert_eq!(Config::with_capacity(4).capacity(), 4);
        assert_eq!(Config::with_capacity(5).capacity(), 8);
        assert_eq!(Config::with_capacity(0).capacity(), 1);
        assert_eq!(Config::with_capacity(1000).capacity(), 1024);
    }

    #[test]
    fn test_const_new_clamps() {
        let config = Config::new(64, 0, 0, true);
        assert_eq!(config.segment_bits, Config::MAX_SEGMENT_BITS);
        assert_eq!(config.initial_segments, 1);
        assert_eq!(config.registry_quantum, 1);
        assert!(config.enable_metrics);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LOW_LATENCY_CONFIG.capacity(), 4096);
        assert_eq!(HIGH_THROUGHPUT_CONFIG.capacity(), 65536);
        assert_eq!(HIGH_THROUGHPUT_CONFIG.initial_segments, 4);
        assert_eq!(Config::default().capacity(), 32 * 1024);
    }
}
