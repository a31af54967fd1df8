/// Read-time configuration

/// What to do when a directory sector fails verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Abort the catalog read
    Fatal,
    /// Record a catalog problem and keep going
    #[default]
    Advisory,
}

/// Pulse length thresholds for the Commodore tape loader
///
/// Values are in TAP pulse units (8 C64 clock cycles). A pulse shorter
/// than `short_max` is short, shorter than `medium_max` is medium and
/// shorter than `long_max` is long; anything longer breaks the byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapTiming {
    /// Upper bound (exclusive) of a short pulse
    pub short_max: u32,
    /// Upper bound (exclusive) of a medium pulse
    pub medium_max: u32,
    /// Upper bound (exclusive) of a long pulse
    pub long_max: u32,
}

impl Default for TapTiming {
    fn default() -> Self {
        Self {
            short_max: 0x3A,
            medium_max: 0x4C,
            long_max: 0x70,
        }
    }
}

/// Options controlling how an image is read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Upper bound on directory sectors followed in a chain
    pub max_chain_sectors: usize,
    /// Directory verification policy
    pub checksum_policy: ChecksumPolicy,
    /// Tape pulse thresholds
    pub tap_timing: TapTiming,
    /// Decode every body during `read`
    pub eager_bodies: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            // Track 18 holds at most 19 sectors
            max_chain_sectors: 19,
            checksum_policy: ChecksumPolicy::Advisory,
            tap_timing: TapTiming::default(),
            eager_bodies: false,
        }
    }
}

impl ReadOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory chain cap
    pub fn with_max_chain_sectors(mut self, max: usize) -> Self {
        self.max_chain_sectors = max;
        self
    }

    /// Set the directory verification policy
    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    /// Set the tape pulse thresholds
    pub fn with_tap_timing(mut self, timing: TapTiming) -> Self {
        self.tap_timing = timing;
        self
    }

    /// Decode every body at load time
    pub fn with_eager_bodies(mut self, eager: bool) -> Self {
        self.eager_bodies = eager;
        self
    }
}
