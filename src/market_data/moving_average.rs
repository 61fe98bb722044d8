// =============================================================================
// Moving Average — 15-minute volume-weighted rolling window
// =============================================================================
//
// A circular buffer of per-minute volume and weighted-price sums.  Each roll
// overwrites the oldest slot and adjusts the running totals by the evicted
// and inserted values, so the window costs O(1) per minute and never
// re-sums its slots.
// =============================================================================

/// Number of one-minute slots in the rolling window.
pub const WINDOW_MINUTES: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageWindow {
    volumes: [f64; WINDOW_MINUTES],
    weighted_prices: [f64; WINDOW_MINUTES],
    total_volume: f64,
    total_weighted_price: f64,
    /// Slots holding non-zero volume.
    occupied: usize,
    oldest: usize,
}

impl Default for MovingAverageWindow {
    fn default() -> Self {
        Self {
            volumes: [0.0; WINDOW_MINUTES],
            weighted_prices: [0.0; WINDOW_MINUTES],
            total_volume: 0.0,
            total_weighted_price: 0.0,
            occupied: 0,
            oldest: 0,
        }
    }
}

impl MovingAverageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the oldest minute with the one that just closed.
    pub fn roll(&mut self, volume: f64, weighted_price: f64) {
        let slot = self.oldest;
        if self.volumes[slot] != 0.0 {
            self.occupied -= 1;
        }
        if volume != 0.0 {
            self.occupied += 1;
        }

        self.total_volume = self.total_volume - self.volumes[slot] + volume;
        self.volumes[slot] = volume;

        self.total_weighted_price =
            self.total_weighted_price - self.weighted_prices[slot] + weighted_price;
        self.weighted_prices[slot] = weighted_price;

        // Subtraction leaves rounding residue once every minute with volume
        // has been evicted; the average must fall back exactly then.  The
        // weighted total is left alone: zero-volume quotes still carry mass.
        if self.occupied == 0 {
            self.total_volume = 0.0;
        }

        self.oldest = (slot + 1) % WINDOW_MINUTES;
    }

    /// Volume-weighted average over the window, or `fallback` when the window
    /// holds no volume at all.
    pub fn average_or(&self, fallback: f64) -> f64 {
        if self.total_volume == 0.0 {
            fallback
        } else {
            self.total_weighted_price / self.total_volume
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    pub fn total_weighted_price(&self) -> f64 {
        self.total_weighted_price
    }

    /// Index of the slot the next roll will overwrite.
    pub fn oldest_index(&self) -> usize {
        self.oldest
    }

    pub fn volumes(&self) -> &[f64; WINDOW_MINUTES] {
        &self.volumes
    }

    pub fn weighted_prices(&self) -> &[f64; WINDOW_MINUTES] {
        &self.weighted_prices
    }
}
