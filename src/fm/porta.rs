
//! Portamento (pitch glide)
//!
//! A linear glide in Q24 log-frequency space (one octave = `1 << 24`,
//! matching `dx7note::osc_freq`), stepping by a fixed amount each block. The
//! step size comes from a 128-entry rate table so that the raw 0-99
//! portamento-time parameter produces the same musically-useful curve of
//! glide speeds the original hardware does: fast at low settings, slow and
//! smooth at high ones.

use super::constants::N;

const RATE_TABLE_SIZE: usize = 128;

fn build_rate_table() -> [i32; RATE_TABLE_SIZE] {
    let mut rates = [0i32; RATE_TABLE_SIZE];
    let step = (1i64 << 24) / 12; // Q24 per semitone
    for (i, slot) in rates.iter_mut().enumerate() {
        let sps = 350.0 * 2.0_f64.powf(-0.062 * i as f64); // semitones/second
        let spf = sps / 44_100.0; // semitones/frame, placeholder sample rate
        let spp = spf * N as f64; // semitones/block
        *slot = (step as f64 * spp).round() as i32;
    }
    rates
}

/// Portamento glide processor, one per voice.
#[derive(Clone, Debug)]
pub struct Porta {
    rates: [i32; RATE_TABLE_SIZE],
    sample_rate: f64,
    current: i32,
    target: i32,
    enabled: bool,
    rate_index: usize,
    /// Glissando: snap the glide to the nearest semitone rather than
    /// sweeping continuously.
    glissando: bool,
}

/// Round a Q24 log-frequency to the nearest semitone (`logfreq_round2semi`
/// in the reference implementation).
fn logfreq_round2semi(logfreq: i32) -> i32 {
    let step = (1i64 << 24) / 12;
    ((logfreq as i64 + step / 2).div_euclid(step) * step) as i32
}

impl Default for Porta {
    fn default() -> Self {
        Self::new(44_100.0)
    }
}

impl Porta {
    /// Create a new portamento processor for a given sample rate.
    pub fn new(sample_rate: f64) -> Self {
        let mut p = Self {
            rates: [0; RATE_TABLE_SIZE],
            sample_rate,
            current: 0,
            target: 0,
            enabled: false,
            rate_index: 63,
            glissando: false,
        };
        p.set_sample_rate(sample_rate);
        p
    }

    /// Rebuild the rate table for a new sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let step = (1i64 << 24) / 12;
        for (i, slot) in self.rates.iter_mut().enumerate() {
            let sps = 350.0 * 2.0_f64.powf(-0.062 * i as f64);
            let spf = sps / sample_rate;
            let spp = spf * N as f64;
            *slot = (step as f64 * spp).round() as i32;
        }
    }

    /// Set the 0-99 portamento time parameter (higher = slower glide).
    pub fn set_rate(&mut self, rate: u8) {
        self.rate_index = (rate as usize).min(RATE_TABLE_SIZE - 1);
    }

    /// Enable or disable portamento.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Enable or disable glissando (snap-to-semitone glide steps).
    pub fn set_glissando(&mut self, glissando: bool) {
        self.glissando = glissando;
    }

    /// Set the glide target, in Q24 log-frequency. If portamento is
    /// disabled, snaps immediately.
    pub fn set_target(&mut self, logfreq: i32) {
        if !self.enabled {
            self.current = logfreq;
        }
        self.target = logfreq;
    }

    /// Advance one block and return the current glide position in Q24
    /// log-frequency.
    pub fn get_pitch(&mut self) -> i32 {
        if !self.enabled {
            return self.target;
        }

        let diff = self.target - self.current;
        if diff == 0 {
            return self.current;
        }

        let step = self.rates[self.rate_index].max(1);
        if diff.unsigned_abs() <= step as u32 {
            self.current = self.target;
        } else if diff > 0 {
            self.current += step;
        } else {
            self.current -= step;
        }

        if self.glissando {
            logfreq_round2semi(self.current)
        } else {
            self.current
        }
    }

    /// Reset the glide position immediately to `logfreq`.
    pub fn reset(&mut self, logfreq: i32) {
        self.current = logfreq;
        self.target = logfreq;
    }

    /// Whether the glide is still in progress.
    pub fn is_active(&self) -> bool {
        self.enabled && self.current != self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_porta_disabled_snaps_immediately() {
        let mut porta = Porta::new(44_100.0);
        porta.set_enabled(false);
        porta.set_target(1 << 24);
        assert_eq!(porta.get_pitch(), 1 << 24);
        assert!(!porta.is_active());
    }

    #[test]
    fn test_porta_enabled_glides_monotonically() {
        let mut porta = Porta::new(44_100.0);
        porta.set_enabled(true);
        porta.set_rate(64);
        porta.reset(0);
        porta.set_target(1 << 24);

        let first = porta.get_pitch();
        assert!(first > 0 && first < (1 << 24));
        let second = porta.get_pitch();
        assert!(second > first && second <= (1 << 24));
    }

    #[test]
    fn test_porta_eventually_reaches_target() {
        let mut porta = Porta::new(44_100.0);
        porta.set_enabled(true);
        porta.set_rate(30);
        porta.reset(0);
        porta.set_target(1 << 22); // quarter octave glide, small enough to converge quickly

        let mut reached = false;
        for _ in 0..10_000 {
            if porta.get_pitch() == (1 << 22) {
                reached = true;
                break;
            }
        }
        assert!(reached);
        assert!(!porta.is_active());
    }

    #[test]
    fn test_porta_faster_rate_index_moves_more_per_block() {
        let mut fast = Porta::new(44_100.0);
        fast.set_enabled(true);
        fast.set_rate(0);
        fast.reset(0);
        fast.set_target(1 << 24);

        let mut slow = Porta::new(44_100.0);
        slow.set_enabled(true);
        slow.set_rate(120);
        slow.reset(0);
        slow.set_target(1 << 24);

        assert!(fast.get_pitch() > slow.get_pitch());
    }

    #[test]
    fn test_porta_glissando_snaps_to_semitone() {
        let mut porta = Porta::new(44_100.0);
        porta.set_enabled(true);
        porta.set_glissando(true);
        porta.set_rate(20);
        porta.reset(0);
        porta.set_target(1 << 24);

        for _ in 0..5 {
            let step = (1i64 << 24) / 12;
            let pitch = porta.get_pitch() as i64;
            assert_eq!(pitch % step, 0);
        }
    }

    #[test]
    fn test_porta_reset_clears_glide() {
        let mut porta = Porta::new(44_100.0);
        porta.set_enabled(true);
        porta.set_rate(64);
        porta.set_target(1 << 24);
        porta.get_pitch();
        porta.reset(0);
        assert!(!porta.is_active());
        assert_eq!(porta.get_pitch(), 0);
    }
}
