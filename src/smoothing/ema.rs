/// Exponential moving average with an optional clamp on observations.
///
/// `value = value * (1 - alpha) + observation * alpha`. Observations that are
/// not finite are dropped and the previous value is kept.
#[derive(Clone, Copy, Debug)]
pub struct Ema {
    value: f32,
    alpha: f32,
    lo: f32,
    hi: f32,
}

impl Ema {
    pub fn new(initial: f32, alpha: f32) -> Self {
        Self {
            value: initial,
            alpha: alpha.clamp(0.0, 1.0),
            lo: f32::NEG_INFINITY,
            hi: f32::INFINITY,
        }
    }

    /// Build from a retention factor (the weight kept on the old value).
    pub fn with_retention(initial: f32, retention: f32) -> Self {
        Self::new(initial, 1.0 - retention.clamp(0.0, 1.0))
    }

    /// Restrict observations (and the initial value) to `[lo, hi]`.
    pub fn bounded(mut self, lo: f32, hi: f32) -> Self {
        self.lo = lo;
        self.hi = hi;
        self.value = self.value.clamp(lo, hi);
        self
    }

    pub fn update(&mut self, observation: f32) -> f32 {
        if observation.is_finite() {
            let obs = observation.clamp(self.lo, self.hi);
            self.value = self.value * (1.0 - self.alpha) + obs * self.alpha;
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// Fixed-width vector of EMAs sharing one coefficient and clamp.
#[derive(Clone, Copy, Debug)]
pub struct EmaArray<const N: usize> {
    values: [f32; N],
    alpha: f32,
    lo: f32,
    hi: f32,
}

impl<const N: usize> EmaArray<N> {
    pub fn new(initial: f32, alpha: f32) -> Self {
        Self {
            values: [initial; N],
            alpha: alpha.clamp(0.0, 1.0),
            lo: f32::NEG_INFINITY,
            hi: f32::INFINITY,
        }
    }

    pub fn with_retention(initial: f32, retention: f32) -> Self {
        Self::new(initial, 1.0 - retention.clamp(0.0, 1.0))
    }

    pub fn bounded(mut self, lo: f32, hi: f32) -> Self {
        self.lo = lo;
        self.hi = hi;
        for v in &mut self.values {
            *v = v.clamp(lo, hi);
        }
        self
    }

    /// Blend a whole observation vector. Missing trailing entries count as 0.
    pub fn update(&mut self, observation: &[f32]) -> &[f32; N] {
        for i in 0..N {
            let obs = observation.get(i).copied().unwrap_or(0.0);
            self.update_at(i, obs);
        }
        &self.values
    }

    /// Blend a single slot, leaving the others untouched.
    pub fn update_at(&mut self, index: usize, observation: f32) -> f32 {
        let Some(slot) = self.values.get_mut(index) else {
            return 0.0;
        };
        if observation.is_finite() {
            let obs = observation.clamp(self.lo, self.hi);
            *slot = *slot * (1.0 - self.alpha) + obs * self.alpha;
        }
        *slot
    }

    pub fn values(&self) -> &[f32; N] {
        &self.values
    }
}
