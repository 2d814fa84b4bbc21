use crate::stats;

/// Fixed-capacity ring. Storage is allocated once; pushing into a full ring
/// overwrites the oldest entry.
#[derive(Clone, Debug)]
pub struct RingBuffer<T = f32> {
    buf: Vec<T>,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![T::default(); capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) {
        let cap = self.buf.len();
        self.buf[self.head] = value;
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    fn slot(&self, i: usize) -> usize {
        let cap = self.buf.len();
        (self.head + cap - self.len + i) % cap
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.buf[self.slot(i)])
    }

    /// The last `n` entries (or fewer), oldest to newest.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = T> + '_ {
        let skip = self.len.saturating_sub(n);
        self.iter().skip(skip)
    }

    /// `back(0)` is the newest entry.
    pub fn back(&self, k: usize) -> Option<T> {
        if k >= self.len {
            return None;
        }
        Some(self.buf[self.slot(self.len - 1 - k)])
    }

    pub fn latest(&self) -> Option<T> {
        self.back(0)
    }

    pub fn recent_vec(&self, n: usize) -> Vec<T> {
        self.recent(n).collect()
    }
}

impl RingBuffer<f32> {
    pub fn mean(&self) -> f32 {
        stats::mean_iter(self.iter())
    }

    pub fn mean_recent(&self, n: usize) -> f32 {
        stats::mean_iter(self.recent(n))
    }

    pub fn variance_recent(&self, n: usize) -> f32 {
        stats::variance(&self.recent_vec(n))
    }
}

/// Ring of fixed-width frames backed by one flat arena.
#[derive(Clone, Debug)]
pub struct FrameRing {
    data: Vec<f32>,
    width: usize,
    capacity: usize,
    head: usize,
    len: usize,
}

impl FrameRing {
    pub fn new(capacity: usize, width: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![0.0; capacity * width],
            width,
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Copy `frame` into the next slot, truncating or zero-filling to `width`.
    pub fn push(&mut self, frame: &[f32]) {
        let start = self.head * self.width;
        let slot = &mut self.data[start..start + self.width];
        let n = frame.len().min(self.width);
        slot[..n].copy_from_slice(&frame[..n]);
        slot[n..].fill(0.0);
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn frame_at(&self, i: usize) -> &[f32] {
        let slot = (self.head + self.capacity - self.len + i) % self.capacity;
        &self.data[slot * self.width..(slot + 1) * self.width]
    }

    /// `back(0)` is the newest frame.
    pub fn back(&self, k: usize) -> Option<&[f32]> {
        if k >= self.len {
            return None;
        }
        Some(self.frame_at(self.len - 1 - k))
    }

    /// The last `n` frames (or fewer), oldest to newest.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &[f32]> + '_ {
        let skip = self.len.saturating_sub(n);
        (skip..self.len).map(move |i| self.frame_at(i))
    }
}
