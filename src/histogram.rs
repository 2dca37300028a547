use rayon::prelude::*;

/// Sample counts below this are binned on the calling thread.
const PARALLEL_THRESHOLD: usize = 30_000;

/// Fixed-resolution empirical distribution of a per-sample scalar.
///
/// Each bucket holds the fraction of samples that fell into it, so the
/// buckets of a histogram built from in-range data sum to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min_value: f64,
    pub max_value: f64,
    pub buckets: Vec<f64>,
}

impl Histogram {
    /// Wrap an existing bucket array with its value domain.
    pub fn from_buckets(min_value: f64, max_value: f64, buckets: Vec<f64>) -> Self {
        Self {
            min_value,
            max_value,
            buckets,
        }
    }

    /// Bin `sample_count` values produced by `sample(i)`.
    ///
    /// Bucket index is `floor((v - min) * (precision - 1) / (max - min))`;
    /// samples whose index falls outside the bucket array (and non-finite
    /// samples) are dropped. When the domain is a single point, only samples
    /// equal to it are kept, in bucket 0.
    pub fn build<F>(
        min_value: f64,
        max_value: f64,
        precision: usize,
        sample_count: usize,
        sample: F,
    ) -> Self
    where
        F: Fn(usize) -> f64 + Sync,
    {
        let mut histogram = Self::from_buckets(min_value, max_value, vec![0.0; precision]);
        if sample_count == 0 || precision == 0 {
            return histogram;
        }

        let counts = if sample_count >= PARALLEL_THRESHOLD {
            (0..sample_count)
                .into_par_iter()
                .fold(
                    || vec![0u64; precision],
                    |mut counts, i| {
                        if let Some(index) = histogram.bucket_index(sample(i)) {
                            counts[index] += 1;
                        }
                        counts
                    },
                )
                .reduce(
                    || vec![0u64; precision],
                    |mut a, b| {
                        for (x, y) in a.iter_mut().zip(b) {
                            *x += y;
                        }
                        a
                    },
                )
        } else {
            let mut counts = vec![0u64; precision];
            for i in 0..sample_count {
                if let Some(index) = histogram.bucket_index(sample(i)) {
                    counts[index] += 1;
                }
            }
            counts
        };

        let step = 1.0 / sample_count as f64;
        for (bucket, count) in histogram.buckets.iter_mut().zip(counts) {
            *bucket = count as f64 * step;
        }
        histogram
    }

    /// Bucket that `value` falls into, if any.
    pub fn bucket_index(&self, value: f64) -> Option<usize> {
        let n = self.buckets.len();
        let span = self.max_value - self.min_value;
        if span <= 0.0 {
            return (value == self.min_value && n > 0).then_some(0);
        }
        let position = ((value - self.min_value) * (n as f64 - 1.0) / span).floor();
        if position >= 0.0 && position < n as f64 {
            Some(position as usize)
        } else {
            None
        }
    }

    /// Domain value represented by bucket `index`.
    pub fn value_at(&self, index: usize) -> f64 {
        let n = self.buckets.len();
        if n < 2 {
            return self.min_value;
        }
        self.min_value + (self.max_value - self.min_value) * index as f64 / (n as f64 - 1.0)
    }

    /// Total mass over all buckets.
    pub fn mass(&self) -> f64 {
        self.buckets.iter().sum()
    }

    /// Value of the first bucket whose mass strictly exceeds `threshold`,
    /// or the domain minimum when none does.
    pub fn low_value(&self, threshold: f64) -> f64 {
        self.buckets
            .iter()
            .position(|&v| v > threshold)
            .map_or(self.min_value, |i| self.value_at(i))
    }

    /// Value of the last bucket whose mass strictly exceeds `threshold`,
    /// or the domain minimum when none does.
    pub fn high_value(&self, threshold: f64) -> f64 {
        self.buckets
            .iter()
            .rposition(|&v| v > threshold)
            .map_or(self.min_value, |i| self.value_at(i))
    }

    /// Value of the first bucket at which the cumulative mass exceeds
    /// `threshold`. Falls back to the domain midpoint when the threshold is
    /// never exceeded (threshold at or above the total mass).
    pub fn median_value(&self, threshold: f64) -> f64 {
        match cumulative_index(&self.buckets, threshold) {
            Some(i) => self.value_at(i),
            None => {
                log::warn!(
                    "cumulative mass {:.4} never exceeds {threshold:.4}, using domain midpoint",
                    self.mass()
                );
                0.5 * (self.min_value + self.max_value)
            }
        }
    }
}

/// First bucket at which the running sum of `buckets` exceeds `threshold`.
pub fn cumulative_index(buckets: &[f64], threshold: f64) -> Option<usize> {
    let mut sum = 0.0;
    buckets.iter().position(|&v| {
        sum += v;
        sum > threshold
    })
}

/// Unit-domain median of a raw bucket array, midpoint when the threshold is
/// never reached.
pub fn normalized_median(buckets: &[f64], threshold: f64) -> f64 {
    match cumulative_index(buckets, threshold) {
        Some(_) if buckets.len() < 2 => 0.0,
        Some(i) => i as f64 / (buckets.len() - 1) as f64,
        None => 0.5,
    }
}
