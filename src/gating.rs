//! Retains completed block loudness values and computes the gated
//! integrated loudness and loudness range from them (§4.5).
//!
//! Two independent accumulators exist per engine — one fed 400 ms block
//! records (read by integrated loudness), one fed 3 s short-term records
//! (read by loudness range) — and each can be backed by either storage
//! strategy selected by the `HISTOGRAM` mode bit: a growable, exact list,
//! or a fixed-size histogram that trades precision for bounded memory.

use crate::error::{Error, Result};

/// Absolute gate (§4.5): blocks quieter than this are silence and never
/// participate in either gated computation.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Integrated loudness's relative gate offset below the pre-gated mean.
const INTEGRATED_RELATIVE_OFFSET: f64 = 10.0;
/// Loudness range's relative gate offset below the pre-gated mean.
const LRA_RELATIVE_OFFSET: f64 = 20.0;

/// Histogram bin width in LU.
const HIST_BIN_WIDTH: f64 = 0.1;
/// Histogram lower bound in LUFS (inclusive).
const HIST_LOW: f64 = -70.0;
/// Number of histogram bins covering `[-70.0, 5.0)` at 0.1 LU each.
const HIST_BINS: usize = 750;

#[inline]
pub(crate) fn energy_of(loudness_lufs: f64) -> f64 {
    10f64.powf((loudness_lufs + 0.691) / 10.0)
}

#[inline]
pub(crate) fn loudness_of(energy: f64) -> f64 {
    if energy > 0.0 {
        -0.691 + 10.0 * energy.log10()
    } else {
        f64::MIN
    }
}

fn hist_bin_index(loudness: f64) -> usize {
    let idx = ((loudness - HIST_LOW) / HIST_BIN_WIDTH).floor();
    if idx < 0.0 {
        0
    } else if idx >= HIST_BINS as f64 {
        HIST_BINS - 1
    } else {
        idx as usize
    }
}

fn hist_bin_center(idx: usize) -> f64 {
    HIST_LOW + (idx as f64 + 0.5) * HIST_BIN_WIDTH
}

/// Storage strategy for one stream of block records.
#[derive(Debug, Clone)]
enum Store {
    /// Append-only ordered list of recorded loudness values.
    Precise(Vec<f64>),
    /// Fixed-size count per 0.1 LU bin over `[-70.0, 5.0)`.
    Histogram(Box<[u64; HIST_BINS]>),
}

impl Store {
    fn new(histogram: bool) -> Self {
        if histogram {
            Store::Histogram(Box::new([0u64; HIST_BINS]))
        } else {
            Store::Precise(Vec::new())
        }
    }

    fn record(&mut self, loudness: f64) -> Result<()> {
        match self {
            Store::Precise(v) => {
                v.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
                v.push(loudness);
                Ok(())
            }
            Store::Histogram(bins) => {
                bins[hist_bin_index(loudness)] += 1;
                Ok(())
            }
        }
    }

    /// `(loudness, count)` pairs, skipping empty histogram bins.
    fn entries(&self) -> Entries<'_> {
        match self {
            Store::Precise(v) => Entries::Precise(v.iter()),
            Store::Histogram(bins) => Entries::Histogram(bins.iter().enumerate()),
        }
    }

    /// Bin width if this store quantizes (used to pick the LRA percentile
    /// algorithm), `None` for exact storage.
    fn bin_width(&self) -> Option<f64> {
        match self {
            Store::Precise(_) => None,
            Store::Histogram(_) => Some(HIST_BIN_WIDTH),
        }
    }
}

enum Entries<'a> {
    Precise(std::slice::Iter<'a, f64>),
    Histogram(std::iter::Enumerate<std::slice::Iter<'a, u64>>),
}

impl Iterator for Entries<'_> {
    type Item = (f64, u64);

    fn next(&mut self) -> Option<(f64, u64)> {
        match self {
            Entries::Precise(it) => it.next().map(|&l| (l, 1)),
            Entries::Histogram(it) => loop {
                let (idx, &count) = it.next()?;
                if count > 0 {
                    return Some((hist_bin_center(idx), count));
                }
            },
        }
    }
}

/// Retains 400 ms block records and 3 s short-term records for an engine
/// instance, and answers integrated-loudness / LRA queries from them.
#[derive(Debug, Clone)]
pub struct GatingAccumulator {
    blocks: Store,
    short_terms: Store,
}

impl GatingAccumulator {
    /// Builds an empty accumulator using precise or histogram storage per
    /// `histogram`.
    pub fn new(histogram: bool) -> Self {
        Self {
            blocks: Store::new(histogram),
            short_terms: Store::new(histogram),
        }
    }

    /// Records one completed 400 ms block's loudness.
    pub fn record_block(&mut self, loudness: f64) -> Result<()> {
        self.blocks.record(loudness)
    }

    /// Records one completed 3 s short-term window's loudness.
    pub fn record_short_term(&mut self, loudness: f64) -> Result<()> {
        self.short_terms.record(loudness)
    }

    /// Gated integrated loudness over this accumulator's block records
    /// alone (§4.5).
    pub fn integrated_loudness(&self) -> f64 {
        integrated_loudness_over(std::iter::once(&self.blocks))
    }

    /// Loudness range over this accumulator's short-term records alone
    /// (§4.5).
    pub fn loudness_range(&self) -> Result<f64> {
        loudness_range_over(std::iter::once(&self.short_terms))
    }

    /// Merges block records from every given accumulator and computes
    /// integrated loudness over the union, as if they were one programme
    /// (§4.5 multi-instance aggregation).
    pub fn merged_integrated_loudness<'a, I>(accumulators: I) -> f64
    where
        I: IntoIterator<Item = &'a GatingAccumulator>,
    {
        integrated_loudness_over(accumulators.into_iter().map(|a| &a.blocks))
    }

    /// Merges short-term records from every given accumulator and computes
    /// loudness range over the union (§4.5 multi-instance aggregation).
    pub fn merged_loudness_range<'a, I>(accumulators: I) -> Result<f64>
    where
        I: IntoIterator<Item = &'a GatingAccumulator>,
    {
        loudness_range_over(accumulators.into_iter().map(|a| &a.short_terms))
    }

    /// The integrated-loudness relative gate `Γ_r` this accumulator's block
    /// records currently imply, or `f64::MIN` if no block has passed the
    /// absolute gate yet. Read-only; exposed for hosts that want to surface
    /// the programme's current gating threshold (supplements §4.5, which
    /// only uses this value internally).
    pub fn relative_threshold(&self) -> f64 {
        let records: Vec<(f64, u64)> = self.blocks.entries().collect();
        let (sum1, cnt1) = gate_sum(&records, ABSOLUTE_GATE_LUFS);
        if cnt1 == 0 {
            return f64::MIN;
        }
        loudness_of(sum1 / cnt1 as f64) - INTEGRATED_RELATIVE_OFFSET
    }
}

fn integrated_loudness_over<'a, I>(stores: I) -> f64
where
    I: Iterator<Item = &'a Store>,
{
    let records: Vec<(f64, u64)> = stores.flat_map(|s| s.entries()).collect();

    let (sum1, cnt1) = gate_sum(&records, ABSOLUTE_GATE_LUFS);
    if cnt1 == 0 {
        return f64::MIN;
    }
    let mean1 = sum1 / cnt1 as f64;
    let relative_gate = loudness_of(mean1) - INTEGRATED_RELATIVE_OFFSET;
    let threshold = relative_gate.max(ABSOLUTE_GATE_LUFS);

    let (sum2, cnt2) = gate_sum(&records, threshold);
    if cnt2 == 0 {
        return f64::MIN;
    }
    loudness_of(sum2 / cnt2 as f64)
}

fn gate_sum(records: &[(f64, u64)], threshold: f64) -> (f64, u64) {
    records
        .iter()
        .filter(|&&(l, _)| l >= threshold)
        .fold((0.0, 0u64), |(s, c), &(l, n)| {
            (s + energy_of(l) * n as f64, c + n)
        })
}

fn loudness_range_over<'a, I>(stores: I) -> Result<f64>
where
    I: Iterator<Item = &'a Store>,
{
    let mut records: Vec<(f64, u64)> = Vec::new();
    let mut bin_width: Option<f64> = None;
    for s in stores {
        records.extend(s.entries());
        bin_width = bin_width.or(s.bin_width());
    }

    let (sum1, cnt1) = gate_sum(&records, ABSOLUTE_GATE_LUFS);
    if cnt1 == 0 {
        return Ok(0.0);
    }
    let mean1 = sum1 / cnt1 as f64;
    let relative_gate = loudness_of(mean1) - LRA_RELATIVE_OFFSET;

    // The sort buffer is reserved up front for its worst case (every record
    // passing the gate) so the fallible allocation happens once, before any
    // filtering runs, rather than through repeated incidental growth.
    let mut gated: Vec<(f64, u64)> = Vec::new();
    gated
        .try_reserve_exact(records.len())
        .map_err(|_| Error::OutOfMemory)?;
    gated.extend(
        records
            .into_iter()
            .filter(|&(l, _)| l >= ABSOLUTE_GATE_LUFS && l >= relative_gate),
    );
    gated.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let total: u64 = gated.iter().map(|&(_, n)| n).sum();
    if total < 2 {
        return Ok(0.0);
    }

    let p10 = weighted_percentile(&gated, total, 10.0, bin_width);
    let p95 = weighted_percentile(&gated, total, 95.0, bin_width);
    Ok((p95 - p10).max(0.0))
}

/// `sorted` must be sorted ascending by loudness and sum of counts must
/// equal `total`. `bin_width` selects the algorithm: `None` linearly
/// interpolates between order statistics (precise mode); `Some(width)`
/// walks cumulative counts and reports the lower edge of the bin the
/// target rank falls in (histogram mode — §4.5: "bin-edge approximation").
fn weighted_percentile(sorted: &[(f64, u64)], total: u64, p: f64, bin_width: Option<f64>) -> f64 {
    match bin_width {
        None => {
            let rank = p / 100.0 * (total - 1) as f64;
            let lo_idx = rank.floor() as u64;
            let hi_idx = rank.ceil() as u64;
            let frac = rank - lo_idx as f64;
            let lo = value_at_rank(sorted, lo_idx);
            let hi = value_at_rank(sorted, hi_idx);
            lo + (hi - lo) * frac
        }
        Some(width) => {
            let target = ((p / 100.0 * total as f64).ceil() as u64).max(1);
            let mut cum = 0u64;
            for &(v, c) in sorted {
                cum += c;
                if cum >= target {
                    return v - width / 2.0;
                }
            }
            sorted.last().map(|&(v, _)| v - width / 2.0).unwrap_or(0.0)
        }
    }
}

fn value_at_rank(sorted: &[(f64, u64)], rank: u64) -> f64 {
    let mut cum = 0u64;
    for &(v, c) in sorted {
        if rank < cum + c {
            return v;
        }
        cum += c;
    }
    sorted.last().map(|&(v, _)| v).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_integrated_is_negative_infinity_sentinel() {
        let acc = GatingAccumulator::new(false);
        assert_eq!(acc.integrated_loudness(), f64::MIN);
    }

    #[test]
    fn empty_lra_is_zero() {
        let acc = GatingAccumulator::new(false);
        assert_eq!(acc.loudness_range().unwrap(), 0.0);
    }

    #[test]
    fn constant_loudness_integrates_to_itself() {
        let mut acc = GatingAccumulator::new(false);
        for _ in 0..50 {
            acc.record_block(-23.0).unwrap();
        }
        assert!((acc.integrated_loudness() - (-23.0)).abs() < 1e-9);
    }

    #[test]
    fn silence_gated_out() {
        let mut acc = GatingAccumulator::new(false);
        for _ in 0..300 {
            acc.record_block(-20.0).unwrap();
        }
        for _ in 0..300 {
            acc.record_block(-80.0).unwrap();
        }
        assert!((acc.integrated_loudness() - (-20.0)).abs() < 0.1);
    }

    #[test]
    fn lra_zero_for_single_value() {
        let mut acc = GatingAccumulator::new(false);
        for _ in 0..10 {
            acc.record_short_term(-23.0).unwrap();
        }
        assert_eq!(acc.loudness_range().unwrap(), 0.0);
    }

    #[test]
    fn lra_detects_spread() {
        let mut acc = GatingAccumulator::new(false);
        for _ in 0..100 {
            acc.record_short_term(-26.0).unwrap();
        }
        for _ in 0..100 {
            acc.record_short_term(-20.0).unwrap();
        }
        let lra = acc.loudness_range().unwrap();
        assert!(lra > 4.0 && lra < 8.0, "lra={lra}");
    }

    #[test]
    fn histogram_matches_precise_within_tolerance() {
        let mut precise = GatingAccumulator::new(false);
        let mut hist = GatingAccumulator::new(true);
        for i in 0..600 {
            let l = -30.0 + (i % 20) as f64 * 0.5;
            precise.record_block(l).unwrap();
            hist.record_block(l).unwrap();
        }
        let diff = (precise.integrated_loudness() - hist.integrated_loudness()).abs();
        assert!(diff < 0.1, "diff={diff}");
    }

    #[test]
    fn merge_across_accumulators_matches_single() {
        let mut combined = GatingAccumulator::new(false);
        let mut a = GatingAccumulator::new(false);
        let mut b = GatingAccumulator::new(false);
        for i in 0..200 {
            let l = -25.0 + (i % 10) as f64 * 0.2;
            combined.record_block(l).unwrap();
            if i < 100 {
                a.record_block(l).unwrap();
            } else {
                b.record_block(l).unwrap();
            }
        }
        let merged = GatingAccumulator::merged_integrated_loudness([&a, &b]);
        let single = combined.integrated_loudness();
        assert!((merged - single).abs() < 1e-9);
    }
}
