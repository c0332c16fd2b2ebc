use ndarray::{s, Array2, ArrayView2};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::float_trait::Bm3dFloat;

/// A candidate patch found during block matching.
#[derive(Debug, Clone, Copy)]
pub struct PatchMatch<F: Bm3dFloat> {
    pub row: usize,
    pub col: usize,
    pub distance: F,
}

impl<F: Bm3dFloat> PartialEq for PatchMatch<F> {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row && self.col == other.col && self.distance == other.distance
    }
}

impl<F: Bm3dFloat> Eq for PatchMatch<F> {}

// Ordered by distance only, so a BinaryHeap pops the worst match first.
impl<F: Bm3dFloat> Ord for PatchMatch<F> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl<F: Bm3dFloat> PartialOrd for PatchMatch<F> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute squared L2 distance between two patches with early termination.
///
/// The threshold is checked once per row so the inner loop stays vectorizable.
#[inline]
fn compute_squared_distance<F: Bm3dFloat>(p1: ArrayView2<F>, p2: ArrayView2<F>, threshold: F) -> F {
    let mut sum_sq = F::zero();
    for (r1, r2) in p1.outer_iter().zip(p2.outer_iter()) {
        for (a, b) in r1.iter().zip(r2.iter()) {
            let diff = *a - *b;
            sum_sq += diff * diff;
        }
        if sum_sq >= threshold {
            return sum_sq;
        }
    }
    sum_sq
}

/// Integral images of a guide image, used to pre-screen candidates.
///
/// `sum[[r + 1, c + 1]]` holds the sum of all pixels above and left of
/// `(r, c)` inclusive, so any rectangle sum is four lookups. `sq_sum` is the
/// same for squared pixels.
pub struct IntegralImages<F: Bm3dFloat> {
    pub sum: Array2<F>,
    pub sq_sum: Array2<F>,
}

impl<F: Bm3dFloat> IntegralImages<F> {
    pub fn new(image: ArrayView2<F>) -> Self {
        let (h, w) = image.dim();
        let mut sum = Array2::<F>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<F>::zeros((h + 1, w + 1));

        for r in 0..h {
            let mut row_sum = F::zero();
            let mut row_sq_sum = F::zero();
            for c in 0..w {
                let val = image[[r, c]];
                row_sum += val;
                row_sq_sum += val * val;

                sum[[r + 1, c + 1]] = sum[[r, c + 1]] + row_sum;
                sq_sum[[r + 1, c + 1]] = sq_sum[[r, c + 1]] + row_sq_sum;
            }
        }
        Self { sum, sq_sum }
    }

    /// Sum and squared sum of the `h x w` rectangle at `(r, c)`.
    #[inline(always)]
    fn rect(&self, r: usize, c: usize, h: usize, w: usize) -> (F, F) {
        let (r2, c2) = (r + h, c + w);
        let sum = self.sum[[r2, c2]] - self.sum[[r, c2]] - self.sum[[r2, c]] + self.sum[[r, c]];
        let sq_sum = self.sq_sum[[r2, c2]] - self.sq_sum[[r, c2]] - self.sq_sum[[r2, c]]
            + self.sq_sum[[r, c]];
        (sum, sq_sum)
    }
}

/// Geometry of one block-matching query.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery {
    /// Top-left corner of the reference patch.
    pub ref_pos: (usize, usize),
    /// Patch (height, width).
    pub patch_size: (usize, usize),
    /// Search area (height, width) centered on `ref_pos`.
    pub search_window: (usize, usize),
    /// Maximum number of patches kept, the reference included.
    pub max_matches: usize,
    /// Stride of the candidate grid.
    pub step: usize,
}

/// Find similar patches within a search window, writing them into `out`.
///
/// Candidates are pre-screened with two lower bounds on the squared distance
/// computed from the integral images:
/// 1. Mean difference: `(sum1 - sum2)^2 / N`
/// 2. Norm difference: `(norm1 - norm2)^2`
///
/// The reference patch is always kept with distance 0, and `out` is sorted by
/// ascending distance.
pub fn find_similar_patches_into<F: Bm3dFloat>(
    image: ArrayView2<F>,
    integral: &IntegralImages<F>,
    query: &MatchQuery,
    out: &mut Vec<PatchMatch<F>>,
) {
    out.clear();
    let (ref_r, ref_c) = query.ref_pos;
    let (ph, pw) = query.patch_size;
    let (h, w) = image.dim();
    if ph == 0 || pw == 0 || ph > h || pw > w || query.max_matches == 0 {
        return;
    }
    let step = query.step.max(1);

    let ref_patch = image.slice(s![ref_r..ref_r + ph, ref_c..ref_c + pw]);

    let search_r_start = ref_r.saturating_sub(query.search_window.0 / 2);
    let search_r_end = (ref_r + query.search_window.0 / 2).min(h - ph);
    let search_c_start = ref_c.saturating_sub(query.search_window.1 / 2);
    let search_c_end = (ref_c + query.search_window.1 / 2).min(w - pw);

    let mut heap = BinaryHeap::with_capacity(query.max_matches + 1);
    heap.push(PatchMatch {
        row: ref_r,
        col: ref_c,
        distance: F::zero(),
    });

    let mut threshold = if query.max_matches > 1 {
        F::max_value()
    } else {
        F::zero()
    };

    let (ref_sum, ref_sq_sum) = integral.rect(ref_r, ref_c, ph, pw);
    let ref_norm = ref_sq_sum.max(F::zero()).sqrt();
    let inv_n = F::one() / F::usize_as(ph * pw);

    for r in (search_r_start..=search_r_end).step_by(step) {
        for c in (search_c_start..=search_c_end).step_by(step) {
            if r == ref_r && c == ref_c {
                continue;
            }

            let (cand_sum, cand_sq_sum) = integral.rect(r, c, ph, pw);

            let diff_sum = cand_sum - ref_sum;
            if diff_sum * diff_sum * inv_n >= threshold {
                continue;
            }

            let cand_norm = cand_sq_sum.max(F::zero()).sqrt();
            let diff_norm = cand_norm - ref_norm;
            if diff_norm * diff_norm >= threshold {
                continue;
            }

            let candidate = image.slice(s![r..r + ph, c..c + pw]);
            let dist = compute_squared_distance(ref_patch, candidate, threshold);
            if dist >= threshold {
                continue;
            }

            if heap.len() >= query.max_matches {
                heap.pop();
            }
            heap.push(PatchMatch {
                row: r,
                col: c,
                distance: dist,
            });
            if heap.len() == query.max_matches {
                if let Some(worst) = heap.peek() {
                    threshold = worst.distance;
                }
            }
        }
    }

    out.extend(heap.into_vec());
    out.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (a.row, a.col).cmp(&(b.row, b.col)))
    });
    // Keep the reference first even when other patches tie at distance 0.
    if let Some(pos) = out.iter().position(|m| m.row == ref_r && m.col == ref_c) {
        let reference = out.remove(pos);
        out.insert(0, reference);
    }
}

/// Allocating wrapper around [`find_similar_patches_into`].
pub fn find_similar_patches<F: Bm3dFloat>(
    image: ArrayView2<F>,
    integral: &IntegralImages<F>,
    query: &MatchQuery,
) -> Vec<PatchMatch<F>> {
    let mut out = Vec::with_capacity(query.max_matches);
    find_similar_patches_into(image, integral, query, &mut out);
    out
}
