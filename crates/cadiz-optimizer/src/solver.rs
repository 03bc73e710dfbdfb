//! Projected-gradient quadratic programming over the portfolio polytope.
//!
//! The feasible set is the intersection of a box (per-position bounds), a
//! budget hyperplane (`sum w = b`), and per-sector halfspaces
//! (`sum_{i in s} w_i <= cap`). Projection onto the intersection is by
//! Dykstra's alternating projections, which is exact for closed convex
//! sets; the outer minimization is accelerated projected gradient
//! (FISTA). Problem sizes are tiny (tens of assets), so iteration counts
//! are generous and tolerances tight.

use ndarray::{Array1, Array2};

use cadiz_traits::{CadizError, Result};

const DYKSTRA_MAX_CYCLES: usize = 200;
const DYKSTRA_TOL: f64 = 1e-12;
const PGD_MAX_ITERS: usize = 4000;
const PGD_TOL: f64 = 1e-11;

/// The feasible portfolio set for one solve.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    /// Per-position lower bounds.
    pub lower: Array1<f64>,
    /// Per-position upper bounds.
    pub upper: Array1<f64>,
    /// Budget: target for `sum w`.
    pub budget: f64,
    /// Sector groups as (member indices, cap on the group sum).
    pub sector_caps: Vec<(Vec<usize>, f64)>,
}

impl ConstraintSet {
    /// A box-and-budget set with no sector caps.
    #[must_use]
    pub fn new(lower: Array1<f64>, upper: Array1<f64>, budget: f64) -> Self {
        Self { lower, upper, budget, sector_caps: Vec::new() }
    }

    /// Attach sector caps.
    #[must_use]
    pub fn with_sector_caps(mut self, caps: Vec<(Vec<usize>, f64)>) -> Self {
        self.sector_caps = caps;
        self
    }

    /// Number of assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Whether the set is over zero assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Largest budget the box alone can absorb.
    #[must_use]
    pub fn box_capacity(&self) -> f64 {
        self.upper.sum()
    }

    /// Largest budget the box and sector caps can absorb together.
    ///
    /// Each capped group contributes at most `min(cap, sum of its upper
    /// bounds)`; uncapped assets contribute their upper bounds.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        let mut grouped = vec![false; self.len()];
        let mut total = 0.0;
        for (members, cap) in &self.sector_caps {
            let group_box: f64 = members.iter().map(|&i| self.upper[i]).sum();
            total += cap.min(group_box);
            for &i in members {
                grouped[i] = true;
            }
        }
        for i in 0..self.len() {
            if !grouped[i] {
                total += self.upper[i];
            }
        }
        total
    }

    /// Validate that the set is non-empty.
    ///
    /// # Errors
    ///
    /// [`CadizError::SolverInfeasible`] when the lower bounds already
    /// overshoot the budget or the capacity falls short of it.
    pub fn check_feasible(&self) -> Result<()> {
        let floor: f64 = self.lower.sum();
        if floor > self.budget + 1e-9 {
            return Err(CadizError::SolverInfeasible(format!(
                "lower bounds sum to {floor}, above budget {}",
                self.budget
            )));
        }
        let capacity = self.capacity();
        if capacity < self.budget - 1e-9 {
            return Err(CadizError::SolverInfeasible(format!(
                "capacity {capacity} below budget {}",
                self.budget
            )));
        }
        for (members, cap) in &self.sector_caps {
            let group_floor: f64 = members.iter().map(|&i| self.lower[i]).sum();
            if group_floor > cap + 1e-9 {
                return Err(CadizError::SolverInfeasible(format!(
                    "sector lower bounds sum to {group_floor}, above cap {cap}"
                )));
            }
        }
        Ok(())
    }

    /// Euclidean projection onto the box intersected with the budget
    /// hyperplane, by bisection on the hyperplane multiplier.
    fn project_box_budget(&self, v: &Array1<f64>) -> Array1<f64> {
        let clipped_sum = |shift: f64| -> f64 {
            v.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(&x, (&lo, &hi))| (x + shift).clamp(lo, hi))
                .sum()
        };

        let mut lo_shift = -1.0;
        let mut hi_shift = 1.0;
        // Widen until the budget is bracketed.
        for _ in 0..80 {
            if clipped_sum(lo_shift) <= self.budget {
                break;
            }
            lo_shift *= 2.0;
        }
        for _ in 0..80 {
            if clipped_sum(hi_shift) >= self.budget {
                break;
            }
            hi_shift *= 2.0;
        }

        for _ in 0..100 {
            let mid = 0.5 * (lo_shift + hi_shift);
            if clipped_sum(mid) < self.budget {
                lo_shift = mid;
            } else {
                hi_shift = mid;
            }
        }
        let shift = 0.5 * (lo_shift + hi_shift);
        Array1::from_iter(
            v.iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .map(|(&x, (&lo, &hi))| (x + shift).clamp(lo, hi)),
        )
    }

    /// Euclidean projection onto one sector halfspace.
    fn project_sector(members: &[usize], cap: f64, v: &mut Array1<f64>) {
        let sum: f64 = members.iter().map(|&i| v[i]).sum();
        if sum > cap {
            let shift = (sum - cap) / members.len() as f64;
            for &i in members {
                v[i] -= shift;
            }
        }
    }

    /// Euclidean projection onto the full feasible set (Dykstra).
    #[must_use]
    pub fn project(&self, v: &Array1<f64>) -> Array1<f64> {
        if self.sector_caps.is_empty() {
            return self.project_box_budget(v);
        }

        let n_sets = 1 + self.sector_caps.len();
        let mut x = v.clone();
        let mut corrections = vec![Array1::<f64>::zeros(self.len()); n_sets];

        for _ in 0..DYKSTRA_MAX_CYCLES {
            let before = x.clone();
            for (set_idx, correction) in corrections.iter_mut().enumerate() {
                let y = &x + &*correction;
                let projected = if set_idx == 0 {
                    self.project_box_budget(&y)
                } else {
                    let (members, cap) = &self.sector_caps[set_idx - 1];
                    let mut z = y.clone();
                    Self::project_sector(members, *cap, &mut z);
                    z
                };
                *correction = &y - &projected;
                x = projected;
            }
            let delta = (&x - &before).iter().map(|d| d * d).sum::<f64>().sqrt();
            if delta < DYKSTRA_TOL {
                break;
            }
        }
        x
    }
}

/// Minimize `0.5 * w' Q w - c' w` over the constraint set.
///
/// `q_matrix` must be symmetric positive semidefinite (callers add a tiny
/// ridge for strict convexity and deterministic tie-breaking).
///
/// # Errors
///
/// [`CadizError::SolverInfeasible`] when the constraint set is empty.
pub fn solve_qp(
    q_matrix: &Array2<f64>,
    linear: &Array1<f64>,
    constraints: &ConstraintSet,
) -> Result<Array1<f64>> {
    constraints.check_feasible()?;
    let n = constraints.len();
    if n == 0 {
        return Err(CadizError::SolverInfeasible("no assets".to_string()));
    }

    // Gershgorin upper bound on the largest eigenvalue for the step size.
    let lipschitz = (0..n)
        .map(|i| (0..n).map(|j| q_matrix[(i, j)].abs()).sum::<f64>())
        .fold(0.0_f64, f64::max)
        .max(1e-12);
    let step = 1.0 / lipschitz;

    let uniform = Array1::from_elem(n, constraints.budget / n as f64);
    let mut w = constraints.project(&uniform);
    let mut y = w.clone();
    let mut t = 1.0_f64;

    for _ in 0..PGD_MAX_ITERS {
        let gradient = q_matrix.dot(&y) - linear;
        let next = constraints.project(&(&y - &(gradient * step)));
        let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
        let momentum = (t - 1.0) / t_next;
        y = &next + &((&next - &w) * momentum);
        let delta = (&next - &w).iter().map(|d| d * d).sum::<f64>().sqrt();
        w = next;
        t = t_next;
        if delta < PGD_TOL {
            break;
        }
    }
    Ok(w)
}
