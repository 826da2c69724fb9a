/// Detection-to-identity assignment strategies
///
/// The tracker hands a cost matrix (rows = live identities, columns = new
/// detections) to a `MatchingStrategy` and applies whatever assignment comes
/// back. The default greedy matcher is cheap and good enough for a doorway;
/// the Hungarian matcher gives the minimum-cost assignment when paths cross.
use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres, Matrix};

/// Result of an assignment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// Assignments as (row_idx, col_idx) pairs
    pub assignments: Vec<(usize, usize)>,
    /// Indices of rows left without a partner
    pub unmatched_rows: Vec<usize>,
    /// Indices of columns left without a partner
    pub unmatched_cols: Vec<usize>,
    /// Sum of the costs of the accepted assignments
    pub total_cost: f32,
}

impl AssignmentResult {
    fn empty(num_rows: usize, num_cols: usize) -> Self {
        Self {
            assignments: Vec::new(),
            unmatched_rows: (0..num_rows).collect(),
            unmatched_cols: (0..num_cols).collect(),
            total_cost: 0.0,
        }
    }

    fn from_assignments(
        cost_matrix: ArrayView2<f32>,
        mut assignments: Vec<(usize, usize)>,
    ) -> Self {
        let mut used_rows = vec![false; cost_matrix.nrows()];
        let mut used_cols = vec![false; cost_matrix.ncols()];
        for &(r, c) in &assignments {
            used_rows[r] = true;
            used_cols[c] = true;
        }
        assignments.sort_unstable();

        let total_cost = assignments.iter().map(|&(r, c)| cost_matrix[[r, c]]).sum();

        Self {
            assignments,
            unmatched_rows: (0..used_rows.len()).filter(|&i| !used_rows[i]).collect(),
            unmatched_cols: (0..used_cols.len()).filter(|&j| !used_cols[j]).collect(),
            total_cost,
        }
    }

    /// Column assigned to each row, `None` for unmatched rows
    pub fn row_to_col(&self, num_rows: usize) -> Vec<Option<usize>> {
        let mut assignment_vector = vec![None; num_rows];
        for &(row, col) in &self.assignments {
            assignment_vector[row] = Some(col);
        }
        assignment_vector
    }
}

/// Pluggable assignment algorithm used by the centroid tracker
pub trait MatchingStrategy: Send {
    /// Assign rows to columns. A pair is only ever accepted when its cost is
    /// `<= max_cost`; non-finite costs are never accepted.
    fn assign(&self, cost_matrix: ArrayView2<f32>, max_cost: f32) -> AssignmentResult;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Greedy nearest-neighbour matching: repeatedly take the globally smallest
/// remaining cost and strike its row and column.
///
/// Not optimal. Two people whose paths cross can swap identities, which is an
/// accepted trade-off for O(n·m·log(n·m)) work per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyMatcher;

impl MatchingStrategy for GreedyMatcher {
    fn assign(&self, cost_matrix: ArrayView2<f32>, max_cost: f32) -> AssignmentResult {
        let num_rows = cost_matrix.nrows();
        let num_cols = cost_matrix.ncols();

        if num_rows == 0 || num_cols == 0 {
            return AssignmentResult::empty(num_rows, num_cols);
        }

        let mut candidates: Vec<(f32, usize, usize)> = cost_matrix
            .indexed_iter()
            .filter(|&(_, &cost)| cost.is_finite() && cost <= max_cost)
            .map(|((i, j), &cost)| (cost, i, j))
            .collect();

        // Cheapest first; ties go to the lowest (row, col)
        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut used_rows = vec![false; num_rows];
        let mut used_cols = vec![false; num_cols];
        let mut assignments = Vec::new();

        for (_cost, row, col) in candidates {
            if !used_rows[row] && !used_cols[col] {
                assignments.push((row, col));
                used_rows[row] = true;
                used_cols[col] = true;
            }
        }

        AssignmentResult::from_assignments(cost_matrix, assignments)
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}

/// Minimum-cost bipartite matching (Kuhn-Munkres)
#[derive(Debug, Clone, Copy)]
pub struct HungarianMatcher {
    /// Costs are converted to integers with this many units per pixel
    pub scale: f32,
}

impl Default for HungarianMatcher {
    fn default() -> Self {
        Self { scale: 1000.0 }
    }
}

impl MatchingStrategy for HungarianMatcher {
    fn assign(&self, cost_matrix: ArrayView2<f32>, max_cost: f32) -> AssignmentResult {
        let num_rows = cost_matrix.nrows();
        let num_cols = cost_matrix.ncols();

        if num_rows == 0 || num_cols == 0 {
            return AssignmentResult::empty(num_rows, num_cols);
        }

        let admissible = |cost: f32| cost.is_finite() && cost <= max_cost;
        let size = num_rows.max(num_cols);

        // kuhn_munkres sums up to `size` weights, so the scale shrinks when
        // the largest admissible cost would push those sums past i64.
        let largest = cost_matrix
            .iter()
            .copied()
            .filter(|&cost| admissible(cost))
            .fold(0.0_f64, |acc, cost| acc.max(f64::from(cost)));
        let limit = (i64::MAX / (4 * (size as i64 + 1))) as f64;
        let scale = f64::from(self.scale).min(limit / largest.max(1.0));

        // Every inadmissible pair (and every padding cell) gets the same
        // ceiling cost, so admissible pairs are always preferred.
        let ceiling = (largest * scale) as i64 + 1;

        // kuhn_munkres maximises, so weights are negated costs
        let mut weights = Matrix::new(size, size, -ceiling);
        for ((i, j), &cost) in cost_matrix.indexed_iter() {
            if admissible(cost) {
                let scaled = ((f64::from(cost) * scale) as i64).clamp(0, ceiling - 1);
                weights[(i, j)] = -scaled;
            }
        }

        let (_total, raw_assignments) = kuhn_munkres(&weights);

        let assignments: Vec<(usize, usize)> = raw_assignments
            .iter()
            .enumerate()
            .filter(|&(row, &col)| {
                row < num_rows && col < num_cols && admissible(cost_matrix[[row, col]])
            })
            .map(|(row, &col)| (row, col))
            .collect();

        AssignmentResult::from_assignments(cost_matrix, assignments)
    }

    fn name(&self) -> &'static str {
        "hungarian"
    }
}
