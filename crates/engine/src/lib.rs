//! Hironaka Game Engine
//!
//! A batched state engine for the Hironaka host/agent game, designed for RL
//! training. Core object is a `PointsBatch`: many simultaneous games stored in
//! one fixed-shape (batch, max_points, dimension) array, with a strictly
//! negative sentinel marking absent points. All game transformations operate
//! on the whole batch at once; ended games are frozen in place.
//!
//! `SimplePoints` is a sequential reference implementation of the same rules,
//! used as a correctness oracle in tests.

use ndarray::{s, Array2, Array3, Axis, Zip};
use rand::Rng;
use thiserror::Error;

// =============================================================================
// Basic types and options
// =============================================================================

/// Coordinate value. Non-negative for live points, strictly negative padding.
pub type Value = f32;

/// Default sentinel for absent points.
pub const DEFAULT_PADDING_VALUE: Value = -1.0;

/// Default ceiling for divergence detection (`exceeds_threshold`).
pub const DEFAULT_VALUE_THRESHOLD: Value = 1e8;

/// Construction options shared by the batch constructors.
#[derive(Copy, Clone, Debug)]
pub struct PointsOptions {
    /// Sentinel written into absent point slots. Must be <= 0.
    pub padding_value: Value,

    /// Divergence ceiling; `None` disables the `exceeds_threshold` check.
    pub value_threshold: Option<Value>,
}

impl Default for PointsOptions {
    fn default() -> Self {
        Self {
            padding_value: DEFAULT_PADDING_VALUE,
            value_threshold: Some(DEFAULT_VALUE_THRESHOLD),
        }
    }
}

impl PointsOptions {
    fn check(&self) -> Result<(), PointsError> {
        if self.padding_value > 0.0 {
            return Err(PointsError::InvalidInput(format!(
                "padding_value must be a non-positive number, got {}",
                self.padding_value
            )));
        }
        if let Some(t) = self.value_threshold {
            if t <= 0.0 {
                return Err(PointsError::InvalidInput(format!(
                    "value_threshold must be positive, got {t}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Engine-level errors.
///
/// An all-zero rescale denominator is recovered locally by leaving the
/// element unchanged and never surfaces here; threshold overflow is reported
/// through the `exceeds_threshold` query, never raised.
#[derive(Debug, Error)]
pub enum PointsError {
    /// Bad constructor argument: illegal padding value, malformed shapes,
    /// negative coordinates, partially padded points.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation received arrays whose shapes do not match the batch.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A caller-contract violation (e.g. shift axis out of range).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
}

// =============================================================================
// The PointSet seam
// =============================================================================

/// Common interface over point-set backends.
///
/// One vectorized production implementation (`PointsBatch`) and one simple
/// sequential implementation (`SimplePoints`) used as a test oracle.
///
/// Mutating operations work in place; the `shifted`/`reduced`/`rescaled`/
/// `repositioned` variants return a transformed copy and leave the receiver
/// untouched. Every operation is a semantic no-op on ended batch elements.
pub trait PointSet: Clone {
    /// Number of simultaneous games in the batch.
    fn batch_size(&self) -> usize;

    /// Coordinate dimension of every point.
    fn dimension(&self) -> usize;

    /// Per batch element, the number of live (non-sentinel) points.
    fn effective_counts(&self) -> Vec<usize>;

    /// True iff any coordinate in the batch reaches the configured ceiling.
    fn exceeds_threshold(&self) -> bool;

    /// The Hironaka move: for each batch element, replace every live point's
    /// coordinate at `axes[b]` with the sum of its coordinates over the axes
    /// selected by `coords[b]`.
    ///
    /// `coords` is a (batch, dimension) 0/1 array. An element whose axis is
    /// not a member of its subset is left unchanged (this is how an unmasked
    /// exploratory agent move stays harmless). An axis outside
    /// `[0, dimension)` is a `PreconditionViolation`.
    fn shift(&mut self, coords: &Array2<Value>, axes: &[usize]) -> Result<(), PointsError>;

    /// Newton-polytope reduction: remove every point dominated by another
    /// live point (component-wise >= everywhere, > somewhere). Among
    /// identical points the one with the lowest index survives. Survivors
    /// are compacted to the front.
    fn reduce(&mut self);

    /// Divide all live coordinates of each element by the element's maximum
    /// live coordinate. Elements whose live coordinates are all zero are
    /// left unchanged.
    fn rescale(&mut self);

    /// Stable compaction of live points to the front of the point axis.
    fn reposition(&mut self);

    /// Per batch element, whether the game has ended (<= 1 live point).
    /// Zero live points counts as ended (degenerate but harmless).
    fn ended_mask(&self) -> Vec<bool> {
        self.effective_counts().iter().map(|&c| c <= 1).collect()
    }

    /// True iff every game in the batch has ended.
    fn all_ended(&self) -> bool {
        self.ended_mask().iter().all(|&e| e)
    }

    /// Copying variant of `shift`.
    fn shifted(&self, coords: &Array2<Value>, axes: &[usize]) -> Result<Self, PointsError> {
        let mut copy = self.clone();
        copy.shift(coords, axes)?;
        Ok(copy)
    }

    /// Copying variant of `reduce`.
    fn reduced(&self) -> Self {
        let mut copy = self.clone();
        copy.reduce();
        copy
    }

    /// Copying variant of `rescale`.
    fn rescaled(&self) -> Self {
        let mut copy = self.clone();
        copy.rescale();
        copy
    }

    /// Copying variant of `reposition`.
    fn repositioned(&self) -> Self {
        let mut copy = self.clone();
        copy.reposition();
        copy
    }
}

// =============================================================================
// PointsBatch: the vectorized production implementation
// =============================================================================

/// A batch of point sets in one dense (batch, max_points, dimension) array.
///
/// Within a batch element, live points occupy a prefix of the point axis and
/// every cell of an absent point holds the sentinel; a point is live iff its
/// coordinate 0 is >= 0. The batch axis never shrinks: ended games stay in
/// the array as inert entries so tensor shapes remain stable.
#[derive(Clone, Debug)]
pub struct PointsBatch {
    points: Array3<Value>,
    padding_value: Value,
    value_threshold: Option<Value>,
    distinguished: Option<Vec<Option<usize>>>,
}

impl PointsBatch {
    /// Build from ragged per-game point lists, padding each game out to
    /// `max_num_points` slots with the sentinel.
    pub fn from_ragged(
        games: &[Vec<Vec<Value>>],
        max_num_points: usize,
        opts: &PointsOptions,
    ) -> Result<Self, PointsError> {
        opts.check()?;
        if games.is_empty() {
            return Err(PointsError::InvalidInput("empty batch".into()));
        }
        if max_num_points == 0 {
            return Err(PointsError::InvalidInput(
                "max_num_points must be positive".into(),
            ));
        }
        let dimension = games
            .iter()
            .find_map(|g| g.first())
            .map(|p| p.len())
            .ok_or_else(|| {
                PointsError::InvalidInput(
                    "cannot infer dimension: every game in the batch is empty".into(),
                )
            })?;
        if dimension == 0 {
            return Err(PointsError::InvalidInput(
                "points must have at least one coordinate".into(),
            ));
        }

        for (bi, game) in games.iter().enumerate() {
            if game.len() > max_num_points {
                return Err(PointsError::InvalidInput(format!(
                    "game {bi} has {} points, more than max_num_points {max_num_points}",
                    game.len()
                )));
            }
            for (pi, point) in game.iter().enumerate() {
                if point.len() != dimension {
                    return Err(PointsError::InvalidInput(format!(
                        "point {pi} of game {bi} has dimension {}, expected {dimension}",
                        point.len()
                    )));
                }
                if point.iter().any(|&v| v < 0.0) {
                    return Err(PointsError::InvalidInput(format!(
                        "point {pi} of game {bi} has a negative coordinate"
                    )));
                }
            }
        }

        let mut points = Array3::from_elem(
            (games.len(), max_num_points, dimension),
            opts.padding_value,
        );
        for (bi, game) in games.iter().enumerate() {
            for (pi, point) in game.iter().enumerate() {
                for (k, &v) in point.iter().enumerate() {
                    points[[bi, pi, k]] = v;
                }
            }
        }

        Ok(Self {
            points,
            padding_value: opts.padding_value,
            value_threshold: opts.value_threshold,
            distinguished: None,
        })
    }

    /// Build from a dense pre-padded array.
    ///
    /// The sentinel invariant is validated eagerly: a point whose coordinate
    /// 0 is negative must be negative in every coordinate (no
    /// partial-dimension padding), and live points must be non-negative
    /// throughout.
    pub fn from_array(points: Array3<Value>, opts: &PointsOptions) -> Result<Self, PointsError> {
        opts.check()?;
        let (b, n, d) = points.dim();
        if b == 0 || n == 0 || d == 0 {
            return Err(PointsError::InvalidInput(format!(
                "batch shape ({b}, {n}, {d}) has a zero axis"
            )));
        }
        for (bi, game) in points.outer_iter().enumerate() {
            for (pi, point) in game.outer_iter().enumerate() {
                if point[0] < 0.0 {
                    if point.iter().any(|&v| v >= 0.0) {
                        return Err(PointsError::InvalidInput(format!(
                            "partially padded point {pi} in game {bi}"
                        )));
                    }
                } else if point.iter().any(|&v| v < 0.0) {
                    return Err(PointsError::InvalidInput(format!(
                        "live point {pi} in game {bi} has a negative coordinate"
                    )));
                }
            }
        }
        Ok(Self {
            points,
            padding_value: opts.padding_value,
            value_threshold: opts.value_threshold,
            distinguished: None,
        })
    }

    /// Attach per-element distinguished point indices.
    ///
    /// Best-effort metadata: the indices follow compaction through
    /// `reduce`/`reposition` and become `None` when the tracked point is
    /// pruned. The game rules never consult them.
    pub fn with_distinguished(
        mut self,
        distinguished: Vec<Option<usize>>,
    ) -> Result<Self, PointsError> {
        let (b, n, _) = self.points.dim();
        if distinguished.len() != b {
            return Err(PointsError::DimensionMismatch(format!(
                "distinguished points: expected {b} entries, got {}",
                distinguished.len()
            )));
        }
        for (bi, entry) in distinguished.iter().enumerate() {
            if let Some(p) = entry {
                if *p >= n {
                    return Err(PointsError::InvalidInput(format!(
                        "distinguished point {p} of game {bi} is out of range (max_points {n})"
                    )));
                }
            }
        }
        self.distinguished = Some(distinguished);
        Ok(self)
    }

    /// The underlying (batch, max_points, dimension) array.
    pub fn points(&self) -> &Array3<Value> {
        &self.points
    }

    /// Sentinel value used for absent point slots.
    pub fn padding_value(&self) -> Value {
        self.padding_value
    }

    /// Configured divergence ceiling, if any.
    pub fn value_threshold(&self) -> Option<Value> {
        self.value_threshold
    }

    /// Distinguished point indices, if tracked.
    pub fn distinguished(&self) -> Option<&[Option<usize>]> {
        self.distinguished.as_deref()
    }

    /// Maximum number of point slots per batch element.
    pub fn max_points(&self) -> usize {
        self.points.dim().1
    }

    /// Stable compaction of live points to the front for every element not
    /// flagged in `skip`, remapping distinguished indices. `reduce` passes
    /// the ended mask captured on entry so an element that shrinks to one
    /// point during the reduction still gets its survivor compacted;
    /// `reposition` passes the current mask.
    fn compact_live(&mut self, skip: &[bool]) {
        let (b, n, d) = self.points.dim();
        for bi in 0..b {
            if skip[bi] {
                continue;
            }
            let mut map: Vec<Option<usize>> = vec![None; n];
            let mut next = 0usize;
            for p in 0..n {
                if self.points[[bi, p, 0]] < 0.0 {
                    continue;
                }
                map[p] = Some(next);
                if next != p {
                    for k in 0..d {
                        let v = self.points[[bi, p, k]];
                        self.points[[bi, next, k]] = v;
                    }
                }
                next += 1;
            }
            for p in next..n {
                for k in 0..d {
                    self.points[[bi, p, k]] = self.padding_value;
                }
            }
            if let Some(dist) = self.distinguished.as_mut() {
                dist[bi] = dist[bi].and_then(|p| map[p]);
            }
        }
    }

    /// Network-ready observation: a copy with the points of each batch
    /// element reordered by descending coordinate 0 (stable). The networks
    /// are not permutation invariant, so observation order must be a
    /// deterministic function of the state.
    pub fn sorted_features(&self) -> Array3<Value> {
        let n = self.points.dim().1;
        let mut out = self.points.clone();
        for (game, mut feat) in self.points.outer_iter().zip(out.outer_iter_mut()) {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&i, &j| game[[j, 0]].total_cmp(&game[[i, 0]]));
            for (slot, &src) in order.iter().enumerate() {
                feat.row_mut(slot).assign(&game.row(src));
            }
        }
        out
    }
}

impl PointSet for PointsBatch {
    fn batch_size(&self) -> usize {
        self.points.dim().0
    }

    fn dimension(&self) -> usize {
        self.points.dim().2
    }

    fn effective_counts(&self) -> Vec<usize> {
        self.points
            .slice(s![.., .., 0])
            .outer_iter()
            .map(|firsts| firsts.iter().filter(|&&v| v >= 0.0).count())
            .collect()
    }

    fn exceeds_threshold(&self) -> bool {
        match self.value_threshold {
            Some(t) => self.points.iter().any(|&v| v >= t),
            None => false,
        }
    }

    fn shift(&mut self, coords: &Array2<Value>, axes: &[usize]) -> Result<(), PointsError> {
        let (b, n, d) = self.points.dim();
        if coords.dim() != (b, d) {
            return Err(PointsError::DimensionMismatch(format!(
                "coords must have shape ({b}, {d}), got {:?}",
                coords.dim()
            )));
        }
        if axes.len() != b {
            return Err(PointsError::DimensionMismatch(format!(
                "axes must have {b} entries, got {}",
                axes.len()
            )));
        }
        if let Some(bi) = axes.iter().position(|&a| a >= d) {
            return Err(PointsError::PreconditionViolation(format!(
                "axis {} of batch element {bi} out of range for dimension {d}",
                axes[bi]
            )));
        }

        let ended = self.ended_mask();
        // Coordinate sums over the chosen subsets, for the whole batch at
        // once: (b, n, d) * (b, 1, d) summed over the last axis.
        let sums = (&self.points * &coords.view().insert_axis(Axis(1))).sum_axis(Axis(2));

        for bi in 0..b {
            if ended[bi] {
                continue;
            }
            let ax = axes[bi];
            if coords[[bi, ax]] == 0.0 {
                // Axis outside the chosen subset: element left unchanged.
                continue;
            }
            for p in 0..n {
                if self.points[[bi, p, 0]] < 0.0 {
                    continue;
                }
                self.points[[bi, p, ax]] = sums[[bi, p]];
            }
        }
        Ok(())
    }

    fn reduce(&mut self) {
        let (b, n, d) = self.points.dim();
        let ended = self.ended_mask();
        let live = Array2::from_shape_fn((b, n), |(bi, p)| self.points[[bi, p, 0]] >= 0.0);

        // Pairwise comparison tensors over the whole batch. Entry (bi, j, i)
        // relates candidate dominator j to point i within batch element bi.
        let mut ge_all = Array3::from_elem((b, n, n), false);
        let mut gt_any = Array3::from_elem((b, n, n), false);
        let mut eq_all = Array3::from_elem((b, n, n), false);
        {
            let points = &self.points;
            let live = &live;
            Zip::indexed(&mut ge_all)
                .and(&mut gt_any)
                .and(&mut eq_all)
                .for_each(|(bi, j, i), ge, gt, eq| {
                    if j == i || !live[[bi, j]] || !live[[bi, i]] {
                        return;
                    }
                    let mut all_ge = true;
                    let mut any_gt = false;
                    for k in 0..d {
                        let vj = points[[bi, j, k]];
                        let vi = points[[bi, i, k]];
                        if vj < vi {
                            all_ge = false;
                            break;
                        }
                        if vj > vi {
                            any_gt = true;
                        }
                    }
                    *ge = all_ge;
                    *gt = all_ge && any_gt;
                    *eq = all_ge && !any_gt;
                });
        }

        // Point i goes when some j strictly dominates it, or ties it from a
        // lower slot (so exactly one of several identical points survives).
        let mut removed = Array2::from_elem((b, n), false);
        Zip::indexed(&mut removed).for_each(|(bi, i), rem| {
            if ended[bi] || !live[[bi, i]] {
                return;
            }
            for j in 0..n {
                if ge_all[[bi, j, i]] && (gt_any[[bi, j, i]] || (eq_all[[bi, j, i]] && j < i)) {
                    *rem = true;
                    return;
                }
            }
        });

        for bi in 0..b {
            if ended[bi] {
                continue;
            }
            for p in 0..n {
                if !removed[[bi, p]] {
                    continue;
                }
                if let Some(dist) = self.distinguished.as_mut() {
                    if dist[bi] == Some(p) {
                        dist[bi] = None;
                    }
                }
                for k in 0..d {
                    self.points[[bi, p, k]] = self.padding_value;
                }
            }
        }
        // Compact with the mask captured on entry: an element that just
        // shrank to a single point still needs its survivor moved to the
        // front.
        self.compact_live(&ended);
    }

    fn rescale(&mut self) {
        let (b, n, d) = self.points.dim();
        let ended = self.ended_mask();
        for bi in 0..b {
            if ended[bi] {
                continue;
            }
            let mut max = 0.0;
            for p in 0..n {
                if self.points[[bi, p, 0]] < 0.0 {
                    continue;
                }
                for k in 0..d {
                    let v = self.points[[bi, p, k]];
                    if v > max {
                        max = v;
                    }
                }
            }
            if max <= 0.0 {
                // All live coordinates zero: leave the element unchanged.
                continue;
            }
            for p in 0..n {
                if self.points[[bi, p, 0]] < 0.0 {
                    continue;
                }
                for k in 0..d {
                    self.points[[bi, p, k]] /= max;
                }
            }
        }
    }

    fn reposition(&mut self) {
        let ended = self.ended_mask();
        self.compact_live(&ended);
    }
}

// =============================================================================
// SimplePoints: the sequential reference implementation (test oracle)
// =============================================================================

/// Sequential point-set backend over plain nested vectors.
///
/// Implements the same rules as `PointsBatch` one game and one point at a
/// time, including the dominance tie-break and the axis-outside-subset no-op.
/// Used to cross-check the vectorized implementation; not built for speed.
#[derive(Clone, Debug, PartialEq)]
pub struct SimplePoints {
    games: Vec<Vec<Vec<Value>>>,
    dimension: usize,
    value_threshold: Option<Value>,
}

impl SimplePoints {
    pub fn new(
        games: Vec<Vec<Vec<Value>>>,
        value_threshold: Option<Value>,
    ) -> Result<Self, PointsError> {
        if games.is_empty() {
            return Err(PointsError::InvalidInput("empty batch".into()));
        }
        let dimension = games
            .iter()
            .find_map(|g| g.first())
            .map(|p| p.len())
            .ok_or_else(|| {
                PointsError::InvalidInput(
                    "cannot infer dimension: every game in the batch is empty".into(),
                )
            })?;
        for (bi, game) in games.iter().enumerate() {
            for (pi, point) in game.iter().enumerate() {
                if point.len() != dimension {
                    return Err(PointsError::InvalidInput(format!(
                        "point {pi} of game {bi} has dimension {}, expected {dimension}",
                        point.len()
                    )));
                }
                if point.iter().any(|&v| v < 0.0) {
                    return Err(PointsError::InvalidInput(format!(
                        "point {pi} of game {bi} has a negative coordinate"
                    )));
                }
            }
        }
        Ok(Self {
            games,
            dimension,
            value_threshold,
        })
    }

    /// Per-game point lists (live points only; compaction is implicit).
    pub fn games(&self) -> &[Vec<Vec<Value>>] {
        &self.games
    }
}

impl PointSet for SimplePoints {
    fn batch_size(&self) -> usize {
        self.games.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn effective_counts(&self) -> Vec<usize> {
        self.games.iter().map(|g| g.len()).collect()
    }

    fn exceeds_threshold(&self) -> bool {
        match self.value_threshold {
            Some(t) => self.games.iter().flatten().flatten().any(|&v| v >= t),
            None => false,
        }
    }

    fn shift(&mut self, coords: &Array2<Value>, axes: &[usize]) -> Result<(), PointsError> {
        let b = self.games.len();
        let d = self.dimension;
        if coords.dim() != (b, d) {
            return Err(PointsError::DimensionMismatch(format!(
                "coords must have shape ({b}, {d}), got {:?}",
                coords.dim()
            )));
        }
        if axes.len() != b {
            return Err(PointsError::DimensionMismatch(format!(
                "axes must have {b} entries, got {}",
                axes.len()
            )));
        }
        if let Some(bi) = axes.iter().position(|&a| a >= d) {
            return Err(PointsError::PreconditionViolation(format!(
                "axis {} of batch element {bi} out of range for dimension {d}",
                axes[bi]
            )));
        }
        for (bi, game) in self.games.iter_mut().enumerate() {
            if game.len() <= 1 {
                continue;
            }
            let ax = axes[bi];
            if coords[[bi, ax]] == 0.0 {
                continue;
            }
            for point in game.iter_mut() {
                let sum: Value = (0..d)
                    .filter(|&k| coords[[bi, k]] != 0.0)
                    .map(|k| point[k])
                    .sum();
                point[ax] = sum;
            }
        }
        Ok(())
    }

    fn reduce(&mut self) {
        let d = self.dimension;
        for game in self.games.iter_mut() {
            if game.len() <= 1 {
                continue;
            }
            let n = game.len();
            let mut removed = vec![false; n];
            for i in 0..n {
                for j in 0..n {
                    if j == i {
                        continue;
                    }
                    let mut all_ge = true;
                    let mut any_gt = false;
                    for k in 0..d {
                        if game[j][k] < game[i][k] {
                            all_ge = false;
                            break;
                        }
                        if game[j][k] > game[i][k] {
                            any_gt = true;
                        }
                    }
                    if all_ge && (any_gt || j < i) {
                        removed[i] = true;
                        break;
                    }
                }
            }
            let mut idx = 0;
            game.retain(|_| {
                let keep = !removed[idx];
                idx += 1;
                keep
            });
        }
    }

    fn rescale(&mut self) {
        for game in self.games.iter_mut() {
            if game.len() <= 1 {
                continue;
            }
            let max = game
                .iter()
                .flatten()
                .fold(0.0f32, |acc, &v| if v > acc { v } else { acc });
            if max <= 0.0 {
                continue;
            }
            for point in game.iter_mut() {
                for v in point.iter_mut() {
                    *v /= max;
                }
            }
        }
    }

    fn reposition(&mut self) {
        // The ragged representation has no padding slots to push back.
    }
}

// =============================================================================
// Random batch generation
// =============================================================================

/// Generate a fresh batch of games with uniform integer coordinates in
/// `[0, max_value]`. The caller typically follows up with `reduce` (and
/// `rescale` when scaled observations are configured).
pub fn random_batch(
    batch_size: usize,
    max_num_points: usize,
    dimension: usize,
    max_value: u32,
    opts: &PointsOptions,
    rng: &mut impl Rng,
) -> Result<PointsBatch, PointsError> {
    let points = Array3::from_shape_fn((batch_size, max_num_points, dimension), |_| {
        rng.random_range(0..=max_value) as Value
    });
    PointsBatch::from_array(points, opts)
}

// =============================================================================
// Tests
// =============================================================================
