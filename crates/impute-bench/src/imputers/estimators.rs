//! Regression estimators used by the iterative imputer.
//!
//! All three work on dense `ndarray` matrices with no missing cells; the
//! iterative imputer is responsible for filling predictors before fitting.

use super::{param_count, param_flag, param_index, param_positive};
use crate::error::{BenchError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A regression model selected by imputer family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    Linear(LinearRegression),
    BayesianRidge(BayesianRidge),
    RandomForest(RandomForestRegressor),
}

impl Estimator {
    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Linear(_) => "LinearRegression",
            Estimator::BayesianRidge(_) => "BayesianRidge",
            Estimator::RandomForest(_) => "RandomForestRegressor",
        }
    }

    /// Override a hyperparameter by name.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        let known = match self {
            Estimator::Linear(model) => model.set_param(name, value)?,
            Estimator::BayesianRidge(model) => model.set_param(name, value)?,
            Estimator::RandomForest(model) => model.set_param(name, value)?,
        };
        if known {
            Ok(())
        } else {
            Err(BenchError::UnknownParameter {
                name: name.to_string(),
                target: self.name().to_string(),
            })
        }
    }

    /// Give a seed to estimators that use randomness and have none yet.
    pub(crate) fn seed_if_unset(&mut self, seed: u64) {
        if let Estimator::RandomForest(model) = self {
            model.random_state.get_or_insert(seed);
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        match self {
            Estimator::Linear(model) => model.fit(x, y),
            Estimator::BayesianRidge(model) => model.fit(x, y),
            Estimator::RandomForest(model) => model.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::Linear(model) => model.predict(x),
            Estimator::BayesianRidge(model) => model.predict(x),
            Estimator::RandomForest(model) => model.predict(x),
        }
    }
}

fn check_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(BenchError::InvariantViolation(format!(
            "{} predictor rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(BenchError::DegenerateComputation(
            "cannot fit an estimator on zero rows".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Dense solvers
// ============================================================================

/// Solve `a · x = b` for symmetric `a` by Cholesky decomposition.
///
/// A non positive-definite `a` is retried once with a small ridge added to its
/// diagonal.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if let Some(x) = cholesky_solve_inner(a, b) {
        return Some(x);
    }
    let n = a.nrows();
    if n == 0 {
        return None;
    }
    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let mut a_reg = a.clone();
    for k in 0..n {
        a_reg[[k, k]] += ridge.max(f64::EPSILON);
    }
    cholesky_solve_inner(&a_reg, b)
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Matrix inverse by Gauss-Jordan elimination with partial pivoting.
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    // [M | I]
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let max_row = (col..n)
            .max_by(|&a, &b| aug[[a, col]].abs().total_cmp(&aug[[b, col]].abs()))
            .unwrap_or(col);
        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        let pivot = aug[[col, col]];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                if factor != 0.0 {
                    for j in 0..2 * n {
                        aug[[row, j]] -= factor * aug[[col, j]];
                    }
                }
            }
        }
    }

    Some(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Center `x` column-wise and `y`, returning the means used.
fn center(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_centered = x - &x_mean.clone().insert_axis(Axis(0));
    let y_centered = y - y_mean;
    (x_centered, y_centered, x_mean, y_mean)
}

/// Coefficients and intercept shared by the two linear models.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearFit {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearFit {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(BenchError::InvariantViolation(format!(
                "model fitted on {} predictors, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

// ============================================================================
// Ordinary least squares
// ============================================================================

/// Ordinary least squares through the normal equations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl LinearRegression {
    fn set_param(&mut self, name: &str, value: f64) -> Result<bool> {
        match name {
            "fit_intercept" => self.fit_intercept = param_flag(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let (xc, yc, x_mean, y_mean) = if self.fit_intercept {
            center(x, y)
        } else {
            (x.clone(), y.clone(), Array1::zeros(x.ncols()), 0.0)
        };

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);

        let coefficients = match cholesky_solve(&xtx, &xty) {
            Some(coef) => coef,
            None => matrix_inverse(&xtx)
                .map(|inv| inv.dot(&xty))
                .ok_or_else(|| {
                    BenchError::DegenerateComputation(
                        "normal equations are singular".to_string(),
                    )
                })?,
        };

        let intercept = y_mean - coefficients.dot(&x_mean);
        self.fitted = Some(LinearFit {
            coefficients,
            intercept,
        });
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(BenchError::NotFitted)?.predict(x)
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }
}

// ============================================================================
// Bayesian ridge
// ============================================================================

/// Bayesian ridge regression with gamma priors on the noise precision
/// (`alpha`) and the weight precision (`lambda`), fitted by evidence
/// maximisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianRidge {
    pub max_iter: usize,
    pub tol: f64,
    pub alpha_1: f64,
    pub alpha_2: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
    alpha: f64,
    lambda: f64,
}

impl Default for BayesianRidge {
    fn default() -> Self {
        Self {
            max_iter: 300,
            tol: 1e-3,
            alpha_1: 1e-6,
            alpha_2: 1e-6,
            lambda_1: 1e-6,
            lambda_2: 1e-6,
            fit_intercept: true,
            fitted: None,
            alpha: 1.0,
            lambda: 1.0,
        }
    }
}

impl BayesianRidge {
    fn set_param(&mut self, name: &str, value: f64) -> Result<bool> {
        match name {
            "max_iter" => self.max_iter = param_count(name, value)?,
            "tol" => self.tol = param_positive(name, value)?,
            "alpha_1" => self.alpha_1 = param_positive(name, value)?,
            "alpha_2" => self.alpha_2 = param_positive(name, value)?,
            "lambda_1" => self.lambda_1 = param_positive(name, value)?,
            "lambda_2" => self.lambda_2 = param_positive(name, value)?,
            "fit_intercept" => self.fit_intercept = param_flag(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Posterior mean and covariance for the current precisions.
    fn posterior(
        xtx: &Array2<f64>,
        xty: &Array1<f64>,
        alpha: f64,
        lambda: f64,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let p = xtx.nrows();
        let precision = xtx * alpha + &(Array2::<f64>::eye(p) * lambda);
        let sigma = matrix_inverse(&precision).ok_or_else(|| {
            BenchError::DegenerateComputation("posterior precision is singular".to_string())
        })?;
        let coef = sigma.dot(xty) * alpha;
        Ok((coef, sigma))
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let (xc, yc, x_mean, y_mean) = if self.fit_intercept {
            center(x, y)
        } else {
            (x.clone(), y.clone(), Array1::zeros(x.ncols()), 0.0)
        };
        let n = xc.nrows() as f64;
        let p = xc.ncols() as f64;

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);

        let variance = yc.mapv(|v| v * v).sum() / n;
        let mut alpha = 1.0 / (variance + f64::EPSILON);
        let mut lambda = 1.0;
        let mut previous: Option<Array1<f64>> = None;

        for _ in 0..self.max_iter {
            let (coef, sigma) = Self::posterior(&xtx, &xty, alpha, lambda)?;
            let residual = &yc - &xc.dot(&coef);
            let rss = residual.mapv(|v| v * v).sum();

            // Effective number of well-determined parameters
            let gamma = p - lambda * sigma.diag().sum();
            lambda = (gamma + 2.0 * self.lambda_1)
                / (coef.mapv(|v| v * v).sum() + 2.0 * self.lambda_2);
            alpha = (n - gamma + 2.0 * self.alpha_1) / (rss + 2.0 * self.alpha_2);

            let converged = previous
                .as_ref()
                .is_some_and(|prev| (prev - &coef).mapv(f64::abs).sum() < self.tol);
            previous = Some(coef);
            if converged {
                break;
            }
        }

        let (coefficients, _) = Self::posterior(&xtx, &xty, alpha, lambda)?;
        let intercept = y_mean - coefficients.dot(&x_mean);

        self.alpha = alpha;
        self.lambda = lambda;
        self.fitted = Some(LinearFit {
            coefficients,
            intercept,
        });
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(BenchError::NotFitted)?.predict(x)
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    /// Estimated noise and weight precisions.
    pub fn precisions(&self) -> (f64, f64) {
        (self.alpha, self.lambda)
    }
}

// ============================================================================
// Random forest
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree stored as a node arena, root at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct TreeLimits {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

impl RegressionTree {
    fn fit(x: &Array2<f64>, y: &Array1<f64>, indices: Vec<usize>, limits: &TreeLimits) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, indices, 0, limits);
        tree
    }

    /// Append the subtree for `indices` and return its node index.
    fn grow(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: Vec<usize>,
        depth: usize,
        limits: &TreeLimits,
    ) -> usize {
        let node_idx = self.nodes.len();
        let n = indices.len();
        let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n.max(1) as f64;
        self.nodes.push(TreeNode::Leaf { value });

        let is_pure = indices.windows(2).all(|w| y[w[0]] == y[w[1]]);
        let stop = n < limits.min_samples_split
            || n < 2 * limits.min_samples_leaf
            || limits.max_depth.is_some_and(|d| depth >= d)
            || is_pure;
        if stop {
            return node_idx;
        }

        let Some((feature, threshold)) = best_split(x, y, &indices, limits.min_samples_leaf)
        else {
            return node_idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[[i, feature]] <= threshold);

        let left = self.grow(x, y, left_rows, depth + 1, limits);
        let right = self.grow(x, y, right_rows, depth + 1, limits);
        self.nodes[node_idx] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_idx
    }

    fn predict_row(&self, row: ndarray::ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Best variance-reducing split over every feature, as `(feature, threshold)`.
///
/// Children sums of squares are compared through `sum² / count`, which is
/// maximised exactly where the total within-child squared error is minimised.
fn best_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..x.ncols() {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        for split in 1..n {
            left_sum += y[order[split - 1]];
            let lo = x[[order[split - 1], feature]];
            let hi = x[[order[split], feature]];
            if lo == hi || split < min_samples_leaf || n - split < min_samples_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / split as f64
                + right_sum * right_sum / (n - split) as f64;
            if score > parent_score + 1e-12 && best.is_none_or(|(_, _, s)| score > s) {
                best = Some((feature, (lo + hi) / 2.0, score));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Bagged CART regression trees, every feature considered at each split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure or too small.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub random_state: Option<u64>,
    trees: Vec<RegressionTree>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: None,
            trees: Vec::new(),
        }
    }
}

impl RandomForestRegressor {
    fn set_param(&mut self, name: &str, value: f64) -> Result<bool> {
        match name {
            "n_estimators" => self.n_estimators = param_count(name, value)?,
            "max_depth" => {
                self.max_depth = match param_index(name, value)? {
                    0 => None,
                    depth => Some(depth as usize),
                }
            }
            "min_samples_split" => self.min_samples_split = param_count(name, value)?.max(2),
            "min_samples_leaf" => self.min_samples_leaf = param_count(name, value)?,
            "random_state" => self.random_state = Some(param_index(name, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let limits = TreeLimits {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        };
        let base_seed = self.random_state.unwrap_or(0);

        self.trees = (0..self.n_estimators)
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                RegressionTree::fit(x, y, bootstrap, &limits)
            })
            .collect();

        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(BenchError::NotFitted);
        }
        let n_trees = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }
}
