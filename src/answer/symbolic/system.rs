//! Numeric solving of equation systems for one goal variable.
//!
//! Every equation is held in residual form (`expr = 0`). Solving alternates
//! two strategies until the goal is known or no progress is made:
//! - substitution: an equation with one unknown left is solved directly
//!   (closed form when affine, bracketed root search otherwise)
//! - elimination: the affine equations with several unknowns are reduced
//!   with Gauss-Jordan and every fully determined variable is taken
//!
//! An equation whose unknowns are all known must evaluate to zero; otherwise
//! the system is inconsistent and has no solution.

use super::expr::Expr;
use std::collections::{BTreeSet, HashMap};

/// Zero threshold for pivots and coefficients.
const EPS: f64 = 1e-9;

/// Relative tolerance for residual and linearity checks.
const REL_TOL: f64 = 1e-7;

/// Sample points for affinity checks; chosen to avoid common poles.
const SAMPLE_POINTS: [f64; 3] = [2.0, -3.5, 7.25];

/// Solve `system` for `goal`.
///
/// Returns `None` when the system is inconsistent or leaves the goal
/// undetermined.
pub fn solve_for(system: &[Expr], goal: &str) -> Option<f64> {
    let vars: Vec<BTreeSet<String>> = system.iter().map(Expr::variables).collect();
    let mut known: HashMap<String, f64> = HashMap::new();

    loop {
        let mut progressed = false;

        for (eq, eq_vars) in system.iter().zip(&vars) {
            let unknown: Vec<&String> = eq_vars.iter().filter(|v| !known.contains_key(*v)).collect();
            match unknown.as_slice() {
                [] => {
                    if !is_satisfied(eq, &known) {
                        return None;
                    }
                }
                [var] => {
                    if let Some(root) = solve_single(eq, &known, var) {
                        known.insert((*var).clone(), root);
                        progressed = true;
                    }
                }
                _ => {}
            }
        }

        if let Some(&value) = known.get(goal) {
            return Some(value);
        }

        if !progressed && !eliminate(system, &vars, &mut known)? {
            return None;
        }
    }
}

/// Solve a single expression for its only unknown, `var`.
pub fn solve_univariate(expr: &Expr, var: &str) -> Option<f64> {
    solve_single(expr, &HashMap::new(), var)
}

fn is_satisfied(eq: &Expr, known: &HashMap<String, f64>) -> bool {
    let scale = 1.0 + known.values().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    eq.eval(known)
        .is_some_and(|residual| residual.abs() <= REL_TOL * scale)
}

/// Residual of `eq` as a function of `var`, other variables fixed.
fn univariate<'a>(
    eq: &'a Expr,
    known: &'a HashMap<String, f64>,
    var: &'a str,
) -> impl Fn(f64) -> Option<f64> + 'a {
    move |t| {
        let mut env = known.clone();
        env.insert(var.to_string(), t);
        eq.eval(&env)
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= REL_TOL * (1.0 + a.abs().max(b.abs()))
}

fn solve_single(eq: &Expr, known: &HashMap<String, f64>, var: &str) -> Option<f64> {
    let f = univariate(eq, known, var);

    if let Some((intercept, slope)) = affine_1d(&f) {
        if slope.abs() <= EPS {
            return None;
        }
        let root = -intercept / slope;
        return root.is_finite().then_some(root);
    }

    smallest_root(&f)
}

/// `(f(0), slope)` when `f` is affine on the sample points.
fn affine_1d(f: &impl Fn(f64) -> Option<f64>) -> Option<(f64, f64)> {
    let f0 = f(0.0)?;
    let slope = f(1.0)? - f0;
    SAMPLE_POINTS
        .iter()
        .all(|&t| f(t).is_some_and(|ft| close(ft, f0 + slope * t)))
        .then_some((f0, slope))
}

/// Smallest real root found by sign-change bracketing over a log grid.
fn smallest_root(f: &impl Fn(f64) -> Option<f64>) -> Option<f64> {
    let mut grid: Vec<f64> = vec![0.0];
    for exp in -3..=7 {
        for mantissa in [1.0, 2.0, 5.0] {
            let t = mantissa * 10f64.powi(exp);
            grid.push(t);
            grid.push(-t);
        }
    }
    grid.sort_by(f64::total_cmp);

    let samples: Vec<(f64, Option<f64>)> = grid.iter().map(|&t| (t, f(t))).collect();

    for window in samples.windows(2) {
        let (a, fa) = window[0];
        let (b, fb) = window[1];
        let (Some(fa), Some(fb)) = (fa, fb) else {
            continue;
        };
        if fa == 0.0 {
            return Some(a);
        }
        if fa.signum() != fb.signum() {
            if let Some(root) = bisect(f, a, b, fa) {
                return Some(root);
            }
        }
    }

    if let Some(&(t, Some(ft))) = samples.last() {
        if ft == 0.0 {
            return Some(t);
        }
    }

    newton_from_best(f, &samples)
}

fn bisect(f: &impl Fn(f64) -> Option<f64>, mut a: f64, mut b: f64, mut fa: f64) -> Option<f64> {
    for _ in 0..200 {
        let mid = 0.5 * (a + b);
        let fm = f(mid)?;
        if fm == 0.0 {
            return Some(mid);
        }
        if fm.signum() == fa.signum() {
            a = mid;
            fa = fm;
        } else {
            b = mid;
        }
        if (b - a).abs() <= f64::EPSILON * (1.0 + a.abs()) {
            break;
        }
    }
    let root = 0.5 * (a + b);
    // A sign change across a pole is not a root.
    f(root)
        .is_some_and(|v| v.abs() <= REL_TOL * (1.0 + root.abs()))
        .then_some(root)
}

/// Newton iteration for touching roots such as `(x - 3)^2`.
fn newton_from_best(f: &impl Fn(f64) -> Option<f64>, samples: &[(f64, Option<f64>)]) -> Option<f64> {
    let (mut x, _) = samples
        .iter()
        .filter_map(|&(t, ft)| ft.map(|v| (t, v.abs())))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    for _ in 0..100 {
        let fx = f(x)?;
        if fx.abs() <= EPS * (1.0 + x.abs()) {
            return Some(x);
        }
        let h = 1e-6 * (1.0 + x.abs());
        let derivative = (f(x + h)? - f(x - h)?) / (2.0 * h);
        if derivative.abs() <= f64::EPSILON {
            return None;
        }
        x -= fx / derivative;
        if !x.is_finite() {
            return None;
        }
    }
    None
}

/// Gauss-Jordan over the affine equations with several unknowns.
///
/// Returns `Some(true)` when a new variable was determined, `Some(false)` when
/// nothing could be, and `None` when the affine block is inconsistent.
fn eliminate(
    system: &[Expr],
    vars: &[BTreeSet<String>],
    known: &mut HashMap<String, f64>,
) -> Option<bool> {
    let unknowns: Vec<String> = vars
        .iter()
        .flatten()
        .filter(|v| !known.contains_key(*v))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if unknowns.is_empty() {
        return Some(false);
    }
    let column: HashMap<&str, usize> = unknowns
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (eq, eq_vars) in system.iter().zip(vars) {
        let local: Vec<&String> = eq_vars.iter().filter(|v| !known.contains_key(*v)).collect();
        if local.len() < 2 {
            continue;
        }
        if let Some((constant, coefficients)) = affine_nd(eq, known, &local) {
            let mut row = vec![0.0; unknowns.len() + 1];
            for (var, coefficient) in local.iter().zip(coefficients) {
                row[column[var.as_str()]] = coefficient;
            }
            row[unknowns.len()] = -constant;
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Some(false);
    }

    let pivots = reduce(&mut rows, unknowns.len())?;

    let mut determined = false;
    for (row, &pivot_col) in rows.iter().zip(&pivots) {
        let free = (0..unknowns.len())
            .filter(|&c| c != pivot_col && !pivots.contains(&c))
            .any(|c| row[c].abs() > EPS);
        if !free {
            known.insert(unknowns[pivot_col].clone(), row[unknowns.len()]);
            determined = true;
        }
    }
    Some(determined)
}

/// `(constant, coefficients)` when `eq` is affine in `local` unknowns.
fn affine_nd(
    eq: &Expr,
    known: &HashMap<String, f64>,
    local: &[&String],
) -> Option<(f64, Vec<f64>)> {
    let eval_at = |point: &[f64]| {
        let mut env = known.clone();
        for (var, &value) in local.iter().zip(point) {
            env.insert((*var).clone(), value);
        }
        eq.eval(&env)
    };

    let origin = vec![0.0; local.len()];
    let constant = eval_at(&origin)?;
    let mut coefficients = Vec::with_capacity(local.len());
    for i in 0..local.len() {
        let mut unit = origin.clone();
        unit[i] = 1.0;
        coefficients.push(eval_at(&unit)? - constant);
    }

    for &scale in &SAMPLE_POINTS {
        let point: Vec<f64> = (0..local.len())
            .map(|i| scale * (1.0 + 0.37 * i as f64))
            .collect();
        let expected = constant
            + coefficients
                .iter()
                .zip(&point)
                .map(|(c, x)| c * x)
                .sum::<f64>();
        if !close(eval_at(&point)?, expected) {
            return None;
        }
    }

    Some((constant, coefficients))
}

/// Reduce the augmented matrix in place to reduced row echelon form.
///
/// Returns the pivot column of each remaining row, or `None` when a row
/// reduces to `0 = c` with `c != 0`.
fn reduce(rows: &mut Vec<Vec<f64>>, width: usize) -> Option<Vec<usize>> {
    let mut pivots = Vec::new();
    let mut rank = 0;

    for col in 0..width {
        let Some(best) = (rank..rows.len())
            .filter(|&r| rows[r][col].abs() > EPS)
            .max_by(|&a, &b| rows[a][col].abs().total_cmp(&rows[b][col].abs()))
        else {
            continue;
        };
        rows.swap(rank, best);

        let pivot = rows[rank][col];
        for value in rows[rank].iter_mut() {
            *value /= pivot;
        }

        for r in 0..rows.len() {
            if r == rank {
                continue;
            }
            let factor = rows[r][col];
            if factor.abs() <= EPS {
                continue;
            }
            for c in 0..=width {
                let delta = factor * rows[rank][c];
                rows[r][c] -= delta;
            }
        }

        pivots.push(col);
        rank += 1;
        if rank == rows.len() {
            break;
        }
    }

    for row in &rows[rank..] {
        if row[width].abs() > REL_TOL {
            return None;
        }
    }
    rows.truncate(rank);
    Some(pivots)
}
