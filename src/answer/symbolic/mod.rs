//! Solving of extracted equation sets for their goal variable.
//!
//! `solve` works through a fixed sequence of stages and reports the first
//! failure as a [`FailureTag`]; callers canonicalize a failed solve to `"bug"`.

pub mod expr;
pub mod rename;
pub mod system;

pub use expr::{BinOp, Expr, ParseError};
pub use rename::{RenameError, VariableMapping, simplify_variables};
pub use system::{solve_for, solve_univariate};

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Why a solve produced no number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureTag {
    #[serde(rename = "invalid equations")]
    InvalidEquations,
    #[serde(rename = "no goal found")]
    NoGoalFound,
    #[serde(rename = "no solution")]
    NoSolution,
    #[serde(rename = "bug")]
    Bug,
}

impl FailureTag {
    pub const ALL: [FailureTag; 4] = [
        FailureTag::InvalidEquations,
        FailureTag::NoGoalFound,
        FailureTag::NoSolution,
        FailureTag::Bug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureTag::InvalidEquations => "invalid equations",
            FailureTag::NoGoalFound => "no goal found",
            FailureTag::NoSolution => "no solution",
            FailureTag::Bug => "bug",
        }
    }
}

impl fmt::Display for FailureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Solve a comma-separated equation set for the variable asked for last.
///
/// The last equation names the goal (`x = ?`). A literal `nan` input yields
/// `NaN`, which callers canonicalize like any other non-finite value.
pub fn solve(equations: &str) -> Result<f64, FailureTag> {
    let result = solve_staged(equations);
    if let Err(tag) = &result {
        debug!(equations = %equations, tag = %tag, "Equation set not solved");
    }
    result
}

fn solve_staged(equations: &str) -> Result<f64, FailureTag> {
    if equations.trim() == "nan" {
        return Ok(f64::NAN);
    }

    let (renamed, _) = simplify_variables(equations).map_err(|e| {
        debug!(error = %e, "Variable renaming failed");
        FailureTag::InvalidEquations
    })?;

    if has_letter_run(&renamed) {
        return Err(FailureTag::InvalidEquations);
    }

    let equation_list: Vec<&str> = renamed.split(',').collect();
    let last = equation_list.last().copied().unwrap_or_default();
    let last_lhs = lhs(last);

    let mut working: Vec<Expr> = Vec::new();
    let goal = if (!last_lhs.is_empty() && last_lhs.chars().all(char::is_alphabetic))
        || last_lhs.chars().count() == 2
    {
        Some(last_lhs.to_string())
    } else if last.contains('=') {
        let goal = unused_letter(last).ok_or(FailureTag::InvalidEquations)?;
        let expression = Expr::residual(Expr::Var(goal.to_string()), parse(last_lhs)?);
        if expression.variables().len() == 1 {
            if let Some(value) = solve_univariate(&expression, &goal.to_string()) {
                return Ok(value);
            }
        }
        working.push(expression);
        Some(goal.to_string())
    } else {
        None
    };

    if let [only] = equation_list.as_slice() {
        return solve_single(only, goal.as_deref());
    }

    let goal = goal.ok_or(FailureTag::NoGoalFound)?;

    for equation in &equation_list[..equation_list.len() - 1] {
        if equation.contains('?') {
            continue;
        }
        let mut sides = equation.split('=');
        let lhs_text = sides.next().unwrap_or_default();
        let rhs_text = sides.next().ok_or(FailureTag::InvalidEquations)?;
        working.push(Expr::residual(parse(lhs_text)?, parse(rhs_text)?));

        if let Some(value) = solve_for(&working, &goal) {
            return Ok(value);
        }
    }

    Err(FailureTag::NoSolution)
}

/// A lone equation: the closed-form value of its left side, or failing that
/// the equation solved for the goal.
fn solve_single(equation: &str, goal: Option<&str>) -> Result<f64, FailureTag> {
    let left = parse(lhs(equation))?;
    if let Some(value) = left.constant() {
        return Ok(value);
    }
    if left.variables().is_empty() {
        debug!(equation = %equation, "Closed-form value is not finite");
        return Err(FailureTag::Bug);
    }

    let goal = goal.ok_or(FailureTag::InvalidEquations)?;
    let right = equation
        .split('=')
        .nth(1)
        .ok_or(FailureTag::InvalidEquations)
        .and_then(parse)?;
    solve_for(&[Expr::residual(left, right)], goal).ok_or(FailureTag::InvalidEquations)
}

fn lhs(equation: &str) -> &str {
    equation.split('=').next().unwrap_or_default().trim()
}

fn parse(text: &str) -> Result<Expr, FailureTag> {
    Expr::parse(text.trim()).map_err(|e| {
        debug!(text = %text, error = %e, "Equation parse failed");
        FailureTag::InvalidEquations
    })
}

/// Three alphabetic characters in a row survive renaming only as garbage.
fn has_letter_run(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    chars
        .windows(3)
        .any(|w| w.iter().all(|c| c.is_alphabetic()))
}

fn unused_letter(text: &str) -> Option<char> {
    ('a'..='z').chain('A'..='Z').find(|&c| !text.contains(c))
}
