//! Penalized least squares
//!
//! Solves `(XᵀX + Λ) β = Xᵀy` where `Λ` is a diagonal matrix of per-column
//! penalties. Each penalty plays the role of a Gaussian prior on the matching
//! coefficient: a small penalty leaves the coefficient free, a large one pulls
//! it towards zero.

use crate::{MathError, Result};

/// Diagonal jitter added to every pivot so unpenalized columns stay solvable
const JITTER: f64 = 1e-10;

/// Ridge regression with one penalty per design column
#[derive(Debug, Clone)]
pub struct RidgeRegression {
    penalties: Vec<f64>,
}

impl RidgeRegression {
    /// Create a solver for a design matrix with `penalties.len()` columns
    pub fn new(penalties: Vec<f64>) -> Result<Self> {
        if penalties.is_empty() {
            return Err(MathError::InvalidInput(
                "Design matrix must have at least one column".to_string(),
            ));
        }
        if penalties.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(MathError::InvalidInput(
                "Penalties must be finite and non-negative".to_string(),
            ));
        }

        Ok(Self { penalties })
    }

    /// Number of design columns this solver expects
    pub fn columns(&self) -> usize {
        self.penalties.len()
    }

    /// Fit coefficients for the given design rows and targets
    pub fn fit(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<Vec<f64>> {
        let p = self.penalties.len();

        if rows.is_empty() {
            return Err(MathError::InsufficientData(
                "No rows in design matrix".to_string(),
            ));
        }
        if rows.len() != targets.len() {
            return Err(MathError::InvalidInput(format!(
                "Design rows ({}) and targets ({}) differ in length",
                rows.len(),
                targets.len()
            )));
        }

        let mut gram = vec![vec![0.0; p]; p];
        let mut moment = vec![0.0; p];

        for (row, &y) in rows.iter().zip(targets) {
            if row.len() != p {
                return Err(MathError::InvalidInput(format!(
                    "Design row has {} columns, expected {}",
                    row.len(),
                    p
                )));
            }
            if !y.is_finite() || row.iter().any(|x| !x.is_finite()) {
                return Err(MathError::CalculationError(
                    "Design matrix or targets contain non-finite values".to_string(),
                ));
            }
            for i in 0..p {
                if row[i] == 0.0 {
                    continue;
                }
                moment[i] += row[i] * y;
                for j in i..p {
                    gram[i][j] += row[i] * row[j];
                }
            }
        }

        for i in 0..p {
            for j in 0..i {
                gram[i][j] = gram[j][i];
            }
            gram[i][i] += self.penalties[i] + JITTER;
        }

        let coefficients = cholesky_solve(gram, moment)?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(MathError::CalculationError(
                "Solver produced non-finite coefficients".to_string(),
            ));
        }

        Ok(coefficients)
    }
}

/// Solve `A x = b` for a symmetric positive definite `A`
pub fn cholesky_solve(mut a: Vec<Vec<f64>>, b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(MathError::InvalidInput(
            "Matrix must be square and match the right-hand side".to_string(),
        ));
    }

    // In-place lower-triangular factor L with A = L Lᵀ
    for j in 0..n {
        let mut diag = a[j][j];
        for k in 0..j {
            diag -= a[j][k] * a[j][k];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return Err(MathError::NotPositiveDefinite { pivot: j });
        }
        let diag = diag.sqrt();
        a[j][j] = diag;

        for i in (j + 1)..n {
            let mut value = a[i][j];
            for k in 0..j {
                value -= a[i][k] * a[j][k];
            }
            a[i][j] = value / diag;
        }
    }

    // Forward substitution: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut value = b[i];
        for k in 0..i {
            value -= a[i][k] * z[k];
        }
        z[i] = value / a[i][i];
    }

    // Back substitution: Lᵀ x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut value = z[i];
        for k in (i + 1)..n {
            value -= a[k][i] * x[k];
        }
        x[i] = value / a[i][i];
    }

    Ok(x)
}
