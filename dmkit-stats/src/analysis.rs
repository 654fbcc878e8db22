//! Binding of a weighted [`Sample`] to the columns a distribution is fitted on.
//!
//! An [`Analysis`] owns its sample and borrows its columns from the dataset.
//! Distributions never store one: it is passed to every estimation and
//! per-row density call, and [`Analysis::with_sample`] rebinds the same
//! columns to a reweighted sample (one mixture component's posterior mass).

use dmkit_core::{
    BoolColumn, DmError, IntColumn, Named, NominalColumn, RealColumn, Result, Sample,
};

/// The column(s) an [`Analysis`] reads.
#[derive(Debug, Clone)]
pub enum Variable<'a> {
    Real(&'a RealColumn),
    Integer(&'a IntColumn),
    Boolean(&'a BoolColumn),
    Nominal(&'a NominalColumn),
    /// Ordered real columns forming a feature space.
    Space(Vec<&'a RealColumn>),
}

impl<'a> Variable<'a> {
    fn len(&self) -> Option<usize> {
        match self {
            Variable::Real(c) => Some(c.len()),
            Variable::Integer(c) => Some(c.len()),
            Variable::Boolean(c) => Some(c.len()),
            Variable::Nominal(c) => Some(c.len()),
            Variable::Space(cols) => cols.first().map(|c| c.len()),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Variable::Real(_) => "real",
            Variable::Integer(_) => "integer",
            Variable::Boolean(_) => "boolean",
            Variable::Nominal(_) => "nominal",
            Variable::Space(_) => "space",
        }
    }
}

/// A sample together with the column(s) it weights.
#[derive(Debug, Clone)]
pub struct Analysis<'a> {
    sample: Sample,
    variable: Variable<'a>,
}

impl<'a> Analysis<'a> {
    /// # Errors
    ///
    /// Returns an error if a column length differs from the sample length,
    /// or a space is empty or has columns of different lengths.
    pub fn new(sample: Sample, variable: Variable<'a>) -> Result<Self> {
        if let Variable::Space(cols) = &variable {
            if cols.is_empty() {
                return Err(DmError::InvalidInput("analysis: empty space".into()));
            }
            for (i, c) in cols.iter().enumerate() {
                if cols[..i].iter().any(|o| o.name() == c.name()) {
                    return Err(DmError::DuplicateColumn(c.name().to_string()));
                }
            }
            if let Some(bad) = cols.iter().find(|c| c.len() != sample.len()) {
                return Err(DmError::DimensionMismatch {
                    expected: sample.len(),
                    found: bad.len(),
                });
            }
        }
        let len = variable.len().unwrap_or(0);
        if len != sample.len() {
            return Err(DmError::DimensionMismatch {
                expected: sample.len(),
                found: len,
            });
        }
        Ok(Self { sample, variable })
    }

    pub fn real(sample: Sample, column: &'a RealColumn) -> Result<Self> {
        Self::new(sample, Variable::Real(column))
    }

    pub fn integer(sample: Sample, column: &'a IntColumn) -> Result<Self> {
        Self::new(sample, Variable::Integer(column))
    }

    pub fn boolean(sample: Sample, column: &'a BoolColumn) -> Result<Self> {
        Self::new(sample, Variable::Boolean(column))
    }

    pub fn nominal(sample: Sample, column: &'a NominalColumn) -> Result<Self> {
        Self::new(sample, Variable::Nominal(column))
    }

    pub fn space(sample: Sample, columns: Vec<&'a RealColumn>) -> Result<Self> {
        Self::new(sample, Variable::Space(columns))
    }

    /// Same columns, different weights.
    pub fn with_sample(&self, sample: Sample) -> Result<Analysis<'a>> {
        Self::new(sample, self.variable.clone())
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn variable(&self) -> &Variable<'a> {
        &self.variable
    }

    pub fn n_rows(&self) -> usize {
        self.sample.len()
    }

    /// Number of coordinates per row: 1, or the width of a space.
    pub fn dim(&self) -> usize {
        match &self.variable {
            Variable::Space(cols) => cols.len(),
            _ => 1,
        }
    }

    /// Names of the columns, in order.
    pub fn column_names(&self) -> Vec<&str> {
        match &self.variable {
            Variable::Real(c) => vec![c.name()],
            Variable::Integer(c) => vec![c.name()],
            Variable::Boolean(c) => vec![c.name()],
            Variable::Nominal(c) => vec![c.name()],
            Variable::Space(cols) => cols.iter().map(|c| c.name()).collect(),
        }
    }

    fn wrong(&self, wanted: &str) -> DmError {
        DmError::InvalidInput(format!(
            "analysis over {} column cannot supply {} values",
            self.variable.describe(),
            wanted
        ))
    }

    /// Real value of `row`; integers and booleans (as 0/1) convert.
    pub fn real_value(&self, row: usize) -> Result<Option<f64>> {
        match &self.variable {
            Variable::Real(c) => Ok(c.get(row)),
            Variable::Integer(c) => Ok(c.get(row).map(|v| v as f64)),
            Variable::Boolean(c) => Ok(c.get(row).map(|b| if b { 1.0 } else { 0.0 })),
            Variable::Space(cols) if cols.len() == 1 => Ok(cols[0].get(row)),
            _ => Err(self.wrong("real")),
        }
    }

    /// Integer value of `row`; integral reals and booleans convert.
    pub fn integer_value(&self, row: usize) -> Result<Option<i64>> {
        match &self.variable {
            Variable::Integer(c) => Ok(c.get(row)),
            Variable::Boolean(c) => Ok(c.get(row).map(i64::from)),
            Variable::Real(c) => match c.get(row) {
                None => Ok(None),
                Some(x) if x.fract() == 0.0 && x.abs() < 9.0e15 => Ok(Some(x as i64)),
                Some(x) => Err(DmError::InvalidInput(format!(
                    "column {}: value {} at row {} is not an integer",
                    c.name(),
                    x,
                    row
                ))),
            },
            _ => Err(self.wrong("integer")),
        }
    }

    /// Boolean value of `row`; integers 0/1 convert.
    pub fn boolean_value(&self, row: usize) -> Result<Option<bool>> {
        match &self.variable {
            Variable::Boolean(c) => Ok(c.get(row)),
            Variable::Integer(c) => match c.get(row) {
                None => Ok(None),
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                Some(v) => Err(DmError::InvalidInput(format!(
                    "column {}: value {} at row {} is not boolean",
                    c.name(),
                    v,
                    row
                ))),
            },
            _ => Err(self.wrong("boolean")),
        }
    }

    /// Category index of `row`.
    pub fn category(&self, row: usize) -> Result<Option<usize>> {
        match &self.variable {
            Variable::Nominal(c) => Ok(c.get(row)),
            _ => Err(self.wrong("category")),
        }
    }

    pub fn n_categories(&self) -> Result<usize> {
        match &self.variable {
            Variable::Nominal(c) => Ok(c.n_categories()),
            _ => Err(self.wrong("category")),
        }
    }

    /// Write the coordinates of `row` into `out` (`None` for missing cells).
    pub fn fill_vector(&self, row: usize, out: &mut [Option<f64>]) -> Result<()> {
        if out.len() != self.dim() {
            return Err(DmError::DimensionMismatch {
                expected: self.dim(),
                found: out.len(),
            });
        }
        match &self.variable {
            Variable::Space(cols) => {
                for (o, c) in out.iter_mut().zip(cols) {
                    *o = c.get(row);
                }
                Ok(())
            }
            _ => {
                out[0] = self.real_value(row)?;
                Ok(())
            }
        }
    }

    /// Coordinates of `row` as a fresh vector.
    pub fn vector(&self, row: usize) -> Result<Vec<Option<f64>>> {
        let mut out = vec![None; self.dim()];
        self.fill_vector(row, &mut out)?;
        Ok(out)
    }

    /// `(value, weight)` of every positively weighted row with a real value.
    pub fn weighted_reals(&self) -> Result<Vec<(f64, f64)>> {
        let mut out = Vec::with_capacity(self.sample.effective_count());
        for (row, w) in self.sample.iter() {
            if let Some(x) = self.real_value(row)? {
                out.push((x, w));
            }
        }
        Ok(out)
    }
}
