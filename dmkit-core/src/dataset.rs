//! In-memory tabular dataset: named rows with weights and typed columns.
//!
//! Every column stores `Option<T>` per row; `None` is the missing value for
//! all column types. Derived columns produced by the fitting code are added
//! through [`Dataset::add_column`].

use crate::{DmError, Named, Result, Sample};

// ── Real columns ───────────────────────────────────────────────────────────

/// Value domain of a real column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RealKind {
    /// Any finite real.
    Real,
    /// Finite and >= 0.
    Positive,
    /// In [0, 1].
    Probability,
}

impl RealKind {
    fn admits(self, x: f64) -> bool {
        x.is_finite()
            && match self {
                RealKind::Real => true,
                RealKind::Positive => x >= 0.0,
                RealKind::Probability => (0.0..=1.0).contains(&x),
            }
    }
}

/// A real-valued column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RealColumn {
    name: String,
    kind: RealKind,
    values: Vec<Option<f64>>,
}

impl RealColumn {
    /// A column of `n_rows` missing values.
    pub fn new(name: impl Into<String>, kind: RealKind, n_rows: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            values: vec![None; n_rows],
        }
    }

    /// # Errors
    ///
    /// Returns an error if a value lies outside `kind`.
    pub fn from_values(
        name: impl Into<String>,
        kind: RealKind,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        let mut col = Self::new(name, kind, 0);
        col.values.reserve(values.len());
        for v in values {
            col.check(v)?;
            col.values.push(v);
        }
        Ok(col)
    }

    /// Build a [`RealKind::Real`] column without missing values.
    pub fn from_reals(name: impl Into<String>, values: &[f64]) -> Result<Self> {
        Self::from_values(name, RealKind::Real, values.iter().map(|&x| Some(x)).collect())
    }

    fn check(&self, v: Option<f64>) -> Result<()> {
        match v {
            Some(x) if !self.kind.admits(x) => Err(DmError::InvalidInput(format!(
                "column {}: value {} is not {:?}",
                self.name, x, self.kind
            ))),
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> RealKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `row`, `None` when missing.
    pub fn get(&self, row: usize) -> Option<f64> {
        self.values[row]
    }

    pub fn is_missing(&self, row: usize) -> bool {
        self.values[row].is_none()
    }

    pub fn set(&mut self, row: usize, value: Option<f64>) -> Result<()> {
        self.check(value)?;
        self.values[row] = value;
        Ok(())
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }
}

impl Named for RealColumn {
    fn name(&self) -> &str {
        &self.name
    }
}

// ── Integer and boolean columns ────────────────────────────────────────────

/// An integer-valued column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntColumn {
    name: String,
    values: Vec<Option<i64>>,
}

impl IntColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<i64> {
        self.values[row]
    }

    pub fn set(&mut self, row: usize, value: Option<i64>) {
        self.values[row] = value;
    }
}

impl Named for IntColumn {
    fn name(&self) -> &str {
        &self.name
    }
}

/// An extended-boolean column (true / false / missing).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoolColumn {
    name: String,
    values: Vec<Option<bool>>,
}

impl BoolColumn {
    pub fn new(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<bool> {
        self.values[row]
    }

    pub fn set(&mut self, row: usize, value: Option<bool>) {
        self.values[row] = value;
    }
}

impl Named for BoolColumn {
    fn name(&self) -> &str {
        &self.name
    }
}

// ── Nominal columns ────────────────────────────────────────────────────────

/// A categorical column: 0-based category indices plus the category names.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NominalColumn {
    name: String,
    categories: Vec<String>,
    values: Vec<Option<usize>>,
}

impl NominalColumn {
    /// A column of `n_rows` missing values with no categories.
    pub fn new(name: impl Into<String>, n_rows: usize) -> Self {
        Self {
            name: name.into(),
            categories: Vec::new(),
            values: vec![None; n_rows],
        }
    }

    /// Build from category labels, assigning indices in order of first
    /// appearance.
    pub fn from_labels<S: AsRef<str>>(name: impl Into<String>, labels: &[Option<S>]) -> Self {
        let mut col = Self::new(name, labels.len());
        for (row, label) in labels.iter().enumerate() {
            if let Some(label) = label {
                let idx = col.category_index(label.as_ref());
                col.values[row] = Some(idx);
            }
        }
        col
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }

    /// Index of the category called `name`, adding it if absent.
    pub fn category_index(&mut self, name: &str) -> usize {
        match self.categories.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                self.categories.push(name.to_string());
                self.categories.len() - 1
            }
        }
    }

    pub fn find_category(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize) -> Option<usize> {
        self.values[row]
    }

    pub fn label(&self, row: usize) -> Option<&str> {
        self.values[row].map(|i| self.categories[i].as_str())
    }

    /// # Errors
    ///
    /// Returns an error if `value` is not a known category index.
    pub fn set(&mut self, row: usize, value: Option<usize>) -> Result<()> {
        if let Some(i) = value {
            if i >= self.categories.len() {
                return Err(DmError::InvalidInput(format!(
                    "column {}: category index {} out of {}",
                    self.name,
                    i,
                    self.categories.len()
                )));
            }
        }
        self.values[row] = value;
        Ok(())
    }

    /// Drop categories no row refers to, renumbering the rest.
    pub fn delete_empty_categories(&mut self) {
        let mut used = vec![false; self.categories.len()];
        for v in self.values.iter().flatten() {
            used[*v] = true;
        }
        let mut remap = vec![usize::MAX; self.categories.len()];
        let mut kept = Vec::new();
        for (i, name) in self.categories.drain(..).enumerate() {
            if used[i] {
                remap[i] = kept.len();
                kept.push(name);
            }
        }
        self.categories = kept;
        for v in self.values.iter_mut().flatten() {
            *v = remap[*v];
        }
    }

    /// # Errors
    ///
    /// Returns an error if the new names are not one per category or collide.
    pub fn rename_categories(&mut self, names: Vec<String>) -> Result<()> {
        if names.len() != self.categories.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.categories.len(),
                found: names.len(),
            });
        }
        for (i, n) in names.iter().enumerate() {
            if names[..i].contains(n) {
                return Err(DmError::InvalidInput(format!(
                    "column {}: duplicate category {}",
                    self.name, n
                )));
            }
        }
        self.categories = names;
        Ok(())
    }
}

impl Named for NominalColumn {
    fn name(&self) -> &str {
        &self.name
    }
}

// ── Two-way attributes ─────────────────────────────────────────────────────

/// An `n × n` real attribute over pairs of rows (distances, similarities).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PairMatrix {
    name: String,
    positive: bool,
    n: usize,
    values: Vec<Option<f64>>,
}

impl PairMatrix {
    /// All-missing matrix over `n` rows.
    pub fn new(name: impl Into<String>, n: usize, positive: bool) -> Self {
        Self {
            name: name.into(),
            positive,
            n,
            values: vec![None; n * n],
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn is_positive(&self) -> bool {
        self.positive
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values[i * self.n + j]
    }

    /// # Errors
    ///
    /// Returns an error for non-finite values, or negative values in a
    /// positive matrix.
    pub fn set(&mut self, i: usize, j: usize, value: Option<f64>) -> Result<()> {
        if let Some(x) = value {
            if !x.is_finite() || (self.positive && x < 0.0) {
                return Err(DmError::InvalidInput(format!(
                    "pair matrix {}: invalid value {} at ({}, {})",
                    self.name, x, i, j
                )));
            }
        }
        self.values[i * self.n + j] = value;
        Ok(())
    }

    /// Set both `(i, j)` and `(j, i)`.
    pub fn set_symmetric(&mut self, i: usize, j: usize, value: Option<f64>) -> Result<()> {
        self.set(i, j, value)?;
        self.set(j, i, value)
    }
}

impl Named for PairMatrix {
    fn name(&self) -> &str {
        &self.name
    }
}

// ── Dataset ────────────────────────────────────────────────────────────────

/// A typed column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Column {
    Real(RealColumn),
    Integer(IntColumn),
    Boolean(BoolColumn),
    Nominal(NominalColumn),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Real(c) => c.name(),
            Column::Integer(c) => c.name(),
            Column::Boolean(c) => c.name(),
            Column::Nominal(c) => c.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Real(c) => c.len(),
            Column::Integer(c) => c.len(),
            Column::Boolean(c) => c.len(),
            Column::Nominal(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_missing(&mut self) {
        match self {
            Column::Real(c) => c.values.push(None),
            Column::Integer(c) => c.values.push(None),
            Column::Boolean(c) => c.values.push(None),
            Column::Nominal(c) => c.values.push(None),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Column::Real(_) => "real",
            Column::Integer(_) => "integer",
            Column::Boolean(_) => "boolean",
            Column::Nominal(_) => "nominal",
        }
    }
}

/// Named, weighted rows with typed columns and pair matrices.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    row_names: Vec<String>,
    weights: Vec<f64>,
    columns: Vec<Column>,
    pair_matrices: Vec<PairMatrix>,
}

impl Dataset {
    /// Empty dataset whose rows are named `"1"`, `"2"`, ... with weight 1.
    pub fn with_rows(n_rows: usize) -> Self {
        Self {
            row_names: (1..=n_rows).map(|i| i.to_string()).collect(),
            weights: vec![1.0; n_rows],
            columns: Vec::new(),
            pair_matrices: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.row_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_names.is_empty()
    }

    pub fn row_name(&self, row: usize) -> &str {
        &self.row_names[row]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// # Errors
    ///
    /// Returns an error for a negative or non-finite weight.
    pub fn set_weight(&mut self, row: usize, weight: f64) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(DmError::InvalidInput(format!(
                "dataset: weight {} of row {} must be finite and >= 0",
                weight, row
            )));
        }
        self.weights[row] = weight;
        Ok(())
    }

    /// Sample over the current row weights.
    pub fn sample(&self) -> Sample {
        match Sample::new(self.weights.clone()) {
            Ok(s) => s,
            // weights are validated by set_weight
            Err(_) => Sample::uniform(self.len()),
        }
    }

    /// Append a row; every column gets a missing value.
    pub fn append_row(&mut self, name: impl Into<String>) -> usize {
        self.row_names.push(name.into());
        self.weights.push(1.0);
        for c in &mut self.columns {
            c.push_missing();
        }
        for m in &mut self.pair_matrices {
            let n = m.n;
            let mut values = vec![None; (n + 1) * (n + 1)];
            for i in 0..n {
                values[i * (n + 1)..i * (n + 1) + n].copy_from_slice(&m.values[i * n..(i + 1) * n]);
            }
            m.values = values;
            m.n = n + 1;
        }
        self.row_names.len() - 1
    }

    fn name_taken(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name() == name)
            || self.pair_matrices.iter().any(|m| m.name() == name)
    }

    /// `prefix` if unused, else the first free `prefix_2`, `prefix_3`, ...
    pub fn find_new_column_name(&self, prefix: &str) -> String {
        if !self.name_taken(prefix) {
            return prefix.to_string();
        }
        let mut k = 2;
        loop {
            let candidate = format!("{}_{}", prefix, k);
            if !self.name_taken(&candidate) {
                return candidate;
            }
            k += 1;
        }
    }

    /// Add a column, returning its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the length differs from the
    /// row count.
    pub fn add_column(&mut self, column: Column) -> Result<usize> {
        if self.name_taken(column.name()) {
            return Err(DmError::DuplicateColumn(column.name().to_string()));
        }
        if column.len() != self.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.len(),
                found: column.len(),
            });
        }
        self.columns.push(column);
        Ok(self.columns.len() - 1)
    }

    pub fn add_pair_matrix(&mut self, matrix: PairMatrix) -> Result<()> {
        if self.name_taken(matrix.name()) {
            return Err(DmError::DuplicateColumn(matrix.name().to_string()));
        }
        if matrix.size() != self.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.len(),
                found: matrix.size(),
            });
        }
        self.pair_matrices.push(matrix);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`DmError::UnknownColumn`] if no column has this name.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| DmError::UnknownColumn(name.to_string()))
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| DmError::UnknownColumn(name.to_string()))
    }

    pub fn pair_matrix(&self, name: &str) -> Result<&PairMatrix> {
        self.pair_matrices
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| DmError::UnknownColumn(name.to_string()))
    }

    pub fn real(&self, name: &str) -> Result<&RealColumn> {
        match self.column(name)? {
            Column::Real(c) => Ok(c),
            other => Err(wrong_type(name, "real", other)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<&IntColumn> {
        match self.column(name)? {
            Column::Integer(c) => Ok(c),
            other => Err(wrong_type(name, "integer", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<&BoolColumn> {
        match self.column(name)? {
            Column::Boolean(c) => Ok(c),
            other => Err(wrong_type(name, "boolean", other)),
        }
    }

    pub fn nominal(&self, name: &str) -> Result<&NominalColumn> {
        match self.column(name)? {
            Column::Nominal(c) => Ok(c),
            other => Err(wrong_type(name, "nominal", other)),
        }
    }

    /// Real columns by name, in the given order.
    pub fn space(&self, names: &[&str]) -> Result<Vec<&RealColumn>> {
        names.iter().map(|n| self.real(n)).collect()
    }
}

fn wrong_type(name: &str, wanted: &str, found: &Column) -> DmError {
    DmError::InvalidInput(format!(
        "column {} is {}, expected {}",
        name,
        found.type_name(),
        wanted
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_column_kinds() {
        assert!(RealColumn::from_values("p", RealKind::Probability, vec![Some(0.5), None]).is_ok());
        assert!(RealColumn::from_values("p", RealKind::Probability, vec![Some(1.5)]).is_err());
        assert!(RealColumn::from_values("x", RealKind::Positive, vec![Some(-1.0)]).is_err());
        let mut c = RealColumn::new("x", RealKind::Real, 2);
        assert!(c.is_missing(0));
        c.set(0, Some(-3.0)).unwrap();
        assert_eq!(c.get(0), Some(-3.0));
        assert!(c.set(1, Some(f64::NAN)).is_err());
    }

    #[test]
    fn nominal_categories() {
        let mut c = NominalColumn::from_labels("c", &[Some("a"), None, Some("b"), Some("a")]);
        assert_eq!(c.categories(), &["a".to_string(), "b".to_string()]);
        assert_eq!(c.get(3), Some(0));
        assert_eq!(c.label(2), Some("b"));
        assert!(c.set(1, Some(5)).is_err());
        let z = c.category_index("z");
        assert_eq!(z, 2);
        c.set(0, Some(z)).unwrap();
        c.set(3, Some(z)).unwrap();
        c.delete_empty_categories();
        assert_eq!(c.categories(), &["b".to_string(), "z".to_string()]);
        assert_eq!(c.label(0), Some("z"));
        assert_eq!(c.label(2), Some("b"));
        assert!(c.rename_categories(vec!["x".into(), "x".into()]).is_err());
    }

    #[test]
    fn dataset_columns() {
        let mut ds = Dataset::with_rows(3);
        ds.add_column(Column::Real(RealColumn::from_reals("x", &[1.0, 2.0, 3.0]).unwrap()))
            .unwrap();
        let dup = Column::Real(RealColumn::new("x", RealKind::Real, 3));
        assert!(matches!(ds.add_column(dup), Err(DmError::DuplicateColumn(_))));
        let short = Column::Real(RealColumn::new("y", RealKind::Real, 2));
        assert!(matches!(
            ds.add_column(short),
            Err(DmError::DimensionMismatch { .. })
        ));
        assert!(matches!(ds.real("nope"), Err(DmError::UnknownColumn(_))));
        assert!(ds.nominal("x").is_err());
        assert_eq!(ds.find_new_column_name("x"), "x_2");
        assert_eq!(ds.find_new_column_name("y"), "y");
    }

    #[test]
    fn dataset_append_row_and_sample() {
        let mut ds = Dataset::with_rows(2);
        ds.add_column(Column::Real(RealColumn::from_reals("x", &[1.0, 2.0]).unwrap()))
            .unwrap();
        let mut m = PairMatrix::new("d", 2, true);
        m.set_symmetric(0, 1, Some(4.0)).unwrap();
        ds.add_pair_matrix(m).unwrap();
        ds.set_weight(0, 0.0).unwrap();
        assert!(ds.set_weight(0, -1.0).is_err());
        let row = ds.append_row("extra");
        assert_eq!(row, 2);
        assert!(ds.real("x").unwrap().is_missing(2));
        let d = ds.pair_matrix("d").unwrap();
        assert_eq!(d.size(), 3);
        assert_eq!(d.get(1, 0), Some(4.0));
        assert_eq!(d.get(2, 2), None);
        let s = ds.sample();
        assert_eq!(s.effective_count(), 2);
    }
}
