#![forbid(unsafe_code)]

use std::collections::HashMap;

use lf_index::{Index, IndexError, IndexLabel};
use lf_series::{Agg, Series, SeriesError, aggregate_values};
use lf_types::{ErrorKind, ReduceOptions, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroupByError {
    #[error("key sequence length ({keys}) does not match series length ({len})")]
    KeyLength { keys: usize, len: usize },
    #[error("rolling window must be at least 1, got {0}")]
    InvalidWindow(usize),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("group {0} not found")]
    GroupNotFound(String),
    #[error("table data is {actual_rows}x{actual_columns}, expected {rows}x{columns}")]
    TableShape {
        rows: usize,
        columns: usize,
        actual_rows: usize,
        actual_columns: usize,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl GroupByError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyLength { .. } | Self::TableShape { .. } => ErrorKind::LengthMismatch,
            Self::InvalidWindow(_) | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::GroupNotFound(_) => ErrorKind::KeyError,
            Self::Series(err) => err.kind(),
            Self::Index(err) => err.kind(),
        }
    }
}

/// One partition cell: the group key plus the members' original labels and values.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: IndexLabel,
    pub labels: Vec<IndexLabel>,
    pub values: Vec<Scalar>,
}

impl Group {
    fn empty(key: IndexLabel) -> Self {
        Self {
            key,
            labels: Vec::new(),
            values: Vec::new(),
        }
    }

    fn push(&mut self, label: &IndexLabel, value: &Scalar) {
        self.labels.push(label.clone());
        self.values.push(value.clone());
    }

    pub fn to_series(&self, name: Option<&str>) -> Result<Series, GroupByError> {
        let series = Series::with_index(Index::new(self.labels.clone()), self.values.clone())?;
        Ok(series.rename(name.map(str::to_owned)))
    }
}

/// Reducer vocabulary shared by grouping, pivoting, and rolling windows.
///
/// Implementors supply `apply` (reducer sees a `Series` over the cell's own
/// labels) and `apply_raw` (reducer sees the bare values and labels). A
/// failing reducer aborts the whole call.
pub trait Aggregate {
    type Output;

    fn apply<F>(&self, reducer: F) -> Result<Self::Output, GroupByError>
    where
        F: FnMut(&Series) -> Result<Scalar, GroupByError>;

    fn apply_raw<F>(&self, reducer: F) -> Result<Self::Output, GroupByError>
    where
        F: FnMut(&[Scalar], &[IndexLabel]) -> Result<Scalar, GroupByError>;

    fn agg(&self, agg: Agg, options: ReduceOptions) -> Result<Self::Output, GroupByError> {
        self.apply_raw(|values, labels| Ok(aggregate_values(values, labels, agg, options)?))
    }

    fn first(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::First, ReduceOptions::default())
    }

    fn last(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Last, ReduceOptions::default())
    }

    fn min(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Min, ReduceOptions::default())
    }

    fn max(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Max, ReduceOptions::default())
    }

    fn sum(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Sum, ReduceOptions::default())
    }

    fn mean(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Mean, ReduceOptions::default())
    }

    fn median(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Median, ReduceOptions::default())
    }

    fn std(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Std, ReduceOptions::default())
    }

    fn var(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Var, ReduceOptions::default())
    }

    fn count(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Count, ReduceOptions::default())
    }

    fn idxmin(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::IdxMin, ReduceOptions::default())
    }

    fn idxmax(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::IdxMax, ReduceOptions::default())
    }

    fn idxfirst(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::IdxFirst, ReduceOptions::default())
    }

    fn idxlast(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::IdxLast, ReduceOptions::default())
    }

    fn all(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::All, ReduceOptions::default())
    }

    fn any(&self) -> Result<Self::Output, GroupByError> {
        self.agg(Agg::Any, ReduceOptions::default())
    }
}

fn series_from_parts(
    labels: Vec<IndexLabel>,
    values: Vec<Scalar>,
    name: Option<&str>,
) -> Result<Series, GroupByError> {
    let series = Series::with_index(Index::new(labels), values)?;
    Ok(series.rename(name.map(str::to_owned)))
}

// ── Grouping ───────────────────────────────────────────────────────────

/// Single-pass partition of `source`, keeping first-seen key order.
pub struct Grouper<'a> {
    source: &'a Series,
    groups: Vec<Group>,
}

impl<'a> Grouper<'a> {
    /// Partition by `key_fn(value, position, label)`.
    pub fn new<F, K>(source: &'a Series, mut key_fn: F) -> Self
    where
        F: FnMut(&Scalar, usize, &IndexLabel) -> K,
        K: Into<IndexLabel>,
    {
        let mut groups = Vec::<Group>::new();
        let mut slot = HashMap::<IndexLabel, usize>::new();

        for (pos, (label, value)) in source.iter().enumerate() {
            let key = key_fn(value, pos, label).into();
            let group = *slot.entry(key).or_insert_with_key(|key| {
                groups.push(Group::empty(key.clone()));
                groups.len() - 1
            });
            groups[group].push(label, value);
        }

        debug!(
            rows = source.len(),
            groups = groups.len(),
            "built group partition"
        );
        Self { source, groups }
    }

    /// Partition by a parallel key sequence.
    pub fn from_keys(source: &'a Series, keys: &[IndexLabel]) -> Result<Self, GroupByError> {
        if keys.len() != source.len() {
            return Err(GroupByError::KeyLength {
                keys: keys.len(),
                len: source.len(),
            });
        }
        Ok(Self::new(source, |_, pos, _| keys[pos].clone()))
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group keys in first-seen order.
    #[must_use]
    pub fn keys(&self) -> Index {
        Index::new(self.groups.iter().map(|g| g.key.clone()).collect())
    }

    pub fn get_group(&self, key: &IndexLabel) -> Result<Series, GroupByError> {
        let group = self
            .groups
            .iter()
            .find(|g| &g.key == key)
            .ok_or_else(|| GroupByError::GroupNotFound(key.to_string()))?;
        group.to_series(self.source.name())
    }
}

impl Aggregate for Grouper<'_> {
    type Output = Series;

    fn apply<F>(&self, mut reducer: F) -> Result<Series, GroupByError>
    where
        F: FnMut(&Series) -> Result<Scalar, GroupByError>,
    {
        let name = self.source.name();
        let values = self
            .groups
            .iter()
            .map(|group| reducer(&group.to_series(name)?))
            .collect::<Result<Vec<_>, _>>()?;
        series_from_parts(self.keys().into_labels(), values, name)
    }

    fn apply_raw<F>(&self, mut reducer: F) -> Result<Series, GroupByError>
    where
        F: FnMut(&[Scalar], &[IndexLabel]) -> Result<Scalar, GroupByError>,
    {
        let values = self
            .groups
            .iter()
            .map(|group| reducer(&group.values, &group.labels))
            .collect::<Result<Vec<_>, _>>()?;
        series_from_parts(self.keys().into_labels(), values, self.source.name())
    }
}

// ── Pivot ──────────────────────────────────────────────────────────────

/// Dedupe keys in first-seen order, then sort them if they are sortable.
fn ordered_keys(keys: Vec<IndexLabel>) -> Index {
    let index = Index::new(keys);
    index.sort().unwrap_or(index)
}

/// Two-level partition: row key, then column key.
pub struct Pivot<'a> {
    source: &'a Series,
    rows: Index,
    columns: Index,
    cells: HashMap<IndexLabel, HashMap<IndexLabel, Group>>,
}

impl<'a> Pivot<'a> {
    /// Partition by `key_fn(value, position, label) -> (row, column)`.
    pub fn new<F, R, C>(source: &'a Series, mut key_fn: F) -> Self
    where
        F: FnMut(&Scalar, usize, &IndexLabel) -> (R, C),
        R: Into<IndexLabel>,
        C: Into<IndexLabel>,
    {
        let mut row_order = Vec::new();
        let mut column_order = Vec::new();
        let mut seen_columns = HashMap::<IndexLabel, ()>::new();
        let mut cells = HashMap::<IndexLabel, HashMap<IndexLabel, Group>>::new();

        for (pos, (label, value)) in source.iter().enumerate() {
            let (row, column) = key_fn(value, pos, label);
            let (row, column) = (row.into(), column.into());
            if seen_columns.insert(column.clone(), ()).is_none() {
                column_order.push(column.clone());
            }
            cells
                .entry(row)
                .or_insert_with_key(|row| {
                    row_order.push(row.clone());
                    HashMap::new()
                })
                .entry(column)
                .or_insert_with_key(|column| Group::empty(column.clone()))
                .push(label, value);
        }

        let rows = ordered_keys(row_order);
        let columns = ordered_keys(column_order);
        debug!(
            rows = rows.len(),
            columns = columns.len(),
            "built pivot partition"
        );
        Self {
            source,
            rows,
            columns,
            cells,
        }
    }

    /// Pivot on two parallel key sequences.
    pub fn from_keys(
        source: &'a Series,
        rows: &[IndexLabel],
        columns: &[IndexLabel],
    ) -> Result<Self, GroupByError> {
        if rows.len() != source.len() || columns.len() != source.len() {
            return Err(GroupByError::InvalidArgument(format!(
                "pivot keys must match the series length {}: got {} row keys and {} column keys",
                source.len(),
                rows.len(),
                columns.len()
            )));
        }
        Ok(Self::new(source, |_, pos, _| {
            (rows[pos].clone(), columns[pos].clone())
        }))
    }

    #[must_use]
    pub fn rows(&self) -> &Index {
        &self.rows
    }

    #[must_use]
    pub fn columns(&self) -> &Index {
        &self.columns
    }

    fn cell(&self, row: &IndexLabel, column: &IndexLabel) -> Option<&Group> {
        self.cells.get(row).and_then(|cols| cols.get(column))
    }

    fn assemble<F>(&self, mut reduce_cell: F) -> Result<Table, GroupByError>
    where
        F: FnMut(&Group) -> Result<Scalar, GroupByError>,
    {
        let mut data = Vec::with_capacity(self.rows.len());
        for row in self.rows.labels() {
            let mut out_row = Vec::with_capacity(self.columns.len());
            for column in self.columns.labels() {
                out_row.push(match self.cell(row, column) {
                    Some(group) => reduce_cell(group)?,
                    None => Scalar::nan(),
                });
            }
            data.push(out_row);
        }
        debug!(
            rows = self.rows.len(),
            columns = self.columns.len(),
            "assembled pivot table"
        );
        Table::new(self.rows.clone(), self.columns.clone(), data)
    }
}

impl Aggregate for Pivot<'_> {
    type Output = Table;

    fn apply<F>(&self, mut reducer: F) -> Result<Table, GroupByError>
    where
        F: FnMut(&Series) -> Result<Scalar, GroupByError>,
    {
        let name = self.source.name();
        self.assemble(|group| reducer(&group.to_series(name)?))
    }

    fn apply_raw<F>(&self, mut reducer: F) -> Result<Table, GroupByError>
    where
        F: FnMut(&[Scalar], &[IndexLabel]) -> Result<Scalar, GroupByError>,
    {
        self.assemble(|group| reducer(&group.values, &group.labels))
    }
}

// ── Rolling ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingOptions {
    pub window: usize,
}

impl RollingOptions {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

/// Sliding window over a Series. Nothing is materialized up front; each
/// output position reads its window straight from the source.
pub struct Rolling<'a> {
    source: &'a Series,
    window: usize,
}

impl<'a> Rolling<'a> {
    pub fn new(source: &'a Series, options: RollingOptions) -> Result<Self, GroupByError> {
        if options.window == 0 {
            return Err(GroupByError::InvalidWindow(options.window));
        }
        Ok(Self {
            source,
            window: options.window,
        })
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Positions `i < window - 1` yield the marker; the rest reduce
    /// `[i + 1 - window, i]`.
    fn evaluate<F>(&self, mut reduce_window: F) -> Result<Series, GroupByError>
    where
        F: FnMut(usize, usize) -> Result<Scalar, GroupByError>,
    {
        debug!(
            window = self.window,
            len = self.source.len(),
            "evaluating rolling window"
        );
        let values = (0..self.source.len())
            .map(|i| match (i + 1).checked_sub(self.window) {
                Some(start) => reduce_window(start, i + 1),
                None => Ok(Scalar::nan()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Series::with_index(self.source.index().clone(), values)?
            .rename(self.source.name().map(str::to_owned)))
    }
}

impl Aggregate for Rolling<'_> {
    type Output = Series;

    fn apply<F>(&self, mut reducer: F) -> Result<Series, GroupByError>
    where
        F: FnMut(&Series) -> Result<Scalar, GroupByError>,
    {
        self.evaluate(|start, stop| reducer(&self.source.islice(start, stop)?))
    }

    fn apply_raw<F>(&self, mut reducer: F) -> Result<Series, GroupByError>
    where
        F: FnMut(&[Scalar], &[IndexLabel]) -> Result<Scalar, GroupByError>,
    {
        let values = self.source.values();
        let labels = self.source.index().labels();
        self.evaluate(|start, stop| reducer(&values[start..stop], &labels[start..stop]))
    }
}

// ── Table ──────────────────────────────────────────────────────────────

/// Dense row-major matrix addressed by a row index and a column index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    rows: Index,
    columns: Index,
    data: Vec<Vec<Scalar>>,
}

impl Table {
    pub fn new(rows: Index, columns: Index, data: Vec<Vec<Scalar>>) -> Result<Self, GroupByError> {
        let ragged = data.iter().find(|row| row.len() != columns.len());
        if data.len() != rows.len() || ragged.is_some() {
            return Err(GroupByError::TableShape {
                rows: rows.len(),
                columns: columns.len(),
                actual_rows: data.len(),
                actual_columns: ragged.map_or(columns.len(), Vec::len),
            });
        }
        Ok(Self {
            rows,
            columns,
            data,
        })
    }

    #[must_use]
    pub fn rows(&self) -> &Index {
        &self.rows
    }

    #[must_use]
    pub fn columns(&self) -> &Index {
        &self.columns
    }

    #[must_use]
    pub fn data(&self) -> &[Vec<Scalar>] {
        &self.data
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn get(&self, row: &IndexLabel, column: &IndexLabel) -> Result<&Scalar, GroupByError> {
        let r = self.rows.index_of(row)?;
        let c = self.columns.index_of(column)?;
        Ok(&self.data[r][c])
    }

    /// One row as a Series over the column labels, named after the row.
    pub fn row(&self, label: &IndexLabel) -> Result<Series, GroupByError> {
        let r = self.rows.index_of(label)?;
        let series = Series::with_index(self.columns.clone(), self.data[r].clone())?;
        Ok(series.named(label.to_string()))
    }

    /// One column as a Series over the row labels, named after the column.
    pub fn column(&self, label: &IndexLabel) -> Result<Series, GroupByError> {
        let c = self.columns.index_of(label)?;
        let values = self.data.iter().map(|row| row[c].clone()).collect();
        let series = Series::with_index(self.rows.clone(), values)?;
        Ok(series.named(label.to_string()))
    }
}

// ── Entry points ───────────────────────────────────────────────────────

/// Aggregation entry points on `Series`.
pub trait GroupBySeriesExt {
    fn groupby<F, K>(&self, key_fn: F) -> Grouper<'_>
    where
        F: FnMut(&Scalar, usize, &IndexLabel) -> K,
        K: Into<IndexLabel>;

    fn groupby_keys(&self, keys: &[IndexLabel]) -> Result<Grouper<'_>, GroupByError>;

    fn pivot<F, R, C>(&self, key_fn: F) -> Pivot<'_>
    where
        F: FnMut(&Scalar, usize, &IndexLabel) -> (R, C),
        R: Into<IndexLabel>,
        C: Into<IndexLabel>;

    fn rolling(&self, options: RollingOptions) -> Result<Rolling<'_>, GroupByError>;
}

impl GroupBySeriesExt for Series {
    fn groupby<F, K>(&self, key_fn: F) -> Grouper<'_>
    where
        F: FnMut(&Scalar, usize, &IndexLabel) -> K,
        K: Into<IndexLabel>,
    {
        Grouper::new(self, key_fn)
    }

    fn groupby_keys(&self, keys: &[IndexLabel]) -> Result<Grouper<'_>, GroupByError> {
        Grouper::from_keys(self, keys)
    }

    fn pivot<F, R, C>(&self, key_fn: F) -> Pivot<'_>
    where
        F: FnMut(&Scalar, usize, &IndexLabel) -> (R, C),
        R: Into<IndexLabel>,
        C: Into<IndexLabel>,
    {
        Pivot::new(self, key_fn)
    }

    fn rolling(&self, options: RollingOptions) -> Result<Rolling<'_>, GroupByError> {
        Rolling::new(self, options)
    }
}
