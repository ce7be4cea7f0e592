#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashSet;

use lf_index::{
    Index, IndexError, IndexLabel, align_union, normalize_position, validate_alignment_plan,
};
use lf_types::{
    Drawdown, ErrorKind, NullKind, ReduceOptions, Scalar, SkipPolicy, StatsError, TypeError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("index length ({index_len}) does not match value length ({value_len})")]
    LengthMismatch { index_len: usize, value_len: usize },
    #[error("operand length ({right}) does not match series length ({left})")]
    OperandLength { left: usize, right: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Stats(#[from] StatsError),
}

impl SeriesError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LengthMismatch { .. } | Self::OperandLength { .. } => ErrorKind::LengthMismatch,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Index(err) => err.kind(),
            Self::Type(err) => err.kind(),
            Self::Stats(err) => err.kind(),
        }
    }
}

// ── Options ────────────────────────────────────────────────────────────

/// How a labelled right-hand operand is matched against the receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Outer join on labels.
    #[default]
    Union,
    /// Pair by position, ignoring labels.
    Position,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineOptions {
    pub alignment: Alignment,
}

impl CombineOptions {
    #[must_use]
    pub fn ignore_index() -> Self {
        Self {
            alignment: Alignment::Position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMethod {
    Forward,
    Backward,
}

/// Fill policy: a propagation method, a constant, or both (method first).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillOptions {
    pub method: Option<FillMethod>,
    pub value: Option<Scalar>,
}

impl FillOptions {
    #[must_use]
    pub fn forward() -> Self {
        Self {
            method: Some(FillMethod::Forward),
            value: None,
        }
    }

    #[must_use]
    pub fn backward() -> Self {
        Self {
            method: Some(FillMethod::Backward),
            value: None,
        }
    }

    #[must_use]
    pub fn value(value: impl Into<Scalar>) -> Self {
        Self {
            method: None,
            value: Some(value.into()),
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<Scalar>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn validate(&self) -> Result<(), SeriesError> {
        if self.method.is_none() && self.value.is_none() {
            return Err(SeriesError::InvalidArgument(
                "fill requires a method or a value".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReindexOptions {
    pub fill: Option<FillOptions>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Values,
    Index,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaPosition {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    pub by: SortBy,
    pub ascending: bool,
    pub na_position: NaPosition,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            by: SortBy::Values,
            ascending: true,
            na_position: NaPosition::Last,
        }
    }
}

impl SortOptions {
    #[must_use]
    pub fn by_index() -> Self {
        Self {
            by: SortBy::Index,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    #[must_use]
    pub fn na_first(mut self) -> Self {
        self.na_position = NaPosition::First;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankOptions {
    pub ascending: bool,
    pub normalized: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            ascending: true,
            normalized: false,
        }
    }
}

// ── Operands and element-wise operators ────────────────────────────────

/// Right-hand side of a binary operation, resolved once at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    Scalar(&'a Scalar),
    Sequence(&'a [Scalar]),
    Labeled(&'a Series),
}

impl<'a> From<&'a Scalar> for Operand<'a> {
    fn from(value: &'a Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl<'a> From<&'a [Scalar]> for Operand<'a> {
    fn from(values: &'a [Scalar]) -> Self {
        Self::Sequence(values)
    }
}

impl<'a> From<&'a Vec<Scalar>> for Operand<'a> {
    fn from(values: &'a Vec<Scalar>) -> Self {
        Self::Sequence(values)
    }
}

impl<'a> From<&'a Series> for Operand<'a> {
    fn from(series: &'a Series) -> Self {
        Self::Labeled(series)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl ArithmeticOp {
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
            Self::Rem => left % right,
            Self::Pow => left.powf(right),
        }
    }

    /// Non-numeric in, non-numeric out.
    #[must_use]
    pub fn combine(self, left: &Scalar, right: &Scalar) -> Scalar {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Scalar::from_f64(self.apply(a, b)),
            _ => Scalar::nan(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl ComparisonOp {
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
        }
    }

    /// Boolean result for numeric operands, the non-numeric marker otherwise.
    #[must_use]
    pub fn combine(self, left: &Scalar, right: &Scalar) -> Scalar {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Scalar::Bool(self.apply(a, b)),
            _ => Scalar::nan(),
        }
    }
}

/// Reducers addressable by name; the aggregation engine dispatches through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agg {
    First,
    Last,
    Min,
    Max,
    Sum,
    Mean,
    Median,
    Std,
    Var,
    Count,
    IdxMin,
    IdxMax,
    IdxFirst,
    IdxLast,
    All,
    Any,
}

/// Reduce a bare value slice with `agg`. Index-returning reducers need the
/// matching labels.
pub fn aggregate_values(
    values: &[Scalar],
    labels: &[IndexLabel],
    agg: Agg,
    options: ReduceOptions,
) -> Result<Scalar, SeriesError> {
    let label_at = |pos: Option<usize>| {
        pos.and_then(|p| labels.get(p))
            .map_or_else(Scalar::nan, |l| Scalar::from(l.clone()))
    };
    Ok(match agg {
        Agg::First => value_at(values, lf_types::idxfirst(values, SkipPolicy::Missing)),
        Agg::Last => value_at(values, lf_types::idxlast(values, SkipPolicy::Missing)),
        Agg::Min => lf_types::nanmin(values, options)?,
        Agg::Max => lf_types::nanmax(values, options)?,
        Agg::Sum => lf_types::nansum(values, options),
        Agg::Mean => lf_types::nanmean(values, options),
        Agg::Median => lf_types::nanmedian(values, options),
        Agg::Std => lf_types::nanstd(values, options),
        Agg::Var => lf_types::nanvar(values, options),
        Agg::Count => Scalar::Int64(lf_types::nancount(values, options.skip) as i64),
        Agg::IdxMin => label_at(lf_types::idxmin(values)),
        Agg::IdxMax => label_at(lf_types::idxmax(values)),
        Agg::IdxFirst => label_at(lf_types::idxfirst(values, SkipPolicy::Missing)),
        Agg::IdxLast => label_at(lf_types::idxlast(values, SkipPolicy::Missing)),
        Agg::All => Scalar::Bool(lf_types::all(values)),
        Agg::Any => Scalar::Bool(lf_types::any(values)),
    })
}

fn value_at(values: &[Scalar], pos: Option<usize>) -> Scalar {
    pos.map_or_else(Scalar::nan, |p| values[p].clone())
}

/// Missing values sort after (or before) everything else, regardless of
/// direction. Inputs must already be known comparable.
fn compare_scalars_with_na(
    left: &Scalar,
    right: &Scalar,
    ascending: bool,
    na_position: NaPosition,
) -> Ordering {
    let na_order = match na_position {
        NaPosition::Last => Ordering::Greater,
        NaPosition::First => Ordering::Less,
    };
    match (left.is_missing(), right.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => na_order,
        (false, true) => na_order.reverse(),
        (false, false) => {
            let order = left.compare(right).unwrap_or(Ordering::Equal);
            if ascending { order } else { order.reverse() }
        }
    }
}

/// Copy of `values` with each flagged gap filled per `options`.
fn fill_gaps(values: &[Scalar], gaps: &[bool], options: &FillOptions) -> Vec<Scalar> {
    let mut out = values.to_vec();
    let mut remaining = gaps.to_vec();
    match options.method {
        Some(FillMethod::Forward) => carry_over(&mut out, &mut remaining, 0..values.len()),
        Some(FillMethod::Backward) => {
            carry_over(&mut out, &mut remaining, (0..values.len()).rev());
        }
        None => {}
    }
    if let Some(value) = &options.value {
        for (slot, gap) in out.iter_mut().zip(&remaining) {
            if *gap {
                *slot = value.clone();
            }
        }
    }
    out
}

fn carry_over(out: &mut [Scalar], gaps: &mut [bool], order: impl Iterator<Item = usize>) {
    let mut last: Option<Scalar> = None;
    for i in order {
        if !gaps[i] {
            last = Some(out[i].clone());
        } else if let Some(value) = &last {
            out[i] = value.clone();
            gaps[i] = false;
        }
    }
}

// ── Series ─────────────────────────────────────────────────────────────

/// Values paired with a label index of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: Option<String>,
    index: Index,
    values: Vec<Scalar>,
}

impl<S: Into<Scalar>> FromIterator<S> for Series {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl Series {
    /// Series over the positional index `0..len`.
    #[must_use]
    pub fn new(values: Vec<Scalar>) -> Self {
        Self {
            name: None,
            index: Index::range(values.len()),
            values,
        }
    }

    pub fn with_index(index: Index, values: Vec<Scalar>) -> Result<Self, SeriesError> {
        if index.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                index_len: index.len(),
                value_len: values.len(),
            });
        }
        Ok(Self {
            name: None,
            index,
            values,
        })
    }

    pub fn from_values(
        name: impl Into<String>,
        labels: Vec<IndexLabel>,
        values: Vec<Scalar>,
    ) -> Result<Self, SeriesError> {
        Ok(Self::with_index(Index::new(labels), values)?.named(name))
    }

    pub fn from_pairs(
        name: impl Into<String>,
        pairs: Vec<(IndexLabel, Scalar)>,
    ) -> Result<Self, SeriesError> {
        let (labels, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::from_values(name, labels, values)
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn rename(&self, name: Option<String>) -> Self {
        let mut out = self.clone();
        out.name = name;
        out
    }

    /// Replace the index in place. The only mutator; the length is re-checked.
    pub fn set_index(&mut self, index: Index) -> Result<(), SeriesError> {
        if index.len() != self.values.len() {
            return Err(SeriesError::LengthMismatch {
                index_len: index.len(),
                value_len: self.values.len(),
            });
        }
        self.index = index;
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexLabel, &Scalar)> {
        self.index.labels().iter().zip(&self.values)
    }

    /// Same name and index, new values. Callers keep the lengths equal.
    fn derive(&self, values: Vec<Scalar>) -> Self {
        Self {
            name: self.name.clone(),
            index: self.index.clone(),
            values,
        }
    }

    /// Callers pass in-bounds positions.
    fn take(&self, positions: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            index: Index::new(
                positions
                    .iter()
                    .map(|&p| self.index.labels()[p].clone())
                    .collect(),
            )
            .rename(self.index.name().map(str::to_owned)),
            values: positions.iter().map(|&p| self.values[p].clone()).collect(),
        }
    }

    fn keep(&self, keep: &[bool]) -> Self {
        let positions: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect();
        self.take(&positions)
    }

    // ── Access ─────────────────────────────────────────────────────────

    pub fn loc(&self, label: &IndexLabel) -> Result<&Scalar, SeriesError> {
        let pos = self.index.index_of(label)?;
        Ok(&self.values[pos])
    }

    /// Values at `labels`, indexed by the queried labels.
    pub fn loc_many(&self, labels: &[IndexLabel]) -> Result<Self, SeriesError> {
        let values = labels
            .iter()
            .map(|label| self.index.index_of(label).map(|p| self.values[p].clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: self.name.clone(),
            index: Index::new(labels.to_vec()).rename(self.index.name().map(str::to_owned)),
            values,
        })
    }

    pub fn iloc(&self, position: isize) -> Result<&Scalar, SeriesError> {
        let pos = normalize_position(position, self.values.len())?;
        Ok(&self.values[pos])
    }

    pub fn iloc_many(&self, positions: &[isize]) -> Result<Self, SeriesError> {
        let resolved = positions
            .iter()
            .map(|&p| normalize_position(p, self.values.len()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.take(&resolved))
    }

    /// Elements whose labels fall in `[start, stop)` by value.
    pub fn loc_range(&self, start: &IndexLabel, stop: &IndexLabel) -> Result<Self, SeriesError> {
        let positions = self.index.slice_positions(start, stop)?;
        Ok(self.take(&positions))
    }

    pub fn islice(&self, start: usize, stop: usize) -> Result<Self, SeriesError> {
        let index = self.index.islice(start, stop)?;
        Ok(Self {
            name: self.name.clone(),
            index,
            values: self.values[start..stop].to_vec(),
        })
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let positions: Vec<usize> = (0..n.min(self.len())).collect();
        self.take(&positions)
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let positions: Vec<usize> = (self.len().saturating_sub(n)..self.len()).collect();
        self.take(&positions)
    }

    /// Every `period`-th element starting at position 0.
    pub fn every(&self, period: usize) -> Result<Self, SeriesError> {
        if period == 0 {
            return Err(SeriesError::InvalidArgument(
                "period must be at least 1".to_owned(),
            ));
        }
        let positions: Vec<usize> = (0..self.len()).step_by(period).collect();
        Ok(self.take(&positions))
    }

    /// Value at the nearest label at or before `label`.
    pub fn asof(&self, label: &IndexLabel) -> Result<&Scalar, SeriesError> {
        let pos = self.index.asof_position(label)?;
        Ok(&self.values[pos])
    }

    // ── Transforms ─────────────────────────────────────────────────────

    #[must_use]
    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Scalar, &IndexLabel) -> Scalar,
    {
        self.derive(self.iter().map(|(label, value)| f(value, label)).collect())
    }

    #[must_use]
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Scalar, &IndexLabel) -> bool,
    {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for (label, value) in self.iter() {
            if predicate(value, label) {
                labels.push(label.clone());
                values.push(value.clone());
            }
        }
        Self {
            name: self.name.clone(),
            index: Index::new(labels).rename(self.index.name().map(str::to_owned)),
            values,
        }
    }

    #[must_use]
    pub fn reverse(&self) -> Self {
        Self {
            name: self.name.clone(),
            index: self.index.reverse(),
            values: self.values.iter().rev().cloned().collect(),
        }
    }

    pub fn mask(&self, keep: &[bool]) -> Result<Self, SeriesError> {
        if keep.len() != self.len() {
            return Err(SeriesError::OperandLength {
                left: self.len(),
                right: keep.len(),
            });
        }
        Ok(self.keep(keep))
    }

    #[must_use]
    pub fn drop(&self, labels: &[IndexLabel]) -> Self {
        let keep: Vec<bool> = self.index.isin(labels).into_iter().map(|d| !d).collect();
        self.keep(&keep)
    }

    #[must_use]
    pub fn dropna(&self) -> Self {
        let keep: Vec<bool> = self.values.iter().map(|v| !v.is_missing()).collect();
        self.keep(&keep)
    }

    #[must_use]
    pub fn dropnan(&self) -> Self {
        let keep: Vec<bool> = self.values.iter().map(Scalar::is_numeric).collect();
        self.keep(&keep)
    }

    #[must_use]
    pub fn isna(&self) -> Self {
        self.derive(lf_types::isna(&self.values).into_iter().map(Scalar::Bool).collect())
    }

    #[must_use]
    pub fn isnan(&self) -> Self {
        self.derive(lf_types::isnan(&self.values).into_iter().map(Scalar::Bool).collect())
    }

    /// Fill missing values.
    pub fn fillna(&self, options: &FillOptions) -> Result<Self, SeriesError> {
        options.validate()?;
        let gaps = lf_types::isna(&self.values);
        Ok(self.derive(fill_gaps(&self.values, &gaps, options)))
    }

    /// Fill non-numeric values.
    pub fn fillnan(&self, options: &FillOptions) -> Result<Self, SeriesError> {
        options.validate()?;
        let gaps = lf_types::isnan(&self.values);
        Ok(self.derive(fill_gaps(&self.values, &gaps, options)))
    }

    /// Conform to `index`. Labels absent from the receiver hold the missing
    /// marker unless `options.fill` supplies a policy for them.
    pub fn reindex(&self, index: &Index, options: &ReindexOptions) -> Result<Self, SeriesError> {
        if self.index.has_duplicates() {
            return Err(IndexError::DuplicateKeys { op: "reindex" }.into());
        }
        let positions = self.index.get_indexer(index);
        debug!(
            source = self.len(),
            target = index.len(),
            missing = positions.iter().filter(|p| p.is_none()).count(),
            "reindexed series"
        );
        let values: Vec<Scalar> = positions
            .iter()
            .map(|p| p.map_or_else(Scalar::nan, |p| self.values[p].clone()))
            .collect();
        let values = match &options.fill {
            Some(fill) => {
                fill.validate()?;
                let gaps: Vec<bool> = positions.iter().map(Option::is_none).collect();
                fill_gaps(&values, &gaps, fill)
            }
            None => values,
        };
        Ok(Self {
            name: self.name.clone(),
            index: index.clone(),
            values,
        })
    }

    #[must_use]
    pub fn isin(&self, candidates: &[Scalar]) -> Self {
        self.derive(
            self.values
                .iter()
                .map(|v| Scalar::Bool(candidates.iter().any(|c| c.semantic_eq(v))))
                .collect(),
        )
    }

    /// Keep values satisfying `predicate`, replacing the rest with `other`.
    #[must_use]
    pub fn where_or<F>(&self, mut predicate: F, other: &Scalar) -> Self
    where
        F: FnMut(&Scalar) -> bool,
    {
        self.derive(
            self.values
                .iter()
                .map(|v| if predicate(v) { v.clone() } else { other.clone() })
                .collect(),
        )
    }

    /// `value[i] - value[i - periods]`; the first `periods` positions are NaN.
    #[must_use]
    pub fn diff(&self, periods: usize) -> Self {
        let values = (0..self.len())
            .map(|i| match i.checked_sub(periods) {
                Some(prev) => ArithmeticOp::Sub.combine(&self.values[i], &self.values[prev]),
                None => Scalar::nan(),
            })
            .collect();
        self.derive(values)
    }

    fn unary<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        self.derive(
            self.values
                .iter()
                .map(|v| v.as_f64().map_or_else(Scalar::nan, |x| Scalar::from_f64(f(x))))
                .collect(),
        )
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        self.unary(f64::abs)
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        self.unary(|x| -x)
    }

    /// Logical negation; missing values stay missing.
    #[must_use]
    pub fn not(&self) -> Self {
        self.derive(
            self.values
                .iter()
                .map(|v| v.truthiness().map_or_else(Scalar::nan, |t| Scalar::Bool(!t)))
                .collect(),
        )
    }

    /// Distinct values in first-seen order.
    #[must_use]
    pub fn uniques(&self) -> Vec<Scalar> {
        let mut seen_labels = HashSet::new();
        let mut seen_nulls = HashSet::new();
        let mut out = Vec::new();
        for value in &self.values {
            let fresh = match value {
                Scalar::Null(kind) => seen_nulls.insert(*kind),
                Scalar::Float64(v) if v.is_nan() => seen_nulls.insert(NullKind::NaN),
                other => match IndexLabel::try_from(other.clone()) {
                    Ok(label) => seen_labels.insert(label),
                    Err(_) => false,
                },
            };
            if fresh {
                out.push(value.clone());
            }
        }
        out
    }

    // ── Alignment protocol ─────────────────────────────────────────────

    /// Apply `f` element-wise against `other`.
    ///
    /// Scalars broadcast and sequences pair by position. A labelled operand is
    /// outer-joined on labels (`Alignment::Union`); a label present on only
    /// one side yields the non-numeric marker without calling `f`.
    pub fn combine<'a, F>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
        mut f: F,
    ) -> Result<Self, SeriesError>
    where
        F: FnMut(&Scalar, &Scalar) -> Scalar,
    {
        match other.into() {
            Operand::Scalar(right) => {
                Ok(self.derive(self.values.iter().map(|v| f(v, right)).collect()))
            }
            Operand::Sequence(right) => self.combine_positional(right, f),
            Operand::Labeled(right) if options.alignment == Alignment::Position => {
                let mut out = self.combine_positional(&right.values, f)?;
                out.name = self.shared_name(right);
                Ok(out)
            }
            Operand::Labeled(right) => {
                let plan = align_union(&self.index, &right.index)?;
                validate_alignment_plan(&plan)?;
                let values = plan
                    .left_positions
                    .iter()
                    .zip(&plan.right_positions)
                    .map(|(l, r)| match (l, r) {
                        (Some(l), Some(r)) => f(&self.values[*l], &right.values[*r]),
                        _ => Scalar::nan(),
                    })
                    .collect();
                Ok(Self {
                    name: self.shared_name(right),
                    index: plan.union_index,
                    values,
                })
            }
        }
    }

    fn combine_positional<F>(&self, right: &[Scalar], mut f: F) -> Result<Self, SeriesError>
    where
        F: FnMut(&Scalar, &Scalar) -> Scalar,
    {
        if right.len() != self.len() {
            return Err(SeriesError::OperandLength {
                left: self.len(),
                right: right.len(),
            });
        }
        Ok(self.derive(self.values.iter().zip(right).map(|(l, r)| f(l, r)).collect()))
    }

    fn shared_name(&self, other: &Self) -> Option<String> {
        if self.name == other.name {
            self.name.clone()
        } else {
            None
        }
    }

    pub fn arithmetic<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ArithmeticOp,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.combine(other, options, |l, r| op.combine(l, r))
    }

    pub fn compare<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ComparisonOp,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.combine(other, options, |l, r| op.combine(l, r))
    }

    pub fn add<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Add, CombineOptions::default())
    }

    pub fn add_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Add, options)
    }

    pub fn sub<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Sub, CombineOptions::default())
    }

    pub fn sub_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Sub, options)
    }

    pub fn mul<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Mul, CombineOptions::default())
    }

    pub fn mul_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Mul, options)
    }

    pub fn div<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Div, CombineOptions::default())
    }

    pub fn div_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Div, options)
    }

    pub fn rem<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Rem, CombineOptions::default())
    }

    pub fn rem_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Rem, options)
    }

    pub fn pow<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Pow, CombineOptions::default())
    }

    pub fn pow_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.arithmetic(other, ArithmeticOp::Pow, options)
    }

    pub fn eq<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Eq, CombineOptions::default())
    }

    pub fn eq_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Eq, options)
    }

    pub fn ne<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Ne, CombineOptions::default())
    }

    pub fn ne_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Ne, options)
    }

    pub fn gt<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Gt, CombineOptions::default())
    }

    pub fn gt_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Gt, options)
    }

    pub fn ge<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Ge, CombineOptions::default())
    }

    pub fn ge_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Ge, options)
    }

    pub fn lt<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Lt, CombineOptions::default())
    }

    pub fn lt_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Lt, options)
    }

    pub fn le<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Le, CombineOptions::default())
    }

    pub fn le_with<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        options: CombineOptions,
    ) -> Result<Self, SeriesError> {
        self.compare(other, ComparisonOp::Le, options)
    }

    // ── Reducers ───────────────────────────────────────────────────────

    pub fn aggregate(&self, agg: Agg, options: ReduceOptions) -> Result<Scalar, SeriesError> {
        aggregate_values(&self.values, self.index.labels(), agg, options)
    }

    #[must_use]
    pub fn sum(&self) -> Scalar {
        lf_types::nansum(&self.values, ReduceOptions::default())
    }

    #[must_use]
    pub fn mean(&self) -> Scalar {
        lf_types::nanmean(&self.values, ReduceOptions::default())
    }

    #[must_use]
    pub fn median(&self) -> Scalar {
        lf_types::nanmedian(&self.values, ReduceOptions::default())
    }

    /// Number of numeric values.
    #[must_use]
    pub fn count(&self) -> usize {
        lf_types::nancount(&self.values, SkipPolicy::NonNumeric)
    }

    /// Fails only when the series has no elements at all.
    pub fn min(&self) -> Result<Scalar, SeriesError> {
        Ok(lf_types::nanmin(&self.values, ReduceOptions::default())?)
    }

    pub fn max(&self) -> Result<Scalar, SeriesError> {
        Ok(lf_types::nanmax(&self.values, ReduceOptions::default())?)
    }

    #[must_use]
    pub fn var(&self, ddof: usize) -> Scalar {
        lf_types::nanvar(&self.values, ReduceOptions::default().with_ddof(ddof))
    }

    #[must_use]
    pub fn std(&self, ddof: usize) -> Scalar {
        lf_types::nanstd(&self.values, ReduceOptions::default().with_ddof(ddof))
    }

    /// First non-missing value, or the marker.
    #[must_use]
    pub fn first(&self) -> Scalar {
        value_at(&self.values, lf_types::idxfirst(&self.values, SkipPolicy::Missing))
    }

    #[must_use]
    pub fn last(&self) -> Scalar {
        value_at(&self.values, lf_types::idxlast(&self.values, SkipPolicy::Missing))
    }

    fn label_at(&self, pos: Option<usize>) -> Option<&IndexLabel> {
        pos.map(|p| &self.index.labels()[p])
    }

    /// Label of the first smallest numeric value.
    #[must_use]
    pub fn idxmin(&self) -> Option<&IndexLabel> {
        self.label_at(lf_types::idxmin(&self.values))
    }

    #[must_use]
    pub fn idxmax(&self) -> Option<&IndexLabel> {
        self.label_at(lf_types::idxmax(&self.values))
    }

    #[must_use]
    pub fn idxfirst(&self) -> Option<&IndexLabel> {
        self.label_at(lf_types::idxfirst(&self.values, SkipPolicy::Missing))
    }

    #[must_use]
    pub fn idxlast(&self) -> Option<&IndexLabel> {
        self.label_at(lf_types::idxlast(&self.values, SkipPolicy::Missing))
    }

    #[must_use]
    pub fn all(&self) -> bool {
        lf_types::all(&self.values)
    }

    #[must_use]
    pub fn any(&self) -> bool {
        lf_types::any(&self.values)
    }

    /// Positional covariance; lengths must match.
    pub fn covar(&self, other: &Self, ddof: usize) -> Result<Scalar, SeriesError> {
        Ok(lf_types::covar(&self.values, &other.values, ddof)?)
    }

    /// Positional Pearson correlation; lengths must match.
    pub fn corr(&self, other: &Self) -> Result<Scalar, SeriesError> {
        Ok(lf_types::corr(&self.values, &other.values)?)
    }

    pub fn quantile(&self, p: f64) -> Result<Scalar, SeriesError> {
        Ok(lf_types::quantile(&self.values, p)?)
    }

    #[must_use]
    pub fn rank(&self, options: RankOptions) -> Self {
        self.derive(lf_types::rank(
            &self.values,
            options.ascending,
            options.normalized,
        ))
    }

    // ── Cumulative ─────────────────────────────────────────────────────

    #[must_use]
    pub fn accumulate<F>(&self, seed: Option<f64>, fold: F) -> Self
    where
        F: FnMut(f64, f64) -> f64,
    {
        self.derive(lf_types::accumulate(&self.values, seed, fold))
    }

    #[must_use]
    pub fn cumsum(&self) -> Self {
        self.derive(lf_types::cumsum(&self.values))
    }

    #[must_use]
    pub fn cumprod(&self) -> Self {
        self.derive(lf_types::cumprod(&self.values))
    }

    #[must_use]
    pub fn cummax(&self) -> Self {
        self.derive(lf_types::cummax(&self.values))
    }

    #[must_use]
    pub fn cummin(&self) -> Self {
        self.derive(lf_types::cummin(&self.values))
    }

    /// Compounded returns.
    #[must_use]
    pub fn compound(&self) -> Self {
        self.derive(lf_types::compound(&self.values))
    }

    /// Largest peak-to-trough loss, located by label.
    #[must_use]
    pub fn max_drawdown(&self) -> Option<Drawdown<IndexLabel>> {
        let labels = self.index.labels();
        lf_types::max_drawdown(&self.values).map(|dd| dd.map_positions(|p| labels[p].clone()))
    }

    // ── Ordering ───────────────────────────────────────────────────────

    /// Stable sort by value or label. Values must be mutually comparable,
    /// ignoring missing ones.
    pub fn sort(&self, options: SortOptions) -> Result<Self, SeriesError> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match options.by {
            SortBy::Values => {
                let mut present = self.values.iter().filter(|v| !v.is_missing());
                if let Some(first) = present.next() {
                    for value in present {
                        first.compare(value)?;
                    }
                }
                order.sort_by(|&a, &b| {
                    compare_scalars_with_na(
                        &self.values[a],
                        &self.values[b],
                        options.ascending,
                        options.na_position,
                    )
                });
            }
            SortBy::Index => {
                if !self.index.is_sortable() {
                    return Err(IndexError::NotSortable { op: "sort" }.into());
                }
                let labels = self.index.labels();
                order.sort_by(|&a, &b| {
                    let ord = labels[a].try_cmp(&labels[b]).unwrap_or(Ordering::Equal);
                    if options.ascending { ord } else { ord.reverse() }
                });
            }
        }
        Ok(self.take(&order))
    }

    pub fn sort_values(&self) -> Result<Self, SeriesError> {
        self.sort(SortOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use lf_index::{Index, IndexLabel};
    use lf_types::{ErrorKind, NullKind, ReduceOptions, Scalar};

    use super::{
        Agg, CombineOptions, FillOptions, RankOptions, ReindexOptions, Series, SeriesError,
        SortOptions,
    };

    fn floats(values: &[f64]) -> Vec<Scalar> {
        values.iter().copied().map(Scalar::Float64).collect()
    }

    fn labelled(labels: &[&str], values: &[f64]) -> Series {
        Series::from_values(
            "s",
            labels.iter().copied().map(IndexLabel::from).collect(),
            floats(values),
        )
        .expect("equal lengths")
    }

    #[test]
    fn construction_validates_lengths() {
        let err = Series::with_index(Index::from_i64(vec![1, 2]), floats(&[1.0]))
            .expect_err("mismatch");
        assert_eq!(
            err,
            SeriesError::LengthMismatch {
                index_len: 2,
                value_len: 1
            }
        );
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);

        let mut s = Series::new(floats(&[1.0, 2.0]));
        assert_eq!(s.index(), &Index::from_i64(vec![0, 1]));
        assert!(s.set_index(Index::from_i64(vec![1])).is_err());
        s.set_index(Index::from_i64(vec![7, 8])).expect("same length");
        assert_eq!(s.loc(&IndexLabel::Int64(8)), Ok(&Scalar::Float64(2.0)));
    }

    #[test]
    fn outer_join_alignment() {
        let a = Series::from_values(
            "a",
            vec!["x".into(), "y".into()],
            vec![Scalar::Int64(1), Scalar::Int64(2)],
        )
        .expect("valid");
        let b = Series::from_values(
            "b",
            vec!["y".into(), "z".into()],
            vec![Scalar::Int64(10), Scalar::Int64(20)],
        )
        .expect("valid");
        let sum = a.add(&b).expect("unique labels");
        assert_eq!(
            sum.index().labels(),
            &[IndexLabel::from("x"), IndexLabel::from("y"), IndexLabel::from("z")]
        );
        assert_eq!(
            sum.values(),
            &[Scalar::nan(), Scalar::Float64(12.0), Scalar::nan()]
        );
        assert_eq!(sum.name(), None);
    }

    #[test]
    fn scalar_and_sequence_operands() {
        let s = labelled(&["a", "b"], &[1.0, 2.0]);
        let doubled = s.mul(&Scalar::Float64(2.0)).expect("broadcast");
        assert_eq!(doubled.values(), floats(&[2.0, 4.0]).as_slice());
        assert_eq!(doubled.index(), s.index());

        let seq = floats(&[10.0, 20.0]);
        assert_eq!(
            s.add(&seq).expect("same length").values(),
            floats(&[11.0, 22.0]).as_slice()
        );
        let short = floats(&[1.0]);
        assert_eq!(
            s.add(&short).expect_err("short").kind(),
            ErrorKind::LengthMismatch
        );
    }

    #[test]
    fn ignore_index_pairs_by_position() {
        let a = labelled(&["a", "b"], &[1.0, 2.0]);
        let b = labelled(&["c", "d"], &[3.0, 4.0]);
        let out = a
            .sub_with(&b, CombineOptions::ignore_index())
            .expect("same length");
        assert_eq!(out.index(), a.index());
        assert_eq!(out.values(), floats(&[-2.0, -2.0]).as_slice());
        assert_eq!(out.name(), Some("s"));
    }

    #[test]
    fn non_numeric_operands_propagate_marker() {
        let s = Series::new(vec![Scalar::Utf8("x".to_owned()), Scalar::Int64(3)]);
        let out = s.add(&Scalar::Int64(1)).expect("broadcast");
        assert_eq!(out.values(), &[Scalar::nan(), Scalar::Float64(4.0)]);
        let cmp = s.gt(&Scalar::Int64(1)).expect("broadcast");
        assert_eq!(cmp.values(), &[Scalar::nan(), Scalar::Bool(true)]);
    }

    #[test]
    fn custom_combine_function() {
        let a = labelled(&["a", "b"], &[1.0, 5.0]);
        let b = labelled(&["a", "b"], &[4.0, 2.0]);
        let out = a
            .combine(&b, CombineOptions::default(), |l, r| {
                match (l.as_f64(), r.as_f64()) {
                    (Some(x), Some(y)) => Scalar::Float64(x.max(y)),
                    _ => Scalar::nan(),
                }
            })
            .expect("aligned");
        assert_eq!(out.values(), floats(&[4.0, 5.0]).as_slice());
    }

    #[test]
    fn reducers_default_to_skipping_non_numeric() {
        let s = Series::new(vec![
            Scalar::Float64(1.0),
            Scalar::Utf8("x".to_owned()),
            Scalar::Float64(3.0),
            Scalar::Null(NullKind::Null),
        ]);
        assert_eq!(s.sum(), Scalar::Float64(4.0));
        assert_eq!(s.mean(), Scalar::Float64(2.0));
        assert_eq!(s.count(), 2);
        assert_eq!(s.min(), Ok(Scalar::Float64(1.0)));
        assert_eq!(
            s.aggregate(Agg::Count, ReduceOptions::default().skip_missing()),
            Ok(Scalar::Int64(3))
        );
        assert_eq!(
            s.aggregate(Agg::Sum, ReduceOptions::default().skip_missing()),
            Ok(Scalar::nan())
        );
    }

    #[test]
    fn min_of_empty_series_fails() {
        let s = Series::new(Vec::new());
        assert_eq!(s.max().expect_err("empty").kind(), ErrorKind::InvalidArgument);
        assert_eq!(s.sum(), Scalar::nan());
    }

    #[test]
    fn label_reducers() {
        let s = labelled(&["a", "b", "c"], &[3.0, 1.0, 3.0]);
        assert_eq!(s.idxmin(), Some(&IndexLabel::from("b")));
        assert_eq!(s.idxmax(), Some(&IndexLabel::from("a")));
        assert_eq!(
            s.aggregate(Agg::IdxLast, ReduceOptions::default()),
            Ok(Scalar::Utf8("c".to_owned()))
        );
        assert_eq!(s.first(), Scalar::Float64(3.0));
    }

    #[test]
    fn covar_and_corr_are_positional() {
        let x = Series::new(floats(&[1.0, 2.0, 3.0]));
        let y = labelled(&["a", "b", "c"], &[2.0, 4.0, 6.0]);
        assert_eq!(x.covar(&y, 1), Ok(Scalar::Float64(2.0)));
        let Ok(Scalar::Float64(r)) = x.corr(&y) else {
            panic!("expected Float64");
        };
        assert!((r - 1.0).abs() < 1e-12);
        let short = Series::new(floats(&[1.0]));
        assert_eq!(
            x.corr(&short).expect_err("mismatch").kind(),
            ErrorKind::LengthMismatch
        );
    }

    #[test]
    fn cumulative_ops_keep_index() {
        let s = labelled(&["a", "b", "c"], &[1.0, 2.0, 3.0]);
        let cs = s.cumsum();
        assert_eq!(cs.index(), s.index());
        assert_eq!(cs.values(), floats(&[1.0, 3.0, 6.0]).as_slice());
        let product = s.accumulate(Some(2.0), |acc, v| acc * v);
        assert_eq!(product.values(), floats(&[2.0, 4.0, 12.0]).as_slice());
    }

    #[test]
    fn compound_returns() {
        let s = Series::new(floats(&[0.1, 0.1]));
        let Scalar::Float64(total) = s.compound().values()[1] else {
            panic!("expected Float64");
        };
        assert!((total - 0.21).abs() < 1e-12);
    }

    #[test]
    fn fill_requires_method_or_value() {
        let s = Series::new(vec![Scalar::nan()]);
        assert_eq!(
            s.fillna(&FillOptions::default())
                .expect_err("empty options")
                .kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn fillna_forward_backward_and_value() {
        let s = Series::new(vec![
            Scalar::nan(),
            Scalar::Float64(1.0),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(3.0),
            Scalar::nan(),
        ]);
        let ffill = s.fillna(&FillOptions::forward()).expect("valid");
        assert_eq!(
            ffill.values(),
            &[
                Scalar::nan(),
                Scalar::Float64(1.0),
                Scalar::Float64(1.0),
                Scalar::Float64(3.0),
                Scalar::Float64(3.0),
            ]
        );
        let bfill = s.fillna(&FillOptions::backward()).expect("valid");
        assert_eq!(bfill.values()[0], Scalar::Float64(1.0));
        assert_eq!(bfill.values()[4], Scalar::nan());

        let both = s
            .fillna(&FillOptions::forward().with_value(0.0))
            .expect("valid");
        assert_eq!(both.values()[0], Scalar::Float64(0.0));
    }

    #[test]
    fn fillnan_targets_strings_too() {
        let s = Series::new(vec![Scalar::Utf8("x".to_owned()), Scalar::Int64(2)]);
        assert_eq!(
            s.fillna(&FillOptions::value(0.0)).expect("valid").values()[0],
            Scalar::Utf8("x".to_owned())
        );
        assert_eq!(
            s.fillnan(&FillOptions::value(0.0)).expect("valid").values()[0],
            Scalar::Float64(0.0)
        );
    }

    #[test]
    fn reindex_marks_absent_labels() {
        let s = labelled(&["a", "b"], &[1.0, 2.0]);
        let target: Index = ["b", "c", "a"].into_iter().collect();
        let out = s.reindex(&target, &ReindexOptions::default()).expect("unique");
        assert_eq!(
            out.values(),
            &[Scalar::Float64(2.0), Scalar::nan(), Scalar::Float64(1.0)]
        );
        let filled = s
            .reindex(
                &target,
                &ReindexOptions {
                    fill: Some(FillOptions::value(-1.0)),
                },
            )
            .expect("unique");
        assert_eq!(filled.values()[1], Scalar::Float64(-1.0));
    }

    #[test]
    fn sort_places_missing_last_and_keeps_original() {
        let s = Series::new(vec![
            Scalar::Float64(3.0),
            Scalar::nan(),
            Scalar::Float64(1.0),
            Scalar::Float64(2.0),
        ]);
        let sorted = s.sort_values().expect("comparable");
        assert_eq!(
            sorted.values(),
            &[
                Scalar::Float64(1.0),
                Scalar::Float64(2.0),
                Scalar::Float64(3.0),
                Scalar::nan(),
            ]
        );
        assert_eq!(sorted.index(), &Index::from_i64(vec![2, 3, 0, 1]));
        let desc = s
            .sort(SortOptions::default().descending().na_first())
            .expect("comparable");
        assert_eq!(desc.values()[0], Scalar::nan());
        assert_eq!(desc.values()[1], Scalar::Float64(3.0));
        assert_eq!(s.values()[0], Scalar::Float64(3.0));
    }

    #[test]
    fn sort_across_kinds_is_type_error() {
        let s = Series::new(vec![Scalar::Int64(1), Scalar::Utf8("a".to_owned())]);
        assert_eq!(
            s.sort_values().expect_err("mixed").kind(),
            ErrorKind::TypeError
        );
    }

    #[test]
    fn sort_by_index_descending() {
        let s = labelled(&["b", "c", "a"], &[1.0, 2.0, 3.0]);
        let out = s.sort(SortOptions::by_index().descending()).expect("sortable");
        assert_eq!(out.values(), floats(&[2.0, 1.0, 3.0]).as_slice());
    }

    #[test]
    fn rank_and_quantile() {
        let s = Series::new(floats(&[10.0, 30.0, 20.0, 20.0]));
        assert_eq!(
            s.rank(RankOptions::default()).values(),
            floats(&[1.0, 4.0, 2.0, 2.0]).as_slice()
        );
        assert_eq!(s.quantile(0.5), Ok(Scalar::Float64(20.0)));
        assert_eq!(
            s.quantile(f64::NAN).expect_err("nan p").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(s.quantile(f64::NEG_INFINITY), Ok(Scalar::Float64(10.0)));
        assert_eq!(s.quantile(1e300), Ok(Scalar::Float64(30.0)));
    }

    #[test]
    fn access_by_label_and_position() {
        let s = labelled(&["a", "b", "c", "d"], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.iloc(-1), Ok(&Scalar::Float64(4.0)));
        assert_eq!(
            s.iloc(9).expect_err("oob").kind(),
            ErrorKind::OutOfBounds
        );
        assert_eq!(
            s.loc(&"z".into()).expect_err("absent").kind(),
            ErrorKind::KeyError
        );
        let picked = s.loc_many(&["d".into(), "a".into()]).expect("present");
        assert_eq!(picked.values(), floats(&[4.0, 1.0]).as_slice());
        let by_pos = s.iloc_many(&[0, -1]).expect("in bounds");
        assert_eq!(by_pos.index().labels(), &[IndexLabel::from("a"), IndexLabel::from("d")]);
        let range = s.loc_range(&"b".into(), &"d".into()).expect("sortable");
        assert_eq!(range.values(), floats(&[2.0, 3.0]).as_slice());
        assert_eq!(s.islice(1, 3).expect("in bounds"), range);
        assert_eq!(s.head(2).values(), floats(&[1.0, 2.0]).as_slice());
        assert_eq!(s.tail(9).len(), 4);
        assert_eq!(
            s.every(2).expect("positive").values(),
            floats(&[1.0, 3.0]).as_slice()
        );
    }

    #[test]
    fn asof_reads_value_at_resolved_label() {
        let s = Series::from_values(
            "px",
            [1_i64, 3, 5].into_iter().map(IndexLabel::from).collect(),
            floats(&[10.0, 30.0, 50.0]),
        )
        .expect("valid");
        assert_eq!(s.asof(&IndexLabel::Int64(4)), Ok(&Scalar::Float64(30.0)));
        assert_eq!(
            s.asof(&IndexLabel::Int64(0)).expect_err("before start").kind(),
            ErrorKind::OutOfRange
        );

        let newest_first = s.reverse();
        assert_eq!(
            newest_first.asof(&IndexLabel::Int64(4)),
            Ok(&Scalar::Float64(30.0))
        );
        assert_eq!(
            newest_first.asof(&IndexLabel::Int64(9)),
            Ok(&Scalar::Float64(50.0))
        );
        assert_eq!(
            newest_first
                .asof(&IndexLabel::Int64(0))
                .expect_err("before start")
                .kind(),
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn filter_map_mask_drop() {
        let s = labelled(&["a", "b", "c"], &[1.0, 2.0, 3.0]);
        let big = s.filter(|v, _| v.as_f64().is_some_and(|x| x > 1.5));
        assert_eq!(big.index().labels(), &[IndexLabel::from("b"), IndexLabel::from("c")]);
        let squared = s.map(|v, _| Scalar::from_f64(v.as_f64().unwrap_or(f64::NAN).powi(2)));
        assert_eq!(squared.values(), floats(&[1.0, 4.0, 9.0]).as_slice());
        assert_eq!(
            s.mask(&[true, false, true]).expect("same length").len(),
            2
        );
        assert_eq!(
            s.mask(&[true]).expect_err("short").kind(),
            ErrorKind::LengthMismatch
        );
        assert_eq!(s.drop(&["a".into()]).len(), 2);
        assert_eq!(s.reverse().reverse(), s);
    }

    #[test]
    fn missing_value_helpers() {
        let s = Series::new(vec![
            Scalar::Float64(1.0),
            Scalar::Utf8("x".to_owned()),
            Scalar::Float64(f64::INFINITY),
        ]);
        assert_eq!(s.dropna().len(), 2);
        assert_eq!(s.dropnan().len(), 1);
        assert_eq!(
            s.isna().values(),
            &[Scalar::Bool(false), Scalar::Bool(false), Scalar::Bool(true)]
        );
        assert_eq!(
            s.isnan().values(),
            &[Scalar::Bool(false), Scalar::Bool(true), Scalar::Bool(true)]
        );
    }

    #[test]
    fn elementwise_helpers() {
        let s = Series::new(vec![
            Scalar::Float64(-1.0),
            Scalar::Float64(2.0),
            Scalar::Float64(2.0),
            Scalar::Int64(0),
        ]);
        assert_eq!(
            s.abs().values(),
            floats(&[1.0, 2.0, 2.0, 0.0]).as_slice()
        );
        assert_eq!(s.neg().values()[0], Scalar::Float64(1.0));
        assert_eq!(s.not().values()[3], Scalar::Bool(true));
        assert_eq!(s.diff(1).values()[0], Scalar::nan());
        assert_eq!(s.diff(1).values()[1], Scalar::Float64(3.0));
        assert_eq!(s.uniques().len(), 3);
        assert_eq!(
            s.isin(&[Scalar::Float64(2.0)]).values(),
            &[
                Scalar::Bool(false),
                Scalar::Bool(true),
                Scalar::Bool(true),
                Scalar::Bool(false),
            ]
        );
        let clipped = s.where_or(|v| v.as_f64().is_some_and(|x| x >= 0.0), &Scalar::Int64(0));
        assert_eq!(clipped.values()[0], Scalar::Int64(0));
    }

    #[test]
    fn drawdown_reports_labels() {
        let s = labelled(&["d1", "d2", "d3", "d4"], &[10.0, 12.0, 6.0, 13.0]);
        let dd = s.max_drawdown().expect("numeric");
        assert_eq!(dd.peak, IndexLabel::from("d2"));
        assert_eq!(dd.trough, IndexLabel::from("d3"));
        assert_eq!(dd.recovery, Some(IndexLabel::from("d4")));
        assert!((dd.loss + 0.5).abs() < 1e-12);
    }
}
