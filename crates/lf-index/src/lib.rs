#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use lf_types::{ErrorKind, NullKind, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Timestamp(i64),
}

/// Float labels hash and compare by canonical bits so `0.0 == -0.0` and all
/// NaNs collapse to one key.
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for IndexLabel {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for IndexLabel {}

impl Hash for IndexLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) | Self::Timestamp(v) => v.hash(state),
            Self::Float64(v) => canonical_bits(*v).hash(state),
            Self::Utf8(v) => v.hash(state),
        }
    }
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for IndexLabel {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<bool> for IndexLabel {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl TryFrom<Scalar> for IndexLabel {
    type Error = IndexError;

    fn try_from(value: Scalar) -> Result<Self, Self::Error> {
        match value {
            Scalar::Null(kind) => Err(IndexError::MissingLabel { kind }),
            Scalar::Bool(v) => Ok(Self::Bool(v)),
            Scalar::Int64(v) => Ok(Self::Int64(v)),
            Scalar::Float64(v) => Ok(Self::Float64(v)),
            Scalar::Utf8(v) => Ok(Self::Utf8(v)),
            Scalar::Timestamp(v) => Ok(Self::Timestamp(v)),
        }
    }
}

impl From<IndexLabel> for Scalar {
    fn from(label: IndexLabel) -> Self {
        match label {
            IndexLabel::Bool(v) => Self::Bool(v),
            IndexLabel::Int64(v) => Self::Int64(v),
            IndexLabel::Float64(v) => Self::Float64(v),
            IndexLabel::Utf8(v) => Self::Utf8(v),
            IndexLabel::Timestamp(v) => Self::Timestamp(v),
        }
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "ts:{v}"),
        }
    }
}

/// Ordering family a label belongs to. Labels only compare within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelClass {
    Numeric,
    Categorical,
    Temporal,
}

impl IndexLabel {
    #[must_use]
    pub fn class(&self) -> Option<LabelClass> {
        match self {
            Self::Bool(_) | Self::Int64(_) => Some(LabelClass::Numeric),
            Self::Float64(v) if v.is_finite() => Some(LabelClass::Numeric),
            Self::Float64(_) => None,
            Self::Utf8(_) => Some(LabelClass::Categorical),
            Self::Timestamp(_) => Some(LabelClass::Temporal),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Value comparison within one label class.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, IndexError> {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => return Ok(a.cmp(b)),
            (Self::Utf8(a), Self::Utf8(b)) => return Ok(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => return Ok(a.cmp(b)),
            _ => {}
        }
        match (self.class(), other.class()) {
            (Some(LabelClass::Numeric), Some(LabelClass::Numeric)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => Ok(a.total_cmp(&b)),
                    _ => Err(self.incompatible(other)),
                }
            }
            _ => Err(self.incompatible(other)),
        }
    }

    fn incompatible(&self, other: &Self) -> IndexError {
        IndexError::IncompatibleLabels {
            left: self.to_string(),
            right: other.to_string(),
        }
    }
}

/// Comparator for labels already known to share one class.
fn cmp_within_class(a: &IndexLabel, b: &IndexLabel) -> Ordering {
    a.try_cmp(b).unwrap_or(Ordering::Equal)
}

/// Classification of a whole index, computed once per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Numeric,
    Categorical,
    Temporal,
    Mixed,
}

impl IndexKind {
    #[must_use]
    pub fn is_sortable(self) -> bool {
        !matches!(self, Self::Mixed)
    }
}

fn detect_kind(labels: &[IndexLabel]) -> IndexKind {
    let Some(first) = labels.first() else {
        return IndexKind::Numeric;
    };
    let Some(class) = first.class() else {
        return IndexKind::Mixed;
    };
    if labels.iter().any(|l| l.class() != Some(class)) {
        return IndexKind::Mixed;
    }
    match class {
        LabelClass::Numeric => IndexKind::Numeric,
        LabelClass::Categorical => IndexKind::Categorical,
        LabelClass::Temporal => IndexKind::Temporal,
    }
}

/// Detected sort order of an index's labels.
///
/// Ordering is non-strict, so an index of repeated labels is ascending.
/// Unsortable (mixed) indexes are always `Unsorted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
    Unsorted,
}

impl SortOrder {
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
            Self::Unsorted => Self::Unsorted,
        }
    }
}

fn detect_sort_order(labels: &[IndexLabel], kind: IndexKind) -> SortOrder {
    if !kind.is_sortable() {
        return SortOrder::Unsorted;
    }
    if labels
        .windows(2)
        .all(|w| cmp_within_class(&w[0], &w[1]) != Ordering::Greater)
    {
        return SortOrder::Ascending;
    }
    if labels
        .windows(2)
        .all(|w| cmp_within_class(&w[0], &w[1]) != Ordering::Less)
    {
        return SortOrder::Descending;
    }
    SortOrder::Unsorted
}

/// Whether set algebra sorts its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Sort when the combined labels are sortable, else keep insertion order.
    #[default]
    Default,
    /// Always sort; an unsortable result is a `TypeError`.
    Always,
    /// Keep insertion order.
    Never,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("label {label} not found in index")]
    KeyNotFound { label: String },
    #[error("{op} requires unique labels but the index has duplicates")]
    DuplicateKeys { op: &'static str },
    #[error("position {position} is out of bounds for length {len}")]
    OutOfBounds { position: isize, len: usize },
    #[error("range [{start}, {stop}) is out of bounds for length {len}")]
    SliceOutOfBounds {
        start: usize,
        stop: usize,
        len: usize,
    },
    #[error("value {value} lies before the first label")]
    OutOfRange { value: String },
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("asof requires a sorted index")]
    NotSorted,
    #[error("{op} requires a sortable index (all labels numeric, categorical, or temporal)")]
    NotSortable { op: &'static str },
    #[error("labels {left} and {right} cannot be compared")]
    IncompatibleLabels { left: String, right: String },
    #[error("{op} of an empty index is undefined")]
    EmptyIndex { op: &'static str },
    #[error("a missing value ({kind:?}) cannot be used as a label")]
    MissingLabel { kind: NullKind },
    #[error("alignment vectors must have equal lengths")]
    InvalidAlignmentVectors,
}

impl IndexError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyNotFound { .. } | Self::DuplicateKeys { .. } => ErrorKind::KeyError,
            Self::OutOfBounds { .. } | Self::SliceOutOfBounds { .. } => ErrorKind::OutOfBounds,
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::LengthMismatch { .. } | Self::InvalidAlignmentVectors => {
                ErrorKind::LengthMismatch
            }
            Self::NotSorted => ErrorKind::NotSorted,
            Self::NotSortable { .. } | Self::IncompatibleLabels { .. } => ErrorKind::TypeError,
            Self::EmptyIndex { .. } | Self::MissingLabel { .. } => ErrorKind::InvalidArgument,
        }
    }
}

/// Resolve a possibly negative position against `len`.
pub fn normalize_position(position: isize, len: usize) -> Result<usize, IndexError> {
    let resolved = if position < 0 {
        len.checked_sub(position.unsigned_abs())
    } else {
        Some(position.unsigned_abs())
    };
    match resolved {
        Some(pos) if pos < len => Ok(pos),
        _ => Err(IndexError::OutOfBounds { position, len }),
    }
}

/// Immutable label index.
///
/// The position map, classification, and sort order are memoized per
/// instance behind `OnceLock`, so shared references may be read from several
/// threads. Every transform returns a new `Index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
    name: Option<String>,
    #[serde(skip)]
    position_cache: OnceLock<HashMap<IndexLabel, usize>>,
    #[serde(skip)]
    kind_cache: OnceLock<IndexKind>,
    #[serde(skip)]
    sort_order_cache: OnceLock<SortOrder>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for Index {}

impl<L: Into<IndexLabel>> FromIterator<L> for Index {
    fn from_iter<T: IntoIterator<Item = L>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self {
            labels,
            name: None,
            position_cache: OnceLock::new(),
            kind_cache: OnceLock::new(),
            sort_order_cache: OnceLock::new(),
        }
    }

    fn with_sort_order(labels: Vec<IndexLabel>, order: SortOrder) -> Self {
        let index = Self::new(labels);
        let _ = index.sort_order_cache.set(order);
        index
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        values.into_iter().collect()
    }

    #[must_use]
    pub fn from_utf8(values: Vec<String>) -> Self {
        values.into_iter().collect()
    }

    /// Default positional index `0..len`.
    #[must_use]
    pub fn range(len: usize) -> Self {
        let labels = (0..len as i64).map(IndexLabel::Int64).collect();
        Self::with_sort_order(labels, SortOrder::Ascending)
    }

    #[must_use]
    pub fn from_range(start: i64, stop: i64, step: i64) -> Self {
        let mut labels = Vec::new();
        let mut next = Some(start);
        while let Some(val) = next {
            let in_range = match step.cmp(&0) {
                Ordering::Greater => val < stop,
                Ordering::Less => val > stop,
                Ordering::Equal => false,
            };
            if !in_range {
                break;
            }
            labels.push(IndexLabel::Int64(val));
            next = val.checked_add(step);
        }
        Self::new(labels)
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

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn into_labels(self) -> Vec<IndexLabel> {
        self.labels
    }

    // ── Cached classification ──────────────────────────────────────────

    fn position_map(&self) -> &HashMap<IndexLabel, usize> {
        self.position_cache.get_or_init(|| {
            let mut positions = HashMap::with_capacity(self.labels.len());
            for (idx, label) in self.labels.iter().enumerate() {
                positions.entry(label.clone()).or_insert(idx);
            }
            positions
        })
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.position_map().len() == self.labels.len()
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.is_unique()
    }

    fn require_unique(&self, op: &'static str) -> Result<(), IndexError> {
        if self.is_unique() {
            Ok(())
        } else {
            Err(IndexError::DuplicateKeys { op })
        }
    }

    #[must_use]
    pub fn kind(&self) -> IndexKind {
        *self.kind_cache.get_or_init(|| detect_kind(&self.labels))
    }

    #[must_use]
    pub fn is_sortable(&self) -> bool {
        self.kind().is_sortable()
    }

    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        *self
            .sort_order_cache
            .get_or_init(|| detect_sort_order(&self.labels, self.kind()))
    }

    #[must_use]
    pub fn is_sorted(&self) -> bool {
        !matches!(self.sort_order(), SortOrder::Unsorted)
    }

    /// Checks that `label` can be ordered against this index's labels.
    fn check_comparable(&self, label: &IndexLabel, op: &'static str) -> Result<(), IndexError> {
        let class = match self.kind() {
            IndexKind::Numeric => LabelClass::Numeric,
            IndexKind::Categorical => LabelClass::Categorical,
            IndexKind::Temporal => LabelClass::Temporal,
            IndexKind::Mixed => return Err(IndexError::NotSortable { op }),
        };
        match (label.class(), self.labels.first()) {
            (Some(c), _) if c == class => Ok(()),
            (_, Some(first)) => Err(first.incompatible(label)),
            // Empty indexes accept any comparable value.
            (Some(_), None) => Ok(()),
            (None, None) => Err(IndexError::NotSortable { op }),
        }
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn has(&self, label: &IndexLabel) -> bool {
        self.position_map().contains_key(label)
    }

    /// First position of `label`, without the uniqueness requirement.
    #[must_use]
    pub fn position(&self, label: &IndexLabel) -> Option<usize> {
        self.position_map().get(label).copied()
    }

    pub fn index_of(&self, label: &IndexLabel) -> Result<usize, IndexError> {
        self.require_unique("index_of")?;
        self.position(label).ok_or_else(|| IndexError::KeyNotFound {
            label: label.to_string(),
        })
    }

    pub fn loc(&self, label: &IndexLabel) -> Result<usize, IndexError> {
        self.index_of(label)
    }

    /// Vectorized `loc`: an index holding the position of each label.
    pub fn loc_many(&self, labels: &[IndexLabel]) -> Result<Index, IndexError> {
        labels
            .iter()
            .map(|label| self.index_of(label).map(|pos| IndexLabel::Int64(pos as i64)))
            .collect::<Result<Vec<_>, _>>()
            .map(Index::new)
    }

    pub fn at(&self, position: isize) -> Result<&IndexLabel, IndexError> {
        let pos = normalize_position(position, self.labels.len())?;
        Ok(&self.labels[pos])
    }

    pub fn iloc(&self, positions: &[isize]) -> Result<Index, IndexError> {
        let resolved = positions
            .iter()
            .map(|&p| normalize_position(p, self.labels.len()))
            .collect::<Result<Vec<_>, _>>()?;
        self.take(&resolved)
    }

    #[must_use]
    pub fn get_indexer(&self, target: &Index) -> Vec<Option<usize>> {
        let map = self.position_map();
        target
            .labels
            .iter()
            .map(|label| map.get(label).copied())
            .collect()
    }

    #[must_use]
    pub fn isin(&self, values: &[IndexLabel]) -> Vec<bool> {
        let set: HashMap<&IndexLabel, ()> = values.iter().map(|v| (v, ())).collect();
        self.labels.iter().map(|l| set.contains_key(l)).collect()
    }

    // ── As-of lookup ───────────────────────────────────────────────────

    /// Position of the nearest label at or before `value` in index order.
    ///
    /// Resolves to the largest label `<= value` in either direction; a value
    /// below the smallest label is `OutOfRange`. Uses bisection; an exact
    /// match is answered from the position map.
    pub fn asof_position(&self, value: &IndexLabel) -> Result<usize, IndexError> {
        let order = self.sort_order();
        if order == SortOrder::Unsorted {
            return Err(IndexError::NotSorted);
        }
        self.check_comparable(value, "asof")?;
        if let Some(pos) = self.position(value) {
            return Ok(pos);
        }

        let out_of_range = || IndexError::OutOfRange {
            value: value.to_string(),
        };
        match order {
            SortOrder::Ascending => self
                .labels
                .partition_point(|l| cmp_within_class(l, value) != Ordering::Greater)
                .checked_sub(1)
                .ok_or_else(out_of_range),
            _ => {
                let split = self
                    .labels
                    .partition_point(|l| cmp_within_class(l, value) == Ordering::Greater);
                if split < self.labels.len() {
                    Ok(split)
                } else {
                    Err(out_of_range())
                }
            }
        }
    }

    pub fn asof(&self, value: &IndexLabel) -> Result<&IndexLabel, IndexError> {
        let pos = self.asof_position(value)?;
        Ok(&self.labels[pos])
    }

    // ── Slicing ────────────────────────────────────────────────────────

    /// Positions whose labels fall in `[start, stop)` by value.
    pub fn slice_positions(
        &self,
        start: &IndexLabel,
        stop: &IndexLabel,
    ) -> Result<Vec<usize>, IndexError> {
        self.check_comparable(start, "slice")?;
        self.check_comparable(stop, "slice")?;
        Ok(self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| {
                cmp_within_class(l, start) != Ordering::Less
                    && cmp_within_class(l, stop) == Ordering::Less
            })
            .map(|(i, _)| i)
            .collect())
    }

    pub fn slice(&self, start: &IndexLabel, stop: &IndexLabel) -> Result<Index, IndexError> {
        let positions = self.slice_positions(start, stop)?;
        self.take(&positions)
    }

    pub fn islice(&self, start: usize, stop: usize) -> Result<Index, IndexError> {
        if start > stop || stop > self.labels.len() {
            return Err(IndexError::SliceOutOfBounds {
                start,
                stop,
                len: self.labels.len(),
            });
        }
        Ok(self.derive(self.labels[start..stop].to_vec()))
    }

    /// Labels at `positions`; any position past the end is `OutOfBounds`.
    pub fn take(&self, positions: &[usize]) -> Result<Index, IndexError> {
        let labels = positions
            .iter()
            .map(|&i| {
                self.labels.get(i).cloned().ok_or(IndexError::OutOfBounds {
                    position: isize::try_from(i).unwrap_or(isize::MAX),
                    len: self.labels.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(labels))
    }

    fn derive(&self, labels: Vec<IndexLabel>) -> Index {
        let mut out = Index::new(labels);
        out.name = self.name.clone();
        out
    }

    // ── Ordering ───────────────────────────────────────────────────────

    /// Stable ascending permutation.
    pub fn argsort(&self) -> Result<Vec<usize>, IndexError> {
        if !self.is_sortable() {
            return Err(IndexError::NotSortable { op: "sort" });
        }
        let mut order: Vec<usize> = (0..self.labels.len()).collect();
        order.sort_by(|&a, &b| cmp_within_class(&self.labels[a], &self.labels[b]));
        Ok(order)
    }

    pub fn sort(&self) -> Result<Index, IndexError> {
        let order = self.argsort()?;
        let mut out = Index::with_sort_order(
            order.iter().map(|&i| self.labels[i].clone()).collect(),
            SortOrder::Ascending,
        );
        out.name = self.name.clone();
        Ok(out)
    }

    /// Stable sort with a caller-supplied comparator.
    #[must_use]
    pub fn sort_by<F>(&self, mut compare: F) -> Index
    where
        F: FnMut(&IndexLabel, &IndexLabel) -> Ordering,
    {
        let mut labels = self.labels.clone();
        labels.sort_by(|a, b| compare(a, b));
        self.derive(labels)
    }

    #[must_use]
    pub fn reverse(&self) -> Index {
        let mut out = Index::with_sort_order(
            self.labels.iter().rev().cloned().collect(),
            self.sort_order().reversed(),
        );
        out.name = self.name.clone();
        out
    }

    pub fn min(&self) -> Result<&IndexLabel, IndexError> {
        self.idx_extremum("min", Ordering::Less)
            .map(|pos| &self.labels[pos])
    }

    pub fn max(&self) -> Result<&IndexLabel, IndexError> {
        self.idx_extremum("max", Ordering::Greater)
            .map(|pos| &self.labels[pos])
    }

    pub fn idxmin(&self) -> Result<usize, IndexError> {
        self.require_unique("idxmin")?;
        self.idx_extremum("idxmin", Ordering::Less)
    }

    pub fn idxmax(&self) -> Result<usize, IndexError> {
        self.require_unique("idxmax")?;
        self.idx_extremum("idxmax", Ordering::Greater)
    }

    fn idx_extremum(&self, op: &'static str, wanted: Ordering) -> Result<usize, IndexError> {
        if !self.is_sortable() {
            return Err(IndexError::NotSortable { op });
        }
        let mut best: Option<usize> = None;
        for (i, label) in self.labels.iter().enumerate() {
            match best {
                Some(b) if cmp_within_class(label, &self.labels[b]) != wanted => {}
                _ => best = Some(i),
            }
        }
        best.ok_or(IndexError::EmptyIndex { op })
    }

    // ── Transforms ─────────────────────────────────────────────────────

    #[must_use]
    pub fn map<F>(&self, f: F) -> Index
    where
        F: FnMut(&IndexLabel) -> IndexLabel,
    {
        self.derive(self.labels.iter().map(f).collect())
    }

    #[must_use]
    pub fn filter<F>(&self, mut predicate: F) -> Index
    where
        F: FnMut(&IndexLabel) -> bool,
    {
        self.derive(
            self.labels
                .iter()
                .filter(|l| predicate(l))
                .cloned()
                .collect(),
        )
    }

    pub fn mask(&self, keep: &[bool]) -> Result<Index, IndexError> {
        if keep.len() != self.labels.len() {
            return Err(IndexError::LengthMismatch {
                expected: self.labels.len(),
                actual: keep.len(),
            });
        }
        Ok(self.derive(
            self.labels
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(l, _)| l.clone())
                .collect(),
        ))
    }

    #[must_use]
    pub fn drop(&self, labels: &[IndexLabel]) -> Index {
        let dropped = self.isin(labels);
        self.derive(
            self.labels
                .iter()
                .zip(dropped)
                .filter(|(_, d)| !d)
                .map(|(l, _)| l.clone())
                .collect(),
        )
    }

    #[must_use]
    pub fn concat(&self, other: &Index) -> Index {
        let mut labels = self.labels.clone();
        labels.extend(other.labels.iter().cloned());
        self.derive(labels)
    }

    // ── Set algebra ────────────────────────────────────────────────────

    fn finish_set_op(
        &self,
        labels: Vec<IndexLabel>,
        policy: SortPolicy,
    ) -> Result<Index, IndexError> {
        let out = self.derive(labels);
        match policy {
            SortPolicy::Never => Ok(out),
            SortPolicy::Always => out.sort(),
            SortPolicy::Default if out.is_sortable() => out.sort(),
            SortPolicy::Default => Ok(out),
        }
    }

    /// Labels of `self` followed by unseen labels of `other`.
    ///
    /// Under the default policy an unchanged result is `self` as-is.
    pub fn union(&self, other: &Index, policy: SortPolicy) -> Result<Index, IndexError> {
        self.require_unique("union")?;
        other.require_unique("union")?;
        let seen = self.position_map();
        let mut labels = self.labels.clone();
        labels.extend(
            other
                .labels
                .iter()
                .filter(|l| !seen.contains_key(*l))
                .cloned(),
        );
        if policy == SortPolicy::Default && labels.len() == self.labels.len() {
            return Ok(self.clone());
        }
        self.finish_set_op(labels, policy)
    }

    /// Labels of `self` also present in `other`, in `self` order.
    pub fn intersection(&self, other: &Index, policy: SortPolicy) -> Result<Index, IndexError> {
        self.require_unique("intersection")?;
        other.require_unique("intersection")?;
        let labels: Vec<IndexLabel> = self
            .labels
            .iter()
            .filter(|l| other.has(l))
            .cloned()
            .collect();
        if policy == SortPolicy::Default && labels.len() == self.labels.len() {
            return Ok(self.clone());
        }
        self.finish_set_op(labels, policy)
    }

    pub fn difference(&self, other: &Index, policy: SortPolicy) -> Result<Index, IndexError> {
        self.require_unique("difference")?;
        other.require_unique("difference")?;
        let labels = self
            .labels
            .iter()
            .filter(|l| !other.has(l))
            .cloned()
            .collect();
        self.finish_set_op(labels, policy)
    }

    /// Pairwise fold of `union` over any number of indexes.
    pub fn union_all(indexes: &[&Index], policy: SortPolicy) -> Result<Index, IndexError> {
        let Some((first, rest)) = indexes.split_first() else {
            return Ok(Index::new(Vec::new()));
        };
        rest.iter()
            .try_fold((*first).clone(), |acc, next| acc.union(next, policy))
    }

    /// Pairwise fold of `intersection` over any number of indexes.
    pub fn intersection_all(indexes: &[&Index], policy: SortPolicy) -> Result<Index, IndexError> {
        let Some((first, rest)) = indexes.split_first() else {
            return Ok(Index::new(Vec::new()));
        };
        rest.iter()
            .try_fold((*first).clone(), |acc, next| acc.intersection(next, policy))
    }
}

// ── Alignment ──────────────────────────────────────────────────────────

/// Output labels of a two-sided alignment plus, per output label, the
/// position of that label in each input (`None` when absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentPlan {
    pub union_index: Index,
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

/// Outer-join plan over the union of both indexes.
pub fn align_union(left: &Index, right: &Index) -> Result<AlignmentPlan, IndexError> {
    let union_index = left.union(right, SortPolicy::Default)?;
    let left_positions = left.get_indexer(&union_index);
    let right_positions = right.get_indexer(&union_index);
    debug!(
        left = left.len(),
        right = right.len(),
        union = union_index.len(),
        "aligned labelled operands"
    );
    Ok(AlignmentPlan {
        union_index,
        left_positions,
        right_positions,
    })
}

pub fn validate_alignment_plan(plan: &AlignmentPlan) -> Result<(), IndexError> {
    if plan.left_positions.len() != plan.right_positions.len()
        || plan.left_positions.len() != plan.union_index.len()
    {
        return Err(IndexError::InvalidAlignmentVectors);
    }
    Ok(())
}
