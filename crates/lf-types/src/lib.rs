#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Timestamp,
}

/// A single cell value.
///
/// `Timestamp` holds epoch nanoseconds and is how dates enter the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Timestamp(i64),
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(NullKind::Null) => write!(f, "null"),
            Self::Null(NullKind::NaN) => write!(f, "NaN"),
            Self::Null(NullKind::NaT) => write!(f, "NaT"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "ts:{v}"),
        }
    }
}

impl Scalar {
    /// The non-numeric marker.
    #[must_use]
    pub fn nan() -> Self {
        Self::Null(NullKind::NaN)
    }

    /// Wrap an arithmetic result, folding IEEE NaN into the non-numeric marker.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Self::nan()
        } else {
            Self::Float64(value)
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Null(_) => ScalarKind::Null,
            Self::Bool(_) => ScalarKind::Bool,
            Self::Int64(_) => ScalarKind::Int64,
            Self::Float64(_) => ScalarKind::Float64,
            Self::Utf8(_) => ScalarKind::Utf8,
            Self::Timestamp(_) => ScalarKind::Timestamp,
        }
    }

    /// Missing means "not truly present": null, NaN, or an infinity.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => !v.is_finite(),
            _ => false,
        }
    }

    /// Numeric means a finite real number or a boolean.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Bool(_) | Self::Int64(_) => true,
            Self::Float64(v) => v.is_finite(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_non_numeric(&self) -> bool {
        !self.is_numeric()
    }

    /// Numeric value of the scalar, `None` for anything non-numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        if let Some(v) = self.as_f64() {
            return Ok(v);
        }
        match self {
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Float64(_) => Err(TypeError::ValueIsMissing {
                kind: NullKind::NaN,
            }),
            other => Err(TypeError::NonNumericValue {
                value: other.to_string(),
                kind: other.kind(),
            }),
        }
    }

    /// Truthiness used by `all`/`any`; `None` for missing values.
    #[must_use]
    pub fn truthiness(&self) -> Option<bool> {
        if self.is_missing() {
            return None;
        }
        Some(match self {
            Self::Bool(v) => *v,
            Self::Int64(v) => *v != 0,
            Self::Float64(v) => *v != 0.0,
            Self::Utf8(v) => !v.is_empty(),
            Self::Timestamp(_) | Self::Null(_) => true,
        })
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            _ => self == other,
        }
    }

    /// Total order among comparable, non-missing scalars.
    ///
    /// Numbers and booleans compare by value, strings lexically, timestamps
    /// chronologically. Anything else is a `TypeError`.
    pub fn compare(&self, other: &Self) -> Result<Ordering, TypeError> {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => Ok(a.cmp(b)),
            (Self::Utf8(a), Self::Utf8(b)) => Ok(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Ok(a.cmp(b)),
            (Self::Null(kind), _) | (_, Self::Null(kind)) => {
                Err(TypeError::ValueIsMissing { kind: *kind })
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => Ok(a.total_cmp(&b)),
                _ => Err(TypeError::IncompatibleKinds {
                    left: self.kind(),
                    right: other.kind(),
                }),
            },
        }
    }
}

/// The error categories every fallible operation in the workspace maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    KeyError,
    OutOfBounds,
    OutOfRange,
    LengthMismatch,
    NotSorted,
    TypeError,
    InvalidArgument,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("cannot compare {left:?} with {right:?}")]
    IncompatibleKinds { left: ScalarKind, right: ScalarKind },
    #[error("value {value:?} of kind {kind:?} is not numeric")]
    NonNumericValue { value: String, kind: ScalarKind },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

impl TypeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TypeError
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatsError {
    #[error("operands must have equal lengths: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("{op} of an empty sequence is undefined")]
    EmptyInput { op: &'static str },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StatsError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            Self::EmptyInput { .. } | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

// ── Missingness utilities ──────────────────────────────────────────────

pub fn isna(values: &[Scalar]) -> Vec<bool> {
    values.iter().map(Scalar::is_missing).collect()
}

pub fn isnan(values: &[Scalar]) -> Vec<bool> {
    values.iter().map(Scalar::is_non_numeric).collect()
}

pub fn count_na(values: &[Scalar]) -> usize {
    values.iter().filter(|v| v.is_missing()).count()
}

// ── Nanops: reductions that treat absent values as data ────────────────

/// Which values a reducer steps over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// Skip every non-numeric value (strings, NaN, null, infinities).
    #[default]
    NonNumeric,
    /// Skip only missing values; a present non-numeric value poisons numeric
    /// results into the non-numeric marker.
    Missing,
}

impl SkipPolicy {
    #[must_use]
    pub fn is_eligible(self, value: &Scalar) -> bool {
        match self {
            Self::NonNumeric => value.is_numeric(),
            Self::Missing => !value.is_missing(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceOptions {
    pub skip: SkipPolicy,
    pub ddof: usize,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            skip: SkipPolicy::NonNumeric,
            ddof: 1,
        }
    }
}

impl ReduceOptions {
    #[must_use]
    pub fn skip_missing(mut self) -> Self {
        self.skip = SkipPolicy::Missing;
        self
    }

    #[must_use]
    pub fn with_ddof(mut self, ddof: usize) -> Self {
        self.ddof = ddof;
        self
    }
}

/// Numbers a reducer operates on, or `None` when a present non-numeric value
/// poisons the reduction.
fn eligible_numbers(values: &[Scalar], skip: SkipPolicy) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match (value.as_f64(), skip) {
            (Some(v), _) => out.push(v),
            (None, SkipPolicy::NonNumeric) => {}
            (None, SkipPolicy::Missing) if value.is_missing() => {}
            (None, SkipPolicy::Missing) => return None,
        }
    }
    Some(out)
}

pub fn nancount(values: &[Scalar], skip: SkipPolicy) -> usize {
    values.iter().filter(|v| skip.is_eligible(v)).count()
}

pub fn nansum(values: &[Scalar], options: ReduceOptions) -> Scalar {
    match eligible_numbers(values, options.skip) {
        Some(nums) if !nums.is_empty() => Scalar::from_f64(nums.iter().sum()),
        _ => Scalar::nan(),
    }
}

pub fn nanmean(values: &[Scalar], options: ReduceOptions) -> Scalar {
    match eligible_numbers(values, options.skip) {
        Some(nums) if !nums.is_empty() => {
            Scalar::from_f64(nums.iter().sum::<f64>() / nums.len() as f64)
        }
        _ => Scalar::nan(),
    }
}

fn extremum(
    values: &[Scalar],
    options: ReduceOptions,
    op: &'static str,
    wanted: Ordering,
) -> Result<Scalar, StatsError> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput { op });
    }
    let mut best: Option<(&Scalar, f64)> = None;
    for value in values {
        let Some(v) = value.as_f64() else {
            if options.skip == SkipPolicy::Missing && !value.is_missing() {
                return Ok(Scalar::nan());
            }
            continue;
        };
        match best {
            Some((_, current)) if v.total_cmp(&current) != wanted => {}
            _ => best = Some((value, v)),
        }
    }
    Ok(best.map_or_else(Scalar::nan, |(value, _)| value.clone()))
}

/// Smallest numeric value, returned as stored. Fails only on an empty input.
pub fn nanmin(values: &[Scalar], options: ReduceOptions) -> Result<Scalar, StatsError> {
    extremum(values, options, "min", Ordering::Less)
}

/// Largest numeric value, returned as stored. Fails only on an empty input.
pub fn nanmax(values: &[Scalar], options: ReduceOptions) -> Result<Scalar, StatsError> {
    extremum(values, options, "max", Ordering::Greater)
}

pub fn nanmedian(values: &[Scalar], options: ReduceOptions) -> Scalar {
    let Some(mut nums) = eligible_numbers(values, options.skip) else {
        return Scalar::nan();
    };
    if nums.is_empty() {
        return Scalar::nan();
    }
    nums.sort_by(f64::total_cmp);
    let mid = nums.len() / 2;
    if nums.len() % 2 == 0 {
        Scalar::from_f64((nums[mid - 1] + nums[mid]) / 2.0)
    } else {
        Scalar::from_f64(nums[mid])
    }
}

/// Variance with `options.ddof` degrees of freedom; NaN when `n - ddof <= 0`.
pub fn nanvar(values: &[Scalar], options: ReduceOptions) -> Scalar {
    let Some(nums) = eligible_numbers(values, options.skip) else {
        return Scalar::nan();
    };
    if nums.len() <= options.ddof {
        return Scalar::nan();
    }
    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
    let sum_sq: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
    Scalar::from_f64(sum_sq / (nums.len() - options.ddof) as f64)
}

pub fn nanstd(values: &[Scalar], options: ReduceOptions) -> Scalar {
    match nanvar(values, options) {
        Scalar::Float64(v) => Scalar::from_f64(v.sqrt()),
        other => other,
    }
}

/// Pairs of positions where both operands are numeric.
fn paired_numbers(x: &[Scalar], y: &[Scalar]) -> Result<Vec<(f64, f64)>, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }
    Ok(x.iter()
        .zip(y)
        .filter_map(|(a, b)| Some((a.as_f64()?, b.as_f64()?)))
        .collect())
}

pub fn covar(x: &[Scalar], y: &[Scalar], ddof: usize) -> Result<Scalar, StatsError> {
    let pairs = paired_numbers(x, y)?;
    if pairs.is_empty() || pairs.len() <= ddof {
        return Ok(Scalar::nan());
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let cross: f64 = pairs.iter().map(|(a, b)| (a - mx) * (b - my)).sum();
    Ok(Scalar::from_f64(cross / (pairs.len() - ddof) as f64))
}

/// Pearson correlation over positions where both operands are numeric.
pub fn corr(x: &[Scalar], y: &[Scalar]) -> Result<Scalar, StatsError> {
    let pairs = paired_numbers(x, y)?;
    if pairs.is_empty() {
        return Ok(Scalar::nan());
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cross, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cross += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    Ok(Scalar::from_f64(cross / (vx * vy).sqrt()))
}

/// Element at `round(p * n) - 1` of the ascending numeric values, clamped.
pub fn quantile(values: &[Scalar], p: f64) -> Result<Scalar, StatsError> {
    if p.is_nan() {
        return Err(StatsError::InvalidArgument(
            "quantile probability must be a number".to_owned(),
        ));
    }
    let mut nums: Vec<f64> = values.iter().filter_map(Scalar::as_f64).collect();
    if nums.is_empty() {
        return Ok(Scalar::nan());
    }
    nums.sort_by(f64::total_cmp);
    let last = (nums.len() - 1) as f64;
    let pos = ((p * nums.len() as f64).round() - 1.0).clamp(0.0, last);
    Ok(Scalar::from_f64(nums[pos as usize]))
}

/// 1-based ranks over numeric values; ties share the lowest common rank.
///
/// Non-numeric positions rank as the non-numeric marker. With `normalized`,
/// ranks are divided by the number of ranked values.
pub fn rank(values: &[Scalar], ascending: bool, normalized: bool) -> Vec<Scalar> {
    let mut sortable: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| Some((i, v.as_f64()?)))
        .collect();
    if ascending {
        sortable.sort_by(|a, b| a.1.total_cmp(&b.1));
    } else {
        sortable.sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    let n = sortable.len() as f64;
    let mut out = vec![Scalar::nan(); values.len()];
    let mut current_rank = 0_usize;
    for (i, (pos, value)) in sortable.iter().enumerate() {
        if i == 0 || sortable[i - 1].1 != *value {
            current_rank = i + 1;
        }
        let rank = current_rank as f64;
        out[*pos] = Scalar::Float64(if normalized { rank / n } else { rank });
    }
    out
}

pub fn idxfirst(values: &[Scalar], skip: SkipPolicy) -> Option<usize> {
    values.iter().position(|v| skip.is_eligible(v))
}

pub fn idxlast(values: &[Scalar], skip: SkipPolicy) -> Option<usize> {
    values.iter().rposition(|v| skip.is_eligible(v))
}

fn idx_extremum(values: &[Scalar], wanted: Ordering) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, value) in values.iter().enumerate() {
        let Some(v) = value.as_f64() else { continue };
        match best {
            Some((_, current)) if v.total_cmp(&current) != wanted => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Position of the first smallest numeric value.
pub fn idxmin(values: &[Scalar]) -> Option<usize> {
    idx_extremum(values, Ordering::Less)
}

/// Position of the first largest numeric value.
pub fn idxmax(values: &[Scalar]) -> Option<usize> {
    idx_extremum(values, Ordering::Greater)
}

pub fn all(values: &[Scalar]) -> bool {
    !values.iter().any(|v| v.truthiness() == Some(false))
}

pub fn any(values: &[Scalar]) -> bool {
    values.iter().any(|v| v.truthiness() == Some(true))
}

// ── Cumulative operations ──────────────────────────────────────────────

/// Running fold over the numeric values.
///
/// The accumulator starts from `seed` (or from the first numeric value when
/// there is none). Non-numeric positions emit the current accumulator
/// unchanged, or the non-numeric marker before anything has accumulated.
pub fn accumulate<F>(values: &[Scalar], seed: Option<f64>, mut fold: F) -> Vec<Scalar>
where
    F: FnMut(f64, f64) -> f64,
{
    let mut acc = seed;
    values
        .iter()
        .map(|value| {
            if let Some(v) = value.as_f64() {
                acc = Some(match acc {
                    Some(prev) => fold(prev, v),
                    None => v,
                });
            }
            acc.map_or_else(Scalar::nan, Scalar::from_f64)
        })
        .collect()
}

pub fn cumsum(values: &[Scalar]) -> Vec<Scalar> {
    accumulate(values, None, |acc, v| acc + v)
}

pub fn cumprod(values: &[Scalar]) -> Vec<Scalar> {
    accumulate(values, None, |acc, v| acc * v)
}

pub fn cummax(values: &[Scalar]) -> Vec<Scalar> {
    accumulate(values, None, f64::max)
}

pub fn cummin(values: &[Scalar]) -> Vec<Scalar> {
    accumulate(values, None, f64::min)
}

/// Compounded returns: `(1 + prev) * (1 + curr) - 1`.
pub fn compound(values: &[Scalar]) -> Vec<Scalar> {
    accumulate(values, None, |acc, v| (1.0 + acc) * (1.0 + v) - 1.0)
}

/// Largest peak-to-trough loss of a price sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawdown<P> {
    pub peak: P,
    pub trough: P,
    pub recovery: Option<P>,
    pub open: f64,
    pub close: f64,
    pub loss: f64,
}

impl<P> Drawdown<P> {
    pub fn map_positions<Q>(self, mut f: impl FnMut(P) -> Q) -> Drawdown<Q> {
        Drawdown {
            peak: f(self.peak),
            trough: f(self.trough),
            recovery: self.recovery.map(f),
            open: self.open,
            close: self.close,
            loss: self.loss,
        }
    }
}

/// Maximum drawdown by position; `None` when no value is numeric.
pub fn max_drawdown(values: &[Scalar]) -> Option<Drawdown<usize>> {
    let mut running_max: Option<(usize, f64)> = None;
    let mut worst: Option<Drawdown<usize>> = None;

    for (i, value) in values.iter().enumerate() {
        let Some(curr) = value.as_f64() else { continue };
        let (peak, open) = match running_max {
            Some((pos, max)) if max > curr => (pos, max),
            _ => (i, curr),
        };
        running_max = Some((peak, open));

        let loss = curr / open - 1.0;
        match worst.as_mut() {
            Some(dd) if loss >= dd.loss => {
                if dd.recovery.is_none() && curr > dd.open {
                    dd.recovery = Some(i);
                }
            }
            _ => {
                worst = Some(Drawdown {
                    peak,
                    trough: i,
                    recovery: None,
                    open,
                    close: curr,
                    loss,
                });
            }
        }
    }
    worst
}
