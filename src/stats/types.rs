//! Shared row types and the error taxonomy of the aggregation core.

/// Measures of a single stat bucket. Only terminal events (`success`,
/// `failed`) are counted, so `passed + failed == total` in practice; the
/// invariant check in [`crate::stats::aggregate`] enforces the weaker
/// `passed + failed <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketTotals {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    /// Mean duration over the counted events, rounded to whole seconds.
    /// Zero when none of the counted events carried a duration.
    pub avg_duration_seconds: i64,
}

/// Per-dimension bucket measures for job-type aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTypeTotals {
    pub job_type_id: i64,
    pub totals: BucketTotals,
}

/// Accounting reported by batch upserts: how many rows were newly created
/// versus overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub created: u64,
    pub updated: u64,
}

impl UpsertOutcome {
    pub fn absorb(&mut self, other: UpsertOutcome) {
        self.created += other.created;
        self.updated += other.updated;
    }
}

#[derive(Debug)]
pub enum StatsError {
    /// Unrecognized duration label on the read path. Never retried.
    InvalidDuration(String),
    /// A computed bucket failed the sanity check and was not persisted.
    InvariantViolation { detail: String },
    /// Read/write failure against the event or stats store.
    Store(sqlx::Error),
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDuration(label) => {
                write!(
                    f,
                    "invalid duration '{label}' (expected one of {})",
                    crate::stats::period::ALLOWED_DURATIONS.join(", ")
                )
            }
            Self::InvariantViolation { detail } => {
                write!(f, "aggregation invariant violated: {detail}")
            }
            Self::Store(err) => write!(f, "stats store error: {err}"),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StatsError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err)
    }
}
