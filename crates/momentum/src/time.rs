use std::fmt;
use std::time::{Duration, TryFromFloatSecsError};

/// A run time.
///
/// Stored as a [`Duration`] so that times are totally ordered; the database keeps them as
/// floating point seconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Into, From)]
pub struct Seconds(pub Duration);

impl Seconds {
    pub fn as_f64(self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl TryFrom<f64> for Seconds {
    type Error = TryFromFloatSecsError;

    /// Fails for negative, NaN and infinite values.
    fn try_from(secs: f64) -> Result<Self, Self::Error> {
        Duration::try_from_secs_f64(secs).map(Self)
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{:.3}s", self.as_f64())
    }
}
