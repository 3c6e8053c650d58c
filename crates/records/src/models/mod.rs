mod comparison;

pub use self::comparison::{ComparisonRecord, NewComparison, RecordedDigest};
pub(crate) use self::comparison::{ComparisonRow, NewComparisonRow};
