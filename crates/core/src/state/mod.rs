pub mod evidence;
pub mod query;
pub mod report;

pub use evidence::{EvidenceItem, EvidenceKey, EvidenceSet, Upsert};
pub use query::{Complexity, Granularity, Intent, IntentType, Query, SubQuery};
pub use report::{Citation, IterationRecord, Report, ReportStatus, SufficiencyScore};
