pub mod executor;
pub mod reuse;
pub mod rows;
pub mod scope;
pub mod session;

pub use executor::{QueryExecutor, ResultCursor};
pub use reuse::{ReuseToken, extract_reuse_token};
pub use rows::{DEFAULT_BATCH_SIZE, EnumerationSummary, MAX_BATCH_SIZE, ResultRecord, RowEnumerator, Rows};
pub use scope::{COUNT_ALL_SQL, QueryText, ScopeList, build_priming_sql};
pub use session::PrimingSession;
