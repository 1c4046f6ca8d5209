pub mod metrics;
pub mod quota_ledger;
pub mod reconciliation;
pub mod upload;

pub use metrics::*;
pub use quota_ledger::*;
pub use reconciliation::*;
pub use upload::*;
