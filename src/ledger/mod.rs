pub mod lock;
pub mod session;

pub use lock::{LockError, RepoLock};
pub use session::{LedgerEntry, LedgerError, SessionLedger};

/// Name of the control directory inside the git dir
pub const CONTROL_DIR: &str = "gitguard";
