pub mod executor;
pub mod parser;
pub mod repository;
pub mod version;

// Re-export commonly used types
pub use executor::{CommandOutput, GitExecutor};
pub use parser::{FileStatus, RefEntry, StatusEntry, parse_ref_list, parse_status_porcelain_v2};
pub use repository::{HeadRef, InProgressOperation, Repository};
pub use version::GitVersion;
