pub mod cli;
pub mod clock;
pub mod connections;
pub mod error;
pub mod logging;
pub mod naming;
pub mod post_activity;
pub mod provision;

pub use clock::Clock;
pub use connections::{parse_connection_pairs, ConnectionPair, ParseError};
pub use error::{BranchOutError, BranchOutResult};
pub use logging::{log_error_chain, LogFormat};
pub use naming::{generate_branch_name, resolve_branch_name};
pub use post_activity::{
    NotebookRef, PostActivityConfig, PostActivityReport, PostActivityRunner, PostActivityTask,
    TaskReport, TaskStatus,
};
pub use provision::{git_directory, ProvisionConfig, ProvisionOutcome, Provisioner};
