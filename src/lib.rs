// Library interface for vcs-proxy (VCS commit ingestion and diff engine)
// The binary and the integration tests both go through these modules

pub mod address;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod model;
pub mod proxy;
pub mod tree;
pub mod vcs;

pub use address::{AddressKind, CommitAddress};
pub use error::{ErrorBody, VcsError, VcsResult};
pub use model::{CommitMetadata, CommitStats, EngineResult, FileChangeMetadata, FileStatus, PatchedFile};
pub use proxy::{ProxyRequest, ProxyResponse};
pub use vcs::{Backend, Handler, Registry};
