//! yadwh-core: shared types for the yadwh webhook.
//!
//! Holds the data model passed between the runtime adapter, the update
//! orchestrator and the HTTP gateway:
//!
//! - **`credentials`**: `GroupCredential` records and the immutable
//!   `CredentialStore` built once at startup
//! - **`labels`**: group membership parsing for the opt-in container label
//! - **`types`**: container descriptors, snapshots, stages and outcomes

pub mod credentials;
pub mod error;
pub mod labels;
pub mod types;

pub use credentials::{CredentialStore, GroupCredential, RegistryAuth, MIN_SECRET_LEN};
pub use error::{ConfigError, ConfigResult};
pub use labels::{DEFAULT_LABEL_KEY, is_member, normalize_group};
pub use types::*;
