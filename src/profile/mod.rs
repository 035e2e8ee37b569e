//! Profiles: identities, their session partitions, and the operations
//! that change them

pub mod id;
pub mod lifecycle;
pub mod partition;
pub mod registry;

pub use id::ProfileId;
pub use lifecycle::ProfileLifecycleController;
