//! Save pipeline and read access to saved contexts.

pub mod archive;
pub mod core;

pub use self::archive::{ContextArchive, RestoredContext};
pub use self::core::{ContextBackends, ContextEngine, SaveOutcome};
