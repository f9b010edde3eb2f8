pub mod fixer;
pub mod logging;
pub mod sources;
pub mod swap;
pub mod sync;

pub use sync::SyncCoordinator;
