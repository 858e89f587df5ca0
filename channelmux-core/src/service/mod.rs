pub mod admission;
pub mod reaper;
pub mod release;

pub use admission::AdmissionController;
pub use reaper::LeaseReaper;
pub use release::ReleaseHandler;
