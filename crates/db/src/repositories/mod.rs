//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PostgrestClient` as the first argument.

pub mod design_job_repo;
pub mod design_session_repo;
pub mod design_variation_repo;
pub mod generation_job_repo;

pub use design_job_repo::DesignJobRepo;
pub use design_session_repo::DesignSessionRepo;
pub use design_variation_repo::DesignVariationRepo;
pub use generation_job_repo::GenerationJobRepo;
