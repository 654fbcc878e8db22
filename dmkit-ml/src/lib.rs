//! Mixture-model clustering and discriminant projection for dmkit.
//!
//! - **Clustering**: multivariate-normal mixtures whose number of
//!   components is chosen by a split/delete search on entropy fitness
//! - **Canonical**: projection onto the axes that best separate the
//!   clusters of a fitted [`Clustering`]

pub mod canonical;
pub mod clustering;

pub use canonical::Canonical;
pub use clustering::{Clustering, ClusteringConfig};
