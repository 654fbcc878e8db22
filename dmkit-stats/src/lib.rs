//! Probability distributions and eigen-based ordination for dmkit.
//!
//! - **Distributions**: weighted maximum-likelihood estimation for discrete,
//!   continuous, kernel and multivariate normal families
//! - **Mixtures**: EM fitting of finite mixtures with entropy fitness
//! - **Ordination**: principal components and metric multidimensional
//!   scaling over a shared symmetric eigensolver
//! - **Numerics**: special functions, bracketing root finding, small dense
//!   linear algebra

pub mod analysis;
pub mod distribution;
pub mod eigen;
pub mod linalg;
pub mod mds;
pub mod mixture;
pub mod prin_comp;
pub mod roots;
pub mod similarity;
pub mod special;

pub use analysis::{Analysis, Variable};
pub use distribution::{
    Bernoulli, Beta, Binomial, Categorical, Cauchy, Chi2, Distribution, Exponential, Geometric,
    MultiNormal, Normal, UniKernel, Univariate, Zipf, DEFAULT_SEED,
};
pub use eigen::{Eigens, EigensConfig, SymmetricEigen};
pub use linalg::Matrix;
pub use mds::{Mds, MdsConfig};
pub use mixture::{Component, Mixture, EM_MAX_ITERATIONS, EM_TOLERANCE};
pub use prin_comp::{PrinComp, PrinCompConfig};
