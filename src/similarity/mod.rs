//! Pairwise patient similarity scoring.

pub mod geno;
pub mod pheno;
pub mod schema;
pub mod view;
