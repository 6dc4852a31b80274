pub mod build;
pub mod burnin;
pub mod record;
