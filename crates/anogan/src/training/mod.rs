//! Training pipeline: data sources, noise and label policies, losses, the
//! adversarial step executor and the epoch driver.

pub mod config;
pub mod data;
pub mod driver;
pub mod labels;
pub mod loss;
pub mod metrics;
pub mod noise;
pub mod step;
pub mod summary;
