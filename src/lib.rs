#![deny(dead_code)]
#![deny(unused_imports)]

pub mod cubature;
pub mod facade;
pub mod integrand;
pub mod minimize;
pub mod quantities;
pub mod types;

pub use cubature::{
    BatchIntegrand, CubatureError, CubatureOptions, IntegrationResult, Pointwise, integrate,
};
pub use facade::{LossModel, QuantitySet};
pub use integrand::{GaussianMixture, InfoIntegrand, LossIntegrand};
pub use minimize::{
    Bracket, MinimizeResult, SearchError, bracket_minimum, brent_minimize,
};
pub use quantities::{
    CommunicationObjective, InformationReport, JointLossReport, LossError, descriptive_loss,
    destructive_interference, info_1d, info_2d, info_total, joint_loss, joint_loss_report,
    parallel_loss, single_frame_loss, single_letter_loss,
};
pub use types::{Dimension, ModelParams, ParameterError, SolverConfig};
