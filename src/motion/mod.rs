//! Newport ESP301 motion controller

pub mod esp301;

pub use esp301::RotationStage;
