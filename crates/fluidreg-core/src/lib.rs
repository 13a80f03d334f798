pub mod error;
pub mod field;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;
pub mod vectorfield;

pub use error::CoreError;
pub use field::Field2;
pub use image::{Image2, Mask2};
pub use transform::{Transform2, TransformFactory};
pub use spatial::{Bounds2, Mat2f, Vec2f};
pub use vectorfield::VectorField2;
