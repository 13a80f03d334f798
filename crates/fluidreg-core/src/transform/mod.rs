//! Transformation models.
//!
//! All models implement [`Transform2`]; registration drivers select a model
//! through a [`TransformFactory`] and only ever talk to the trait.

pub mod trait_;
pub mod translation;
pub mod rigid;
pub mod affine;
pub mod bspline;
pub mod grid;

pub use trait_::{Transform2, TransformFactory};
pub use translation::{TranslationFactory, TranslationTransform2};
pub use rigid::{RigidFactory, RigidTransform2};
pub use affine::{AffineFactory, AffineTransform2};
pub use bspline::{BsplineFactory, BsplineTransform2};
pub use grid::{GridFactory, GridTransform2};
