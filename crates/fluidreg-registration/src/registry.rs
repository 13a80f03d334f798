//! Name-based construction of transform models and minimizers.
//!
//! Descriptors are the plain names used on command lines and in config
//! files: `translate`, `rigid`, `affine`, `spline`, `vf` for models and
//! `gd`, `simplex` for minimizers. A model may carry options after a
//! colon, e.g. `spline:rate=8`.

use crate::error::{RegistrationError, Result};
use crate::optimizer::{GradientDescent, Minimizer, NelderMead};
use fluidreg_core::transform::{
    AffineFactory, BsplineFactory, GridFactory, RigidFactory, TransformFactory,
    TranslationFactory,
};

fn parse_option<'a>(options: &'a str, key: &str) -> Result<Option<&'a str>> {
    for part in options.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((k, v)) if k == key => return Ok(Some(v)),
            Some(_) => continue,
            None => {
                return Err(RegistrationError::invalid_configuration(format!(
                    "malformed option '{part}', expected key=value"
                )))
            }
        }
    }
    Ok(None)
}

/// Create a transform factory from its descriptor.
pub fn create_transform_factory(descriptor: &str) -> Result<Box<dyn TransformFactory>> {
    let (name, options) = descriptor
        .split_once(':')
        .unwrap_or((descriptor, ""));
    match name {
        "translate" => Ok(Box::new(TranslationFactory)),
        "rigid" => Ok(Box::new(RigidFactory)),
        "affine" => Ok(Box::new(AffineFactory)),
        "spline" => {
            let mut factory = BsplineFactory::default();
            if let Some(rate) = parse_option(options, "rate")? {
                factory.rate = rate.parse::<f32>().map_err(|_| {
                    RegistrationError::invalid_configuration(format!(
                        "spline rate '{rate}' is not a number"
                    ))
                })?;
                if factory.rate < 1.0 {
                    return Err(RegistrationError::invalid_configuration(format!(
                        "spline rate must be at least 1, got {}",
                        factory.rate
                    )));
                }
            }
            Ok(Box::new(factory))
        }
        "vf" => Ok(Box::new(GridFactory)),
        other => Err(RegistrationError::invalid_configuration(format!(
            "unknown transform model '{other}'"
        ))),
    }
}

/// Create a minimizer from its descriptor.
pub fn create_minimizer(descriptor: &str) -> Result<Box<dyn Minimizer>> {
    match descriptor {
        "gd" => Ok(Box::new(GradientDescent::default())),
        "simplex" => Ok(Box::new(NelderMead::default())),
        other => Err(RegistrationError::invalid_configuration(format!(
            "unknown minimizer '{other}'"
        ))),
    }
}
