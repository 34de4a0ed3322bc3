use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snow_ids::Id;

use super::{Factory, Nnary, NnarySnowball, NnarySnowflake, Unary, UnarySnowball, UnarySnowflake};
use crate::Parameters;

/// Produces snowball instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowballFactory;

impl Factory for SnowballFactory {
    fn new_nnary(&self, params: &Parameters, choice: Id) -> Box<dyn Nnary> {
        Box::new(NnarySnowball::new(
            params.alpha_preference,
            params.termination_conditions(),
            choice,
        ))
    }

    fn new_unary(&self, params: &Parameters) -> Box<dyn Unary> {
        Box::new(UnarySnowball::new(
            params.alpha_preference,
            params.termination_conditions(),
        ))
    }
}

/// Produces snowflake instances, which keep no preference strength.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeFactory;

impl Factory for SnowflakeFactory {
    fn new_nnary(&self, params: &Parameters, choice: Id) -> Box<dyn Nnary> {
        Box::new(NnarySnowflake::new(
            params.alpha_preference,
            params.termination_conditions(),
            choice,
        ))
    }

    fn new_unary(&self, params: &Parameters) -> Box<dyn Unary> {
        Box::new(UnarySnowflake::new(
            params.alpha_preference,
            params.termination_conditions(),
        ))
    }
}

/// Names a [`Factory`] in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactoryKind {
    #[default]
    Snowball,
    Snowflake,
}

impl FactoryKind {
    #[must_use]
    pub fn into_factory(self) -> Arc<dyn Factory> {
        match self {
            Self::Snowball => Arc::new(SnowballFactory),
            Self::Snowflake => Arc::new(SnowflakeFactory),
        }
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snowball => f.write_str("snowball"),
            Self::Snowflake => f.write_str("snowflake"),
        }
    }
}
