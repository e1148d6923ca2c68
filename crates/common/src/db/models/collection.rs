//! Collection entity: a named set of documents sharing one vector space

use crate::index::DistanceMetric;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "collections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub name: String,

    /// Vector dimensionality every document must match
    pub dimension: i32,

    /// Distance metric name, see `DistanceMetric::as_str`
    #[sea_orm(column_type = "Text")]
    pub metric: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn distance_metric(&self) -> crate::errors::Result<DistanceMetric> {
        DistanceMetric::parse(&self.metric)
    }

    pub fn dimension(&self) -> usize {
        self.dimension.max(0) as usize
    }
}
