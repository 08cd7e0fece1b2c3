use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub kind: String,
    pub target: String,
    pub expected_status: i32,
    pub check_interval: i32,
    pub timeout: i32,
    pub order_id: i32,
    pub online: bool,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::hit::Entity")]
    Hit,
    #[sea_orm(has_many = "super::failure::Entity")]
    Failure,
}

impl Related<super::hit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Hit.def()
    }
}

impl Related<super::failure::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Failure.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
