//! SeaORM entities for the monitoring tables.

pub mod failure;
pub mod hit;
pub mod service;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::service::ActiveModel as ServiceActiveModel;
    pub use super::service::Column as ServiceColumn;
    pub use super::service::Entity as Service;
    pub use super::service::Model as ServiceModel;

    pub use super::hit::ActiveModel as HitActiveModel;
    pub use super::hit::Column as HitColumn;
    pub use super::hit::Entity as Hit;
    pub use super::hit::Model as HitModel;

    pub use super::failure::ActiveModel as FailureActiveModel;
    pub use super::failure::Column as FailureColumn;
    pub use super::failure::Entity as Failure;
    pub use super::failure::Model as FailureModel;
}
