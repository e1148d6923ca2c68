//! SeaORM entity models

pub mod collection;
pub mod document;

pub use collection::{
    ActiveModel as CollectionActiveModel, Entity as CollectionEntity, Model as Collection,
};
pub use document::{Column as DocumentColumn, Entity as DocumentEntity};
