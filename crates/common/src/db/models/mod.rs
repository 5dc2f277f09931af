//! SeaORM entity models

pub mod document;

pub use document::{
    Column as DocumentColumn, Entity as DocumentEntity, Model as Document,
};
