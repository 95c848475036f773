//! Ziggurat containers: memory-mappable files holding a fixed header, a
//! directory of named components and the component payloads.

#[macro_use]
extern crate anyhow;

pub mod builder;
pub mod codec;
pub mod component;
pub mod container;
pub mod error;
pub mod format;
pub mod store;

pub use builder::{create, ContainerBuilder};
pub use component::{Component, ComponentData, ComponentKind};
pub use container::{Container, ContainerFile, OpenOptions};
pub use error::{Error, Result};
pub use format::{ContainerHeader, ContainerType, HeaderRevision};
pub use store::{Datastore, StoreConfig};
