//! Cirrus Core
//!
//! Core library shared by Cirrus providers: the resource model, attribute
//! schemas, the Provider trait and the helpers every CRUD implementation uses
//! (change detection and state-change polling).

pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod wait;
