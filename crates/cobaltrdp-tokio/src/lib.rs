#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

mod connector;
mod framed;

pub use connector::{connect_begin, connect_finalize, mark_as_upgraded, single_connect_step, ShouldUpgrade, Upgraded};
pub use framed::Framed;
