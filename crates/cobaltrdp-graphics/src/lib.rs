#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod color_conversion;
pub mod pointer;
pub mod rle;
