#![forbid(unsafe_code)]

pub mod book;
pub mod build;
pub mod cache;
pub mod cli;
pub mod cover;
pub mod decode;
pub mod epub;
pub mod formats;
pub mod images;
pub mod logging;
pub mod rules;
pub mod segment;
pub mod split;
pub mod text;
