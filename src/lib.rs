pub mod app;
pub mod catalog;
pub mod config;
pub mod coords;
pub mod domain;
pub mod error;
pub mod fits;
pub mod fs_util;
pub mod http;
pub mod output;
pub mod resolver;
pub mod simbad;
pub mod sources;
pub mod store;
pub mod table;
