//! Metadata store for the media lifecycle layer.

pub mod db;

pub use db::*;
