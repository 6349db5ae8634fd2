//! Attention and embedding visualization pipeline for transformer model
//! output, plus the egui views that present it.

pub mod attention;
pub mod config;
pub mod error;
pub mod interaction;
pub mod model;
pub mod physics;
pub mod projection;
pub mod render;
pub mod service;
pub mod util;
pub mod viz;
