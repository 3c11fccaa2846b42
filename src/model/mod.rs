// src/model/mod.rs

pub mod ad;
pub mod adapters;
