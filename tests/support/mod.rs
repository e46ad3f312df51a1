#![allow(dead_code)]

pub mod ecoclass_env;
pub mod images;
