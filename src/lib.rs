pub mod analytics;
pub mod api;
pub mod auth;
pub mod blob;
pub mod codegen;
pub mod config;
pub mod error;
pub mod models;
pub mod redirect;
pub mod render;
pub mod storage;
