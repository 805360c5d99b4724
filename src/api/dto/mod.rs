//! Data Transfer Objects for REST request/response serialization.

pub mod dashboard_dto;

pub use dashboard_dto::*;
