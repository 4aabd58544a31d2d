//! REST handlers, grouped by resource.

pub mod admin;
pub mod evaluate;
pub mod rules;
pub mod schemas;
pub mod tenants;
