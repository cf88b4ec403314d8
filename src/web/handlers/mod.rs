//! HTTP request handlers organized by domain

pub mod admin;
pub mod channels;
pub mod guide;
pub mod health;
