//! Sports tuner
//!
//! Presents live sports-streaming subscriptions as a virtual multi-channel
//! tuner. Provider events are allocated onto numbered channels without time
//! overlap; tuning a channel launches a session that proxies and rewrites the
//! live HLS stream of whatever is scheduled on it right now.

pub mod config;
pub mod errors;
pub mod job_scheduling;
pub mod models;
pub mod observability;
pub mod providers;
pub mod proxy;
pub mod schedule;
pub mod streaming;
pub mod web;
