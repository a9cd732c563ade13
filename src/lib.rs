//! ScholarFeed - content core of an academic social platform
//!
//! This library provides the ranked feed, the engagement aggregates kept
//! beside publications and users, and the notification inbox.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
