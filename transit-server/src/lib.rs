//! Transit departures server.
//!
//! Answers "when does my bus actually leave" by fusing a static GTFS
//! schedule with a periodically fetched GTFS-Realtime feed of trip delays.

pub mod config;
pub mod dataset;
pub mod domain;
pub mod fusion;
pub mod realtime;
pub mod schedule;
pub mod scheduler;
pub mod web;

#[cfg(test)]
mod testing;
