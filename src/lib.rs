//! Library crate for evolution-town-back: the HTTP backend of the game plus the
//! player-session client that keeps local state in sync with it.

pub mod client;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
