//! Request helpers shared by the HTTP routes

pub mod auth;
