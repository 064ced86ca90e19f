pub mod auth;
pub mod balance;
pub mod dto;
pub mod error;
pub mod routes;
pub mod schemas;
pub mod service;
pub mod settings;
pub mod settlement;
pub mod store;
