pub mod autolabel;
pub mod bootstrap;
pub mod config;
pub mod handler;
pub mod health;
pub mod models;
pub mod projects;
pub mod rng;
pub mod routes;
pub mod training;
