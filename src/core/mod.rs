pub mod controller;
pub mod errors;
pub mod logbuf;
pub mod models;
pub mod steps;
