pub mod check_predecessor;
pub mod chord;
pub mod client_api;
pub mod setup;
pub mod web;
