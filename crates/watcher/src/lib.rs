pub mod app;
pub mod auth;
pub mod fetcher;
pub mod poller;
