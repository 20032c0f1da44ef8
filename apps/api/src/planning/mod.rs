pub mod adaptation;
pub mod calendar;
pub mod handlers;
pub mod service;
pub mod topology;
