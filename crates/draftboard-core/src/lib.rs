// Snake draft board: turn engine, persistence and live notifications.

pub mod board;
pub mod db;
pub mod draft;
pub mod models;
pub mod notify;
pub mod validation;
