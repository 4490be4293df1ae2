pub mod event;
pub mod exception;
pub mod fleet;
pub mod history;
pub mod order;
pub mod route;
pub mod tracking;
