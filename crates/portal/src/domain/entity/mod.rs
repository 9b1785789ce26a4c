pub mod account;
pub mod document;
pub mod progress;
pub mod route;
pub mod session;
pub mod submission;
pub mod wizard;
