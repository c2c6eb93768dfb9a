pub mod address;
pub mod delivery;
pub mod message;
pub mod request;
