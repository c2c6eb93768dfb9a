pub mod database;
pub mod ledger;
pub mod smpp;
pub mod transport;
