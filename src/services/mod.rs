pub mod bulk_service;
pub mod gateway_service;
pub mod health_service;

#[cfg(test)]
pub(crate) mod testing;
