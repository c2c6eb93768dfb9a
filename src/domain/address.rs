/// Returns `true` when `address` is a non-empty run of ASCII letters and digits.
///
/// Every submission is gated on this before the transport or the ledger is touched.
#[must_use]
pub fn validate(address: &str) -> bool {
    !address.is_empty() && address.bytes().all(|b| b.is_ascii_alphanumeric())
}
