/// A single-recipient send as decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Origin address; the gateway's system identity is used when absent.
    pub a_address: Option<String>,
    pub b_address: String,
    pub body: String,
    pub data_coding: u8,
}

/// A cancel request. Both fields are optional on the wire so that their absence can be
/// answered with a structured envelope rather than a protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub message_id: Option<String>,
    pub a_address: Option<String>,
}

/// One body sent from one origin to many recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    pub a_address: Option<String>,
    /// Ordered; duplicates are dispatched independently.
    pub b_addresses: Vec<String>,
    pub body: Option<String>,
    pub data_coding: u8,
}
