use sha2::{Digest, Sha256};

/// Per-signal correlation id threaded through every pipeline step.
///
/// The id is an 8-char hex digest prefix of the signal id, so re-delivered
/// signals map to the same flow. Stateless beyond the derivation.
#[derive(Debug, Clone)]
pub struct Flow {
    id: String,
}

impl Flow {
    pub fn for_signal(signal_id: &str) -> Self {
        let digest = Sha256::digest(signal_id.as_bytes());
        let id = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        Self { id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start(&self, service: &'static str, operation: &'static str) {
        tracing::debug!(flow = %self.id, service, operation, marker = "start");
    }

    pub fn step(&self, service: &'static str, operation: &'static str) {
        tracing::debug!(flow = %self.id, service, operation, marker = "step");
    }

    pub fn complete(&self, service: &'static str, operation: &'static str) {
        tracing::info!(flow = %self.id, service, operation, marker = "complete");
    }

    pub fn fail(&self, service: &'static str, operation: &'static str, error: &str) {
        tracing::warn!(flow = %self.id, service, operation, marker = "fail", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_id_is_8_hex_chars() {
        let flow = Flow::for_signal("sig-001");
        assert_eq!(flow.id().len(), 8);
        assert!(flow.id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_flow_id_stable_across_redelivery() {
        assert_eq!(Flow::for_signal("sig-001").id(), Flow::for_signal("sig-001").id());
        assert_ne!(Flow::for_signal("sig-001").id(), Flow::for_signal("sig-002").id());
    }
}
