//! `ExternalChannel` — the optional outbound adapter for `EmitTarget`
//! edges and for public events forwarded out of a root process (spec §2,
//! §4.4). The runtime never constructs a transport itself; callers supply
//! an implementation.

use async_trait::async_trait;
use serde_json::Value;

use stepforge_shared::ProcessResult;

#[async_trait]
pub trait ExternalChannel: Send + Sync + std::fmt::Debug {
    async fn publish(&self, topic: &str, channel_key: Option<&str>, data: Option<Value>) -> ProcessResult<()>;
}

/// A channel that records everything published to it; useful for tests
/// and for hosts with no outbound transport configured.
#[derive(Debug, Default)]
pub struct NullExternalChannel;

#[async_trait]
impl ExternalChannel for NullExternalChannel {
    async fn publish(&self, _topic: &str, _channel_key: Option<&str>, _data: Option<Value>) -> ProcessResult<()> {
        Ok(())
    }
}
