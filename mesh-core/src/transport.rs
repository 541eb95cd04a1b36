//! The "small capability set" (spec §9) pools and breakers program against:
//! a peer address, a connectivity state, and a way to issue one call. Real
//! traffic goes out over a `tonic` gRPC channel (`GrpcTransport`); tests use
//! the programmable [`mock::MockTransport`] so pool/breaker behavior can be
//! exercised without a live peer.

use crate::error::{MeshError, MeshResult};
use async_trait::async_trait;

/// Mirrors a gRPC channel's connectivity state machine. Spec §9 Open
/// Question (a): the reference implementation accepts only `Ready` and
/// `Idle` as healthy; `Connecting` during a slow start is *not* treated as
/// healthy, so a pool under slow peer startup relies on `min_connections`
/// being opened eagerly rather than on a lenient health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Ready,
    Idle,
    TransientFailure,
    Shutdown,
}

impl ConnState {
    pub fn is_acceptable(self) -> bool {
        matches!(self, ConnState::Ready | ConnState::Idle)
    }
}

/// A single outstanding transport to one peer. Implementations own whatever
/// underlying connection they wrap; `mesh-pool` only ever sees this trait.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    fn peer_address(&self) -> &str;

    /// The transport's own view of its connectivity, independent of any
    /// pool-level cached `healthy` flag (spec §4.2 health checker evaluates
    /// both).
    async fn connectivity_state(&self) -> ConnState;

    /// Issue one call, used both for real RPC traffic and for the health
    /// checker's liveness probe (method `"health"`).
    async fn call(&self, method: &str, payload: serde_json::Value) -> MeshResult<serde_json::Value>;
}

/// Builds a [`Transport`] for a given peer address. `mesh-pool` depends only
/// on this factory, never on a concrete transport type, so swapping gRPC for
/// another wire protocol touches one call site.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, address: &str) -> MeshResult<Box<dyn Transport>>;
}

pub mod grpc {
    //! Real peer transport over a `tonic` gRPC channel. No service stubs are
    //! generated here (the mesh substrate calls peers by method name rather
    //! than a fixed `.proto` contract) — a small JSON codec rides over the
    //! gRPC framing instead, matching the plain-JSON wire shape the rest of
    //! this system uses (spec §6).
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
    use tonic::transport::{Channel, Endpoint};
    use tonic::Status;

    #[derive(Debug, Clone, Default)]
    pub struct JsonCodec;

    impl Codec for JsonCodec {
        type Encode = serde_json::Value;
        type Decode = serde_json::Value;
        type Encoder = JsonCodec;
        type Decoder = JsonCodec;

        fn encoder(&mut self) -> Self::Encoder {
            JsonCodec
        }

        fn decoder(&mut self) -> Self::Decoder {
            JsonCodec
        }
    }

    impl Encoder for JsonCodec {
        type Item = serde_json::Value;
        type Error = Status;

        fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
            let bytes = serde_json::to_vec(&item).map_err(|e| Status::internal(e.to_string()))?;
            dst.put_slice(&bytes);
            Ok(())
        }
    }

    impl Decoder for JsonCodec {
        type Item = serde_json::Value;
        type Error = Status;

        fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
            if !src.has_remaining() {
                return Ok(None);
            }
            let mut bytes = vec![0u8; src.remaining()];
            src.copy_to_slice(&mut bytes);
            let value = serde_json::from_slice(&bytes).map_err(|e| Status::internal(e.to_string()))?;
            Ok(Some(value))
        }
    }

    fn conn_state_from_tonic(state: u8) -> ConnState {
        match state {
            0 => ConnState::Idle,
            1 => ConnState::Connecting,
            2 => ConnState::Ready,
            3 => ConnState::TransientFailure,
            _ => ConnState::Shutdown,
        }
    }

    fn conn_state_to_tonic(state: ConnState) -> u8 {
        match state {
            ConnState::Idle => 0,
            ConnState::Connecting => 1,
            ConnState::Ready => 2,
            ConnState::TransientFailure => 3,
            ConnState::Shutdown => 4,
        }
    }

    /// A single gRPC channel to a peer. `state` is updated optimistically
    /// from call outcomes rather than polled from the channel (tonic's
    /// public API does not expose the gRPC-core connectivity watcher), which
    /// is noted as a deliberate simplification in `DESIGN.md`.
    #[derive(Debug)]
    pub struct GrpcTransport {
        address: String,
        channel: Channel,
        state: AtomicU8,
    }

    impl GrpcTransport {
        pub async fn connect(address: &str) -> MeshResult<Self> {
            let endpoint = Endpoint::from_shared(format!("http://{address}"))
                .map_err(|e| MeshError::Backend(e.to_string()))?
                .connect_timeout(Duration::from_secs(5))
                .timeout(Duration::from_secs(30));
            let channel = endpoint.connect().await.map_err(|e| MeshError::Backend(e.to_string()))?;
            Ok(Self { address: address.to_string(), channel, state: AtomicU8::new(conn_state_to_tonic(ConnState::Ready)) })
        }

        fn mark(&self, state: ConnState) {
            self.state.store(conn_state_to_tonic(state), Ordering::Relaxed);
        }
    }

    #[async_trait]
    impl Transport for GrpcTransport {
        fn peer_address(&self) -> &str {
            &self.address
        }

        async fn connectivity_state(&self) -> ConnState {
            conn_state_from_tonic(self.state.load(Ordering::Relaxed))
        }

        async fn call(&self, method: &str, payload: serde_json::Value) -> MeshResult<serde_json::Value> {
            let mut grpc = tonic::client::Grpc::new(self.channel.clone());
            if let Err(e) = grpc.ready().await {
                self.mark(ConnState::TransientFailure);
                return Err(MeshError::Backend(e.to_string()));
            }
            let path = match tonic::codegen::http::uri::PathAndQuery::from_maybe_shared(format!("/mesh.Peer/{method}")) {
                Ok(p) => p,
                Err(e) => return Err(MeshError::InvalidArgument(e.to_string())),
            };
            let request = tonic::Request::new(payload);
            match grpc.unary(request, path, JsonCodec).await {
                Ok(response) => {
                    self.mark(ConnState::Ready);
                    Ok(response.into_inner())
                }
                Err(status) => {
                    self.mark(ConnState::TransientFailure);
                    Err(MeshError::Backend(status.to_string()))
                }
            }
        }
    }

    pub struct GrpcTransportFactory;

    #[async_trait]
    impl TransportFactory for GrpcTransportFactory {
        async fn connect(&self, address: &str) -> MeshResult<Box<dyn Transport>> {
            let transport = GrpcTransport::connect(address).await?;
            Ok(Box::new(transport))
        }
    }

    // Kept for symmetry with `Arc`-based call sites elsewhere in the mesh
    // crates; not currently constructed outside tests.
    #[allow(dead_code)]
    fn _assert_send_sync(f: Arc<dyn TransportFactory>) -> Arc<dyn TransportFactory> {
        f
    }
}

pub mod mock {
    //! A transport double driven entirely by test code: its connectivity
    //! state and per-call outcome (including artificial latency, for
    //! circuit-breaker timeout tests) are set directly rather than observed
    //! from a real connection.
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::sleep;

    fn state_to_u8(s: ConnState) -> u8 {
        match s {
            ConnState::Connecting => 0,
            ConnState::Ready => 1,
            ConnState::Idle => 2,
            ConnState::TransientFailure => 3,
            ConnState::Shutdown => 4,
        }
    }

    fn u8_to_state(v: u8) -> ConnState {
        match v {
            0 => ConnState::Connecting,
            1 => ConnState::Ready,
            2 => ConnState::Idle,
            3 => ConnState::TransientFailure,
            _ => ConnState::Shutdown,
        }
    }

    #[derive(Debug)]
    pub struct MockTransport {
        address: String,
        state: AtomicU8,
        delay: Mutex<Duration>,
        fail: std::sync::atomic::AtomicBool,
        calls: AtomicU32,
    }

    impl MockTransport {
        pub fn new(address: impl Into<String>) -> Self {
            Self {
                address: address.into(),
                state: AtomicU8::new(state_to_u8(ConnState::Ready)),
                delay: Mutex::new(Duration::ZERO),
                fail: std::sync::atomic::AtomicBool::new(false),
                calls: AtomicU32::new(0),
            }
        }

        pub fn set_state(&self, state: ConnState) {
            self.state.store(state_to_u8(state), Ordering::SeqCst);
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn peer_address(&self) -> &str {
            &self.address
        }

        async fn connectivity_state(&self) -> ConnState {
            u8_to_state(self.state.load(Ordering::SeqCst))
        }

        async fn call(&self, _method: &str, payload: serde_json::Value) -> MeshResult<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(MeshError::Backend("mock transport configured to fail".to_string()));
            }
            Ok(payload)
        }
    }

    pub struct MockTransportFactory {
        pub fail_connect: std::sync::atomic::AtomicBool,
    }

    impl Default for MockTransportFactory {
        fn default() -> Self {
            Self { fail_connect: std::sync::atomic::AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn connect(&self, address: &str) -> MeshResult<Box<dyn Transport>> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(MeshError::Backend("mock transport factory configured to fail".to_string()));
            }
            Ok(Box::new(MockTransport::new(address)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[tokio::test]
    async fn mock_transport_echoes_payload() {
        let transport = MockTransport::new("127.0.0.1:9000");
        let result = transport.call("echo", serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(result["a"], 1);
    }

    #[tokio::test]
    async fn mock_transport_respects_failing_flag() {
        let transport = MockTransport::new("127.0.0.1:9000");
        transport.set_failing(true);
        assert!(transport.call("echo", serde_json::json!({})).await.is_err());
    }

    #[test]
    fn only_ready_and_idle_are_acceptable() {
        assert!(ConnState::Ready.is_acceptable());
        assert!(ConnState::Idle.is_acceptable());
        assert!(!ConnState::Connecting.is_acceptable());
        assert!(!ConnState::TransientFailure.is_acceptable());
        assert!(!ConnState::Shutdown.is_acceptable());
    }
}
