//! Mock transport for deterministic testing of the bus engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test datagram encoding, chunking
//! and acknowledgment handling without a board attached.
//!
//! Unlike a strict ping-pong mock, responses are appended to a receive
//! queue as their requests arrive. Several writes can therefore be sent
//! back-to-back before any acknowledgment is read, which is exactly what a
//! lazy section does.
//!
//! # Example
//!
//! ```
//! use scaffold_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // Write 0x2a to register 0x0201, board acknowledges one byte.
//! mock.expect(&[0x01, 0x02, 0x01, 0x2a], &[0x01]);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use scaffold_core::error::{Error, Result};
use scaffold_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Bytes "sent by the board" and not yet received by the host.
    rx: VecDeque<u8>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
    receive_calls: usize,
}

/// A mock [`Transport`] for testing the bus engine without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation, and the
/// corresponding response is queued for `receive()`.
///
/// Clones share the same state, so a test can keep a handle for inspection
/// after moving the transport into the engine.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                rx: VecDeque::new(),
                connected: true,
                sent_log: Vec::new(),
                receive_calls: 0,
            })),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// Use an empty `response` for datagrams the board does not answer.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.state.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Every byte slice passed to `send()`, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent_log.clone()
    }

    /// Number of `send()` calls so far.
    pub fn send_count(&self) -> usize {
        self.state.lock().sent_log.len()
    }

    /// Number of `receive()` calls so far.
    pub fn receive_count(&self) -> usize {
        self.state.lock().receive_calls
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.state.lock().expectations.len()
    }

    /// Number of queued response bytes the host has not read yet.
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().rx.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        let Some(expectation) = state.expectations.pop_front() else {
            return Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            )));
        }
        state.rx.extend(expectation.response);
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.receive_calls += 1;

        if state.rx.is_empty() {
            return Err(Error::Timeout);
        }
        let n = state.rx.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.rx.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        let request = &[0x00, 0x06, 0x00];
        let response = &[0x03, 0x01];
        mock.expect(request, response);

        mock.send(request).await.unwrap();

        let mut buf = [0u8; 8];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], response);
    }

    #[tokio::test]
    async fn mock_transport_queues_responses() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01, 0x02, 0x00, 0x00], &[0x01]);
        mock.expect(&[0x01, 0x02, 0x01, 0x14], &[0x01]);

        mock.send(&[0x01, 0x02, 0x00, 0x00]).await.unwrap();
        mock.send(&[0x01, 0x02, 0x01, 0x14]).await.unwrap();
        assert_eq!(mock.pending_bytes(), 2);

        let mut buf = [0u8; 1];
        mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(mock.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let mock = MockTransport::new();
        let handle = mock.clone();
        mock.expect(&[0x08, 0, 0, 0, 0], &[]);

        let mut boxed: Box<dyn Transport> = Box::new(mock);
        boxed.send(&[0x08, 0, 0, 0, 0]).await.unwrap();

        assert_eq!(handle.send_count(), 1);
        assert_eq!(handle.sent_data()[0], vec![0x08, 0, 0, 0, 0]);
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xFF]);

        let result = mock.send(&[0x99]).await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(&[0x01]).await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn mock_transport_receive_without_send_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 4];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
        assert_eq!(mock.receive_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        let result = mock.send(&[0x01]).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }

    #[tokio::test]
    async fn mock_transport_partial_receive() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x02, 0x01, 0x00, 0x04], &[0xAA, 0xBB, 0xCC, 0xDD, 0x04]);
        mock.send(&[0x02, 0x01, 0x00, 0x04]).await.unwrap();

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
        assert_eq!(mock.pending_bytes(), 1);
    }
}
