//! Correlation id flow across the full chain: ingress header, outbound
//! call, published envelope, and the consumer-side handler scope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use switchboard_core::classification::ClassifiedError;
use switchboard_core::constants::correlation::CORRELATION_ID_HEADER;
use switchboard_core::correlation::{CorrelationContext, CorrelationId};
use switchboard_core::messaging::{
    Broker, DispatcherConfig, InMemoryBroker, MessageDispatcher, MessageEnvelope, MessageHandler,
};
use switchboard_core::resilience::{CircuitBreakerRegistry, PolicyEngine, ResilienceConfig};
use switchboard_core::transport::{MockTransport, ResilientClient, TransportRequest};

fn engine() -> PolicyEngine {
    PolicyEngine::new(Arc::new(CircuitBreakerRegistry::new(
        ResilienceConfig::default(),
    )))
}

/// Handler that records the correlation scope active while it runs and
/// publishes a follow-up message from inside that scope
struct RecordingHandler {
    dispatcher: MessageDispatcher,
    seen: Mutex<Vec<CorrelationId>>,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, _envelope: &MessageEnvelope) -> Result<(), ClassifiedError> {
        let active = CorrelationContext::current_or_new();
        self.seen.lock().push(active);

        self.dispatcher
            .publish("downstream", serde_json::json!({"hop": 2}))
            .await
            .map_err(|e| ClassifiedError::transient(e.to_string()))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_correlation_id_survives_call_publish_consume_chain() {
    let transport = MockTransport::new().respond(200);
    let client = ResilientClient::new(Arc::new(transport.clone()), engine());

    let broker = Arc::new(InMemoryBroker::new());
    broker.create_queue("upstream").await.unwrap();
    broker.create_queue("downstream").await.unwrap();
    let dispatcher = MessageDispatcher::new(
        Arc::clone(&broker) as Arc<dyn Broker>,
        engine(),
        DispatcherConfig::default(),
    );

    // Ingress: a request arrives carrying a correlation header
    let ingress = CorrelationContext::from_header(Some("req-777"));
    ingress
        .scope(async {
            // Outbound HTTP call from the request path
            client
                .send("inventory", TransportRequest::new("GET", "/stock"))
                .await
                .unwrap();

            // Message published from the same request path
            dispatcher
                .publish("upstream", serde_json::json!({"hop": 1}))
                .await
                .unwrap();
        })
        .await;

    // The outbound call carried the header
    let requests = transport.requests();
    assert_eq!(
        requests[0]
            .headers
            .get(CORRELATION_ID_HEADER)
            .map(String::as_str),
        Some("req-777")
    );

    // The envelope carries the same id
    let handler = Arc::new(RecordingHandler {
        dispatcher: dispatcher.clone(),
        seen: Mutex::new(Vec::new()),
    });
    dispatcher
        .consume_available("upstream", handler.clone())
        .await
        .unwrap();

    // The consumer ran inside the originating scope
    let seen = handler.seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].as_str(), "req-777");

    // And the message it published in turn carries the id onward
    let downstream = broker
        .receive("downstream", 10, std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(downstream.len(), 1);
    assert_eq!(downstream[0].envelope.correlation_id.as_str(), "req-777");
}

#[tokio::test]
async fn test_missing_ingress_header_generates_one_id_for_the_chain() {
    let transport = MockTransport::new().respond(200);
    let client = ResilientClient::new(Arc::new(transport.clone()), engine());

    let broker = Arc::new(InMemoryBroker::new());
    broker.create_queue("upstream").await.unwrap();
    let dispatcher = MessageDispatcher::new(
        Arc::clone(&broker) as Arc<dyn Broker>,
        engine(),
        DispatcherConfig::default(),
    );

    let ingress = CorrelationContext::from_header(None);
    let generated = ingress.correlation_id.clone();
    ingress
        .scope(async {
            client
                .send("inventory", TransportRequest::new("GET", "/stock"))
                .await
                .unwrap();
            dispatcher
                .publish("upstream", serde_json::json!({}))
                .await
                .unwrap();
        })
        .await;

    // One generated id, shared by the call and the envelope
    let requests = transport.requests();
    assert_eq!(
        requests[0]
            .headers
            .get(CORRELATION_ID_HEADER)
            .map(String::as_str),
        Some(generated.as_str())
    );

    let deliveries = broker
        .receive("upstream", 10, std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(deliveries[0].envelope.correlation_id, generated);
}

#[tokio::test]
async fn test_malformed_ingress_header_replaced_not_propagated() {
    let transport = MockTransport::new().respond(200);
    let client = ResilientClient::new(Arc::new(transport.clone()), engine());

    let ingress = CorrelationContext::from_header(Some("bad header with spaces"));
    ingress
        .scope(async {
            client
                .send("inventory", TransportRequest::new("GET", "/stock"))
                .await
                .unwrap();
        })
        .await;

    let header = transport.requests()[0]
        .headers
        .get(CORRELATION_ID_HEADER)
        .cloned()
        .unwrap();
    assert_ne!(header, "bad header with spaces");
    assert!(!header.is_empty());
}
