use ibkr_relay_catalog::arguments::{
    BAR_SIZES, DEFAULT_BAR_SIZE, DEFAULT_DURATION, DEFAULT_SEC_TYPE,
};
use ibkr_relay_catalog::{
    build_request, Dataset, Operation, OperationRequest, OperationResult, RelayClient, SymbolSpec,
};
use ibkr_relay_core::{CallError, ErrorKind, RequestEnvelope, ResponseEnvelope};
use ibkr_relay_fabric::{
    codec::{Codec, JsonCodec},
    error::{Result as TransportResult, TransportError},
    transport::{
        ChannelAddress, Delivery, MemoryQueue, OutboundMessage, Queue, Receipt, ReceivedMessage,
    },
    Dispatcher,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn requests() -> ChannelAddress {
    ChannelAddress::new("memory://ibkr-requests")
}

fn responses() -> ChannelAddress {
    ChannelAddress::new("memory://ibkr-responses")
}

fn client(queue: &Arc<MemoryQueue>) -> RelayClient {
    RelayClient::new(Dispatcher::new(queue.clone(), requests(), responses()))
}

/// Executor stand-in answering every request with `respond`
fn spawn_executor<F>(queue: Arc<MemoryQueue>, respond: F) -> JoinHandle<()>
where
    F: Fn(&RequestEnvelope) -> ResponseEnvelope + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let batch = queue
                .receive(&requests(), Duration::from_secs(1))
                .await
                .unwrap();
            for message in batch {
                let request = JsonCodec.decode_request(&message.body).unwrap();
                queue.acknowledge(&requests(), &message.receipt).await.unwrap();
                let body = JsonCodec.encode_response(&respond(&request)).unwrap();
                queue
                    .send(&responses(), OutboundMessage::new(body))
                    .await
                    .unwrap();
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn symbol_search_returns_integer_contract_ids() {
    let queue = Arc::new(MemoryQueue::new());
    spawn_executor(queue.clone(), |request| {
        assert_eq!(request.operation, "find_symbols");
        assert_eq!(request.payload["query"], json!("AAPL"));
        ResponseEnvelope::reply_ok(
            request,
            json!([{"symbol": "AAPL", "conId": 265598, "exchange": "SMART", "secType": "STK"}]),
        )
    });

    let matches = client(&queue).search_symbols("AAPL").await.unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].symbol, "AAPL");
    assert_eq!(matches[0].con_id, 265598);
}

#[tokio::test(start_paused = true)]
async fn call_by_tool_name_yields_typed_result() {
    let queue = Arc::new(MemoryQueue::new());
    spawn_executor(queue.clone(), |request| {
        assert_eq!(request.operation, "tws_health");
        ResponseEnvelope::reply_ok(request, json!({"connected": true, "server_time": "20240102 10:00:00"}))
    });

    let result = client(&queue)
        .call("ibkr_health", &Value::Null)
        .await
        .unwrap();

    match result {
        OperationResult::Health(report) => {
            assert!(report.connected);
            assert_eq!(report.server_time.as_deref(), Some("20240102 10:00:00"));
        }
        other => panic!("Expected health report, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn invalid_contract_id_never_reaches_the_queue() {
    let queue = Arc::new(MemoryQueue::new());

    let err = client(&queue)
        .call("ibkr_contract_by_id", &json!({"contract_id": "not-a-number"}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    assert_eq!(queue.stats().sent(), 0);
    assert_eq!(queue.depth(&requests()), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_tool_never_reaches_the_queue() {
    let queue = Arc::new(MemoryQueue::new());

    let err = client(&queue)
        .call("ibkr_place_order", &json!({}))
        .await
        .unwrap_err();

    assert_eq!(err, CallError::UnknownOperation("ibkr_place_order".to_string()));
    assert_eq!(queue.stats().sent(), 0);
}

#[tokio::test(start_paused = true)]
async fn health_without_executor_times_out() {
    let queue = Arc::new(MemoryQueue::new());
    let client = client(&queue).with_timeout(Duration::from_secs(30));
    let started = Instant::now();

    let err = client.health().await.unwrap_err();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));
    match err {
        CallError::Timeout { operation, .. } => assert_eq!(operation, "ibkr_health"),
        other => panic!("Expected Timeout, got {other:?}"),
    }
    // The request stays queued for an executor that may come back
    assert_eq!(queue.depth(&requests()), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_error_is_reported_verbatim() {
    let queue = Arc::new(MemoryQueue::new());
    spawn_executor(queue.clone(), |request| {
        ResponseEnvelope::reply_error(request, "No security definition has been found")
    });

    let err = client(&queue).contract_by_id(1, false).await.unwrap_err();

    assert_eq!(
        err,
        CallError::RemoteError("No security definition has been found".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn wrong_result_shape_is_rejected() {
    let queue = Arc::new(MemoryQueue::new());
    spawn_executor(queue.clone(), |request| {
        ResponseEnvelope::reply_ok(request, json!({"status": "up"}))
    });

    let err = client(&queue).health().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnexpectedResponseShape);
}

#[tokio::test(start_paused = true)]
async fn custom_ohlcv_sends_executor_field_names() {
    let queue = Arc::new(MemoryQueue::new());
    spawn_executor(queue.clone(), |request| {
        assert_eq!(request.operation, "ohlcv");
        assert_eq!(request.payload["duration_str"], json!("1 M"));
        assert_eq!(request.payload["bar_size_setting"], json!("1 day"));
        assert_eq!(
            request.payload["symbols"],
            json!([{"symbol": "AAPL", "currency": "USD", "secType": "STK"}])
        );
        ResponseEnvelope::reply_ok(request, json!({"s3_uri": "s3://bucket/custom.parquet", "rows": 21}))
    });

    let bars = client(&queue)
        .custom_ohlcv(&[SymbolSpec::stock("AAPL", "USD")], Some("1 M"), None)
        .await
        .unwrap();

    match bars {
        Dataset::Stored(artifact) => {
            assert_eq!(artifact.uri, "s3://bucket/custom.parquet");
            assert_eq!(artifact.rows, Some(21));
        }
        other => panic!("Expected stored dataset, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn catalog_timeouts_apply_without_override() {
    let queue = Arc::new(MemoryQueue::new());
    let client = client(&queue);

    assert_eq!(client.timeout_for(Operation::Health), Duration::from_secs(120));
    assert_eq!(client.timeout_for(Operation::DailyOhlcv), Duration::from_secs(1200));

    let client = client.with_timeout(Duration::from_secs(5));
    assert_eq!(client.timeout_for(Operation::DailyOhlcv), Duration::from_secs(5));
}

/// Queue whose every operation fails
struct Unreachable;

#[async_trait::async_trait]
impl Queue for Unreachable {
    async fn send(&self, _: &ChannelAddress, _: OutboundMessage) -> TransportResult<Delivery> {
        Err(TransportError::unavailable("connection refused"))
    }

    async fn receive(&self, _: &ChannelAddress, _: Duration) -> TransportResult<Vec<ReceivedMessage>> {
        Err(TransportError::unavailable("connection refused"))
    }

    async fn acknowledge(&self, _: &ChannelAddress, _: &Receipt) -> TransportResult<()> {
        Ok(())
    }

    async fn release(&self, _: &ChannelAddress, _: &Receipt) -> TransportResult<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn send_failure_names_the_tool() {
    let dispatcher = Dispatcher::new(Arc::new(Unreachable), requests(), responses());
    let err = RelayClient::new(dispatcher).positions().await.unwrap_err();

    match err {
        CallError::DispatchFailed { operation, .. } => assert_eq!(operation, "ibkr_positions"),
        other => panic!("Expected DispatchFailed, got {other:?}"),
    }
}

fn symbol_spec() -> impl Strategy<Value = Value> {
    (
        "[A-Z]{1,5}",
        prop::sample::select(vec!["USD", "EUR", "GBP", "JPY"]),
        prop::option::of(prop::sample::select(vec!["STK", "CASH", "FUT", "IND"])),
        prop::option::of("[A-Z]{2,8}"),
        prop::option::of(1u64..=u64::from(u32::MAX)),
    )
        .prop_map(|(symbol, currency, sec_type, exchange, con_id)| {
            let mut spec = json!({"symbol": symbol, "currency": currency});
            if let Some(sec_type) = sec_type {
                spec["secType"] = json!(sec_type);
            }
            if let Some(exchange) = exchange {
                spec["exchange"] = json!(exchange);
            }
            if let Some(con_id) = con_id {
                spec["conId"] = json!(con_id);
            }
            spec
        })
}

fn duration() -> impl Strategy<Value = String> {
    (1u32..=365, prop::sample::select(vec!["S", "D", "W", "M", "Y"]))
        .prop_map(|(count, unit)| format!("{count} {unit}"))
}

fn assert_survives_codec(request: &OperationRequest) -> Result<(), TestCaseError> {
    let envelope = RequestEnvelope::new(request.operation.wire_name(), request.payload.clone());
    let body = JsonCodec.encode_request(&envelope).unwrap();
    let decoded = JsonCodec.decode_request(&body).unwrap();

    prop_assert_eq!(decoded.correlation_id, envelope.correlation_id);
    prop_assert_eq!(decoded.operation.as_str(), request.operation.wire_name());
    prop_assert_eq!(&decoded.payload, &request.payload);
    Ok(())
}

#[test]
fn argument_free_requests_survive_the_codec() {
    let plain: Vec<_> = Operation::ALL
        .into_iter()
        .filter(|op| op.parameters().is_empty())
        .collect();
    assert_eq!(plain.len(), 6);

    for op in plain {
        for arguments in [Value::Null, json!({})] {
            let request = build_request(op.tool_name(), &arguments).unwrap();
            assert!(request.payload.is_empty());
            assert_survives_codec(&request).unwrap();
        }
    }
}

proptest! {
    #[test]
    fn lookup_requests_survive_the_codec(
        query in "[A-Za-z][A-Za-z0-9 .]{0,15}",
        contract_id in 1u64..=u64::from(u32::MAX),
        check_ohlcv in any::<bool>(),
    ) {
        let search = build_request("ibkr_search_symbols", &json!({"query": query})).unwrap();
        assert_survives_codec(&search)?;

        let by_id = build_request(
            "ibkr_contract_by_id",
            &json!({"contract_id": contract_id, "check_ohlcv": check_ohlcv}),
        )
        .unwrap();
        prop_assert_eq!(&by_id.payload["contract_id"], &json!(contract_id));
        prop_assert_eq!(&by_id.payload["check_ohlcv_availability"], &json!(check_ohlcv));
        assert_survives_codec(&by_id)?;
    }

    #[test]
    fn custom_ohlcv_requests_survive_the_codec(
        symbols in prop::collection::vec(symbol_spec(), 1..5),
        duration in prop::option::of(duration()),
        bar_size in prop::option::of(prop::sample::select(BAR_SIZES.to_vec())),
    ) {
        let mut arguments = json!({"symbols": symbols});
        if let Some(duration) = &duration {
            arguments["duration"] = json!(duration);
        }
        if let Some(bar_size) = bar_size {
            arguments["bar_size"] = json!(bar_size);
        }

        let request = build_request("ibkr_custom_ohlcv", &arguments).unwrap();
        let sent = request.payload["symbols"].as_array().unwrap();
        prop_assert_eq!(sent.len(), symbols.len());
        for (sent, given) in sent.iter().zip(&symbols) {
            prop_assert_eq!(&sent["symbol"], &given["symbol"]);
            prop_assert_eq!(&sent["conId"], &given["conId"]);
            let sec_type = given.get("secType").cloned().unwrap_or(json!(DEFAULT_SEC_TYPE));
            prop_assert_eq!(&sent["secType"], &sec_type);
        }
        prop_assert_eq!(
            &request.payload["duration_str"],
            &json!(duration.as_deref().unwrap_or(DEFAULT_DURATION))
        );
        prop_assert_eq!(
            &request.payload["bar_size_setting"],
            &json!(bar_size.unwrap_or(DEFAULT_BAR_SIZE))
        );
        assert_survives_codec(&request)?;
    }
}
