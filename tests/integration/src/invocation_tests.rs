//! Invocation Tests
//!
//! Calls through stubs and raw references against real listeners:
//! - Round trips for primitive, array, and nested object arguments
//! - Declared errors, dispatch panics, and argument decode faults
//! - Delivery failures versus lost responses
//! - Legacy operation indices next to method hashes

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use remoteref::{
    ApplicationError, ExportOptions, MethodDef, ObjectIdentity, RemoteError, RemoteReference,
    RemoteRuntime, Selector, StubDescriptor, StubKind,
};

/// Ship a descriptor through the codec, as a caller in another process would get it
fn received(descriptor: &StubDescriptor) -> StubDescriptor {
    let bytes = remote_marshal::to_bytes(descriptor).unwrap();
    remote_marshal::from_bytes(bytes).unwrap()
}

/// Scenario A: one request/response round trip
#[tokio::test]
async fn test_add_round_trip() {
    init_logging();

    let server = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&server).await;

    let client = RemoteRuntime::default();
    let descriptor = received(stub.descriptor());
    assert!(!descriptor.reference.is_local());
    assert!(stub.reference().is_local());
    let proxy = client.attach(descriptor);

    let sum: i32 = proxy.invoke(&ADD, &(2i32, 3i32)).await.unwrap();
    assert_eq!(sum, 5);
    assert_eq!(calculator.calls(), 1);

    let stats = server.stats();
    assert_eq!(stats.connections_accepted, 1);
    assert_eq!(stats.calls_received, 1);
    assert_eq!(stats.calls_completed, 1);
    assert_eq!(stats.calls_failed, 0);
}

#[tokio::test]
async fn test_equal_references_are_interchangeable() {
    init_logging();

    let server = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&server).await;
    let endpoint = stub.reference().endpoint().clone();
    let identity = stub.reference().identity();

    let client = RemoteRuntime::default();
    let a = RemoteReference::new(endpoint.clone(), identity);
    let b = RemoteReference::new(endpoint, identity);
    assert_eq!(a, b);

    let mut set = HashSet::new();
    set.insert(a.clone());
    assert!(set.contains(&b));
    assert!(set.contains(stub.reference()));

    let selector = Selector::Hash(ADD.hash());
    let x: i32 = a
        .invoke(client.channels().as_ref(), selector, &(20i32, 1i32))
        .await
        .unwrap();
    let y: i32 = b
        .invoke(client.channels().as_ref(), selector, &(20i32, 1i32))
        .await
        .unwrap();
    assert_eq!((x, y), (21, 21));
    assert_eq!(calculator.calls(), 2);
}

/// Scenario B: a declared error crosses the wire intact
#[tokio::test]
async fn test_declared_error_is_raised_exactly() {
    init_logging();

    let server = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&server).await;
    let client = RemoteRuntime::default();
    let proxy = client.attach(received(stub.descriptor()));

    let err = proxy
        .invoke::<_, i32>(&DIVIDE, &(7i32, 0i32))
        .await
        .unwrap_err();
    let app = match &err {
        RemoteError::Application(app) => app,
        other => panic!("expected application error, got {:?}", other),
    };
    assert!(app.is_declared());
    assert_eq!(app.type_name, "tests.MathError");
    assert_eq!(app.message, "cannot divide 7 by zero");
    assert_eq!(
        app.downcast::<MathError>(),
        Some(MathError {
            message: "cannot divide 7 by zero".to_string()
        })
    );
    assert!(!err.is_retry_safe());

    let quotient: i32 = proxy.invoke(&DIVIDE, &(7i32, 2i32)).await.unwrap();
    assert_eq!(quotient, 3);
    assert_eq!(server.stats().calls_failed, 1);
}

/// Scenario C: the server reads the call and dies before answering
#[tokio::test]
async fn test_lost_response_is_outcome_unknown() {
    init_logging();

    let (endpoint, accepted) = raw_server(|mut transport| async move {
        let _ = transport.read_frame().await;
    })
    .await;

    let client = RemoteRuntime::default();
    let reference = RemoteReference::new(endpoint, ObjectIdentity::well_known(0x20));
    let err = reference
        .invoke::<_, i32>(
            client.channels().as_ref(),
            Selector::Hash(ADD.hash()),
            &(2i32, 3i32),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, RemoteError::OutcomeUnknown { .. }),
        "expected outcome unknown, got {:?}",
        err
    );
    assert!(!err.is_retry_safe());
    assert!(!err.is_stale_reference());
    assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_delivery_failure() {
    init_logging();

    let client = RemoteRuntime::default();
    let reference = RemoteReference::new(dead_endpoint().await, ObjectIdentity::well_known(0x20));
    let err = reference
        .invoke::<_, i32>(
            client.channels().as_ref(),
            Selector::Hash(ADD.hash()),
            &(2i32, 3i32),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, RemoteError::DeliveryFailure { .. }),
        "expected delivery failure, got {:?}",
        err
    );
    assert!(err.is_retry_safe());
    assert!(err.is_stale_reference());
}

#[tokio::test]
async fn test_unknown_identity_is_no_such_object() {
    init_logging();

    let server = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&server).await;

    let missing = ObjectIdentity::well_known(0x999);
    let reference = RemoteReference::new(stub.reference().endpoint().clone(), missing);
    let err = reference
        .invoke::<_, i32>(
            server.channels().as_ref(),
            Selector::Hash(ADD.hash()),
            &(1i32, 1i32),
        )
        .await
        .unwrap_err();

    match err {
        RemoteError::NoSuchObject(identity) => assert_eq!(identity, missing),
        other => panic!("expected no such object, got {:?}", other),
    }
}

#[tokio::test]
async fn test_round_trip_nested_objects_and_arrays() {
    init_logging();

    let server = RemoteRuntime::default();
    let stub = server
        .export(Arc::new(Geometry), ExportOptions::new())
        .await
        .unwrap();
    let client = RemoteRuntime::default();
    let proxy = client.attach(received(stub.descriptor()));

    let inner = Polygon {
        name: "hole".to_string(),
        vertices: vec![Point { x: 1, y: 1 }, Point { x: 2, y: 2 }],
        label: None,
    };
    let polygon = Polygon {
        name: "square".to_string(),
        vertices: vec![
            Point { x: 0, y: 0 },
            Point { x: 0, y: 4 },
            Point { x: 4, y: 4 },
            Point { x: 4, y: 0 },
        ],
        label: Some(Box::new(inner)),
    };
    let by = Point { x: 10, y: -3 };

    let moved: Polygon = proxy.invoke(&TRANSLATE, &(polygon.clone(), by)).await.unwrap();
    assert_eq!(moved, polygon.translate(by));

    let corners: [Point; 4] = proxy.invoke(&CORNERS, &(moved.clone(),)).await.unwrap();
    assert_eq!(corners, moved.corners());

    let values: Vec<i64> = (1..=100).map(|v| v * 1_000_000_007).collect();
    let sum: i64 = proxy.invoke(&SUM, &(values.clone(),)).await.unwrap();
    assert_eq!(sum, values.iter().sum::<i64>());

    let empty: i64 = proxy.invoke(&SUM, &(Vec::<i64>::new(),)).await.unwrap();
    assert_eq!(empty, 0);
}

#[tokio::test]
async fn test_large_string_round_trip() {
    init_logging();

    let server = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&server).await;

    let text: String = "0123456789abcdef".repeat(64 * 1024);
    let echoed: String = stub.invoke(&ECHO, &(text.clone(),)).await.unwrap();
    assert_eq!(echoed, text);
}

#[tokio::test]
async fn test_panic_becomes_fault_and_connection_keeps_serving() {
    init_logging();

    let server = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&server).await;

    let err = stub.invoke::<_, i32>(&BOOM, &(3i32,)).await.unwrap_err();
    let app = err.as_application().expect("application error");
    assert_eq!(app.type_name, ApplicationError::DISPATCH_PANIC);
    assert_eq!(app.message, "boom 3");
    assert!(!app.is_declared());

    let sum: i32 = stub.invoke(&ADD, &(4i32, 4i32)).await.unwrap();
    assert_eq!(sum, 8);

    let stats = server.stats();
    assert_eq!(stats.connections_accepted, 1);
    assert_eq!(stats.calls_received, 2);
    assert_eq!(stats.calls_failed, 1);
}

#[tokio::test]
async fn test_undecodable_arguments_are_reported() {
    init_logging();

    let server = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&server).await;

    let err = stub
        .reference()
        .invoke::<_, i32>(
            server.channels().as_ref(),
            Selector::Hash(ADD.hash()),
            &("x".to_string(),),
        )
        .await
        .unwrap_err();
    let app = err.as_application().expect("application error");
    assert_eq!(app.type_name, ApplicationError::ARGUMENT_DECODE);
    assert_eq!(calculator.calls(), 0);
}

#[tokio::test]
async fn test_undeclared_method_hash_is_unknown_method() {
    init_logging();

    let server = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&server).await;

    let sqrt = MethodDef::new(CALC_INTERFACE, "sqrt(double)", "double");
    let err = stub.invoke::<_, f64>(&sqrt, &(2.0f64,)).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnknownMethod(_)), "got {:?}", err);

    let foreign = MethodDef::new("tests.Other", "add(int,int)", "int");
    let err = stub.invoke::<_, i32>(&foreign, &(1i32, 2i32)).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnknownMethod(_)), "got {:?}", err);
    assert_eq!(server.stats().calls_received, 1);
}

#[tokio::test]
async fn test_indexed_and_hashed_protocols_agree() {
    init_logging();

    let server = RemoteRuntime::default();
    server.stub_registry().register(calculator_template());
    let (_calculator, stub) = export_calculator(&server).await;

    let legacy = match stub.kind() {
        StubKind::Static { protocol, .. } => *protocol,
        other => panic!("expected static stub, got {:?}", other),
    };
    assert_eq!(legacy, remoteref::CallProtocol::Indexed);

    let client = RemoteRuntime::default();
    let indexed = client.attach(received(stub.descriptor()));
    let mut forwarding_descriptor = received(stub.descriptor());
    forwarding_descriptor.kind = StubKind::Forwarding;
    let hashed = client.attach(forwarding_descriptor);

    for (a, b) in [(2, 3), (-7, 7), (1000, 24)] {
        let x: i32 = indexed.invoke(&ADD, &(a, b)).await.unwrap();
        let y: i32 = hashed.invoke(&ADD, &(a, b)).await.unwrap();
        assert_eq!(x, y);
        assert_eq!(x, a + b);
    }

    let err = indexed
        .invoke::<_, i32>(&DIVIDE, &(1i32, 0i32))
        .await
        .unwrap_err();
    assert!(err
        .as_application()
        .and_then(|a| a.downcast::<MathError>())
        .is_some());

    let echoed: String = indexed.invoke(&ECHO, &("legacy".to_string(),)).await.unwrap();
    assert_eq!(echoed, "legacy");
}

#[tokio::test]
async fn test_out_of_range_index_is_unknown_method() {
    init_logging();

    let server = RemoteRuntime::default();
    server.stub_registry().register(calculator_template());
    let (_calculator, stub) = export_calculator(&server).await;

    let err = stub
        .reference()
        .invoke::<_, i32>(server.channels().as_ref(), Selector::Index(99), &(1i32, 2i32))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::UnknownMethod(_)), "got {:?}", err);

    // A static stub never sends an operation it does not know
    let err = stub.invoke::<_, i32>(&WAIT, &(1i32,)).await.unwrap_err();
    assert!(matches!(err, RemoteError::UnknownMethod(_)), "got {:?}", err);
    assert_eq!(server.stats().calls_received, 1);
}

#[tokio::test]
async fn test_index_without_skeleton_is_unknown_method() {
    init_logging();

    let server = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&server).await;
    assert_eq!(stub.kind(), &StubKind::Forwarding);

    let err = stub
        .reference()
        .invoke::<_, i32>(server.channels().as_ref(), Selector::Index(0), &(1i32, 2i32))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::UnknownMethod(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_detached_export_over_loopback_channels() {
    init_logging();

    let server = RemoteRuntime::default();
    let calculator = Arc::new(Calculator::default());
    let stub = server
        .export(Arc::clone(&calculator), ExportOptions::new().detached())
        .await
        .unwrap();
    assert!(server.listening_ports().is_empty());

    let loopback = Arc::new(LoopbackChannels::new(Arc::clone(server.dispatcher())));
    let client = RemoteRuntime::builder().channels(loopback.clone()).build();
    let proxy = client.attach(received(stub.descriptor()));

    let sum: i32 = proxy.invoke(&ADD, &(40i32, 2i32)).await.unwrap();
    assert_eq!(sum, 42);
    let sum: i32 = proxy.invoke(&ADD, &(1i32, 2i32)).await.unwrap();
    assert_eq!(sum, 3);

    assert_eq!(calculator.calls(), 2);
    assert_eq!(loopback.opened(), 2);
    assert_eq!(server.stats().connections_accepted, 0);
}
