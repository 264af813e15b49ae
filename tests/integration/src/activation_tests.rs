//! Activation Tests
//!
//! Activatable references against real hosts:
//! - Lazy activation on first call
//! - Exactly one forced re-activation when the held reference is stale
//! - Failures outside the stale set propagate untouched
//! - Activators exported by another runtime

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use futures::future::join_all;
use remoteref::{
    ActivatableRef, ActivationId, Activator, ExportOptions, ObjectIdentity, RemoteError,
    RemoteReference, RemoteRuntime, Result,
};

/// Hands out one reference normally and another when forced
struct ScriptedActivator {
    normal: RemoteReference,
    forced: RemoteReference,
    calls: AtomicUsize,
    forced_calls: AtomicUsize,
}

impl ScriptedActivator {
    fn new(normal: RemoteReference, forced: RemoteReference) -> Arc<Self> {
        Arc::new(Self {
            normal,
            forced,
            calls: AtomicUsize::new(0),
            forced_calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> (usize, usize) {
        (
            self.calls.load(Ordering::SeqCst),
            self.forced_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl Activator for ScriptedActivator {
    async fn activate(&self, _id: &ActivationId, force: bool) -> Result<RemoteReference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.forced.clone())
        } else {
            Ok(self.normal.clone())
        }
    }
}

async fn dead_reference() -> RemoteReference {
    RemoteReference::new(dead_endpoint().await, ObjectIdentity::well_known(0x30))
}

#[tokio::test]
async fn test_activation_is_lazy_and_cached() {
    init_logging();

    let host = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&host).await;
    let activator = ScriptedActivator::new(stub.reference().clone(), stub.reference().clone());

    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));
    assert!(reference.current().await.is_none());
    assert_eq!(activator.calls(), (0, 0));

    for i in 0..3 {
        let sum: i32 = reference.invoke(&ADD, &(i, 1i32)).await.unwrap();
        assert_eq!(sum, i + 1);
    }
    assert_eq!(activator.calls(), (1, 0));
    assert_eq!(calculator.calls(), 3);
    assert_eq!(reference.current().await.as_ref(), Some(stub.reference()));
}

#[tokio::test]
async fn test_refused_connection_reactivates_once() {
    init_logging();

    let host = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&host).await;
    let activator = ScriptedActivator::new(dead_reference().await, stub.reference().clone());

    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));

    let sum: i32 = reference.invoke(&ADD, &(2i32, 3i32)).await.unwrap();
    assert_eq!(sum, 5);
    assert_eq!(activator.calls(), (2, 1));
    assert_eq!(calculator.calls(), 1);
    assert_eq!(reference.current().await.as_ref(), Some(stub.reference()));

    // The fresh reference is kept
    let sum: i32 = reference.invoke(&ADD, &(4i32, 4i32)).await.unwrap();
    assert_eq!(sum, 8);
    assert_eq!(activator.calls(), (2, 1));
}

#[tokio::test]
async fn test_second_failure_propagates_without_further_retry() {
    init_logging();

    let activator = ScriptedActivator::new(dead_reference().await, dead_reference().await);
    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));

    let err = reference
        .invoke::<_, i32>(&ADD, &(2i32, 3i32))
        .await
        .unwrap_err();
    assert!(
        matches!(err, RemoteError::DeliveryFailure { .. }),
        "expected delivery failure, got {:?}",
        err
    );
    assert_eq!(activator.calls(), (2, 1));
}

#[tokio::test]
async fn test_dead_host_behind_pooled_channel_reactivates() {
    init_logging();

    let dying = single_call_host(5i32).await;
    let host = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&host).await;
    let activator = ScriptedActivator::new(
        RemoteReference::new(dying, ObjectIdentity::well_known(0x33)),
        stub.reference().clone(),
    );

    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));

    let sum: i32 = reference.invoke(&ADD, &(2i32, 3i32)).await.unwrap();
    assert_eq!(sum, 5);
    assert_eq!(activator.calls(), (1, 0));

    // The channel to the dead host is still pooled
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sum: i32 = reference.invoke(&ADD, &(4i32, 4i32)).await.unwrap();
    assert_eq!(sum, 8);
    assert_eq!(activator.calls(), (2, 1));
    assert_eq!(calculator.calls(), 1);
}

#[tokio::test]
async fn test_missing_object_reactivates() {
    init_logging();

    let host = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&host).await;
    let gone = RemoteReference::new(
        stub.reference().endpoint().clone(),
        ObjectIdentity::well_known(0x31),
    );
    let activator = ScriptedActivator::new(gone, stub.reference().clone());

    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));
    let echoed: String = reference
        .invoke(&ECHO, &("again".to_string(),))
        .await
        .unwrap();
    assert_eq!(echoed, "again");
    assert_eq!(activator.calls(), (2, 1));
}

#[tokio::test]
async fn test_outcome_unknown_is_not_retried() {
    init_logging();

    let (endpoint, accepted) = raw_server(|mut transport| async move {
        let _ = transport.read_frame().await;
    })
    .await;
    let host = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&host).await;
    let activator = ScriptedActivator::new(
        RemoteReference::new(endpoint, ObjectIdentity::well_known(0x32)),
        stub.reference().clone(),
    );

    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));
    let err = reference
        .invoke::<_, i32>(&ADD, &(2i32, 3i32))
        .await
        .unwrap_err();

    assert!(
        matches!(err, RemoteError::OutcomeUnknown { .. }),
        "expected outcome unknown, got {:?}",
        err
    );
    assert_eq!(activator.calls(), (1, 0));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(calculator.calls(), 0);
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    init_logging();

    let host = RemoteRuntime::default();
    let (_calculator, stub) = export_calculator(&host).await;
    let activator = ScriptedActivator::new(stub.reference().clone(), stub.reference().clone());

    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));
    let err = reference
        .invoke::<_, i32>(&DIVIDE, &(9i32, 0i32))
        .await
        .unwrap_err();

    assert!(err
        .as_application()
        .and_then(|a| a.downcast::<MathError>())
        .is_some());
    assert_eq!(activator.calls(), (1, 0));
    assert_eq!(host.stats().calls_received, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_all_recover() {
    init_logging();

    const CALLERS: i32 = 16;

    let host = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&host).await;
    let activator = ScriptedActivator::new(dead_reference().await, stub.reference().clone());

    let client = RemoteRuntime::default();
    let reference = Arc::new(client.activatable(ActivationId::generate(activator.clone())));

    let calls = (0..CALLERS).map(|i| {
        let reference = Arc::clone(&reference);
        async move { reference.invoke::<_, i32>(&ADD, &(i, i)).await }
    });
    let results = join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), 2 * i as i32);
    }
    assert_eq!(calculator.calls(), CALLERS as usize);

    // Redundant re-activations are allowed, but each caller retries at most once
    let (calls, forced) = activator.calls();
    assert!(forced >= 1);
    assert!(forced <= CALLERS as usize);
    assert!(calls <= 2 * CALLERS as usize);
}

/// Starts a fresh host runtime whenever asked to re-establish the object
#[derive(Default)]
struct RecyclingActivator {
    hosts: tokio::sync::Mutex<Vec<(RemoteRuntime, RemoteReference)>>,
    forced: AtomicUsize,
}

#[async_trait]
impl Activator for RecyclingActivator {
    async fn activate(&self, _id: &ActivationId, force: bool) -> Result<RemoteReference> {
        let mut hosts = self.hosts.lock().await;
        if force {
            self.forced.fetch_add(1, Ordering::SeqCst);
        } else if let Some((_, reference)) = hosts.last() {
            return Ok(reference.clone());
        }
        let host = RemoteRuntime::default();
        let stub = host
            .export(Arc::new(Calculator::default()), ExportOptions::new())
            .await?;
        let reference = stub.reference().clone();
        hosts.push((host, reference.clone()));
        Ok(reference)
    }
}

#[tokio::test]
async fn test_recycled_host_is_reestablished() {
    init_logging();

    let activator = Arc::new(RecyclingActivator::default());
    let client = RemoteRuntime::default();
    let reference = client.activatable(ActivationId::generate(activator.clone()));

    let sum: i32 = reference.invoke(&ADD, &(1i32, 1i32)).await.unwrap();
    assert_eq!(sum, 2);
    let first = reference.current().await.unwrap();

    // The host goes away along with its open connections
    activator.hosts.lock().await[0].0.shutdown();
    while activator.hosts.lock().await[0].0.stats().connections_active > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sum: i32 = reference.invoke(&ADD, &(2i32, 2i32)).await.unwrap();
    assert_eq!(sum, 4);
    let second = reference.current().await.unwrap();
    assert_ne!(first, second);

    let hosts = activator.hosts.lock().await;
    assert_eq!(hosts.len(), 2);
    assert_eq!(activator.forced.load(Ordering::SeqCst), 1);
    // Recovered through the refused connection, not a missing-object fault
    assert_eq!(hosts[0].0.stats().calls_failed, 0);
    assert_eq!(hosts[0].0.stats().calls_received, 1);
}

/// Activator living in the host process, exported for remote clients
struct HostActivator {
    reference: Option<RemoteReference>,
    calls: AtomicUsize,
}

#[async_trait]
impl Activator for HostActivator {
    async fn activate(&self, id: &ActivationId, _force: bool) -> Result<RemoteReference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reference
            .clone()
            .ok_or_else(|| RemoteError::Activation(format!("nothing registered for {}", id)))
    }
}

#[tokio::test]
async fn test_remote_activator_round_trip() {
    init_logging();

    let host = RemoteRuntime::default();
    let (calculator, stub) = export_calculator(&host).await;
    let host_activator = Arc::new(HostActivator {
        reference: Some(stub.reference().clone()),
        calls: AtomicUsize::new(0),
    });
    let exported = host
        .export_activator(host_activator.clone(), ExportOptions::new())
        .await
        .unwrap();
    assert_eq!(
        exported.reference().identity(),
        ObjectIdentity::well_known(remoteref::types::ACTIVATOR_NUMBER)
    );

    let client = RemoteRuntime::default();
    let remote: Arc<dyn Activator> =
        Arc::new(client.remote_activator(exported.reference().endpoint().clone()));
    let reference: ActivatableRef = client.activatable(ActivationId::generate(remote));

    let sum: i32 = reference.invoke(&ADD, &(20i32, 22i32)).await.unwrap();
    assert_eq!(sum, 42);
    assert_eq!(host_activator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(calculator.calls(), 1);

    let resolved = reference.current().await.unwrap();
    assert_eq!(&resolved, stub.reference());
    assert!(!resolved.is_local());
}

#[tokio::test]
async fn test_remote_activator_failure_is_activation_error() {
    init_logging();

    let host = RemoteRuntime::default();
    let exported = host
        .export_activator(
            Arc::new(HostActivator {
                reference: None,
                calls: AtomicUsize::new(0),
            }),
            ExportOptions::new(),
        )
        .await
        .unwrap();

    let client = RemoteRuntime::default();
    let remote: Arc<dyn Activator> =
        Arc::new(client.remote_activator(exported.reference().endpoint().clone()));
    let id = ActivationId::generate(remote);
    let reference = client.activatable(id.clone());

    let err = reference
        .invoke::<_, i32>(&ADD, &(1i32, 2i32))
        .await
        .unwrap_err();
    match err {
        RemoteError::Activation(message) => {
            assert!(
                message.contains(&format!("nothing registered for {}", id)),
                "unexpected message: {}",
                message
            );
        }
        other => panic!("expected activation error, got {:?}", other),
    }
    assert!(reference.current().await.is_none());
}
