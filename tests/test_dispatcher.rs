use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use onvif_server::Error;
use onvif_server::http::request::{Method, Request, RequestBuilder};
use onvif_server::http::response::{Response, StatusCode};
use onvif_server::service::{MAX_SERVICES, ServiceDispatcher, ServiceRegistration};

fn request() -> Request {
    RequestBuilder::new()
        .method(Method::POST)
        .target("/onvif/ptz_service")
        .build()
        .unwrap()
}

fn echo(name: &str) -> ServiceRegistration {
    ServiceRegistration::new(name, |operation, _| Ok(Response::ok("text/plain", operation)))
}

#[test]
fn test_register_twice_is_duplicate() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher.register(echo("ptz")).unwrap();

    assert!(matches!(dispatcher.register(echo("ptz")), Err(Error::Duplicate(_))));
    assert_eq!(dispatcher.services(), ["ptz"]);
}

#[test]
fn test_unregister_twice_is_not_found() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher.register(echo("ptz")).unwrap();

    dispatcher.unregister("ptz").unwrap();
    assert!(matches!(dispatcher.unregister("ptz"), Err(Error::NotFound(_))));
    assert!(dispatcher.is_empty());
}

#[test]
fn test_register_after_unregister_is_allowed() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher.register(echo("ptz")).unwrap();
    dispatcher.unregister("ptz").unwrap();
    dispatcher.register(echo("ptz")).unwrap();
    assert!(dispatcher.has_service("ptz"));
}

#[test]
fn test_empty_name_rejected() {
    let dispatcher = ServiceDispatcher::new();
    assert!(matches!(dispatcher.register(echo("")), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_dispatch_passes_operation_through() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher.register(echo("ptz")).unwrap();

    let response = dispatcher.dispatch("ptz", "GetPresets", &request()).unwrap();
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"GetPresets");
}

#[test]
fn test_dispatch_unknown_service() {
    let dispatcher = ServiceDispatcher::new();
    let result = dispatcher.dispatch("media", "GetProfiles", &request());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_dispatch_returns_handler_errors_untouched() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher
        .register(ServiceRegistration::new("ptz", |_, _| {
            Err(Error::ResourceExhausted("full".to_string()))
        }))
        .unwrap();

    let result = dispatcher.dispatch("ptz", "SetPreset", &request());
    assert_eq!(result.unwrap_err(), Error::ResourceExhausted("full".to_string()));
}

#[test]
fn test_handler_can_use_dispatcher_reentrantly() {
    let dispatcher = Arc::new(ServiceDispatcher::new());
    let inner = Arc::clone(&dispatcher);
    dispatcher.register(echo("device")).unwrap();
    dispatcher
        .register(ServiceRegistration::new("ptz", move |op, req| {
            // no registry lock is held while a handler runs
            inner.dispatch("device", op, req)
        }))
        .unwrap();

    let response = dispatcher.dispatch("ptz", "GetNodes", &request()).unwrap();
    assert_eq!(response.body, b"GetNodes");
}

#[test]
fn test_capabilities() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher.register(echo("device")).unwrap();
    dispatcher
        .register(echo("ptz").with_capabilities(|name| name == "MoveStatus"))
        .unwrap();

    assert!(dispatcher.capabilities("ptz", "MoveStatus"));
    assert!(!dispatcher.capabilities("ptz", "EFlip"));
    assert!(!dispatcher.capabilities("device", "MoveStatus"));
    assert!(!dispatcher.capabilities("imaging", "MoveStatus"));
}

#[test]
fn test_failed_init_leaves_registry_unchanged() {
    let dispatcher = ServiceDispatcher::new();
    dispatcher.register(echo("device")).unwrap();

    let result = dispatcher.register(
        echo("ptz").with_init(|| Err(Error::Internal("no motor".to_string()))),
    );
    assert!(matches!(result, Err(Error::Internal(_))));
    assert_eq!(dispatcher.services(), ["device"]);
}

#[test]
fn test_init_and_cleanup_hooks_run() {
    let inits = Arc::new(AtomicUsize::new(0));
    let cleanups = Arc::new(AtomicUsize::new(0));

    let dispatcher = ServiceDispatcher::new();
    let (i, c) = (Arc::clone(&inits), Arc::clone(&cleanups));
    dispatcher
        .register(
            echo("ptz")
                .with_init(move || {
                    i.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .with_cleanup(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    // a failed duplicate registration runs no hooks
    assert!(dispatcher.register(echo("ptz")).is_err());

    dispatcher.unregister("ptz").unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn test_service_limit() {
    let dispatcher = ServiceDispatcher::new();
    for i in 0..MAX_SERVICES {
        dispatcher.register(echo(&format!("svc{}", i))).unwrap();
    }

    assert!(matches!(
        dispatcher.register(echo("one_more")),
        Err(Error::ResourceExhausted(_))
    ));
    assert_eq!(dispatcher.len(), MAX_SERVICES);
}

#[test]
fn test_services_listed_in_registration_order() {
    let dispatcher = ServiceDispatcher::new();
    for name in ["device", "media", "ptz", "imaging"] {
        dispatcher.register(echo(name)).unwrap();
    }
    dispatcher.unregister("media").unwrap();

    assert_eq!(dispatcher.services(), ["device", "ptz", "imaging"]);
}

#[test]
fn test_shutdown_runs_every_cleanup() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let dispatcher = ServiceDispatcher::new();
    for name in ["device", "ptz"] {
        let c = Arc::clone(&cleanups);
        dispatcher
            .register(echo(name).with_cleanup(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }

    dispatcher.shutdown();
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_concurrent_dispatch_and_registration() {
    let dispatcher = Arc::new(ServiceDispatcher::new());
    dispatcher.register(echo("ptz")).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                let name = format!("svc{}", n);
                for _ in 0..50 {
                    dispatcher.register(echo(&name)).unwrap();
                    assert!(dispatcher.dispatch("ptz", "GetStatus", &request()).is_ok());
                    dispatcher.unregister(&name).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(dispatcher.services(), ["ptz"]);
}
