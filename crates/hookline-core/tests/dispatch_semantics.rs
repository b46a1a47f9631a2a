//! End-to-end dispatch behaviour of the event hub.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hookline_core::{
    AnyEvent, Event, EventHub, HookError, InterceptError, LaneConfig, LifecycleEvent, Registration,
    Timing, intercept,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct Login {
    timing: Timing,
    identity: String,
    token: Option<String>,
}

impl Event for Login {}

impl LifecycleEvent for Login {
    fn timing(&self) -> Timing {
        self.timing
    }

    fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }
}

#[derive(Debug, Clone)]
struct TokenIssued {
    identity: String,
}

impl Event for TokenIssued {}

#[derive(Debug, Clone)]
struct Unobserved;

impl Event for Unobserved {}

fn hub() -> EventHub {
    EventHub::builder()
        .lane(
            LaneConfig::default()
                .with_workers(4)
                .with_shutdown_timeout(Duration::from_secs(2)),
        )
        .build()
}

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

#[tokio::test]
async fn publish_with_no_handlers_never_fails() {
    let hub = hub();
    for _ in 0..3 {
        assert!(hub.publish(&Unobserved).is_ok());
    }
    hub.shutdown().await;
}

#[tokio::test]
async fn sync_handlers_complete_in_registration_order() {
    let hub = hub();
    let trace = Arc::new(Mutex::new(Vec::new()));

    for name in ["h1", "h2", "h3", "h4"] {
        let trace = trace.clone();
        hub.on_sync("orders", name, move |_: &TokenIssued| {
            trace.lock().unwrap().push(format!("{name}:start"));
            trace.lock().unwrap().push(format!("{name}:end"));
            Ok(())
        })
        .unwrap();
    }

    hub.publish(&TokenIssued {
        identity: "a@b.c".into(),
    })
    .unwrap();

    let trace = trace.lock().unwrap().clone();
    assert_eq!(
        trace,
        vec![
            "h1:start", "h1:end", "h2:start", "h2:end", "h3:start", "h3:end", "h4:start",
            "h4:end"
        ]
    );
}

#[tokio::test]
async fn failing_sync_handler_skips_the_rest() {
    for failing in 1..=3usize {
        let hub = hub();
        let invoked = Arc::new(Mutex::new(Vec::new()));

        for k in 1..=3usize {
            let invoked = invoked.clone();
            hub.on_sync("test", format!("h{k}"), move |_: &TokenIssued| {
                invoked.lock().unwrap().push(k);
                if k == failing {
                    Err(HookError::execution(format!("h{k} failed")))
                } else {
                    Ok(())
                }
            })
            .unwrap();
        }

        let err = hub
            .publish(&TokenIssued {
                identity: "x".into(),
            })
            .unwrap_err();

        assert_eq!(err.handler_name(), format!("h{failing}"));
        assert_eq!(
            err.hook_error().to_string(),
            format!("Hook execution failed: h{failing} failed")
        );
        assert_eq!(*invoked.lock().unwrap(), (1..=failing).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn async_failure_reaches_sink_not_publisher() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let hub = EventHub::builder()
        .lane(LaneConfig::default().with_workers(2))
        .exception_handler(
            move |reg: &Registration, event: &dyn AnyEvent, err: &HookError| {
                let identity = event
                    .downcast_ref::<TokenIssued>()
                    .map(|e| e.identity.clone());
                let _ = tx.send((reg.name().to_string(), identity, err.to_string()));
            },
        )
        .build();

    let sync_after = counter();
    let async_ok = counter();

    hub.on_async("test", "broken", |_: TokenIssued| async {
        Err(HookError::execution("downstream unavailable"))
    })
    .unwrap();
    let c = async_ok.clone();
    hub.on_async("test", "healthy", move |_: TokenIssued| {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .unwrap();
    let c = sync_after.clone();
    hub.on_sync("test", "sync_after", move |_: &TokenIssued| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    assert!(
        hub.publish(&TokenIssued {
            identity: "carol".into()
        })
        .is_ok()
    );
    assert_eq!(sync_after.load(Ordering::SeqCst), 1);

    let (handler, identity, message) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("sink should be called")
        .unwrap();
    assert_eq!(handler, "broken");
    assert_eq!(identity.as_deref(), Some("carol"));
    assert!(message.contains("downstream unavailable"));

    hub.shutdown().await;
    assert_eq!(async_ok.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn after_veto_blocks_issued_notification() {
    let hub = hub();
    let before = counter();
    let after = counter();
    let issued = counter();

    let c = before.clone();
    hub.on_sync("auth", "a_before", move |e: &Login| {
        if e.is_before() {
            c.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    })
    .unwrap();
    let c = after.clone();
    hub.on_sync("auth", "b_after", move |e: &Login| {
        if e.is_after() {
            c.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    })
    .unwrap();
    let c = after.clone();
    hub.on_sync("auth", "c_after_fails", move |e: &Login| {
        if e.is_after() {
            c.fetch_add(1, Ordering::SeqCst);
            return Err(HookError::rejected("after handler error"));
        }
        Ok(())
    })
    .unwrap();
    let c = issued.clone();
    hub.on_sync("auth", "issued", move |_: &TokenIssued| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let mut event = Login {
        timing: Timing::Before,
        identity: "admin@example.com".into(),
        token: None,
    };
    let result: Result<String, InterceptError<HookError>> = intercept(&hub, &mut event, |e| {
        let token = format!("token-for-{}", e.identity);
        e.token = Some(token.clone());
        Ok(token)
    });
    if result.is_ok() {
        hub.publish(&TokenIssued {
            identity: event.identity.clone(),
        })
        .unwrap();
    }

    assert!(matches!(
        result,
        Err(InterceptError::Vetoed {
            phase: Timing::After,
            ..
        })
    ));
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 2);
    assert_eq!(issued.load(Ordering::SeqCst), 0);
    assert!(event.token.is_some());
}

#[tokio::test]
async fn unregistered_owner_stops_receiving() {
    let hub = hub();
    let hits = counter();

    let c = hits.clone();
    hub.on_sync("cache", "evict", move |_: &TokenIssued| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let event = TokenIssued {
        identity: "x".into(),
    };
    hub.publish(&event).unwrap();
    assert_eq!(hub.unregister_owner(&"cache".into()), 1);
    hub.publish(&event).unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
