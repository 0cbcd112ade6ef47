use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dog_core::{
    ActiveFilter, CallContext, DataSession, DogAfterHook, DogApp, DogAroundHook, DogBeforeHook, DogError,
    DogErrorHook, DogService, ErrorKind, FilterActivation, FilterScope, FilterTable, HookContext, Next,
    ServiceCapabilities, ServiceMethodKind, SessionError, SessionProvider, TenantId,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

struct EchoService {
    log: Log,
}

#[async_trait]
impl DogService<String, ()> for EchoService {
    async fn find(&self, ctx: &CallContext, _params: ()) -> Result<Vec<String>> {
        self.log.lock().push("service".into());
        let filters = ctx.session().map(|s| s.active_filters().len()).unwrap_or(0);
        Ok(vec![format!("filters={filters}")])
    }

    async fn create(&self, _ctx: &CallContext, data: String, _params: ()) -> Result<String> {
        self.log.lock().push("service".into());
        if data == "boom" {
            return Err(DogError::conflict("boom").into_anyhow());
        }
        Ok(data.to_uppercase())
    }
}

struct Mark {
    log: Log,
    label: &'static str,
}

#[async_trait]
impl DogBeforeHook<String, ()> for Mark {
    async fn run(&self, _ctx: &mut HookContext<String, ()>) -> Result<()> {
        self.log.lock().push(format!("before:{}", self.label));
        Ok(())
    }
}

#[async_trait]
impl DogAfterHook<String, ()> for Mark {
    async fn run(&self, ctx: &mut HookContext<String, ()>) -> Result<()> {
        self.log.lock().push(format!("after:{}", self.label));
        // the input stays visible next to the result
        assert!(ctx.result.is_some());
        Ok(())
    }
}

#[async_trait]
impl DogAroundHook<String, ()> for Mark {
    async fn run(&self, ctx: &mut HookContext<String, ()>, next: Next<String, ()>) -> Result<()> {
        self.log.lock().push(format!("around-in:{}", self.label));
        let res = next.run(ctx).await;
        self.log.lock().push(format!("around-out:{}", self.label));
        res
    }
}

/// Turns a Conflict into a fallback result.
struct Recover;

#[async_trait]
impl DogErrorHook<String, ()> for Recover {
    async fn run(&self, ctx: &mut HookContext<String, ()>) -> Result<()> {
        let conflict = ctx.error.as_ref().and_then(DogError::kind_of) == Some(ErrorKind::Conflict);
        if conflict {
            ctx.error = None;
            ctx.result = Some(dog_core::HookResult::One("recovered".into()));
        }
        Ok(())
    }
}

/// Holds a filter scope on every call.
struct Scoped;

#[async_trait]
impl DogBeforeHook<String, ()> for Scoped {
    async fn run(&self, ctx: &mut HookContext<String, ()>) -> Result<()> {
        let session = ctx
            .session()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no session"))?;
        let scope = FilterScope::activate(&session, "F", "p", &TenantId::from("t"))?;
        ctx.hold_scope(scope);
        Ok(())
    }
}

#[derive(Default)]
struct CountingSession {
    filters: FilterTable,
}

impl DataSession for CountingSession {
    fn id(&self) -> &str {
        "counting"
    }

    fn enable_filter(&self, filter: &str, param: &str, value: &TenantId) -> Result<FilterActivation, SessionError> {
        self.filters.enable(filter, param, value)
    }

    fn disable_filter(&self, activation: FilterActivation) -> bool {
        self.filters.disable(activation)
    }

    fn active_filters(&self) -> Vec<ActiveFilter> {
        self.filters.active()
    }

    fn reset(&self) {
        self.filters.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Sessions {
    session: Arc<CountingSession>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    filters_at_release: Mutex<Vec<usize>>,
}

#[async_trait]
impl SessionProvider for Sessions {
    async fn acquire(&self) -> Result<Arc<dyn DataSession>, SessionError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.clone() as Arc<dyn DataSession>)
    }

    fn release(&self, session: Arc<dyn DataSession>) {
        self.filters_at_release.lock().push(session.active_filters().len());
        session.reset();
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn app_with_log() -> (DogApp<String, ()>, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app: DogApp<String, ()> = DogApp::new();
    app.register_service("notes", Arc::new(EchoService { log: log.clone() }));
    (app, log)
}

#[tokio::test]
async fn hooks_run_in_pipeline_order() {
    let (app, log) = app_with_log();
    let mark = |label| Arc::new(Mark { log: log.clone(), label });

    app.hooks(|h| {
        h.around_all(mark("app"));
        h.before_all(mark("app"));
        h.after_all(mark("app"));
    });
    let m1 = mark("svc");
    let m2 = mark("svc-create");
    app.service("notes").unwrap().hooks(|h| {
        h.before_all(m1.clone());
        h.after_all(m1);
        h.before_create(m2);
    });

    let out = app
        .service("notes")
        .unwrap()
        .create(CallContext::for_login("alice"), "hi".into(), ())
        .await
        .unwrap();

    assert_eq!(out, "HI");
    assert_eq!(
        *log.lock(),
        vec![
            "around-in:app",
            "before:app",
            "before:svc",
            "before:svc-create",
            "service",
            "after:svc",
            "after:app",
            "around-out:app",
        ]
    );
}

#[tokio::test]
async fn method_hooks_only_run_for_their_method() {
    let (app, log) = app_with_log();
    let create_only = Arc::new(Mark { log: log.clone(), label: "create" });
    app.hooks(|h| {
        h.before_create(create_only);
    });

    app.service("notes").unwrap().find(CallContext::anonymous(), ()).await.unwrap();

    assert_eq!(*log.lock(), vec!["service"]);
}

#[tokio::test]
async fn error_hooks_can_recover() {
    let (app, _log) = app_with_log();
    app.hooks(|h| {
        h.error_all(Arc::new(Recover));
    });

    let out = app
        .service("notes")
        .unwrap()
        .create(CallContext::anonymous(), "boom".into(), ())
        .await
        .unwrap();

    assert_eq!(out, "recovered");
}

#[tokio::test]
async fn unrecovered_errors_keep_their_kind() {
    let (app, _log) = app_with_log();

    let err = app
        .service("notes")
        .unwrap()
        .create(CallContext::anonymous(), "boom".into(), ())
        .await
        .unwrap_err();

    assert_eq!(DogError::kind_of(&err), Some(ErrorKind::Conflict));
}

#[tokio::test]
async fn each_call_leases_a_session_and_releases_scopes_first() {
    let (app, _log) = app_with_log();
    let sessions = Arc::new(Sessions::default());
    app.use_sessions(sessions.clone());
    app.hooks(|h| {
        h.before_all(Arc::new(Scoped));
    });
    let notes = app.service("notes").unwrap();

    let seen = notes.find(CallContext::for_login("alice"), ()).await.unwrap();
    assert_eq!(seen, vec!["filters=1".to_string()]);

    notes
        .create(CallContext::for_login("alice"), "boom".into(), ())
        .await
        .unwrap_err();

    assert_eq!(sessions.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(sessions.released.load(Ordering::SeqCst), 2);
    // scopes were dropped before the lease went back, on success and error
    assert_eq!(*sessions.filters_at_release.lock(), vec![0, 0]);
}

#[tokio::test]
async fn caller_supplied_session_is_not_leased() {
    let (app, _log) = app_with_log();
    let sessions = Arc::new(Sessions::default());
    app.use_sessions(sessions.clone());

    let own: Arc<dyn DataSession> = Arc::new(CountingSession::default());
    app.service("notes")
        .unwrap()
        .find(CallContext::anonymous().with_session(own), ())
        .await
        .unwrap();

    assert_eq!(sessions.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn methods_outside_the_capabilities_are_refused() {
    struct ReadOnly(EchoService);

    #[async_trait]
    impl DogService<String, ()> for ReadOnly {
        fn capabilities(&self) -> ServiceCapabilities {
            ServiceCapabilities::read_only()
        }

        async fn find(&self, ctx: &CallContext, params: ()) -> Result<Vec<String>> {
            self.0.find(ctx, params).await
        }

        async fn create(&self, ctx: &CallContext, data: String, params: ()) -> Result<String> {
            self.0.create(ctx, data, params).await
        }
    }

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app: DogApp<String, ()> = DogApp::new();
    app.register_service("notes", Arc::new(ReadOnly(EchoService { log: log.clone() })));
    let sessions = Arc::new(Sessions::default());
    app.use_sessions(sessions.clone());
    app.hooks(|h| {
        h.before(ServiceMethodKind::Create, Arc::new(Mark { log: log.clone(), label: "create" }));
    });
    let notes = app.service("notes").unwrap();

    let err = notes
        .create(CallContext::for_login("alice"), "hi".into(), ())
        .await
        .unwrap_err();
    assert_eq!(DogError::kind_of(&err), Some(ErrorKind::MethodNotAllowed));
    assert!(log.lock().is_empty());
    assert_eq!(sessions.acquired.load(Ordering::SeqCst), 0);

    notes.find(CallContext::for_login("alice"), ()).await.unwrap();
    assert_eq!(*log.lock(), vec!["service"]);
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let (app, _log) = app_with_log();
    let err = app.service("nope").err().unwrap();
    assert_eq!(DogError::kind_of(&err), Some(ErrorKind::NotFound));
    assert_eq!(app.service_names(), vec!["notes".to_string()]);
}
