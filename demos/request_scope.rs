use ferrous_uow::{
    key_of_type, with_unit_of_work, BoxError, Close, Lifecycle, Provider, Scope, ScopeConfig,
    ScopeError, StrategyKind, ThreadLocalUnitOfWorkScope, UnitOfWorkScope,
};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ===== Domain Types =====

#[derive(Debug)]
struct RequestContext {
    request_id: u64,
    worker: String,
}

#[derive(Debug)]
struct DbSession {
    request_id: u64,
    statements: AtomicU64,
}

impl DbSession {
    fn execute(&self, sql: &str) {
        self.statements.fetch_add(1, Ordering::SeqCst);
        info!(request_id = self.request_id, sql, "Executing");
    }
}

impl Close for DbSession {
    fn close(&self) -> io::Result<()> {
        info!(
            request_id = self.request_id,
            statements = self.statements.load(Ordering::SeqCst),
            "Closing session"
        );
        Ok(())
    }
}

// ===== Wiring =====

struct App {
    scope: ThreadLocalUnitOfWorkScope,
    contexts: Arc<dyn Provider<RequestContext>>,
    sessions: Arc<dyn Provider<DbSession>>,
}

fn build_app() -> Result<App, ScopeError> {
    // FERROUS_UOW_STRATEGIES=closeable,pre-destroy overrides this
    let config = match ScopeConfig::from_env() {
        Ok(config) if !config.strategies.is_empty() => config,
        Ok(config) => config.with_strategy(StrategyKind::Closeable),
        Err(err) => return Err(err),
    };
    let scope = config.build_thread_local();

    let next_id = Arc::new(AtomicU64::new(1));
    let contexts = scope.scope(
        key_of_type::<RequestContext>(),
        move || {
            Ok::<_, ScopeError>(Arc::new(RequestContext {
                request_id: next_id.fetch_add(1, Ordering::SeqCst),
                worker: thread::current().name().unwrap_or("main").to_string(),
            }))
        },
        Lifecycle::none(),
    );

    let ctx = contexts.clone();
    let sessions = scope.scope(
        key_of_type::<DbSession>(),
        move || {
            let context = ctx.get()?;
            Ok::<_, ScopeError>(Arc::new(DbSession {
                request_id: context.request_id,
                statements: AtomicU64::new(0),
            }))
        },
        Lifecycle::<DbSession>::builder()
            .closeable()
            .pre_destroy(|session: &DbSession| {
                info!(request_id = session.request_id, "Committing");
                Ok::<(), BoxError>(())
            })
            .build(),
    );

    Ok(App {
        scope,
        contexts,
        sessions,
    })
}

fn handle(app: &App, path: &str) -> Result<String, ScopeError> {
    with_unit_of_work(&app.scope, || {
        let context = app.contexts.get()?;
        let session = app.sessions.get()?;
        session.execute(&format!("SELECT * FROM pages WHERE path = '{}'", path));
        // Same session for the whole request
        app.sessions.get()?.execute("UPDATE stats SET hits = hits + 1");

        Ok(format!(
            "{} handled request {} for {}",
            context.worker, context.request_id, path
        ))
    })
}

fn main() -> Result<(), ScopeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Arc::new(build_app()?);
    let paths = ["/", "/about", "/users", "/users/1"];

    let workers: Vec<_> = paths
        .iter()
        .enumerate()
        .map(|(i, &path)| {
            let app = app.clone();
            thread::Builder::new()
                .name(format!("worker-{}", i))
                .spawn(move || handle(&app, path))
                .map_err(|e| ScopeError::provision("worker thread", e))
        })
        .collect::<Result<_, _>>()?;

    for worker in workers {
        match worker.join() {
            Ok(Ok(response)) => println!("{}", response),
            Ok(Err(err)) => eprintln!("request failed: {}", err),
            Err(_) => eprintln!("worker panicked"),
        }
    }

    assert!(!app.scope.is_active());
    Ok(())
}
