//! In-process harness for route tests.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::Duration;
use homeman_auth::{TokenService, TokenSettings, hash_password};
use homeman_bootstrap::{
    BackoffPolicy, Dependency, DependencyBootstrapper, MockConnector, RecordingTimer,
};
use homeman_core::Principal;
use homeman_redis::{MemoryTaskQueue, RedisConnector, RedisTaskQueue, TaskQueue};
use homeman_storage::{MemoryStore, NewUser, PostgresConnector, PostgresStore, Store, User};
use serde_json::Value;
use tower::ServiceExt;

use crate::router;
use crate::state::AppState;

pub(crate) struct TestApp {
    pub router: Router,
    pub state: AppState,
    queue: Option<Arc<MemoryTaskQueue>>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_dependencies(vec![MockConnector::new("postgres")]).await
    }

    pub async fn with_dependencies(connectors: Vec<MockConnector>) -> Self {
        let mut bootstrap = DependencyBootstrapper::new(BackoffPolicy::default())
            .with_timer(Arc::new(RecordingTimer::default()));
        for connector in connectors {
            bootstrap = bootstrap.with_dependency(Arc::new(Dependency::new(connector)));
        }
        bootstrap.start().await;

        let queue = Arc::new(MemoryTaskQueue::new());
        Self::assemble(
            bootstrap,
            Arc::new(MemoryStore::new()),
            queue.clone(),
            Some(queue),
        )
    }

    /// Real Postgres and Redis backends whose dependencies never came up:
    /// both point at a closed port and get a single attempt.
    pub async fn degraded() -> Self {
        let db = Arc::new(Dependency::new(
            PostgresConnector::new("postgres://homeman@127.0.0.1:1/homeman", 1),
        ));
        let broker = Arc::new(Dependency::new(RedisConnector::new("redis://127.0.0.1:1/0")));
        let bootstrap = DependencyBootstrapper::new(BackoffPolicy::new().with_max_attempts(1))
            .with_timer(Arc::new(RecordingTimer::default()))
            .with_dependency(db.clone())
            .with_dependency(broker.clone());
        bootstrap.start().await;

        Self::assemble(
            bootstrap,
            Arc::new(PostgresStore::new(db)),
            Arc::new(RedisTaskQueue::new(broker, "celery")),
            None,
        )
    }

    fn assemble(
        bootstrap: DependencyBootstrapper,
        store: Arc<dyn Store>,
        tasks: Arc<dyn TaskQueue>,
        queue: Option<Arc<MemoryTaskQueue>>,
    ) -> Self {
        let settings = TokenSettings::new("api-test-secret", Duration::hours(1)).unwrap();
        let tokens = Arc::new(TokenService::new(settings));
        let state = AppState::new(tokens, store, tasks, Arc::new(bootstrap));

        Self {
            router: router(state.clone(), "/api/v1"),
            state,
            queue,
        }
    }

    /// Task names handed to the in-memory queue, oldest first.
    pub fn queued_tasks(&self) -> Vec<String> {
        self.queue
            .as_ref()
            .map(|q| q.messages().into_iter().map(|m| m.task).collect())
            .unwrap_or_default()
    }

    /// Creates a user directly in the store and returns a token for it.
    pub async fn user(&self, email: &str, privileged: bool) -> (User, String) {
        let user = self
            .state
            .store
            .create_user(NewUser {
                email: email.into(),
                full_name: None,
                is_superuser: privileged,
                hashed_password: "unused".into(),
            })
            .await
            .unwrap();
        let principal = Principal {
            subject_id: user.id,
            is_privileged: privileged,
        };
        let token = self.state.tokens().issue_default(&principal).unwrap();
        (user, token.into_string())
    }

    /// A token for a subject that has no user record.
    pub fn stranger_token(&self) -> String {
        let principal = Principal::new(uuid::Uuid::new_v4());
        self.state
            .tokens()
            .issue_default(&principal)
            .unwrap()
            .into_string()
    }

    pub async fn user_with_password(&self, email: &str, password: &str, privileged: bool) -> User {
        self.state
            .store
            .create_user(NewUser {
                email: email.into(),
                full_name: None,
                is_superuser: privileged,
                hashed_password: hash_password(password).unwrap(),
            })
            .await
            .unwrap()
    }

    pub async fn sensor_type(&self, name: &str, unit: &str) -> i32 {
        self.state
            .store
            .create_sensor_type(name, unit)
            .await
            .unwrap()
            .id
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.finish(builder.body(body).unwrap()).await
    }

    async fn finish(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }

    pub async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/login/access-token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap();
        self.finish(request).await
    }
}
