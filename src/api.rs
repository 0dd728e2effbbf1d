//! JSON HTTP surface consumed by the dashboard front end.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::backend::ClusterClient;
use crate::error::ApiError;
use crate::manifest::{ConfigMapForm, DeploymentForm, IngressForm, ServiceForm};
use crate::model::{ClusterRecord, ResourceKind};
use crate::registry::ClusterRegistry;

type ApiResult<T = Json<Value>> = Result<T, ApiError>;
type Body = Result<Json<Value>, JsonRejection>;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClusterRegistry>,
}

#[derive(Debug, Default, Deserialize)]
struct NamespaceQuery {
    namespace: Option<String>,
}

impl NamespaceQuery {
    /// Requested namespace; `None` leaves the choice to the cluster's default.
    fn namespace(&self) -> Option<&str> {
        scope(&self.namespace)
    }
}

#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    namespace: Option<String>,
    lines: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageQuery {
    namespace: Option<String>,
    #[serde(default)]
    image: String,
}

pub fn router(state: AppState, static_dir: Option<&std::path::Path>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/clusters", get(list_clusters).post(add_cluster))
        .route(
            "/clusters/:id",
            put(rename_cluster).delete(remove_cluster),
        )
        .route(
            "/clusters/:id/namespaces",
            get(list_namespaces).post(create_namespace),
        )
        .route("/clusters/:id/namespaces/:ns", delete(delete_namespace))
        .route(
            "/clusters/:id/deployments",
            get(list_deployments).post(create_deployment),
        )
        .route("/clusters/:id/deployments/yaml", post(apply_yaml))
        .route("/clusters/:id/yaml", post(apply_yaml))
        .route(
            "/clusters/:id/deployments/:name",
            delete(delete_deployment),
        )
        .route(
            "/clusters/:id/deployments/:name/detail",
            get(deployment_detail),
        )
        .route(
            "/clusters/:id/deployments/:name/update-image",
            post(update_image),
        )
        .route("/clusters/:id/deployments/:name/scale", post(scale))
        .route("/clusters/:id/deployments/:name/restart", post(restart))
        .route("/clusters/:id/pods", get(list_pods))
        .route("/clusters/:id/pods/:name", delete(delete_pod))
        .route("/clusters/:id/pods/:name/logs", get(pod_logs))
        .route(
            "/clusters/:id/services",
            get(list_services).post(create_service),
        )
        .route("/clusters/:id/services/:name", delete(delete_service))
        .route(
            "/clusters/:id/services/:name/detail",
            get(service_detail),
        )
        .route(
            "/clusters/:id/configmaps",
            get(list_configmaps).post(create_configmap),
        )
        .route(
            "/clusters/:id/configmaps/:name",
            delete(delete_configmap),
        )
        .route(
            "/clusters/:id/configmaps/:name/detail",
            get(configmap_detail),
        )
        .route(
            "/clusters/:id/ingresses",
            get(list_ingresses).post(create_ingress),
        )
        .route("/clusters/:id/ingresses/:name", delete(delete_ingress))
        .route(
            "/clusters/:id/ingresses/:name/detail",
            get(ingress_detail),
        )
        .route(
            "/clusters/:id/search-deployments-by-image",
            get(search_by_image),
        )
        .fallback(not_found)
        .with_state(state);

    let router = Router::new().nest("/api", api);
    // Unknown paths outside /api belong to the front end's client-side router.
    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router.fallback(not_found),
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Not found" })),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "clusters": state.registry.len().await }))
}

async fn list_clusters(State(state): State<AppState>) -> Json<Value> {
    Json(Value::Array(state.registry.list().await))
}

async fn add_cluster(State(state): State<AppState>, payload: Body) -> ApiResult {
    let record: ClusterRecord = parse_body(payload)?;
    let cluster_id = state.registry.add(record).await?;
    Ok(Json(json!({ "success": true, "cluster_id": cluster_id })))
}

async fn rename_cluster(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult {
    let body = body_value(payload)?;
    let name = body.get("name").and_then(Value::as_str).unwrap_or("");
    let cluster_id = state.registry.rename(&id, name).await?;
    Ok(Json(json!({ "success": true, "cluster_id": cluster_id })))
}

async fn remove_cluster(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.registry.remove(&id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn list_namespaces(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let rows = client(&state, &id).await?.namespaces().await?;
    Ok(Json(json!(rows)))
}

async fn create_namespace(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Body,
) -> ApiResult {
    let client = client(&state, &id).await?;
    let body = body_value(payload)?;
    let name = required_field(&body, "namespace", "Namespace name is required")?;
    let message = client.create_namespace(&name).await?;
    Ok(message_reply(message))
}

async fn delete_namespace(
    State(state): State<AppState>,
    Path((id, namespace)): Path<(String, String)>,
) -> ApiResult {
    let message = client(&state, &id).await?.delete_namespace(&namespace).await?;
    Ok(message_reply(message))
}

async fn list_rows(
    state: &AppState,
    id: &str,
    kind: ResourceKind,
    query: &NamespaceQuery,
) -> ApiResult {
    let rows = client(state, id)
        .await?
        .list(kind, query.namespace())
        .await?;
    Ok(Json(json!(rows)))
}

async fn detail(
    state: &AppState,
    id: &str,
    kind: ResourceKind,
    name: &str,
    query: &NamespaceQuery,
) -> ApiResult {
    let object = client(state, id)
        .await?
        .detail(kind, name, query.namespace())
        .await?;
    Ok(Json(object))
}

async fn remove(
    state: &AppState,
    id: &str,
    kind: ResourceKind,
    name: &str,
    query: &NamespaceQuery,
) -> ApiResult {
    let result = client(state, id)
        .await?
        .delete(kind, name, query.namespace())
        .await?;
    Ok(Json(json!({ "success": true, "result": result })))
}

async fn apply_manifest(
    state: &AppState,
    id: &str,
    query: &NamespaceQuery,
    manifest: impl FnOnce(&str) -> Result<String, ApiError>,
) -> ApiResult {
    let client = client(state, id).await?;
    let manifest = manifest(query.namespace().unwrap_or(client.default_namespace()))?;
    let message = client.apply(&manifest, query.namespace()).await?;
    Ok(message_reply(message))
}

async fn list_deployments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    list_rows(&state, &id, ResourceKind::Deployments, &query).await
}

async fn list_pods(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    list_rows(&state, &id, ResourceKind::Pods, &query).await
}

async fn list_services(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    list_rows(&state, &id, ResourceKind::Services, &query).await
}

async fn list_configmaps(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    list_rows(&state, &id, ResourceKind::ConfigMaps, &query).await
}

async fn list_ingresses(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    list_rows(&state, &id, ResourceKind::Ingresses, &query).await
}

async fn deployment_detail(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    detail(&state, &id, ResourceKind::Deployments, &name, &query).await
}

async fn service_detail(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    detail(&state, &id, ResourceKind::Services, &name, &query).await
}

async fn configmap_detail(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    detail(&state, &id, ResourceKind::ConfigMaps, &name, &query).await
}

async fn ingress_detail(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    detail(&state, &id, ResourceKind::Ingresses, &name, &query).await
}

async fn delete_deployment(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    remove(&state, &id, ResourceKind::Deployments, &name, &query).await
}

async fn delete_pod(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    remove(&state, &id, ResourceKind::Pods, &name, &query).await
}

async fn delete_service(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    remove(&state, &id, ResourceKind::Services, &name, &query).await
}

async fn delete_configmap(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    remove(&state, &id, ResourceKind::ConfigMaps, &name, &query).await
}

async fn delete_ingress(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    remove(&state, &id, ResourceKind::Ingresses, &name, &query).await
}

async fn create_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let form: DeploymentForm = parse_body(payload)?;
    apply_manifest(&state, &id, &query, |ns| Ok(form.to_manifest(ns)?)).await
}

async fn create_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let form: ServiceForm = parse_body(payload)?;
    apply_manifest(&state, &id, &query, |ns| Ok(form.to_manifest(ns)?)).await
}

async fn create_configmap(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let form: ConfigMapForm = parse_body(payload)?;
    apply_manifest(&state, &id, &query, |ns| Ok(form.to_manifest(ns)?)).await
}

async fn create_ingress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let form: IngressForm = parse_body(payload)?;
    apply_manifest(&state, &id, &query, |ns| Ok(form.to_manifest(ns)?)).await
}

async fn apply_yaml(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let body = body_value(payload)?;
    let manifest = required_field(&body, "yaml", "YAML content is required")?;
    apply_manifest(&state, &id, &query, |_| Ok(manifest)).await
}

async fn update_image(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let client = client(&state, &id).await?;
    let body = body_value(payload)?;
    let image = required_field(&body, "image", "Image is required")?;
    let message = client
        .update_image(&name, &image, query.namespace())
        .await?;
    Ok(message_reply(message))
}

async fn scale(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
    payload: Body,
) -> ApiResult {
    let client = client(&state, &id).await?;
    let body = body_value(payload)?;
    let replicas = match body.get("replicas") {
        None | Some(Value::Null) => {
            return Err(ApiError::BadRequest("Replicas is required".to_string()));
        }
        Some(value) => replica_count(value)?,
    };
    let message = client
        .scale(&name, replicas, query.namespace())
        .await?;
    Ok(message_reply(message))
}

async fn restart(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    let message = client(&state, &id)
        .await?
        .restart(&name, query.namespace())
        .await?;
    Ok(message_reply(message))
}

async fn pod_logs(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<LogsQuery>,
) -> ApiResult {
    let client = client(&state, &id).await?;
    let lines = match query.lines.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            ApiError::BadRequest("lines must be an integer".to_string())
        })?),
    };
    let logs = client.logs(&name, scope(&query.namespace), lines).await?;
    Ok(Json(json!({ "success": true, "logs": logs })))
}

async fn search_by_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ImageQuery>,
) -> ApiResult {
    let client = client(&state, &id).await?;
    let deployments = client
        .search_by_image(&query.image, scope(&query.namespace))
        .await?;
    Ok(Json(json!({ "success": true, "deployments": deployments })))
}

async fn client(state: &AppState, id: &str) -> Result<ClusterClient, ApiError> {
    state.registry.client(id).await
}

fn scope(namespace: &Option<String>) -> Option<&str> {
    namespace
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn message_reply(message: String) -> Json<Value> {
    Json(json!({ "success": true, "message": message }))
}

fn body_value(payload: Body) -> Result<Value, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn parse_body<T: DeserializeOwned>(payload: Body) -> Result<T, ApiError> {
    serde_json::from_value(body_value(payload)?)
        .map_err(|error| ApiError::BadRequest(format!("invalid request body: {error}")))
}

fn required_field(body: &Value, field: &str, message: &str) -> Result<String, ApiError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

/// Accepts a JSON integer or a string holding one.
fn replica_count(value: &Value) -> Result<i64, ApiError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::BadRequest("Replicas must be an integer".to_string()))
}

#[cfg(test)]
mod tests {
    use super::{AppState, router};
    use crate::backend::CallPolicy;
    use crate::config::ClusterStore;
    use crate::crypto::{CryptoManager, generate_key};
    use crate::registry::ClusterRegistry;
    use crate::registry::testing::{FakeFactory, kube_record};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        factory: Arc<FakeFactory>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".clusters.yaml");
        std::fs::write(
            &path,
            "clusters:\n  broken:\n    name: broken\n    k8s_controller: KUBE\n",
        )
        .unwrap();

        let factory = Arc::new(FakeFactory::default());
        let store = ClusterStore::new(&path, Arc::new(CryptoManager::from_key(generate_key())));
        let registry = Arc::new(ClusterRegistry::new(
            store,
            factory.clone(),
            CallPolicy::default(),
        ));
        registry.bootstrap().await;
        registry.add(kube_record("prod")).await.unwrap();

        Harness {
            app: router(AppState { registry }, None),
            factory,
            _dir: dir,
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_counts_registered_clusters() {
        let harness = harness().await;
        let (status, body) = call(&harness.app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "clusters": 2}));
    }

    #[tokio::test]
    async fn unknown_and_uninitialized_clusters_are_distinguished() {
        let harness = harness().await;

        let (status, body) = call(&harness.app, "GET", "/api/clusters/ghost/pods", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "error": "Cluster not found"}));

        let (status, body) = call(&harness.app, "GET", "/api/clusters/broken/pods", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Cluster client not initialized");
    }

    #[tokio::test]
    async fn cluster_listing_reports_status() {
        let harness = harness().await;
        let (status, body) = call(&harness.app, "GET", "/api/clusters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "broken");
        assert_eq!(body[0]["status"], "uninitialized");
        assert_eq!(body[1]["status"], "ready");
    }

    #[tokio::test]
    async fn cluster_lifecycle_over_http() {
        let harness = harness().await;

        let (status, _) = call(&harness.app, "POST", "/api/clusters", Some(json!({"namespace": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &harness.app,
            "POST",
            "/api/clusters",
            Some(json!({"name": "stage", "k8s_controller": "KUBE"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "cluster_id": "stage"}));

        let (status, body) = call(
            &harness.app,
            "PUT",
            "/api/clusters/stage",
            Some(json!({"name": "staging"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cluster_id"], "staging");

        let (status, _) = call(&harness.app, "DELETE", "/api/clusters/staging", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&harness.app, "DELETE", "/api/clusters/staging", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn namespaces_round_trip() {
        let harness = harness().await;

        let (status, body) = call(&harness.app, "GET", "/api/clusters/prod/namespaces", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["NAME"], "default");
        assert_eq!(body[0]["SELECT"], true);

        let (status, _) = call(&harness.app, "POST", "/api/clusters/prod/namespaces", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/namespaces",
            Some(json!({"namespace": "default"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(
            &harness.app,
            "DELETE",
            "/api/clusters/prod/namespaces/kube-system",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "namespace kube-system deleted");
    }

    #[tokio::test]
    async fn scale_validates_replicas() {
        let harness = harness().await;
        let uri = "/api/clusters/prod/deployments/web/scale";

        for bad in [json!({}), json!({"replicas": "many"}), json!({"replicas": -2})] {
            let (status, body) = call(&harness.app, "POST", uri, Some(bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
        }

        let (status, body) = call(&harness.app, "POST", uri, Some(json!({"replicas": "4"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "deployment web scaled to 4");
        let backend = harness.factory.backend("prod");
        assert_eq!(backend.deployments.lock().unwrap()["default"]["web"].1, 4);
    }

    #[tokio::test]
    async fn deployment_detail_and_missing_objects() {
        let harness = harness().await;

        let (status, body) = call(
            &harness.app,
            "GET",
            "/api/clusters/prod/deployments/web/detail",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "Deployment");

        let (status, _) = call(
            &harness.app,
            "GET",
            "/api/clusters/prod/deployments/ghost/detail?namespace=default",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forms_and_yaml_are_applied_in_requested_namespace() {
        let harness = harness().await;

        let (status, _) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/configmaps?namespace=apps",
            Some(json!({"name": "settings", "data": {"mode": "fast"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/deployments/yaml",
            Some(json!({"yaml": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "YAML content is required");

        let (status, _) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/yaml",
            Some(json!({"yaml": "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: extra\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let applied = harness.factory.backend("prod").applied.lock().unwrap().clone();
        assert_eq!(applied.len(), 2);
        assert!(applied[0].starts_with("apps:"));
        assert!(applied[0].contains("kind: ConfigMap"));
        assert!(applied[1].starts_with("default:"));
    }

    #[tokio::test]
    async fn invalid_forms_are_rejected() {
        let harness = harness().await;
        let (status, _) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/services",
            Some(json!({"name": "api"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/deployments",
            Some(json!({"image": "nginx"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logs_require_numeric_lines() {
        let harness = harness().await;

        let (status, _) = call(&harness.app, "GET", "/api/clusters/prod/pods/api-0/logs?lines=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&harness.app, "GET", "/api/clusters/prod/pods/api-0/logs?lines=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "logs": "api-0 line 5"}));
    }

    #[tokio::test]
    async fn image_search_and_updates() {
        let harness = harness().await;

        let (status, _) = call(
            &harness.app,
            "GET",
            "/api/clusters/prod/search-deployments-by-image?image=",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &harness.app,
            "GET",
            "/api/clusters/prod/search-deployments-by-image?image=busybox:latest",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deployments"][0]["name"], "worker");

        let (status, _) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/deployments/web/update-image",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &harness.app,
            "POST",
            "/api/clusters/prod/deployments/web/update-image",
            Some(json!({"image": "nginx:1.27"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "deployment web image updated to nginx:1.27");
    }

    #[tokio::test]
    async fn deletes_report_result() {
        let harness = harness().await;
        let (status, body) = call(&harness.app, "DELETE", "/api/clusters/prod/pods/api-0?namespace=jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "result": "pod jobs/api-0 deleted"}));
        assert_eq!(
            harness.factory.backend("prod").deleted.lock().unwrap()[0],
            "pods/jobs/api-0"
        );
    }

    #[tokio::test]
    async fn unknown_paths_fall_back_to_json_404() {
        let harness = harness().await;
        let (status, body) = call(&harness.app, "GET", "/api/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn front_end_routes_serve_the_index_page() {
        let dir = tempfile::tempdir().unwrap();
        let static_dir = dir.path().join("dist");
        std::fs::create_dir(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<html>kubedeck</html>").unwrap();
        std::fs::write(static_dir.join("app.js"), "console.log('up')").unwrap();

        let store = ClusterStore::new(
            dir.path().join(".clusters.yaml"),
            Arc::new(CryptoManager::from_key(generate_key())),
        );
        let registry = Arc::new(ClusterRegistry::new(
            store,
            Arc::new(FakeFactory::default()),
            CallPolicy::default(),
        ));
        let app = router(AppState { registry }, Some(&static_dir));

        for (uri, expected) in [
            ("/clusters/prod/pods", "<html>kubedeck</html>"),
            ("/", "<html>kubedeck</html>"),
            ("/app.js", "console.log('up')"),
        ] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert_eq!(&bytes[..], expected.as_bytes(), "{uri}");
        }

        let (status, body) = call(&app, "GET", "/api/clusters/prod/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");

        let (status, body) = call(&app, "GET", "/api/clusters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
