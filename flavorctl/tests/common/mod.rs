//! Shared test utilities: an in-process mock of the identity and compute
//! services, served over HTTP on a local port.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use flavorctl::params::Credentials;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "secret";
pub const TOKEN: &str = "token-0123456789";
pub const REGION: &str = "RegionOne";

/// Flavor as stored by the mock compute service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFlavor {
    pub id: String,
    pub name: String,
    pub ram: u64,
    pub vcpus: u64,
    pub disk: u64,
    pub ephemeral: u64,
    pub swap: u64,
    pub is_public: bool,
    pub extra_specs: BTreeMap<String, String>,
}

impl MockFlavor {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ram: 2048,
            vcpus: 2,
            disk: 20,
            ephemeral: 0,
            swap: 0,
            is_public: true,
            extra_specs: BTreeMap::new(),
        }
    }

    fn to_json(&self) -> Value {
        // Swap of zero is reported as an empty string, like the real service.
        let swap = if self.swap == 0 {
            json!("")
        } else {
            json!(self.swap)
        };
        json!({
            "id": self.id,
            "name": self.name,
            "ram": self.ram,
            "vcpus": self.vcpus,
            "disk": self.disk,
            "OS-FLV-EXT-DATA:ephemeral": self.ephemeral,
            "swap": swap,
            "os-flavor-access:is_public": self.is_public,
            "rxtx_factor": 1.0,
            "links": []
        })
    }
}

#[derive(Default)]
struct Cloud {
    flavors: Vec<MockFlavor>,
    fail_delete: HashSet<String>,
    mutations: Vec<String>,
}

struct Shared {
    compute_url: String,
    cloud: Mutex<Cloud>,
}

type AppState = Arc<Shared>;

/// Mock OpenStack cloud.
pub struct MockOpenStack {
    pub addr: SocketAddr,
    shared: AppState,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl MockOpenStack {
    /// Spawn the mock on an OS-assigned port.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            compute_url: format!("http://{}/compute/v2.1", addr),
            cloud: Mutex::new(Cloud::default()),
        });

        let router = Router::new()
            .route("/identity/v2.0/tokens", post(v2_tokens))
            .route("/identity/v3/auth/tokens", post(v3_tokens))
            .route("/compute/v2.1/flavors", post(create_flavor))
            .route("/compute/v2.1/flavors/detail", get(list_flavors))
            .route("/compute/v2.1/flavors/{id}", delete(delete_flavor))
            .route(
                "/compute/v2.1/flavors/{id}/os-extra_specs",
                get(get_extra_specs).post(set_extra_specs),
            )
            .route(
                "/compute/v2.1/flavors/{id}/os-extra_specs/{key}",
                delete(unset_extra_spec),
            )
            .with_state(shared.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            shared,
            shutdown_tx,
        }
    }

    pub fn auth_url_v2(&self) -> String {
        format!("http://{}/identity/v2.0/", self.addr)
    }

    pub fn auth_url_v3(&self) -> String {
        format!("http://{}/identity/v3", self.addr)
    }

    pub fn compute_url(&self) -> String {
        self.shared.compute_url.clone()
    }

    pub fn credentials(&self, auth_url: String) -> Credentials {
        Credentials {
            username: "admin".to_string(),
            password: PASSWORD.to_string(),
            tenant_name: "admin".to_string(),
            auth_url,
            region_name: None,
        }
    }

    pub fn insert(&self, flavor: MockFlavor) {
        self.shared.cloud.lock().unwrap().flavors.push(flavor);
    }

    pub fn fail_delete(&self, id: &str) {
        self.shared
            .cloud
            .lock()
            .unwrap()
            .fail_delete
            .insert(id.to_string());
    }

    pub fn flavors(&self) -> Vec<MockFlavor> {
        self.shared.cloud.lock().unwrap().flavors.clone()
    }

    /// Mutating requests received so far, as "METHOD path".
    pub fn mutations(&self) -> Vec<String> {
        self.shared.cloud.lock().unwrap().mutations.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn fault(status: StatusCode, kind: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ kind: { "code": status.as_u16(), "message": message } })),
    )
        .into_response()
}

fn unauthorized() -> Response {
    fault(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "The request you have made requires authentication.",
    )
}

fn not_found(id: &str) -> Response {
    fault(
        StatusCode::NOT_FOUND,
        "itemNotFound",
        &format!("Flavor {} could not be found.", id),
    )
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == TOKEN)
}

async fn v2_tokens(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let creds = &body["auth"]["passwordCredentials"];
    if creds["password"] != PASSWORD || body["auth"]["tenantName"].as_str().is_none() {
        return unauthorized();
    }

    Json(json!({
        "access": {
            "token": { "id": TOKEN, "expires": "2099-01-01T00:00:00Z" },
            "serviceCatalog": [
                {
                    "type": "identity",
                    "name": "keystone",
                    "endpoints": [{ "region": REGION, "publicURL": "http://unused/identity/v2.0" }]
                },
                {
                    "type": "compute",
                    "name": "nova",
                    "endpoints": [{ "region": REGION, "publicURL": state.compute_url }]
                }
            ]
        }
    }))
    .into_response()
}

async fn v3_tokens(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let user = &body["auth"]["identity"]["password"]["user"];
    if user["password"] != PASSWORD {
        return unauthorized();
    }

    let body = Json(json!({
        "token": {
            "catalog": [
                {
                    "type": "compute",
                    "name": "nova",
                    "endpoints": [
                        { "interface": "internal", "region_id": REGION, "region": REGION, "url": "http://internal-only" },
                        { "interface": "public", "region_id": REGION, "region": REGION, "url": state.compute_url }
                    ]
                }
            ]
        }
    }));
    (StatusCode::CREATED, [("X-Subject-Token", TOKEN)], body).into_response()
}

async fn list_flavors(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let cloud = state.cloud.lock().unwrap();
    let flavors: Vec<Value> = cloud.flavors.iter().map(MockFlavor::to_json).collect();
    Json(json!({ "flavors": flavors })).into_response()
}

async fn create_flavor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let f = &body["flavor"];
    let mut cloud = state.cloud.lock().unwrap();
    cloud.mutations.push("POST /flavors".to_string());

    let name = f["name"].as_str().unwrap_or_default().to_string();
    let id = f["id"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if cloud.flavors.iter().any(|existing| existing.id == id) {
        return fault(
            StatusCode::CONFLICT,
            "conflictingRequest",
            &format!("Flavor with ID {} already exists.", id),
        );
    }
    if cloud.flavors.iter().any(|existing| existing.name == name) {
        return fault(
            StatusCode::CONFLICT,
            "conflictingRequest",
            &format!("Flavor with name {} already exists.", name),
        );
    }

    let flavor = MockFlavor {
        id,
        name,
        ram: f["ram"].as_u64().unwrap_or_default(),
        vcpus: f["vcpus"].as_u64().unwrap_or_default(),
        disk: f["disk"].as_u64().unwrap_or_default(),
        ephemeral: f["OS-FLV-EXT-DATA:ephemeral"].as_u64().unwrap_or_default(),
        swap: f["swap"].as_u64().unwrap_or_default(),
        is_public: f["os-flavor-access:is_public"].as_bool().unwrap_or(true),
        extra_specs: BTreeMap::new(),
    };
    let response = Json(json!({ "flavor": flavor.to_json() }));
    cloud.flavors.push(flavor);
    response.into_response()
}

async fn delete_flavor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut cloud = state.cloud.lock().unwrap();
    cloud.mutations.push(format!("DELETE /flavors/{}", id));

    if cloud.fail_delete.contains(&id) {
        return fault(
            StatusCode::INTERNAL_SERVER_ERROR,
            "computeFault",
            "Unexpected API Error.",
        );
    }
    let before = cloud.flavors.len();
    cloud.flavors.retain(|f| f.id != id);
    if cloud.flavors.len() == before {
        return not_found(&id);
    }
    StatusCode::ACCEPTED.into_response()
}

async fn get_extra_specs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let cloud = state.cloud.lock().unwrap();
    match cloud.flavors.iter().find(|f| f.id == id) {
        Some(flavor) => Json(json!({ "extra_specs": flavor.extra_specs })).into_response(),
        None => not_found(&id),
    }
}

async fn set_extra_specs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut cloud = state.cloud.lock().unwrap();
    cloud
        .mutations
        .push(format!("POST /flavors/{}/os-extra_specs", id));

    let Some(flavor) = cloud.flavors.iter_mut().find(|f| f.id == id) else {
        return not_found(&id);
    };
    let Some(specs) = body["extra_specs"].as_object() else {
        return fault(StatusCode::BAD_REQUEST, "badRequest", "extra_specs required");
    };
    for (key, value) in specs {
        flavor.extra_specs.insert(
            key.clone(),
            value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
        );
    }
    Json(json!({ "extra_specs": flavor.extra_specs })).into_response()
}

async fn unset_extra_spec(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, key)): Path<(String, String)>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut cloud = state.cloud.lock().unwrap();
    cloud
        .mutations
        .push(format!("DELETE /flavors/{}/os-extra_specs/{}", id, key));

    let Some(flavor) = cloud.flavors.iter_mut().find(|f| f.id == id) else {
        return not_found(&id);
    };
    if flavor.extra_specs.remove(&key).is_none() {
        return fault(
            StatusCode::NOT_FOUND,
            "itemNotFound",
            &format!("Flavor {} has no extra specs with key {}.", id, key),
        );
    }
    StatusCode::OK.into_response()
}
