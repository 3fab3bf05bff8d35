use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Patterns the demo report groups by.
pub const AGGREGATES: [&str; 2] = [r"/users/\d+", r"/products/\d+"];

/// Users with an id above this do not exist.
const KNOWN_USERS: u32 = 900;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "viewer".into()
}

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: u32,
    pub title: String,
    /// Price in cents (e.g. 12999 = $129.99)
    pub price: u64,
}

// ─── Router ──────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(|| async { "accessprof demo\n" }))
        .route("/users/:id", get(get_user))
        .route("/users", post(create_user))
        .route("/products/:id", get(get_product))
}

// ─── GET /users/:id ──────────────────────────────────────────────

async fn get_user(Path(id): Path<u32>) -> Result<Json<User>, StatusCode> {
    if id == 0 || id > KNOWN_USERS {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(User {
        id,
        name: format!("user {id}"),
        role: "viewer".into(),
    }))
}

// ─── POST /users ─────────────────────────────────────────────────

async fn create_user(Json(req): Json<CreateUserRequest>) -> (StatusCode, Json<User>) {
    let user = User {
        id: KNOWN_USERS + 1,
        name: req.name,
        role: req.role,
    };
    (StatusCode::CREATED, Json(user))
}

// ─── GET /products/:id ───────────────────────────────────────────

async fn get_product(Path(id): Path<u32>) -> Json<Product> {
    Json(Product {
        id,
        title: format!("product {id}"),
        price: 100 * u64::from(id % 500),
    })
}
