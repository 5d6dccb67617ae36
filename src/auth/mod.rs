mod login;
mod logout;
mod password;
mod signup;

use axum::{Router, routing::post};

use crate::AppState;

pub use password::{hash_password, verify_password};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup))
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
}
