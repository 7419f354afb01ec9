// src/middleware/actor.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::common::error::AppError;

// La autenticación es responsabilidad del gateway que tenemos delante;
// acá solo tomamos la identidad que él inyecta en X-User-Id. Sin esa
// cabecera (o con un UUID inválido), la petición es un 400.
pub struct Actor(pub Uuid);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("X-User-Id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(Actor)
            .ok_or(AppError::MissingActor)
    }
}
