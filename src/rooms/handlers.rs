use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::db::ChatRoom;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub ok: bool,
    pub room: ChatRoom,
}

/// History for a room; unknown rooms come back empty rather than 404.
pub async fn get_room_history(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let room = state.rooms.get_or_create(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(RoomResponse { ok: true, room }))
}
