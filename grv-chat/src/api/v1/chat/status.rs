use actix_web::http::StatusCode;
use actix_web::{web, Responder};
use grv::response::respond_api;

use crate::server::ChatServer;

pub const ROUTE_PATH: &str = "/chat/status";

// 路由注册入口（GET）/ Route registration (GET)
pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::get().to(chat_status_handle)));
}

// 在线用户列表 / Currently connected users
pub async fn chat_status_handle(server: web::Data<ChatServer>) -> impl Responder {
    respond_api(StatusCode::OK, "online status", Some(server.online_snapshot()))
}
