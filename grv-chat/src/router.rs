use actix_web::web;

/// 路由配置包装 / Route configuration wrapper
pub fn configure(cfg: &mut web::ServiceConfig) {
    crate::api::v1::chat::status::register(cfg, crate::api::v1::chat::status::ROUTE_PATH);
    crate::api::v1::message::history::register(cfg, crate::api::v1::message::history::ROUTE_PATH);
    crate::api::v1::health::basic::register(cfg, crate::api::v1::health::basic::ROUTE_PATH);
}
