use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use grv::response::{respond_api, respond_error};

use crate::api::{error_status, AUTH_USER_HEADER};
use crate::server::ChatServer;
use crate::service::history::HistoryQuery;

pub const ROUTE_PATH: &str = "/messages";

/// 原始查询参数（数值字段手动解析以返回明确错误）
/// Raw query parameters; numeric fields are parsed by hand for precise errors
#[derive(serde::Deserialize, Debug, Default)]
pub struct MessagesParams {
    pub user_id: Option<String>,
    pub peer_id: Option<String>,
    pub limit: Option<String>,
    pub before: Option<String>,
}

fn parse_number(raw: &Option<String>) -> Result<Option<i64>, ()> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<i64>().map(Some).map_err(|_| ()),
    }
}

// 路由注册入口（GET）/ Route registration (GET)
pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::get().to(history_handle)));
}

// 会话历史查询 / Conversation history between the caller and a peer
pub async fn history_handle(
    req: HttpRequest,
    server: web::Data<ChatServer>,
    params: web::Query<MessagesParams>,
) -> impl Responder {
    if server.store.is_none() {
        return respond_error(StatusCode::SERVICE_UNAVAILABLE, "message history not available");
    }

    let user_id = params.user_id.clone().unwrap_or_default();
    if uuid::Uuid::parse_str(&user_id).is_err() {
        return respond_error(StatusCode::BAD_REQUEST, "invalid user_id, must be UUID");
    }
    // 上游鉴权层注入的身份优先 / identity injected by the upstream auth layer wins
    let authenticated = req
        .headers()
        .get(AUTH_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| user_id.clone());
    if authenticated != user_id {
        return respond_error(StatusCode::FORBIDDEN, "forbidden: can only fetch your own messages");
    }

    let peer_id = params.peer_id.clone().unwrap_or_default();
    if peer_id.is_empty() {
        return respond_error(StatusCode::BAD_REQUEST, "peer_id is required");
    }
    let Ok(limit) = parse_number(&params.limit) else {
        return respond_error(StatusCode::BAD_REQUEST, "invalid limit parameter");
    };
    let Ok(before) = parse_number(&params.before) else {
        return respond_error(StatusCode::BAD_REQUEST, "invalid before parameter");
    };

    let query = HistoryQuery {
        user_id,
        peer_id,
        limit,
        before,
    };
    match server.get_history(&authenticated, &query).await {
        Ok(messages) => respond_api(
            StatusCode::OK,
            "messages",
            Some(serde_json::json!({ "count": messages.len(), "messages": messages })),
        ),
        Err(e) => failure(&e),
    }
}

fn failure(err: &crate::error::ChatError) -> HttpResponse {
    let code = error_status(err);
    let message = if code == StatusCode::INTERNAL_SERVER_ERROR {
        "failed to fetch messages".to_string()
    } else {
        err.to_string()
    };
    respond_error(code, &message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;
    use crate::storage::{MemoryMessageStore, MessageStore};
    use actix_web::{test, App};
    use std::sync::Arc;

    const ALICE: &str = "0b9c2f34-5c1d-4f0a-8d54-2a7f0c6f3e11";
    const BOB: &str = "7e4a1d22-9b3f-4c6e-a1d0-5f2e8b7c9a33";

    async fn server_with_history() -> ChatServer {
        let store = Arc::new(MemoryMessageStore::new());
        store.save_message(ALICE, BOB, "hi", MessageKind::Text, 100).await.unwrap();
        store.save_message(BOB, ALICE, "hey", MessageKind::Text, 200).await.unwrap();
        ChatServer::default().with_store(store)
    }

    macro_rules! app {
        ($server:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($server))
                    .configure(|cfg| register(cfg, ROUTE_PATH)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_history_ok() {
        let app = app!(server_with_history().await);
        let uri = format!("{}?user_id={}&peer_id={}&limit=10&before=1000", ROUTE_PATH, ALICE, BOB);
        let req = test::TestRequest::get().uri(&uri).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["count"], 2);
        assert_eq!(body["data"]["messages"][0]["content"], "hi");
        assert_eq!(body["data"]["messages"][1]["sender_id"], BOB);
    }

    #[actix_web::test]
    async fn test_history_rejections() {
        let app = app!(server_with_history().await);
        let cases = vec![
            (format!("{}?user_id=nope&peer_id={}", ROUTE_PATH, BOB), StatusCode::BAD_REQUEST),
            (format!("{}?user_id={}", ROUTE_PATH, ALICE), StatusCode::BAD_REQUEST),
            (
                format!("{}?user_id={}&peer_id={}&limit=ten", ROUTE_PATH, ALICE, BOB),
                StatusCode::BAD_REQUEST,
            ),
            (
                format!("{}?user_id={}&peer_id={}&before=yesterday", ROUTE_PATH, ALICE, BOB),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (uri, expected) in cases {
            let req = test::TestRequest::get().uri(&uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_history_forged_identity_is_forbidden() {
        let app = app!(server_with_history().await);
        let uri = format!("{}?user_id={}&peer_id={}", ROUTE_PATH, ALICE, BOB);
        let req = test::TestRequest::get()
            .uri(&uri)
            .insert_header((AUTH_USER_HEADER, BOB))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_history_without_store_is_unavailable() {
        let app = app!(ChatServer::default());
        let uri = format!("{}?user_id={}&peer_id={}", ROUTE_PATH, ALICE, BOB);
        let req = test::TestRequest::get().uri(&uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_parse_number() {
        assert_eq!(parse_number(&None), Ok(None));
        assert_eq!(parse_number(&Some(" 42 ".into())), Ok(Some(42)));
        assert!(parse_number(&Some("4x".into())).is_err());
    }
}
