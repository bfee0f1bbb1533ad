#![forbid(unsafe_code)]

//! `GET /ws?token=<access_token>` (§4.5). A plain `poem` handler rather
//! than a `poem_openapi` operation -- the OpenAPI layer has no first-class
//! websocket-upgrade shape, the same reason the teacher's swagger UI and
//! spec endpoints are mounted directly on the `Route` instead of through
//! an `#[OpenApi]` impl.

use futures::{SinkExt, StreamExt};
use poem::web::websocket::{Message, WebSocket};
use poem::web::{Data, Query};
use poem::{handler, IntoResponse, Response};
use serde::Deserialize;

use crate::auth::service::authenticate;
use crate::events::Topic;
use crate::utils::config::RuntimeCtx;

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

#[handler]
pub async fn ws_handler(ws: WebSocket, Query(q): Query<WsQuery>, Data(rt): Data<&'static RuntimeCtx>) -> Response {
    let user = match authenticate(&rt.store, &rt.parms.config, &q.token).await {
        Ok(u) => u,
        Err(e) => {
            return poem::http::StatusCode::UNAUTHORIZED.with_body(e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        let subscriber = rt.bus.subscribe(vec![Topic::User(user.id), Topic::Broadcast]);
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                event = subscriber.recv() => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&text) {
                                if v.get("op").and_then(|o| o.as_str()) == Some("ping") {
                                    let _ = sink.send(Message::Text(r#"{"op":"pong"}"#.to_string())).await;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        _ => {}
                    }
                }
            }
        }
        rt.bus.unsubscribe(subscriber.id);
    })
    .into_response()
}
