#![forbid(unsafe_code)]

//! `POST /register`, `POST /token`, `POST /token/refresh`, `POST /logout`.

use poem::Request;
use poem_openapi::{param::Query, payload::Json, ApiResponse, Object, OpenApi};

use crate::api_response;
use crate::auth::service;
use crate::utils::config::ctx;
use crate::utils::reqauth::current_caller;
use crate::utils::reqdebug::{debug_request, RequestDebug};

pub struct AuthApi;

#[derive(Object, Debug)]
pub struct ReqRegister {
    pub username: String,
    pub password: String,
}

impl RequestDebug for ReqRegister {
    type Req = ReqRegister;
    fn get_request_info(&self) -> String {
        format!("  Request body:\n    username: {}\n    password: <redacted>\n", self.username)
    }
}

#[derive(Object, Debug)]
pub struct RespUser {
    pub id: String,
    pub username: String,
}

api_response!(RegisterResponse, 201, RespUser);

#[derive(Object, Debug)]
pub struct ReqToken {
    pub username: String,
    pub password: String,
    pub mfa_code: Option<String>,
}

impl RequestDebug for ReqToken {
    type Req = ReqToken;
    fn get_request_info(&self) -> String {
        format!("  Request body:\n    username: {}\n    password: <redacted>\n    mfa_code: {:?}\n", self.username, self.mfa_code)
    }
}

#[derive(Object, Debug)]
pub struct RespTokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl From<service::TokenPair> for RespTokenPair {
    fn from(p: service::TokenPair) -> Self {
        Self { access_token: p.access_token, refresh_token: p.refresh_token, token_type: "bearer".to_string() }
    }
}

api_response!(TokenResponse, 200, RespTokenPair);

#[derive(ApiResponse)]
pub enum LogoutResponse {
    #[oai(status = 204)]
    NoContent,
    #[oai(status = 401)]
    Unauthenticated(Json<crate::utils::api_error::ErrorBody>),
    #[oai(status = 500)]
    Internal(Json<crate::utils::api_error::ErrorBody>),
}

#[OpenApi]
impl AuthApi {
    #[oai(path = "/register", method = "post")]
    async fn register(&self, http_req: &Request, req: Json<ReqRegister>) -> RegisterResponse {
        debug_request(http_req, &req.0);
        match service::register(&ctx().store, &ctx().parms.config, &req.username, &req.password).await {
            Ok(user) => RegisterResponse::ok(RespUser { id: user.id.to_string(), username: user.username }),
            Err(e) => RegisterResponse::err(e),
        }
    }

    #[oai(path = "/token", method = "post")]
    async fn token(&self, http_req: &Request, req: poem_openapi::payload::Form<ReqToken>) -> TokenResponse {
        debug_request(http_req, &req.0);
        let result =
            service::login(&ctx().store, &ctx().parms.config, &req.username, &req.password, req.mfa_code.as_deref())
                .await;
        match result {
            Ok(pair) => TokenResponse::ok(pair.into()),
            Err(e) => TokenResponse::err(e),
        }
    }

    #[oai(path = "/token/refresh", method = "post")]
    async fn refresh(&self, refresh_token: Query<String>) -> TokenResponse {
        match service::refresh(&ctx().store, &ctx().parms.config, &refresh_token.0).await {
            Ok(pair) => TokenResponse::ok(pair.into()),
            Err(e) => TokenResponse::err(e),
        }
    }

    #[oai(path = "/logout", method = "post")]
    async fn logout(&self, http_req: &Request) -> LogoutResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => {
                return LogoutResponse::Unauthenticated(Json(e.body()));
            }
        };
        match service::logout(&ctx().store, caller.id()).await {
            Ok(()) => LogoutResponse::NoContent,
            Err(e) => LogoutResponse::Internal(Json(e.body())),
        }
    }
}
