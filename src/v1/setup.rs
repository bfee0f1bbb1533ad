#![forbid(unsafe_code)]

//! `GET /setup/status`, `POST /setup/initialize` (§4.1 setup gate).

use poem::Request;
use poem_openapi::{payload::Json, ApiResponse, Object, OpenApi};

use crate::api_response;
use crate::auth::setup::{self, InitializeRequest};
use crate::utils::config::ctx;
use crate::utils::reqdebug::{debug_request, RequestDebug};

pub struct SetupApi;

#[derive(Object, Debug)]
pub struct RespSetupStatus {
    pub setup_complete: bool,
    pub setup_reopened: bool,
    pub user_count: i64,
}

#[derive(ApiResponse)]
pub enum StatusResponse {
    #[oai(status = 200)]
    Ok(Json<RespSetupStatus>),
    #[oai(status = 500)]
    Internal(Json<crate::utils::api_error::ErrorBody>),
}

#[derive(Object, Debug)]
pub struct ReqInitialize {
    pub username: String,
    pub password: String,
}

impl RequestDebug for ReqInitialize {
    type Req = ReqInitialize;
    fn get_request_info(&self) -> String {
        format!("  Request body:\n    username: {}\n    password: <redacted>\n", self.username)
    }
}

#[derive(Object, Debug)]
pub struct RespUser {
    pub id: String,
    pub username: String,
}

api_response!(InitializeResponse, 201, RespUser);

#[OpenApi]
impl SetupApi {
    #[oai(path = "/setup/status", method = "get")]
    async fn status(&self) -> StatusResponse {
        match setup::get_status(&ctx().store).await {
            Ok(s) => StatusResponse::Ok(Json(RespSetupStatus {
                setup_complete: s.setup_complete,
                setup_reopened: s.setup_reopened,
                user_count: s.user_count,
            })),
            Err(e) => {
                log::error!("setup status lookup failed: {e:#}");
                StatusResponse::Internal(Json(crate::utils::api_error::ErrorBody {
                    detail: "internal".into(),
                    correlation_id: None,
                    overlapping_ids: None,
                }))
            }
        }
    }

    #[oai(path = "/setup/initialize", method = "post")]
    async fn initialize(
        &self,
        http_req: &Request,
        #[oai(name = "X-Setup-Token")] unlock_token: poem_openapi::param::Header<Option<String>>,
        req: Json<ReqInitialize>,
    ) -> InitializeResponse {
        debug_request(http_req, &req.0);
        let result = setup::initialize(
            &ctx().store,
            &ctx().parms.config,
            InitializeRequest {
                username: &req.username,
                password: &req.password,
                unlock_token: unlock_token.0.as_deref(),
            },
        )
        .await;
        match result {
            Ok(user) => InitializeResponse::ok(RespUser { id: user.id.to_string(), username: user.username }),
            Err(e) => InitializeResponse::err(e),
        }
    }
}
