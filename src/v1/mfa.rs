#![forbid(unsafe_code)]

//! `POST /auth/mfa/setup|verify|disable|backup-codes`.

use poem::Request;
use poem_openapi::{payload::Json, Object, OpenApi};

use crate::api_response;
use crate::auth::service;
use crate::utils::config::ctx;
use crate::utils::reqauth::current_caller;

pub struct MfaApi;

#[derive(Object, Debug)]
pub struct RespMfaSetup {
    pub secret: String,
    pub backup_codes: Vec<String>,
}

api_response!(MfaSetupResponse, 200, RespMfaSetup);

#[derive(Object, Debug)]
pub struct ReqMfaCode {
    pub code: String,
}

#[derive(Object, Debug)]
pub struct Empty {}

api_response!(MfaVerifyResponse, 204, Empty);

#[derive(Object, Debug)]
pub struct ReqMfaDisable {
    pub password: String,
}

api_response!(MfaDisableResponse, 204, Empty);

#[derive(Object, Debug)]
pub struct RespBackupCodes {
    pub backup_codes: Vec<String>,
}

api_response!(MfaBackupCodesResponse, 200, RespBackupCodes);

#[OpenApi]
impl MfaApi {
    #[oai(path = "/auth/mfa/setup", method = "post")]
    async fn setup(&self, http_req: &Request) -> MfaSetupResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return MfaSetupResponse::err(e),
        };
        match service::mfa_setup(&ctx().store, &ctx().parms.config, &caller.user).await {
            Ok(s) => MfaSetupResponse::ok(RespMfaSetup { secret: s.secret, backup_codes: s.backup_codes }),
            Err(e) => MfaSetupResponse::err(e),
        }
    }

    #[oai(path = "/auth/mfa/verify", method = "post")]
    async fn verify(&self, http_req: &Request, req: Json<ReqMfaCode>) -> MfaVerifyResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return MfaVerifyResponse::err(e),
        };
        match service::mfa_verify(&ctx().store, &ctx().parms.config, &caller.user, &req.code).await {
            Ok(()) => MfaVerifyResponse::ok(Empty {}),
            Err(e) => MfaVerifyResponse::err(e),
        }
    }

    #[oai(path = "/auth/mfa/disable", method = "post")]
    async fn disable(&self, http_req: &Request, req: Json<ReqMfaDisable>) -> MfaDisableResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return MfaDisableResponse::err(e),
        };
        match service::mfa_disable(&ctx().store, &caller.user, &req.password).await {
            Ok(()) => MfaDisableResponse::ok(Empty {}),
            Err(e) => MfaDisableResponse::err(e),
        }
    }

    #[oai(path = "/auth/mfa/backup-codes", method = "post")]
    async fn regenerate_backup_codes(&self, http_req: &Request) -> MfaBackupCodesResponse {
        let caller = match current_caller(&ctx().store, &ctx().parms.config, http_req).await {
            Ok(c) => c,
            Err(e) => return MfaBackupCodesResponse::err(e),
        };
        match service::mfa_regenerate_backup_codes(&ctx().store, &ctx().parms.config, &caller.user).await {
            Ok(codes) => MfaBackupCodesResponse::ok(RespBackupCodes { backup_codes: codes }),
            Err(e) => MfaBackupCodesResponse::err(e),
        }
    }
}
