//! The nine agent-facing endpoints (spec.md §4.7) plus the `osctrld`
//! control-plane endpoints, wired against the `Engine` aggregate instead of
//! the teacher's `status_handler.rs`-style direct `web::Data<AppData>`
//! extraction — the same pattern, applied to the wider surface this spec
//! requires.

use crate::carve::{CarveBlockSubmission, CarveInit};
use crate::engine::Engine;
use crate::logsink::extract_identity;
use crate::node::EnrollAttempt;
use crate::protocol::script::ScriptKind;
use crate::protocol::{
    self, CarveBlockRequest, CarveBlockResponse, CarveInitRequest, CarveInitResponse,
    ConfigRequest, ConfigResponse, EnrollRequest, EnrollResponse, ErrorMessage, LogRequest,
    LogResponse, ProtocolError, QueryReadRequest, QueryReadResponse, QueryWriteRequest,
    QueryWriteResponse, SecretBody,
};
use crate::query::QueryResult;
use crate::store::{Environment, IngestKey, IngestKind, NodeKey, PackageKind, PackageLocation};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use flate2::read::GzDecoder;
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use uuid::Uuid;

fn resolve_env(engine: &Engine, raw: &str) -> Result<Environment, ProtocolError> {
    let id = raw
        .parse()
        .map_err(|_| ProtocolError::MissingPathVariable("env"))?;
    engine
        .environments
        .by_id(id)
        .ok_or(ProtocolError::UnknownEnvironment)
}

fn peer_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .peer_addr()
        .unwrap_or("unknown")
        .to_string()
}

fn debug_dump(env: &Environment, req: &HttpRequest, body: &[u8]) {
    if !env.debug_http {
        return;
    }
    tracing::debug!(
        env = %env.name,
        method = %req.method(),
        uri = %req.uri(),
        body = %String::from_utf8_lossy(body),
        "debug http dump"
    );
}

fn json_response(status: StatusCode, body: &impl Serialize) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("application/json; charset=UTF-8")
        .body(serde_json::to_vec(body).unwrap_or_default())
}

fn text_response(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/plain; charset=UTF-8")
        .body(body)
}

// -- agent endpoints ----------------------------------------------------------------

pub async fn enroll(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    debug_dump(&env, &req, &body);
    let wire: EnrollRequest = serde_json::from_slice(&body)?;

    if !env.accepts_enrolls {
        return Err(ProtocolError::EnrollmentDisabled);
    }
    if wire.enroll_secret != env.enroll_secret {
        tracing::warn!(env = %env.name, "enroll rejected: secret mismatch");
        return Err(ProtocolError::InvalidSecret);
    }

    let attempt = EnrollAttempt {
        host_identifier: wire.host_identifier,
        platform: wire.platform_type,
        hostname: wire.host_details.system_info.hostname.clone(),
        local_name: wire.host_details.system_info.computer_name.clone(),
        username: String::new(),
        osquery_user: String::new(),
        config_hash: wire.host_details.osquery_info.config_hash.clone(),
        osquery_version: wire.host_details.osquery_info.version.clone(),
        source_ip: Some(peer_ip(&req)),
    };

    let (node_key, outcome) = engine.nodes.enroll(&env, attempt)?;

    Ok(json_response(
        StatusCode::OK,
        &EnrollResponse {
            node_key: node_key.0,
            node_invalid: outcome.node_invalid,
        },
    ))
}

pub async fn config(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    debug_dump(&env, &req, &body);
    let wire: ConfigRequest = serde_json::from_slice(&body)?;
    let key = NodeKey(wire.node_key);

    let Some(node) = engine.nodes.get_by_key(&key)? else {
        return Ok(json_response(
            StatusCode::OK,
            &ConfigResponse::Invalid { node_invalid: true },
        ));
    };

    engine.nodes.record_ip_address(&key, peer_ip(&req));
    engine.nodes.config_refresh(&key, body.len() as u64);
    engine.accounting.record(
        IngestKey {
            environment_id: env.id,
            node_id: node.id,
            kind: IngestKind::Config,
        },
        body.len() as u64,
    );

    Ok(json_response(
        StatusCode::OK,
        &ConfigResponse::Config(env.configuration.clone()),
    ))
}

pub async fn log(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;

    let is_gzip = req
        .headers()
        .get(actix_web::http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    let decoded = if is_gzip {
        let mut decoder = GzDecoder::new(&body[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(ProtocolError::Gzip)?;
        out
    } else {
        body.to_vec()
    };

    debug_dump(&env, &req, &decoded);
    let wire: LogRequest = serde_json::from_slice(&decoded)?;
    let key = NodeKey(wire.node_key);

    let Some(node) = engine.nodes.get_by_key(&key)? else {
        return Ok(json_response(
            StatusCode::OK,
            &LogResponse { node_invalid: true },
        ));
    };

    let body_len = decoded.len() as u64;
    engine.nodes.record_ip_address(&key, peer_ip(&req));

    let log_type: crate::logsink::LogType = wire.log_type.into();
    let ingest_kind = match log_type {
        crate::logsink::LogType::Status => {
            engine.nodes.log_status_refresh(&key, body_len);
            IngestKind::LogStatus
        }
        crate::logsink::LogType::Result => {
            engine.nodes.log_result_refresh(&key, body_len);
            IngestKind::LogResult
        }
    };
    engine.accounting.record(
        IngestKey {
            environment_id: env.id,
            node_id: node.id,
            kind: ingest_kind,
        },
        body_len,
    );

    match extract_identity(&wire.data) {
        Ok(_identity) => {
            engine.dispatcher.log(
                log_type,
                &wire.data,
                env.id,
                &env.name,
                &node.uuid,
                env.debug_http,
            );
        }
        Err(_mixed) => {
            tracing::warn!(
                env = %env.name,
                node = %node.uuid,
                "dropping log batch: mixed host identities across records"
            );
        }
    }

    Ok(json_response(
        StatusCode::OK,
        &LogResponse { node_invalid: false },
    ))
}

pub async fn read(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    debug_dump(&env, &req, &body);
    let wire: QueryReadRequest = serde_json::from_slice(&body)?;
    let key = NodeKey(wire.node_key);

    let Some(node) = engine.nodes.get_by_key(&key)? else {
        return Ok(json_response(
            StatusCode::OK,
            &QueryReadResponse {
                queries: Default::default(),
                node_invalid: true,
                accelerate: None,
            },
        ));
    };

    engine.nodes.record_ip_address(&key, peer_ip(&req));
    engine.nodes.query_read_refresh(&key, body.len() as u64);
    engine.accounting.record(
        IngestKey {
            environment_id: env.id,
            node_id: node.id,
            kind: IngestKind::QueryRead,
        },
        body.len() as u64,
    );

    let accelerated_seconds = engine.settings.get_u64("accelerated_seconds", 10);
    let result = engine
        .queries
        .node_queries(&node, accelerated_seconds, Utc::now())?;

    Ok(json_response(
        StatusCode::OK,
        &QueryReadResponse {
            queries: result.queries,
            node_invalid: false,
            accelerate: result.accelerate,
        },
    ))
}

pub async fn write(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    debug_dump(&env, &req, &body);
    let wire: QueryWriteRequest = serde_json::from_slice(&body)?;
    let key = NodeKey(wire.node_key);

    let Some(node) = engine.nodes.get_by_key(&key)? else {
        return Ok(json_response(
            StatusCode::OK,
            &QueryWriteResponse { node_invalid: true },
        ));
    };

    engine.nodes.record_ip_address(&key, peer_ip(&req));
    engine.nodes.query_write_refresh(&key, body.len() as u64);
    engine.accounting.record(
        IngestKey {
            environment_id: env.id,
            node_id: node.id,
            kind: IngestKind::QueryWrite,
        },
        body.len() as u64,
    );

    let results: Vec<QueryResult> = wire
        .queries
        .keys()
        .map(|name| QueryResult {
            query_name: name.clone(),
            status: wire.statuses.get(name).copied().unwrap_or(0),
        })
        .collect();
    engine.queries.accept_results(&node, &results)?;

    for (name, rows) in &wire.queries {
        let status = wire.statuses.get(name).copied().unwrap_or(0);
        engine
            .dispatcher
            .query_log(name, status, rows, env.id, &env.name, &node.uuid, env.debug_http);
    }

    Ok(json_response(
        StatusCode::OK,
        &QueryWriteResponse { node_invalid: false },
    ))
}

pub async fn carve_init(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    debug_dump(&env, &req, &body);
    let wire: CarveInitRequest = serde_json::from_slice(&body)?;
    let key = NodeKey(wire.node_key);

    let Some(node) = engine.nodes.get_by_key(&key)? else {
        return Ok(json_response(
            StatusCode::OK,
            &CarveInitResponse {
                success: false,
                session_id: None,
            },
        ));
    };

    let session_id = Uuid::new_v4().simple().to_string();
    let init = CarveInit {
        session_id: session_id.clone(),
        request_id: wire.request_id,
        carve_id: wire.carve_id,
        node_uuid: node.uuid.clone(),
        environment: env.name.clone(),
        total_blocks: wire.block_count,
        block_size: wire.block_size,
        carve_size: wire.carve_size,
        destination_dir: engine.carve_destination_dir.clone(),
    };

    match engine.carve.init(init) {
        Ok(()) => {
            engine.nodes.carve_refresh(&key, body.len() as u64);
            engine.accounting.record(
                IngestKey {
                    environment_id: env.id,
                    node_id: node.id,
                    kind: IngestKind::CarveInit,
                },
                body.len() as u64,
            );
            Ok(json_response(
                StatusCode::OK,
                &CarveInitResponse {
                    success: true,
                    session_id: Some(session_id),
                },
            ))
        }
        Err(err) => {
            tracing::error!(error = %err, env = %env.name, "carve init failed");
            Ok(json_response(
                StatusCode::OK,
                &CarveInitResponse {
                    success: false,
                    session_id: None,
                },
            ))
        }
    }
}

pub async fn carve_block(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    debug_dump(&env, &req, &body);
    let wire: CarveBlockRequest = serde_json::from_slice(&body)?;

    let Some(session) = engine.carve.check_carve(&wire.session_id, &wire.request_id)? else {
        return Ok(json_response(StatusCode::OK, &CarveBlockResponse { success: false }));
    };

    let submission = CarveBlockSubmission {
        session_id: wire.session_id.clone(),
        request_id: wire.request_id.clone(),
        block_id: wire.block_id,
        data_b64: wire.data,
        environment: env.name.clone(),
    };

    match engine.carve.write_block(submission) {
        Ok(true) => {
            engine
                .nodes
                .carve_refresh_by_uuid(&env, &session.node_uuid, body.len() as u64);
            if let Ok(Some(node)) = engine.store.get_node_by_uuid(&env.id, &session.node_uuid) {
                engine.accounting.record(
                    IngestKey {
                        environment_id: env.id,
                        node_id: node.id,
                        kind: IngestKind::CarveBlock,
                    },
                    body.len() as u64,
                );
            }
            Ok(json_response(StatusCode::OK, &CarveBlockResponse { success: true }))
        }
        Ok(false) => Ok(json_response(StatusCode::OK, &CarveBlockResponse { success: false })),
        Err(err) => {
            tracing::error!(error = %err, session = %wire.session_id, "carve block write failed");
            Ok(json_response(StatusCode::OK, &CarveBlockResponse { success: false }))
        }
    }
}

/// `GET /{env}/{secretpath}/{script}` — the install/remove script an agent
/// (or an operator) downloads. Bad input is reported as a 500 with a plain
/// error body per spec.md §4.7's table, not a `ProtocolError`, since there is
/// nothing for `ResponseError` to add here.
pub async fn script(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ProtocolError> {
    let (raw_env, secretpath, script_name) = path.into_inner();
    let env = resolve_env(&engine, &raw_env)?;

    let Some(kind) = ScriptKind::from_filename(&script_name) else {
        return Ok(json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorMessage { message: "Invalid".into() },
        ));
    };

    let secret_path = match kind.action {
        crate::protocol::script::ScriptAction::Enroll => &env.enroll_secret_path,
        crate::protocol::script::ScriptAction::Remove => &env.remove_secret_path,
    };

    if secret_path.path != secretpath {
        return Ok(json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorMessage { message: "Invalid".into() },
        ));
    }
    if secret_path.is_expired(Utc::now()) {
        return Ok(json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorMessage { message: "Expired".into() },
        ));
    }

    let body = protocol::script::render(kind, &engine.tls_host, &env.enroll_secret);
    Ok(text_response(StatusCode::OK, body))
}

/// `GET /{env}/package/{secretpath}/{pkg}` — installer package delivery.
/// `pkg` is one of `deb`/`rpm`/`pkg`/`msi`; a `Local` location is streamed
/// with `std::fs::read` rather than the `fs` crate's capability traits, which
/// only read UTF-8 text and can't carry a binary package (see DESIGN.md).
pub async fn package(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ProtocolError> {
    let (raw_env, secretpath, pkg) = path.into_inner();
    let env = resolve_env(&engine, &raw_env)?;

    if env.enroll_secret_path.path != secretpath || env.enroll_secret_path.is_expired(Utc::now()) {
        return Err(ProtocolError::SecretPathInvalid);
    }

    let kind: PackageKind = pkg
        .parse()
        .map_err(|_| ProtocolError::UnknownPackageKind(pkg.clone()))?;
    let location = env
        .packages
        .get(kind)
        .ok_or_else(|| ProtocolError::UnknownPackageKind(pkg))?;

    match location {
        PackageLocation::Url(url) => Ok(HttpResponse::Found()
            .append_header((actix_web::http::header::LOCATION, url.clone()))
            .finish()),
        PackageLocation::Local(path_buf) => {
            let bytes = std::fs::read(path_buf).map_err(ProtocolError::PackageUnavailable)?;
            let filename = path_buf
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("package.bin");
            Ok(HttpResponse::Ok()
                .content_type("application/octet-stream")
                .append_header((
                    actix_web::http::header::CONTENT_DISPOSITION,
                    format!("attachment; filename={filename}"),
                ))
                .body(bytes))
        }
    }
}

// -- osctrld control-plane endpoints --------------------------------------------------

fn check_secret(env: &Environment, wire: &SecretBody) -> Result<(), ProtocolError> {
    if wire.secret != env.enroll_secret {
        return Err(ProtocolError::InvalidSecret);
    }
    Ok(())
}

pub async fn flags(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    let wire: SecretBody = serde_json::from_slice(&body)?;
    check_secret(&env, &wire)?;
    Ok(text_response(StatusCode::OK, env.flags.clone()))
}

pub async fn cert(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    let wire: SecretBody = serde_json::from_slice(&body)?;
    check_secret(&env, &wire)?;
    Ok(text_response(StatusCode::OK, env.certificate.clone()))
}

#[derive(Serialize)]
struct VerifyResponse {
    success: bool,
}

pub async fn verify(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let env = resolve_env(&engine, &path.into_inner())?;
    let wire: SecretBody = serde_json::from_slice(&body)?;
    check_secret(&env, &wire)?;
    Ok(json_response(StatusCode::OK, &VerifyResponse { success: true }))
}

/// `POST /{env}/script/{action}/{platform}` — the control-plane equivalent of
/// [`script`], authenticated by a body-carried secret rather than a
/// [`crate::store::SecretPath`].
pub async fn control_script(
    engine: web::Data<Arc<Engine>>,
    path: web::Path<(String, String, String)>,
    body: web::Bytes,
) -> Result<HttpResponse, ProtocolError> {
    let (raw_env, action, platform) = path.into_inner();
    let env = resolve_env(&engine, &raw_env)?;
    let wire: SecretBody = serde_json::from_slice(&body)?;
    check_secret(&env, &wire)?;

    let kind = ScriptKind::from_parts(&action, &platform)
        .ok_or_else(|| ProtocolError::UnknownScriptKind(format!("{action}/{platform}")))?;

    let body = protocol::script::render(kind, &engine.tls_host, &env.enroll_secret);
    Ok(text_response(StatusCode::OK, body))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/{env}/enroll", web::post().to(enroll))
        .route("/{env}/config", web::post().to(config))
        .route("/{env}/log", web::post().to(log))
        .route("/{env}/read", web::post().to(read))
        .route("/{env}/write", web::post().to(write))
        .route("/{env}/carve/init", web::post().to(carve_init))
        .route("/{env}/carve/block", web::post().to(carve_block))
        .route("/{env}/flags", web::post().to(flags))
        .route("/{env}/cert", web::post().to(cert))
        .route("/{env}/verify", web::post().to(verify))
        .route("/{env}/script/{action}/{platform}", web::post().to(control_script))
        .route("/{env}/package/{secretpath}/{pkg}", web::get().to(package))
        .route("/{env}/{secretpath}/{script}", web::get().to(script));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EnvironmentId, PackageLocations, SecretPath};

    fn sample_env() -> Environment {
        let now = Utc::now();
        Environment {
            id: EnvironmentId(Uuid::new_v4()),
            name: "prod".into(),
            enroll_secret: "S0".into(),
            certificate: "CERT".into(),
            flags: "--force=true".into(),
            enroll_secret_path: SecretPath {
                path: "enroll-abc".into(),
                expires_at: now + chrono::Duration::hours(1),
            },
            remove_secret_path: SecretPath {
                path: "remove-abc".into(),
                expires_at: now + chrono::Duration::hours(1),
            },
            accepts_enrolls: true,
            debug_http: false,
            configuration: serde_json::json!({}),
            packages: PackageLocations::default(),
        }
    }

    // end-to-end scenarios (enroll/config round trip, carve completion, gzip
    // dispatch, script expiry, ...) live in `osctrl-tls/tests/scenarios.rs`
    // against the real `configure()` wiring; these cover the pure helpers.

    #[test]
    fn check_secret_rejects_mismatch() {
        let env = sample_env();
        let wire = SecretBody { secret: "WRONG".into() };
        assert!(matches!(check_secret(&env, &wire), Err(ProtocolError::InvalidSecret)));
    }

    #[test]
    fn check_secret_accepts_match() {
        let env = sample_env();
        let wire = SecretBody { secret: "S0".into() };
        assert!(check_secret(&env, &wire).is_ok());
    }

    #[test]
    fn debug_dump_is_silent_when_debug_http_disabled() {
        // no assertion beyond "doesn't panic": debug_http gates the log line,
        // exercised here so the early-return branch stays covered.
        let env = sample_env();
        let req = actix_web::test::TestRequest::default().to_http_request();
        debug_dump(&env, &req, b"{}");
    }
}
