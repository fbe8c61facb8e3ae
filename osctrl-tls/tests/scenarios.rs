//! End-to-end scenario tests against the real `App::configure` wiring,
//! grounded on the teacher's `tests/` integration style (e.g.
//! `tests/supervisor.rs`, `tests/cli.rs`): build the same app the binary
//! serves, drive it with `actix_web::test`, assert on the wire response.

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::Utc;
use osctrl_tls::engine::Engine;
use osctrl_tls::http::handlers::configure;
use osctrl_tls::logsink::{LogDispatcher, NoneSink, TailCache};
use osctrl_tls::protocol::{CarveBlockResponse, CarveInitResponse, EnrollResponse};
use osctrl_tls::store::{Environment, EnvironmentId, MemoryStore, PackageLocations, SecretPath};
use std::sync::Arc;
use uuid::Uuid;

fn sample_env(store: &MemoryStore, secret: &str, secret_path_ttl: chrono::Duration) -> Environment {
    let now = Utc::now();
    let env = Environment {
        id: EnvironmentId(Uuid::new_v4()),
        name: "prod".into(),
        enroll_secret: secret.into(),
        certificate: "CERT".into(),
        flags: "--force=true".into(),
        enroll_secret_path: SecretPath {
            path: "enroll-abc".into(),
            expires_at: now + secret_path_ttl,
        },
        remove_secret_path: SecretPath {
            path: "remove-abc".into(),
            expires_at: now + secret_path_ttl,
        },
        accepts_enrolls: true,
        debug_http: false,
        configuration: serde_json::json!({"options": {"host_identifier": "uuid"}}),
        packages: PackageLocations::default(),
    };
    store.put_environment(env.clone());
    env
}

fn test_engine(store: Arc<MemoryStore>) -> web::Data<Arc<Engine>> {
    let dispatcher = LogDispatcher::new(
        Box::new(NoneSink),
        Box::new(NoneSink),
        Arc::new(TailCache::new(8)),
    );
    web::Data::new(Arc::new(Engine::new(
        store,
        dispatcher,
        "tls.example.com".into(),
        std::env::temp_dir(),
    )))
}

fn enroll_body(host: &str, secret: &str) -> serde_json::Value {
    serde_json::json!({
        "enroll_secret": secret,
        "host_identifier": host,
        "platform_type": "2",
        "host_details": {
            "os_version": {},
            "system_info": {"uuid": host, "hostname": "box", "computer_name": "box"},
            "osquery_info": {"version": "5.0.0"}
        }
    })
}

/// Scenario 1: enroll then config round-trips, echoing the environment's
/// stored configuration back once the node key checks out.
#[actix_web::test]
async fn enroll_then_config_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let env = sample_env(&store, "S0", chrono::Duration::hours(1));
    let engine = test_engine(store);
    engine.environments.refresh(engine.store.as_ref());

    let app = test::init_service(App::new().app_data(engine.clone()).configure(configure)).await;

    let enroll_req = test::TestRequest::post()
        .uri(&format!("/{}/enroll", env.id))
        .set_json(enroll_body("HOST-1", "S0"))
        .to_request();
    let resp: EnrollResponse = test::call_and_read_body_json(&app, enroll_req).await;
    assert!(!resp.node_invalid);
    assert!(!resp.node_key.is_empty());

    let config_req = test::TestRequest::post()
        .uri(&format!("/{}/config", env.id))
        .set_json(serde_json::json!({"node_key": resp.node_key}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, config_req).await;
    assert_eq!(body["options"]["host_identifier"], "uuid");
}

/// Scenario 2: an enroll carrying the wrong secret is rejected outright,
/// never reaching node creation.
#[actix_web::test]
async fn enroll_with_wrong_secret_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let env = sample_env(&store, "S0", chrono::Duration::hours(1));
    let engine = test_engine(store);
    engine.environments.refresh(engine.store.as_ref());

    let app = test::init_service(App::new().app_data(engine.clone()).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri(&format!("/{}/enroll", env.id))
        .set_json(enroll_body("HOST-1", "WRONG"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(engine.environments.len(), 1);
}

/// Scenario 5: a gzip-encoded `/log` batch is decoded before parsing and
/// still dispatches to the sinks.
#[actix_web::test]
async fn gzip_encoded_log_batch_is_decoded_and_dispatched() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let store = Arc::new(MemoryStore::new());
    let env = sample_env(&store, "S0", chrono::Duration::hours(1));
    let engine = test_engine(store);
    engine.environments.refresh(engine.store.as_ref());

    let app = test::init_service(App::new().app_data(engine.clone()).configure(configure)).await;

    let enroll_req = test::TestRequest::post()
        .uri(&format!("/{}/enroll", env.id))
        .set_json(enroll_body("HOST-1", "S0"))
        .to_request();
    let resp: EnrollResponse = test::call_and_read_body_json(&app, enroll_req).await;

    let payload = serde_json::to_vec(&serde_json::json!({
        "node_key": resp.node_key,
        "log_type": "result",
        "data": [{"hostIdentifier": "HOST-1", "columns": {"a": "1"}}]
    }))
    .unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload).unwrap();
    let gzipped = encoder.finish().unwrap();

    let log_req = test::TestRequest::post()
        .uri(&format!("/{}/log", env.id))
        .insert_header(("Content-Encoding", "gzip"))
        .set_payload(gzipped)
        .to_request();
    let log_resp = test::call_service(&app, log_req).await;
    assert_eq!(log_resp.status(), StatusCode::OK);
}

/// Scenarios 3 & 4: a carve session completes on its last block, and a
/// duplicate resend of an already-written block is rejected without
/// double-counting.
#[actix_web::test]
async fn two_block_carve_completes_and_rejects_duplicate_block() {
    let store = Arc::new(MemoryStore::new());
    let env = sample_env(&store, "S0", chrono::Duration::hours(1));
    let engine = test_engine(store);
    engine.environments.refresh(engine.store.as_ref());

    let app = test::init_service(App::new().app_data(engine.clone()).configure(configure)).await;

    let enroll_req = test::TestRequest::post()
        .uri(&format!("/{}/enroll", env.id))
        .set_json(enroll_body("HOST-1", "S0"))
        .to_request();
    let resp: EnrollResponse = test::call_and_read_body_json(&app, enroll_req).await;

    let init_req = test::TestRequest::post()
        .uri(&format!("/{}/carve/init", env.id))
        .set_json(serde_json::json!({
            "node_key": resp.node_key,
            "block_count": 2,
            "block_size": 4,
            "carve_size": 8,
            "carve_id": "cid",
            "request_id": "rid"
        }))
        .to_request();
    let init_resp: CarveInitResponse = test::call_and_read_body_json(&app, init_req).await;
    assert!(init_resp.success);
    let session_id = init_resp.session_id.unwrap();

    for block_id in 0..2u64 {
        let block_req = test::TestRequest::post()
            .uri(&format!("/{}/carve/block", env.id))
            .set_json(serde_json::json!({
                "block_id": block_id,
                "session_id": session_id,
                "request_id": "rid",
                "data": "AAAA"
            }))
            .to_request();
        let block_resp: CarveBlockResponse = test::call_and_read_body_json(&app, block_req).await;
        assert!(block_resp.success);
    }
    assert!(engine.carve.completed(&session_id).unwrap());

    // A resend of an already-stored block after the session has completed
    // is still a success that does not double-count (spec.md §8 scenario 4).
    let dup_req = test::TestRequest::post()
        .uri(&format!("/{}/carve/block", env.id))
        .set_json(serde_json::json!({
            "block_id": 0,
            "session_id": session_id,
            "request_id": "rid",
            "data": "AAAA"
        }))
        .to_request();
    let dup_resp: CarveBlockResponse = test::call_and_read_body_json(&app, dup_req).await;
    assert!(dup_resp.success);
    assert!(engine.carve.completed(&session_id).unwrap());
}

/// Scenario 6: an install script download succeeds against the live secret
/// path and fails both on a wrong path and once the path has expired.
#[actix_web::test]
async fn script_download_rejects_wrong_and_expired_paths() {
    let store = Arc::new(MemoryStore::new());
    let env = sample_env(&store, "S0", chrono::Duration::hours(1));
    let engine = test_engine(store.clone());
    engine.environments.refresh(engine.store.as_ref());

    let app = test::init_service(App::new().app_data(engine.clone()).configure(configure)).await;

    let good = test::TestRequest::get()
        .uri(&format!("/{}/enroll-abc/enroll.sh", env.id))
        .to_request();
    let resp = test::call_service(&app, good).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("S0"));

    let bad = test::TestRequest::get()
        .uri(&format!("/{}/wrong-path/enroll.sh", env.id))
        .to_request();
    let resp = test::call_service(&app, bad).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let expired_env = sample_env(&store, "S1", chrono::Duration::seconds(-1));
    engine.environments.refresh(engine.store.as_ref());
    let expired = test::TestRequest::get()
        .uri(&format!("/{}/enroll-abc/enroll.sh", expired_env.id))
        .to_request();
    let resp = test::call_service(&app, expired).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("Expired"));
}
