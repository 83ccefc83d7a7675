mod config;
mod error;
mod handlers;
mod models;
mod services;
mod validation;

use anyhow::bail;
use clap::{Parser, Subcommand};
use config::ServerConfig;
use error::AppError;
use handlers::battle::SharedSource;
use ntex::http::Method;
use ntex::web;
use services::fetcher::HttpBattleSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API (default if no subcommand)
    Serve,
    /// Fetch and score one battle, printing the ranking
    Score {
        /// Battle id, `@id` or a battleverse battle link
        target: String,

        /// Number of ranked results to print
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Save the full report as JSON (defaults to a timestamped file name)
        #[arg(long)]
        save: Option<Option<PathBuf>>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "battle-score")]
#[command(about = "Battle vote scoring service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[ntex::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(std::env::var("RUST_LOG").ok().as_deref());
    let cli = Cli::parse();
    let config = ServerConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Score { target, top, save } => score(config, &target, top, save).await,
    }
}

fn init_tracing(log_override: Option<&str>) {
    let filter = config::resolve_log_filter(log_override);
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let http_source = HttpBattleSource::from_config(&config)?;
    let bind_addr = config.bind_addr();
    tracing::info!(
        bind_addr = %bind_addr,
        endpoint = %http_source.endpoint(),
        timeout_secs = config.fetch_timeout.as_secs(),
        "battle score server starting"
    );

    let source: SharedSource = Arc::new(http_source);

    web::HttpServer::new(move || {
        web::App::new()
            .state(source.clone())
            .wrap(cors_headers())
            .configure(routes)
            .default_service(web::route().to(fallback))
    })
    .bind(bind_addr)?
    .run()
    .await?;
    Ok(())
}

async fn score(
    config: ServerConfig,
    target: &str,
    top: usize,
    save: Option<Option<PathBuf>>,
) -> anyhow::Result<()> {
    let Some(fight_id) = validation::extract_fight_id(target) else {
        bail!("{}", error::INVALID_TARGET_MESSAGE);
    };
    let source = HttpBattleSource::from_config(&config)?;
    let report = services::report::fetch_and_score(&source, fight_id)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.client_message()))?;

    print!("{}", services::report::render_summary(&report, top));

    if let Some(path) = save {
        let path = path.unwrap_or_else(|| services::report::snapshot_filename(fight_id));
        services::report::save_snapshot(&report, &path).await?;
        println!("JSON 已保存: {}", path.display());
    }
    Ok(())
}

// ntex-cors only answers requests that carry an Origin header; every response here needs `*`.
fn cors_headers() -> web::middleware::DefaultHeaders {
    web::middleware::DefaultHeaders::new()
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(health))
            .route(web::method(Method::OPTIONS).to(preflight))
            .default_service(web::route().to(fallback)),
    );
    cfg.service(
        web::resource("/api/battle")
            .route(web::get().to(health))
            .route(web::post().to(handlers::battle::score_battle))
            .route(web::method(Method::OPTIONS).to(preflight)),
    );
    cfg.service(
        web::resource("/api/battle/{tail}*")
            .route(web::get().to(health))
            .route(web::post().to(handlers::battle::score_battle))
            .route(web::method(Method::OPTIONS).to(preflight)),
    );
}

async fn health() -> web::HttpResponse {
    web::HttpResponse::Ok().json(&serde_json::json!({ "ok": true }))
}

async fn preflight() -> web::HttpResponse {
    web::HttpResponse::NoContent().finish()
}

async fn fallback(req: web::HttpRequest) -> Result<web::HttpResponse, AppError> {
    if *req.method() == Method::OPTIONS {
        Ok(preflight().await)
    } else {
        Err(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ntex::http::StatusCode;
    use ntex::web::test;
    use serde_json::{json, Value};
    use services::fetcher::BattleSource;
    use std::sync::Mutex;

    /// Replays a canned payload and records which ids were requested.
    struct FakeSource {
        payload: Option<Value>,
        requested: Mutex<Vec<u64>>,
    }

    impl FakeSource {
        fn new(payload: Option<Value>) -> Arc<Self> {
            Arc::new(Self {
                payload,
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl BattleSource for FakeSource {
        async fn fetch(&self, fight_id: u64) -> Option<Value> {
            self.requested.lock().unwrap().push(fight_id);
            self.payload.clone()
        }
    }

    macro_rules! test_app {
        ($source:expr) => {{
            let source: SharedSource = $source;
            test::init_service(
                web::App::new()
                    .state(source)
                    .wrap(cors_headers())
                    .configure(routes)
                    .default_service(web::route().to(fallback)),
            )
            .await
        }};
    }

    fn battle_payload() -> Value {
        let votes = |names: &[&str]| -> Vec<Value> {
            names.iter().map(|n| json!({ "userName": n })).collect()
        };
        json!({
            "success": true,
            "data": {
                "fightNameCn": "Battle 630",
                "fightDesc": "spring round",
                "createTime": "2024-03-01 10:00:00",
                "endTime": "2024-03-08 10:00:00",
                "fightUserCount": 42,
                "winnerList": [
                    { "creationId": 1, "userName": "alice", "winner": 1,
                      "voteList": votes(&["a", "b", "c", "d"]) }
                ],
                "creationList": [
                    { "creationId": 2, "userName": "bob",
                      "voteList": votes(&["a", "K'K", "AJ", "麦橘MERJIC"]) },
                    { "creationId": 3, "userName": "carol", "voteList": votes(&["x"]) }
                ]
            }
        })
    }

    async fn body_json(resp: web::WebResponse) -> Value {
        let body = test::read_body(resp).await;
        serde_json::from_slice(&body).unwrap()
    }

    #[ntex::test]
    async fn test_health_check() {
        let app = test_app!(FakeSource::new(None));
        for uri in ["/", "/api/battle", "/api/battle/anything"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(
                resp.headers().get("access-control-allow-origin").unwrap(),
                "*"
            );
            assert_eq!(body_json(resp).await, json!({ "ok": true }));
        }
    }

    #[ntex::test]
    async fn test_preflight_returns_no_content() {
        let app = test_app!(FakeSource::new(None));
        for uri in ["/api/battle", "/somewhere/else"] {
            let req = test::TestRequest::default()
                .method(Method::OPTIONS)
                .uri(uri)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
            let headers = resp.headers();
            assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
            assert_eq!(headers.get("access-control-allow-methods").unwrap(), "POST, OPTIONS");
            assert_eq!(headers.get("access-control-allow-headers").unwrap(), "Content-Type");
        }
    }

    #[ntex::test]
    async fn test_unknown_path_is_not_found() {
        let app = test_app!(FakeSource::new(None));
        let req = test::TestRequest::get().uri("/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(resp).await,
            json!({ "success": false, "message": "Not Found" })
        );
    }

    #[ntex::test]
    async fn test_post_to_root_is_not_found() {
        let app = test_app!(FakeSource::new(Some(battle_payload())));
        let req = test::TestRequest::post()
            .uri("/")
            .set_json(&json!({ "id": 630 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            body_json(resp).await,
            json!({ "success": false, "message": "Not Found" })
        );
    }

    #[ntex::test]
    async fn test_scores_battle_from_link() {
        let source = FakeSource::new(Some(battle_payload()));
        let app = test_app!(source.clone());
        let req = test::TestRequest::post()
            .uri("/api/battle")
            .set_json(&json!({ "url": "https://www.battleverse.cn/battle/630" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*source.requested.lock().unwrap(), vec![630]);

        let body = body_json(resp).await;
        assert_eq!(body["success"], json!(true));
        let data = &body["data"];
        assert_eq!(data["fightId"], json!(630));
        assert_eq!(data["total_votes"], json!(9));
        assert_eq!(data["total_creations"], json!(3));
        assert_eq!(data["winner_count"], json!(1));
        assert_eq!(data["points_per_vote"], json!(11.1111));
        assert_eq!(data["battle_info"]["名称"], json!("Battle 630"));
        assert_eq!(data["battle_info"]["参与用户数"], json!(42));

        let results = data["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        // bob ties alice on votes and collects every judge bonus
        assert_eq!(results[0]["用户名"], json!("bob"));
        assert_eq!(results[0]["得分"], json!(190.0));
        assert_eq!(results[0]["K'K加分"], json!(30));
        assert_eq!(results[0]["AJ加分"], json!(30));
        assert_eq!(results[0]["麦橘MERJIC加分"], json!(30));
        assert_eq!(results[0]["特邀评委总分"], json!(90));
        assert_eq!(results[1]["用户名"], json!("alice"));
        assert_eq!(results[1]["是否冠军"], json!("是"));
        assert_eq!(results[1]["加分"], json!(0));
        assert_eq!(results[2]["得分"], json!(25.0));
    }

    #[ntex::test]
    async fn test_identifier_keys_and_tail_path() {
        let source = FakeSource::new(Some(battle_payload()));
        let app = test_app!(source.clone());
        for body in [json!({ "fightId": 12 }), json!({ "id": "@13" })] {
            let req = test::TestRequest::post()
                .uri("/api/battle/score")
                .set_json(&body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }
        assert_eq!(*source.requested.lock().unwrap(), vec![12, 13]);
    }

    #[ntex::test]
    async fn test_missing_identifier_is_bad_request() {
        let source = FakeSource::new(Some(battle_payload()));
        let app = test_app!(source.clone());
        for body in [json!({}), json!({ "url": "abc" })] {
            let req = test::TestRequest::post()
                .uri("/api/battle")
                .set_json(&body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body = body_json(resp).await;
            assert_eq!(body["success"], json!(false));
            assert_eq!(body["message"], json!(error::INVALID_TARGET_MESSAGE));
        }
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[ntex::test]
    async fn test_fetch_failure_is_bad_gateway() {
        let app = test_app!(FakeSource::new(None));
        let req = test::TestRequest::post()
            .uri("/api/battle")
            .set_json(&json!({ "id": 630 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(resp).await,
            json!({ "success": false, "message": error::FETCH_FAILED_MESSAGE })
        );
    }

    #[ntex::test]
    async fn test_empty_upstream_body_is_bad_gateway() {
        for payload in [json!({}), json!([]), json!(""), json!(0), json!(false)] {
            let app = test_app!(FakeSource::new(Some(payload)));
            let req = test::TestRequest::post()
                .uri("/api/battle")
                .set_json(&json!({ "id": 630 }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
            assert_eq!(
                body_json(resp).await,
                json!({ "success": false, "message": error::FETCH_FAILED_MESSAGE })
            );
        }
    }

    #[ntex::test]
    async fn test_invalid_payload_is_server_error() {
        let app = test_app!(FakeSource::new(Some(json!({ "success": false }))));
        let req = test::TestRequest::post()
            .uri("/api/battle")
            .set_json(&json!({ "id": 630 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            json!({ "success": false, "message": error::PROCESSING_FAILED_MESSAGE })
        );
    }

    #[ntex::test]
    async fn test_malformed_request_body_is_server_error() {
        let app = test_app!(FakeSource::new(Some(battle_payload())));
        let req = test::TestRequest::post()
            .uri("/api/battle")
            .header("content-type", "application/json")
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["success"], json!(false));
        assert!(body["message"].as_str().unwrap().starts_with("服务器异常"));
    }

    #[ntex::test]
    async fn test_empty_battle_reports_zero_points_per_vote() {
        let app = test_app!(FakeSource::new(Some(json!({ "success": true, "data": {} }))));
        let req = test::TestRequest::post()
            .uri("/api/battle")
            .set_json(&json!({ "id": "1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["points_per_vote"], json!(0.0));
        assert_eq!(body["data"]["results"], json!([]));
        assert_eq!(body["data"]["battle_info"]["名称"], json!("未知"));
    }

    #[ntex::test]
    async fn test_report_render_and_snapshot() {
        let source = FakeSource::new(Some(battle_payload()));
        let report = services::report::fetch_and_score(&*source, 630).await.unwrap();

        let text = services::report::render_summary(&report, 2);
        assert!(text.contains("对战名称: Battle 630"));
        assert!(text.contains("每票得分: 11.1111"));
        assert!(text.contains("bob"));
        assert!(text.contains("alice"));
        assert!(!text.contains("carol"));

        let name = services::report::snapshot_filename(630);
        let name = name.to_string_lossy();
        assert!(name.starts_with("battle_630_data_") && name.ends_with(".json"));

        let path = std::env::temp_dir().join(format!("battle-score-test-{}.json", std::process::id()));
        services::report::save_snapshot(&report, &path).await.unwrap();
        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(saved["fightId"], json!(630));
        assert_eq!(saved["results"].as_array().unwrap().len(), 3);
    }
}
