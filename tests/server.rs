//! HTTP API tests against a live server on a free port.

use axum::{routing::get, Router};
use estate_harness::config::Config;
use estate_harness::server::run_server;
use estate_harness::users::{create_user, NewUser};
use estate_harness::{db, migrate};
use estate_harness_core::Role;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;

const SINGLE_LISTING: &str =
    "<imoveis><imovel><codigo>UP-1</codigo><tipo>Casa</tipo><cidade>Recife</cidade></imovel></imoveis>";

const PORTAL_B_FEED: &str = "<ListaImoveis>\
    <Imovel><CodigoImovel>R1</CodigoImovel><PrecoVenda>100</PrecoVenda></Imovel>\
    <Imovel><CodigoImovel>R2</CodigoImovel><PrecoLocacao>900</PrecoLocacao></Imovel>\
    </ListaImoveis>";

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config_with_port(tmp: &TempDir, port: u16, import_extra: &str) -> Config {
    let config_content = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:{}"

[auth]
secret = "server-test-secret"

[import]
fetch_timeout_secs = 5
upload_dir = "{}"
{}
"#,
        tmp.path().join("estate.sqlite").display(),
        port,
        tmp.path().join("uploads").display(),
        import_extra
    );
    toml::from_str(&config_content).unwrap()
}

struct TestServer {
    _tmp: TempDir,
    cfg: Config,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with("").await
    }

    /// Start with extra `[import]` settings.
    async fn start_with(import_extra: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let port = find_free_port();
        let cfg = test_config_with_port(&tmp, port, import_extra);

        migrate::run_migrations(&cfg).await.unwrap();
        let pool = db::connect(&cfg).await.unwrap();
        for (email, role, reference) in [
            ("admin@example.com", Role::Master, None),
            ("client@example.com", Role::Client, Some("UP-1")),
        ] {
            create_user(
                &pool,
                &NewUser {
                    name: email.to_string(),
                    email: email.to_string(),
                    password: "correct horse".to_string(),
                    role,
                    client_reference: reference.map(str::to_string),
                },
            )
            .await
            .unwrap();
        }
        pool.close().await;

        let cfg_clone = cfg.clone();
        tokio::spawn(async move {
            run_server(&cfg_clone).await.ok();
        });
        wait_for_server(port).await;

        Self {
            _tmp: tmp,
            cfg,
            base: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn login(&self, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": "correct horse" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn upload(&self, token: Option<&str>, file_name: &str, mime: &str, data: &str) -> reqwest::Response {
        let part = Part::bytes(data.as_bytes().to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .unwrap();
        let mut req = self
            .client
            .post(self.url("/xml/upload"))
            .multipart(Form::new().part("xmlFile", part));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn process_url(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/xml/process-url"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

async fn start_feed_server() -> u16 {
    let port = find_free_port();
    let app = Router::new().route("/feed.xml", get(|| async { PORTAL_B_FEED }));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    port
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_login() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/auth/login"))
        .json(&json!({ "email": "ADMIN@example.com", "password": "correct horse" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let cookie = resp
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user"]["role"], "master");
    assert!(body["user"].get("password_hash").is_none());

    let resp = server
        .client
        .post(server.url("/auth/login"))
        .json(&json!({ "email": "admin@example.com", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "unauthorized");

    let resp = server
        .client
        .post(server.url("/auth/login"))
        .json(&json!({ "email": "admin@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_import_routes_require_master() {
    let server = TestServer::start().await;

    let resp = server
        .upload(None, "feed.xml", "application/xml", SINGLE_LISTING)
        .await;
    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "unauthorized");

    let resp = server
        .upload(Some("garbage.token"), "feed.xml", "application/xml", SINGLE_LISTING)
        .await;
    assert_eq!(resp.status(), 401);

    let client_token = server.login("client@example.com").await;
    let resp = server
        .upload(Some(&client_token), "feed.xml", "application/xml", SINGLE_LISTING)
        .await;
    assert_eq!(resp.status(), 403);
    assert_eq!(error_code(resp).await, "forbidden");

    let resp = server
        .process_url(&client_token, json!({ "url": "http://x", "portal": "portalA" }))
        .await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_upload_twice_updates() {
    let server = TestServer::start().await;
    let token = server.login("admin@example.com").await;

    let resp = server
        .upload(Some(&token), "feed.xml", "application/xml", SINGLE_LISTING)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["results"],
        json!({ "total_processados": 1, "inseridos": 1, "atualizados": 0, "erros": 0 })
    );
    assert_eq!(body["errors"], json!([]));
    assert!(body["message"].is_string());

    let resp = server
        .upload(Some(&token), "feed.xml", "application/xml", SINGLE_LISTING)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["results"],
        json!({ "total_processados": 1, "inseridos": 0, "atualizados": 1, "erros": 0 })
    );

    // Staged files never outlive the request.
    let leftovers = std::fs::read_dir(&server.cfg.import.upload_dir)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_upload_accepts_cookie_token() {
    let server = TestServer::start().await;
    let token = server.login("admin@example.com").await;

    let part = Part::bytes(SINGLE_LISTING.as_bytes().to_vec())
        .file_name("feed.xml")
        .mime_str("text/xml")
        .unwrap();
    let resp = server
        .client
        .post(server.url("/xml/upload"))
        .header("cookie", format!("token={}", token))
        .multipart(Form::new().part("xmlFile", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_upload_rejections() {
    let server = TestServer::start().await;
    let token = server.login("admin@example.com").await;

    let resp = server
        .upload(Some(&token), "feed.json", "application/json", "{}")
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = server
        .upload(Some(&token), "feed.xml", "application/xml", "<imoveis><imovel>")
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "malformed_input");

    let resp = server
        .upload(Some(&token), "feed.xml", "application/xml", "<rss><item/></rss>")
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "unrecognized_format");

    let part = Part::text("hello");
    let resp = server
        .client
        .post(server.url("/xml/upload"))
        .bearer_auth(&token)
        .multipart(Form::new().part("other", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let server = TestServer::start_with("max_upload_bytes = 1024").await;
    let token = server.login("admin@example.com").await;

    let mut big = String::from("<imoveis><imovel><codigo>BIG</codigo><descricao>");
    big.push_str(&"x".repeat(4096));
    big.push_str("</descricao></imovel></imoveis>");

    let resp = server
        .upload(Some(&token), "feed.xml", "application/xml", &big)
        .await;
    assert_eq!(resp.status(), 413);
    assert_eq!(error_code(resp).await, "payload_too_large");

    // Small feeds still go through on the same server.
    let resp = server
        .upload(Some(&token), "feed.xml", "application/xml", SINGLE_LISTING)
        .await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_process_url() {
    let server = TestServer::start().await;
    let token = server.login("admin@example.com").await;
    let feed_port = start_feed_server().await;
    let url = format!("http://127.0.0.1:{}/feed.xml", feed_port);

    let resp = server
        .process_url(&token, json!({ "url": url, "portal": "portalB" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["total_processados"], 2);
    assert_eq!(body["results"]["inseridos"], 2);

    let resp = server
        .process_url(&token, json!({ "url": url, "portal": "canalpro" }))
        .await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["results"]["atualizados"], 2);
}

#[tokio::test]
async fn test_process_url_rejections() {
    let server = TestServer::start().await;
    let token = server.login("admin@example.com").await;

    let resp = server.process_url(&token, json!({ "portal": "portalA" })).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = server
        .process_url(&token, json!({ "url": "http://127.0.0.1:1/feed.xml" }))
        .await;
    assert_eq!(resp.status(), 400);

    let resp = server
        .process_url(
            &token,
            json!({ "url": "http://127.0.0.1:1/feed.xml", "portal": "zap" }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    let unreachable = format!("http://127.0.0.1:{}/feed.xml", find_free_port());
    let resp = server
        .process_url(&token, json!({ "url": unreachable, "portal": "portalA" }))
        .await;
    assert_eq!(resp.status(), 502);
    assert_eq!(error_code(resp).await, "transport");
}
