use std::io::Cursor;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use calamine::{Data, Reader, Xlsx};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use testscore::config::AppConfig;
use testscore::session::SessionStore;
use testscore::web::{router, AppState};

const BOUNDARY: &str = "testscore-boundary";
const SCENARIO: &str = "pre_test,post_test,gender\n50,70,Male\n60,55,Female\n40,80,Male\n";

fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::with_data_dir(dir.path());
    let app = router(AppState::new(config, SessionStore::in_memory()));
    (dir, app)
}

fn upload(cookie: Option<&str>, file_name: &str, contents: &str, disaggregate: bool) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"dataset\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n{contents}\r\n"
    );
    if disaggregate {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"disaggregate\"\r\n\r\nyes\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    let mut request = Request::builder()
        .method("POST")
        .uri("/testscore/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::from(body)).unwrap()
}

/// Files left in the uploads directory; zero when it was never created.
fn stored_uploads(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path().join("uploads").join("testscore"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::empty()).unwrap()
}

/// `name=value` of the session cookie issued by a response.
fn session_cookie(response: &Response<Body>) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie issued")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn upload_renders_report_with_metrics_and_charts() {
    let (dir, app) = app();
    let response = app
        .clone()
        .oneshot(upload(None, "scores.csv", SCENARIO, true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let html = body_text(response).await;
    assert_eq!(stored_uploads(&dir), 1);

    assert!(html.contains("<td>68.33</td>"));
    assert!(html.contains("Knowledge Gap"));
    assert!(html.contains("<td>36.67</td>"));
    assert!(html.contains("Gender Disaggregation"));
    assert!(html.contains("<td>Male</td><td>2</td><td>45.00</td><td>75.00</td><td>30.00</td>"));

    let start = html.find("/static/charts/testscore/").expect("chart link");
    let end = start + html[start..].find('"').unwrap();
    let chart = app
        .clone()
        .oneshot(request("GET", &html[start..end], Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(chart.status(), StatusCode::OK);
    assert_eq!(&body_bytes(chart).await[..4], b"\x89PNG");
}

#[tokio::test]
async fn missing_post_test_redirects_with_message() {
    let (dir, app) = app();
    let response = app
        .clone()
        .oneshot(upload(None, "scores.csv", "pre_test,score\n1,2\n", false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/testscore/");
    let cookie = session_cookie(&response);
    assert_eq!(stored_uploads(&dir), 0);

    let form = app
        .clone()
        .oneshot(request("GET", "/testscore/", Some(&cookie)))
        .await
        .unwrap();
    let html = body_text(form).await;
    assert!(html.contains("Dataset must contain 'pre_test' and 'post_test' columns."));

    // Nothing was stored, so exporting still has nothing to work with.
    let export = app
        .clone()
        .oneshot(request("POST", "/testscore/export/pdf", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::SEE_OTHER);

    // The flash is shown once.
    let again = app
        .clone()
        .oneshot(request("GET", "/testscore/", Some(&cookie)))
        .await
        .unwrap();
    let html = body_text(again).await;
    assert!(html.contains("Nothing to export yet."));
    assert!(!html.contains("pre_test' and 'post_test' columns."));
}

#[tokio::test]
async fn unsupported_extension_is_rejected_before_analysis() {
    let (dir, app) = app();
    let response = app
        .clone()
        .oneshot(upload(None, "scores.txt", SCENARIO, false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&response);
    assert!(!dir.path().join("uploads").exists());

    let html = body_text(
        app.oneshot(request("GET", "/testscore/", Some(&cookie)))
            .await
            .unwrap(),
    )
    .await;
    assert!(html.contains("Unsupported file type"));
}

#[tokio::test]
async fn export_before_analysis_is_a_redirect_not_a_server_error() {
    let (_dir, app) = app();
    for format in ["word", "pdf", "excel"] {
        let response = app
            .clone()
            .oneshot(request("POST", &format!("/testscore/export/{format}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{format}");
    }

    let unknown = app
        .oneshot(request("POST", "/testscore/export/csv", None))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exports_use_the_session_result() {
    let (_dir, app) = app();
    let response = app
        .clone()
        .oneshot(upload(None, "scores.csv", SCENARIO, true))
        .await
        .unwrap();
    let cookie = session_cookie(&response);

    let expectations = [
        (
            "word",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ".docx",
        ),
        ("pdf", "application/pdf", ".pdf"),
        (
            "excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ".xlsx",
        ),
    ];
    for (slug, content_type, extension) in expectations {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/testscore/export/{slug}"),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{slug}");
        assert_eq!(response.headers()[header::CONTENT_TYPE], content_type);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"test_score_analysis_report_"));
        assert!(disposition.ends_with(&format!("{extension}\"")));

        let bytes = body_bytes(response).await;
        if slug == "excel" {
            let mut workbook = Xlsx::new(Cursor::new(bytes)).unwrap();
            let overall = workbook.worksheet_range("Overall").unwrap();
            assert_eq!(overall.get_value((3, 1)), Some(&Data::Float(68.33)));
            assert_eq!(overall.get_value((5, 1)), Some(&Data::Float(36.67)));
        } else {
            assert!(!bytes.is_empty());
        }
    }
}

#[tokio::test]
async fn sessions_do_not_see_each_other() {
    let (_dir, app) = app();
    let first = app
        .clone()
        .oneshot(upload(None, "scores.csv", SCENARIO, false))
        .await
        .unwrap();
    let first_cookie = session_cookie(&first);

    let second = app
        .clone()
        .oneshot(request("GET", "/testscore/", None))
        .await
        .unwrap();
    let second_cookie = session_cookie(&second);
    assert_ne!(first_cookie, second_cookie);

    let export = app
        .clone()
        .oneshot(request("POST", "/testscore/export/excel", Some(&second_cookie)))
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::SEE_OTHER);

    let export = app
        .oneshot(request("POST", "/testscore/export/excel", Some(&first_cookie)))
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::OK);
}

#[tokio::test]
async fn help_page_and_missing_manual() {
    let (_dir, app) = app();
    let help = app
        .clone()
        .oneshot(request("GET", "/testscore/help", None))
        .await
        .unwrap();
    assert_eq!(help.status(), StatusCode::OK);
    assert!(body_text(help).await.contains("pre_test"));

    let manual = app
        .oneshot(request("GET", "/testscore/manual", None))
        .await
        .unwrap();
    assert_eq!(manual.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn about_page_is_linked_from_the_form() {
    let (_dir, app) = app();
    let form = body_text(
        app.clone()
            .oneshot(request("GET", "/testscore/", None))
            .await
            .unwrap(),
    )
    .await;
    assert!(form.contains("href=\"/testscore/about\""));

    let about = app
        .oneshot(request("GET", "/testscore/about", None))
        .await
        .unwrap();
    assert_eq!(about.status(), StatusCode::OK);
    assert!(body_text(about).await.contains("About Test Score Analysis"));
}
