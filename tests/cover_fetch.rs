use std::fs;
use std::io::{Cursor, Read as _};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use predicates::prelude::*;
use txt2epub::cover::{FetchError, fetch_image};

static COVER_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

fn spawn_image_server() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let base_url = format!("http://{}", server.server_addr());

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            let path = url.split('?').next().unwrap_or(&url);
            let (status, content_type, body): (u16, &str, &[u8]) = match path {
                "/covers/front.png" | "/cover" => (200, "image/png", COVER_PNG),
                "/cover.php" => (200, "image/jpeg", COVER_PNG),
                "/page.html" => (200, "text/html", b"<html></html>"),
                _ => (404, "text/plain", b"not found"),
            };
            let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                .expect("content-type header");
            let response = tiny_http::Response::from_data(body)
                .with_header(header)
                .with_status_code(status);
            let _ = request.respond(response);
        }
    });

    (base_url, shutdown_tx, handle)
}

fn opf_of(epub: &std::path::Path) -> String {
    let bytes = fs::read(epub).expect("read epub");
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open epub");
    let mut file = archive.by_name("OEBPS/content.opf").expect("package document");
    let mut out = String::new();
    file.read_to_string(&mut out).expect("utf-8 opf");
    out
}

#[test]
fn fetches_cover_named_after_url_path() {
    let (base_url, shutdown, handle) = spawn_image_server();

    let image = fetch_image(&format!("{base_url}/covers/front.png")).expect("fetch cover");
    assert_eq!(image.name, "front.png");
    assert_eq!(image.data, COVER_PNG);

    let image = fetch_image(&format!("{base_url}/cover")).expect("fetch cover");
    assert_eq!(image.name, "cover.png");

    let image = fetch_image(&format!("{base_url}/cover.php?id=1")).expect("fetch cover");
    assert_eq!(image.name, "cover.jpg");

    let err = fetch_image(&format!("{base_url}/missing.png")).unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));

    let _ = shutdown.send(());
    handle.join().expect("server thread");
}

#[test]
fn build_embeds_downloaded_cover() {
    let (base_url, shutdown, handle) = spawn_image_server();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let input = temp.path().join("novel.txt");
    fs::write(&input, "第一章\n正文\n").expect("write novel");
    let out = temp.path().join("novel.epub");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("txt2epub");
    cmd.arg("build")
        .arg("--cover-url")
        .arg(format!("{base_url}/covers/front.png"))
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let opf = opf_of(&out);
    assert!(opf.contains("<meta name=\"cover\" content=\"cover-image\" />"));
    assert!(opf.contains("href=\"cover.png\" media-type=\"image/png\""));

    let _ = shutdown.send(());
    handle.join().expect("server thread");
}

#[test]
fn build_without_reachable_cover_still_succeeds() {
    let (base_url, shutdown, handle) = spawn_image_server();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let input = temp.path().join("novel.txt");
    fs::write(&input, "第一章\n正文\n").expect("write novel");
    let out = temp.path().join("novel.epub");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("txt2epub");
    cmd.arg("build")
        .arg("--cover-url")
        .arg(format!("{base_url}/missing.png"))
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("cover download failed"));

    let opf = opf_of(&out);
    assert!(!opf.contains("name=\"cover\""));

    let _ = shutdown.send(());
    handle.join().expect("server thread");
}

#[test]
fn build_drops_downloaded_cover_that_is_not_an_image() {
    let (base_url, shutdown, handle) = spawn_image_server();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let input = temp.path().join("novel.txt");
    fs::write(&input, "第一章\n正文\n").expect("write novel");
    let out = temp.path().join("novel.epub");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("txt2epub");
    cmd.arg("build")
        .arg("--cover-url")
        .arg(format!("{base_url}/page.html"))
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("not a supported image"));

    assert!(!opf_of(&out).contains("name=\"cover\""));

    let _ = shutdown.send(());
    handle.join().expect("server thread");
}

#[test]
fn build_names_script_served_cover_from_content_type() {
    let (base_url, shutdown, handle) = spawn_image_server();
    let temp = tempfile::TempDir::new().expect("tempdir");
    let input = temp.path().join("novel.txt");
    fs::write(&input, "第一章\n正文\n").expect("write novel");
    let out = temp.path().join("novel.epub");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("txt2epub");
    cmd.arg("build")
        .arg("--cover-url")
        .arg(format!("{base_url}/cover.php?id=1"))
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    assert!(opf_of(&out).contains("href=\"cover.jpg\" media-type=\"image/jpeg\""));

    let _ = shutdown.send(());
    handle.join().expect("server thread");
}
