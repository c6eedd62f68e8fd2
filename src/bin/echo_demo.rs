//! Throwaway UI smoke test: proves the form-to-server plumbing works before wiring in the real
//! inference wrapper. Kept around because it's the quickest way to check a box can reach the
//! demo port at all.
use axum::extract::Form;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use serde::Deserialize;
use tracing::info;

#[derive(Parser, Debug)]
pub struct Args {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1:7861")]
    listen: String,
}

const PAGE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Test UI Sederhana</title></head>
<body>
<h1>Test UI Sederhana</h1>
<form method="post" action="/echo">
  <input name="text" placeholder="Masukkan teks">
  <button type="submit">Submit</button>
</form>
{RESULT}
</body></html>"#;

#[derive(Deserialize)]
struct EchoForm {
    text: String,
}

async fn index() -> Html<String> {
    Html(PAGE.replace("{RESULT}", ""))
}

async fn echo(Form(form): Form<EchoForm>) -> Html<String> {
    info!("[DEBUG] input: {}", form.text);
    let escaped = form
        .text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    Html(PAGE.replace("{RESULT}", &format!("<p>Kamu mengetik: {}</p>", escaped)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    let app = Router::new().route("/", get(index)).route("/echo", post(echo));

    info!("Echo UI on http://{}", args.listen);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
