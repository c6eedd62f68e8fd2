//! Browser demo for the Indonesian voice. One text box, one button: the submitted text goes
//! through the inference wrapper synchronously and the page comes back with a status line and an
//! audio player for the generated wav. Single-user by design, a submission blocks until the
//! Python side finishes.
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::Router;
use bahasa_tts::infer::InferenceRunner;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
pub struct Args {
    /// Path to the trained checkpoint
    #[clap(short, long, default_value = "melo/logs/LJSpeech-1.1/testing/G_644000.pth")]
    model: PathBuf,
    /// Directory the inference script writes into
    #[clap(short, long, default_value = "output_gradio")]
    output: PathBuf,
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1:7860")]
    listen: String,
}

struct AppState {
    runner: InferenceRunner,
}

const PAGE: &str = r#"<!doctype html>
<html><head><meta charset="utf-8"><title>Bahasa TTS Demo</title></head>
<body>
<h1>Bahasa TTS Demo - PT Bahasa Kinerja Utama</h1>
<form method="post" action="/synthesize">
  <textarea name="text" rows="2" cols="60" placeholder="Tulis teks di sini..."></textarea><br>
  <button type="submit">Submit</button>
</form>
{RESULT}
</body></html>"#;

fn page(result: &str) -> Html<String> {
    Html(PAGE.replace("{RESULT}", result))
}

#[derive(Deserialize)]
struct SynthesizeForm {
    text: String,
}

async fn index() -> Html<String> {
    page("")
}

async fn synthesize(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SynthesizeForm>,
) -> Html<String> {
    info!("[UI Input] {}", form.text);
    let text = form.text.clone();
    let state_for_task = state.clone();

    // The wrapper blocks on the subprocess, keep it off the async workers.
    let result =
        tokio::task::spawn_blocking(move || state_for_task.runner.synthesize(&text)).await;

    match result {
        Ok(Ok(artifact)) => {
            info!("Inference sukses: {}", artifact.display());
            page(&format!(
                "<p>Teks diproses: {}</p><audio controls src=\"/audio\"></audio>",
                escape_html(&form.text)
            ))
        }
        Ok(Err(e)) => {
            error!("Inference gagal: {}", e);
            page(&format!("<p>Inference gagal: {}</p>", escape_html(&e.to_string())))
        }
        Err(e) => {
            error!("Worker panicked: {}", e);
            page("<p>Inference gagal!</p>")
        }
    }
}

async fn audio(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match tokio::fs::read(state.runner.artifact_path()).await {
        Ok(bytes) => (StatusCode::OK, [("Content-Type", "audio/wav")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "File audio tidak ditemukan").into_response(),
    }
}

/// Minimal escaping for text echoed back into the page.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bahasa_tts::setup_logging();
    let args = Args::parse();

    let state = Arc::new(AppState {
        runner: InferenceRunner::new(args.model, args.output),
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/synthesize", post(synthesize))
        .route("/audio", get(audio))
        .with_state(state);

    info!("Demo UI on http://{}", args.listen);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
