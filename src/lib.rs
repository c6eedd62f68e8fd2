use std::env;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Layer, Registry};

pub mod audio;
pub mod bert;
pub mod g2p;
pub mod infer;
pub mod supervisor;
pub mod text_normaliser;

pub fn setup_logging() {
    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_env("RUST_LOG"),
        _ => EnvFilter::new(
            "bahasa_tts=info,audit=info,resample=info,g2p=info,supervise=info,say=info,demo=info,echo_demo=info",
        ),
    };

    let fmt = tracing_subscriber::fmt::Layer::default();

    let subscriber = filter.and_then(fmt).with_subscriber(Registry::default());

    tracing::subscriber::set_global_default(subscriber).unwrap();
}
