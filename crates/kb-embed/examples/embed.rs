use kb_core::config::Config;
use kb_embed::embedder_from_settings;

// Embed two strings with the configured provider and print the shape.
//   APP_USE_FAKE_EMBEDDINGS=1 cargo run -p kb-embed --example embed

fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.embedding()?;
    let embedder = embedder_from_settings(&settings)?;
    let texts = vec!["hello world".to_string(), "如何申请年假".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("B={} dim={}", embs.len(), embedder.dim());
    Ok(())
}
