use kb_core::config::Config;
use kb_vector::store::{LanceSnapshotStore, DEFAULT_TABLE};

// Print what the persisted chunk snapshot holds.
//   cargo run -p kb-vector --features lance --example status

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data = Config::load()?.data()?;
    let db_path = kb_core::config::expand_path(&data.lance_dir);
    let store = LanceSnapshotStore::open(&db_path, DEFAULT_TABLE).await?;
    let chunks = store.load().await?;
    let with_vec = chunks.iter().filter(|c| c.embedding.is_some()).count();
    let dim = chunks.iter().find_map(|c| c.embedding.as_ref().map(Vec::len)).unwrap_or(0);
    println!("{}: chunks={} with_vector={} dim={}", db_path.display(), chunks.len(), with_vec, dim);
    Ok(())
}
