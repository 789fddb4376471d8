//! Loading and saving an apparatus snapshot from disk (spec §6.3). The
//! text format itself lives in `seqlab-apparatus`; this just adds the file
//! I/O boundary, grounded on `daq-experiment/src/run_engine.rs`'s plan-file
//! loading step at the start of `RunEngine::start`.

use seqlab_apparatus::Apparatus;
use seqlab_core::SeqError;
use seqlab_instruments::ModelRegistry;
use std::path::Path;

pub async fn load(path: &Path, registry: &ModelRegistry) -> Result<Apparatus, SeqError> {
    let text = tokio::fs::read_to_string(path).await?;
    Apparatus::deserialize(&text, registry)
}

pub async fn save(path: &Path, apparatus: &Apparatus) -> Result<(), SeqError> {
    tokio::fs::write(path, apparatus.serialize()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqlab_instruments::models::demo_source;
    use seqlab_instruments::Instrument;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.txt");

        let mut registry = ModelRegistry::new();
        registry.register(demo_source());
        let mut apparatus = Apparatus::new();
        apparatus.push_instrument(Instrument::new("A", demo_source()).with_name("src"));

        save(&path, &apparatus).await.unwrap();
        let loaded = load(&path, &registry).await.unwrap();
        assert_eq!(loaded.instruments().len(), 1);
        assert_eq!(loaded.instruments()[0].name.as_deref(), Some("src"));
    }
}
