// Loaded on startup, saved on quit and on Command::Save.
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::info;

use crate::pipeline::project::ProjectDocument;

const ROWSEQ_DIR: &str = ".rowseq";
const PROJECT_FILE: &str = "project.json";

// <project_dir>/.rowseq/project.json
pub fn project_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(ROWSEQ_DIR).join(PROJECT_FILE)
}

/// `Ok(None)` when there is no saved project yet; a file that exists but does
/// not parse is an error so it is never silently overwritten with a blank one.
pub fn load_project(project_dir: &Path) -> anyhow::Result<Option<ProjectDocument>> {
    let path = project_file_path(project_dir);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    let doc = ProjectDocument::from_json(&data)
        .with_context(|| format!("loading {}", path.display()))?;
    info!("loaded {} ({} tracks)", path.display(), doc.tracks.len());
    Ok(Some(doc))
}

pub fn save_project(project_dir: &Path, doc: &ProjectDocument) -> anyhow::Result<()> {
    let path = project_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?; // create .rowseq/ if needed
    }
    let json = doc.to_json()?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    info!("saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_project_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_project(dir.path()).unwrap(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = ProjectDocument::default();
        doc.tempo_bpm = 87.5;
        save_project(dir.path(), &doc).unwrap();
        assert!(dir.path().join(".rowseq/project.json").is_file());
        assert_eq!(load_project(dir.path()).unwrap(), Some(doc));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".rowseq")).unwrap();
        std::fs::write(project_file_path(dir.path()), "{ nope").unwrap();
        assert!(load_project(dir.path()).is_err());
    }
}
