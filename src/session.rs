//! Session file discovery.
//!
//! Candidates are checked in a fixed priority order and the first existing,
//! non-empty regular file wins. Nothing here reads file contents: decoding
//! belongs to [`MonarchClient::load_session`](crate::monarch::MonarchClient::load_session).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;

/// Session file name inside the project root.
const PROJECT_SESSION_FILE: &str = "monarch_session.json";
/// Dot-directory holding the secondary session file.
const SESSION_DIR: &str = ".mm";
/// Session file name inside [`SESSION_DIR`].
const SESSION_DIR_FILE: &str = "mm_session.pickle";

/// Where a candidate path came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CandidateSource {
    /// `MONARCH_SESSION_FILE`.
    Override,
    /// `<project root>/monarch_session.json`.
    ProjectRoot,
    /// `<project root>/.mm/mm_session.pickle`.
    ProjectDotDir,
    /// `~/.mm/mm_session.pickle`.
    HomeDotDir,
}

/// One place a session file may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionCandidate {
    /// Origin of the path.
    pub(crate) source: CandidateSource,
    /// Path to check.
    pub(crate) path: PathBuf,
}

impl SessionCandidate {
    /// Returns `true` if the path is a non-empty regular file.
    ///
    /// A zero-length file is left behind by an interrupted save and counts
    /// as missing.
    pub(crate) fn is_usable(&self) -> bool {
        fs::metadata(&self.path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }
}

/// Ordered list of session file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionLocations {
    /// Candidates, highest priority first.
    candidates: Vec<SessionCandidate>,
}

impl SessionLocations {
    /// Builds the candidate list.
    pub(crate) fn new(
        override_path: Option<&Path>,
        project_root: &Path,
        home_dir: Option<&Path>,
    ) -> Self {
        let mut candidates = Vec::with_capacity(4);
        if let Some(path) = override_path {
            candidates.push(SessionCandidate {
                source: CandidateSource::Override,
                path: path.to_path_buf(),
            });
        }
        candidates.push(SessionCandidate {
            source: CandidateSource::ProjectRoot,
            path: project_root.join(PROJECT_SESSION_FILE),
        });
        candidates.push(SessionCandidate {
            source: CandidateSource::ProjectDotDir,
            path: project_root.join(SESSION_DIR).join(SESSION_DIR_FILE),
        });
        if let Some(home) = home_dir {
            candidates.push(SessionCandidate {
                source: CandidateSource::HomeDotDir,
                path: home.join(SESSION_DIR).join(SESSION_DIR_FILE),
            });
        }
        Self { candidates }
    }

    /// Builds the candidate list from the server configuration.
    pub(crate) fn from_config(config: &Config) -> Self {
        Self::new(
            config.session_file.as_deref(),
            &config.project_root,
            config.home_dir.as_deref(),
        )
    }

    /// All candidates, highest priority first.
    pub(crate) fn candidates(&self) -> &[SessionCandidate] {
        &self.candidates
    }

    /// Returns the first usable candidate.
    pub(crate) fn resolve(&self) -> Option<&SessionCandidate> {
        self.candidates.iter().find(|candidate| {
            let usable = candidate.is_usable();
            tracing::debug!(path = %candidate.path.display(), usable, "checked session candidate");
            usable
        })
    }

    /// Paths the `login` command writes to: the override alone if set,
    /// otherwise every fixed location.
    pub(crate) fn save_targets(&self) -> Vec<&Path> {
        let overridden = self
            .candidates
            .iter()
            .find(|candidate| candidate.source == CandidateSource::Override);
        overridden.map_or_else(
            || {
                self.candidates
                    .iter()
                    .map(|candidate| candidate.path.as_path())
                    .collect()
            },
            |candidate| vec![candidate.path.as_path()],
        )
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    clippy::indexing_slicing,
    reason = "test code uses expect and indexing for readability"
)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::{CandidateSource, SessionLocations};

    struct Layout {
        _root: TempDir,
        locations: SessionLocations,
    }

    fn layout() -> Layout {
        let root = tempfile::tempdir().expect("tempdir");
        let project = root.path().join("project");
        let home = root.path().join("home");
        fs::create_dir_all(project.join(".mm")).expect("project dot dir");
        fs::create_dir_all(home.join(".mm")).expect("home dot dir");
        let override_path = root.path().join("override").join("custom.session");
        fs::create_dir_all(override_path.parent().expect("parent")).expect("override dir");
        let locations = SessionLocations::new(Some(&override_path), &project, Some(&home));
        Layout {
            _root: root,
            locations,
        }
    }

    fn paths(locations: &SessionLocations) -> Vec<PathBuf> {
        locations
            .candidates()
            .iter()
            .map(|candidate| candidate.path.clone())
            .collect()
    }

    fn write(path: &Path, contents: &[u8]) {
        fs::write(path, contents).expect("write session file");
    }

    #[test]
    fn candidates_follow_priority_order() {
        let layout = layout();
        let sources: Vec<CandidateSource> = layout
            .locations
            .candidates()
            .iter()
            .map(|candidate| candidate.source)
            .collect();
        assert_eq!(
            sources,
            vec![
                CandidateSource::Override,
                CandidateSource::ProjectRoot,
                CandidateSource::ProjectDotDir,
                CandidateSource::HomeDotDir,
            ]
        );
    }

    #[test]
    fn each_location_alone_is_resolved() {
        for k in 0..4 {
            let layout = layout();
            let all = paths(&layout.locations);
            write(&all[k], b"{\"token\":\"t\"}");
            let resolved = layout.locations.resolve().expect("one file exists");
            assert_eq!(resolved.path, all[k], "location {k}");
        }
    }

    #[test]
    fn higher_priority_wins_over_lower() {
        for k in 0..4 {
            let layout = layout();
            let all = paths(&layout.locations);
            for path in &all[k..] {
                write(path, b"session");
            }
            let resolved = layout.locations.resolve().expect("files exist");
            assert_eq!(resolved.path, all[k], "location {k}");
        }
    }

    #[test]
    fn empty_file_falls_through() {
        let layout = layout();
        let all = paths(&layout.locations);
        write(&all[0], b"");
        write(&all[1], b"session");
        let resolved = layout.locations.resolve().expect("second file exists");
        assert_eq!(resolved.source, CandidateSource::ProjectRoot);
    }

    #[test]
    fn directory_is_not_a_session() {
        let layout = layout();
        let all = paths(&layout.locations);
        fs::create_dir_all(&all[1]).expect("dir in place of file");
        assert!(layout.locations.resolve().is_none());
    }

    #[test]
    fn nothing_found() {
        let layout = layout();
        assert!(layout.locations.resolve().is_none());
    }

    #[test]
    fn without_override_or_home() {
        let root = tempfile::tempdir().expect("tempdir");
        let locations = SessionLocations::new(None, root.path(), None);
        assert_eq!(locations.candidates().len(), 2);
        assert_eq!(locations.save_targets().len(), 2);
    }

    #[test]
    fn override_is_the_only_save_target() {
        let layout = layout();
        let targets = layout.locations.save_targets();
        assert_eq!(targets.len(), 1);
        assert!(targets[0].ends_with("custom.session"));
    }
}
