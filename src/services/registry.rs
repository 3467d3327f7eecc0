use crate::models::{PreparedAsset, PreparedKind, ProjectPaths};
use crate::services::fs_ops;

/// Read-only view of what is ready to be packed.
///
/// Every call rescans the prepared folders; nothing is cached between calls because
/// the external tool adds files behind our back.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    paths: ProjectPaths,
}

impl AssetRegistry {
    pub fn new(paths: ProjectPaths) -> Self {
        Self { paths }
    }

    /// Prepared textures, then SFX, then speech, each sorted by file name.
    pub fn scan_prepared(&self) -> Vec<PreparedAsset> {
        let mut assets = Vec::new();
        for kind in [PreparedKind::Tex, PreparedKind::Sfx, PreparedKind::Spe] {
            let dir = self.paths.folder(kind.folder());
            let files = match fs_ops::list_files(&dir) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("Could not scan {}: {}", dir, e);
                    continue;
                }
            };

            assets.extend(
                files
                    .into_iter()
                    .filter(|path| path.file_name().is_some_and(|name| kind.accepts(name)))
                    .map(|path| PreparedAsset::new(path, kind)),
            );
        }

        tracing::debug!("Found {} prepared asset(s)", assets.len());
        assets
    }

    /// Pick assets by file name or by their `[TEX] name` label.
    ///
    /// Returns the matches in scan order and the requests nothing matched.
    pub fn select(&self, requested: &[String]) -> (Vec<PreparedAsset>, Vec<String>) {
        let available = self.scan_prepared();
        let mut unmatched = Vec::new();
        let mut wanted = vec![false; available.len()];

        for request in requested {
            let request = request.trim();
            let mut found = false;
            for (index, asset) in available.iter().enumerate() {
                if asset.file_name() == request || asset.to_string() == request {
                    wanted[index] = true;
                    found = true;
                }
            }
            if !found {
                unmatched.push(request.to_string());
            }
        }

        let selected = available
            .into_iter()
            .zip(wanted)
            .filter_map(|(asset, keep)| keep.then_some(asset))
            .collect();
        (selected, unmatched)
    }
}
