//! Code bundle fingerprinting

use crate::construct::Environment;
use crate::error::{AppError, Result};
use crate::token::Token;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bucket the bootstrap process provisions for file assets
pub const ASSET_BUCKET: &str = "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}";

/// Bucket name for `env`; explicit account and region replace the pseudo parameters
pub fn asset_bucket(env: &Environment) -> Token {
    let mut name = ASSET_BUCKET.to_string();
    if let Some(account) = &env.account {
        name = name.replace("${AWS::AccountId}", account);
    }
    if let Some(region) = &env.region {
        name = name.replace("${AWS::Region}", region);
    }
    if name.contains("${") {
        Token::sub(name)
    } else {
        Token::literal(name)
    }
}

/// One entry of `<stack>.assets.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifestEntry {
    pub source_path: String,
    pub packaging: String,
    pub hash: String,
    pub object_key: String,
}

/// A staged directory or file bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub source: PathBuf,
    pub hash: String,
}

impl Asset {
    /// Fingerprint `source`. Fails when it does not exist.
    pub fn stage(source: &Path) -> Result<Self> {
        let metadata = fs::metadata(source).map_err(|_| {
            AppError::invalid(
                "code",
                format!("Cannot find asset at {}", source.display()),
            )
        })?;

        let mut hasher = Sha256::new();
        if metadata.is_dir() {
            let mut files = Vec::new();
            collect_files(source, source, &mut files)?;
            files.sort();
            for relative in &files {
                hasher.update(relative.as_bytes());
                hasher.update([0u8]);
                hasher.update(fs::read(source.join(relative))?);
                hasher.update([0u8]);
            }
            debug!(source = %source.display(), files = files.len(), "Fingerprinted asset directory");
        } else {
            hasher.update(fs::read(source)?);
        }

        Ok(Self {
            source: source.to_path_buf(),
            hash: hex::encode(hasher.finalize()),
        })
    }

    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }

    pub fn manifest_entry(&self) -> AssetManifestEntry {
        AssetManifestEntry {
            source_path: self.source.display().to_string(),
            packaging: "zip".to_string(),
            hash: self.hash.clone(),
            object_key: self.object_key(),
        }
    }
}

/// Relative paths use `/` so the fingerprint is platform independent.
/// Symbolic links are not followed.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            debug!(path = %path.display(), "Skipping symbolic link in asset");
        } else if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| AppError::Internal(e.into()))?;
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(relative.join("/"));
        }
    }
    Ok(())
}
