use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::version::Version;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("template root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// One released version of a template family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    pub template: String,
    pub version: Version,
    pub path: PathBuf,
}

/// A spreadsheet that was seen but left out of the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Discovery {
    /// Template family → its versions, oldest first.
    pub templates: BTreeMap<String, Vec<TemplateFile>>,
    pub excluded: Vec<ExcludedFile>,
}

impl Discovery {
    pub fn file_count(&self) -> usize {
        self.templates.values().map(Vec::len).sum()
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm"))
}

/// Find the versioned template files under `root`.
///
/// Every direct subdirectory is a template family; its direct `.xlsx`/`.xlsm` children whose
/// stem ends in `_<int>(.<int>)*` are its versions. Office lock files (`~$...`) are ignored and
/// other spreadsheets are reported as excluded.
pub fn discover_templates(root: &Path) -> Result<Discovery, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    let mut discovery = Discovery::default();

    for family in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let family = family?;
        if !family.file_type().is_dir() {
            log::debug!("ignoring {} outside any template folder", family.path().display());
            continue;
        }
        let template = family.file_name().to_string_lossy().into_owned();

        let mut versions: Vec<TemplateFile> = Vec::new();
        for entry in WalkDir::new(family.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_spreadsheet(path) {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with("~$") {
                continue;
            }

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match Version::from_file_stem(&stem) {
                Some(version) => versions.push(TemplateFile {
                    template: template.clone(),
                    version,
                    path: path.to_path_buf(),
                }),
                None => discovery.excluded.push(ExcludedFile {
                    path: path.to_path_buf(),
                    reason: "no version suffix".to_string(),
                }),
            }
        }

        versions.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
        versions.dedup_by(|later, earlier| {
            if later.version.key() != earlier.version.key() {
                return false;
            }
            discovery.excluded.push(ExcludedFile {
                path: later.path.clone(),
                reason: format!("duplicate of version {}", earlier.version),
            });
            true
        });

        if versions.is_empty() {
            log::debug!("template folder {template} has no versioned files");
            continue;
        }
        discovery.templates.insert(template, versions);
    }

    Ok(discovery)
}
