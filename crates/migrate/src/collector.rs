//! Selection of the files that make up a migration set.
//!
//! Top-level names come from [`PathPolicy`]. Directories are walked with an
//! explicit worklist; every discovered path is named under the *virtual*
//! prefix of the top-level item it was reached through, so a symlinked
//! subtree lands at its declared location rather than its physical one.

use crate::config::Layout;
use crate::policy::{PathPolicy, SETTINGS_LOCAL};
use ccm_common::{Error, Result};
use ccm_manifest::{FileEntry, SECRETS_SENTINEL};
use ccm_secrets::extract_mcp_servers;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Caller toggles for a collection run.
#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    /// Also collect `settings.local.json`.
    pub include_settings_local: bool,
    /// Extract MCP servers from the external secrets file.
    pub include_mcp_config: bool,
    /// Preview run: missing required items are not reported.
    pub dry_run: bool,
}

/// Output of a collection run.
#[derive(Debug, Default)]
pub struct Collection {
    pub entries: Vec<FileEntry>,
    pub warnings: Vec<String>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Collect the migration set described by `policy` under `layout.source_root`.
///
/// Only a missing source root is an error; every per-item problem is
/// downgraded to a warning.
pub fn collect(
    layout: &Layout,
    policy: &PathPolicy,
    options: &CollectorOptions,
) -> Result<Collection> {
    let root = &layout.source_root;
    if !root.is_dir() {
        return Err(Error::SourceNotFound(root.clone()));
    }

    let mut walk = Walk::default();

    for name in policy.always_include {
        walk.collect_item(root, name, !options.dry_run);
    }

    for name in policy.include_if_present {
        walk.collect_item(root, name, false);
    }

    if options.include_settings_local {
        let path = root.join(SETTINGS_LOCAL);
        if fs::symlink_metadata(&path).is_ok() {
            walk.collect_file(&path, SETTINGS_LOCAL);
        }
    }

    if options.include_mcp_config && layout.secrets_file.exists() {
        walk.collect_mcp_servers(&layout.secrets_file);
    }

    let before = walk.entries.len();
    walk.entries
        .retain(|entry| !policy.is_excluded(&entry.relative_path));
    if walk.entries.len() != before {
        debug!("Excluded {} entries", before - walk.entries.len());
    }

    info!("Collected {} files from {:?}", walk.entries.len(), root);

    Ok(Collection {
        entries: walk.entries,
        warnings: walk.warnings,
    })
}

/// One path waiting to be inspected, already named at its virtual location.
struct Pending {
    path: PathBuf,
    relative: String,
    /// Canonical directories from the top-level item down to this path.
    chain: Rc<Vec<PathBuf>>,
}

#[derive(Default)]
struct Walk {
    entries: Vec<FileEntry>,
    warnings: Vec<String>,
    seen: HashSet<String>,
}

impl Walk {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn emit(&mut self, entry: FileEntry) {
        if self.seen.insert(entry.relative_path.clone()) {
            self.entries.push(entry);
        } else {
            debug!("Skipping duplicate {}", entry.relative_path);
        }
    }

    fn collect_item(&mut self, root: &Path, name: &str, report_missing: bool) {
        let full = root.join(name);

        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(_) => {
                if report_missing {
                    self.warn(format!("Missing required: {}", name));
                }
                return;
            }
        };

        if meta.is_dir() {
            self.walk_dir(&full, name);
        } else if meta.file_type().is_symlink() {
            match fs::canonicalize(&full) {
                Ok(real) if real.is_dir() => self.walk_dir(&real, name),
                Ok(_) => self.collect_file(&full, name),
                Err(e) => debug!("Dropping broken symlink {:?}: {}", full, e),
            }
        } else {
            self.collect_file(&full, name);
        }
    }

    /// Emit a single file, resolving it if it is a symlink.
    fn collect_file(&mut self, path: &Path, relative: &str) {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => return,
        };

        if !meta.file_type().is_symlink() {
            self.emit(FileEntry::file(path, relative));
            return;
        }

        let link_text = fs::read_link(path)
            .map(|t| t.to_string_lossy().into_owned())
            .unwrap_or_default();
        match fs::canonicalize(path) {
            Ok(real) if real.exists() => self.emit(FileEntry::symlink(real, relative, link_text)),
            _ => debug!("Dropping broken symlink {:?}", path),
        }
    }

    /// Walk `dir` (a real directory) naming everything below `prefix`.
    fn walk_dir(&mut self, dir: &Path, prefix: &str) {
        let chain = Rc::new(vec![canonical_or_self(dir)]);
        let mut stack = Vec::new();
        self.push_children(&mut stack, dir, prefix, &chain);

        while let Some(item) = stack.pop() {
            let meta = match fs::symlink_metadata(&item.path) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!("Vanished during walk {:?}: {}", item.path, e);
                    continue;
                }
            };

            if meta.file_type().is_symlink() {
                let link_text = fs::read_link(&item.path)
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();

                let real = match fs::canonicalize(&item.path) {
                    Ok(real) => real,
                    Err(_) => {
                        debug!("Dropping broken symlink {:?}", item.path);
                        continue;
                    }
                };

                if real.is_dir() {
                    if item.chain.contains(&real) {
                        self.warn(format!(
                            "Skipping symlink loop: {} -> {}",
                            item.relative, link_text
                        ));
                        continue;
                    }
                    let chain = extend_chain(&item.chain, real.clone());
                    self.push_children(&mut stack, &real, &item.relative, &chain);
                } else if real.exists() {
                    self.emit(FileEntry::symlink(real, item.relative, link_text));
                }
            } else if meta.is_dir() {
                let chain = extend_chain(&item.chain, canonical_or_self(&item.path));
                self.push_children(&mut stack, &item.path, &item.relative, &chain);
            } else {
                self.emit(FileEntry::file(item.path, item.relative));
            }
        }
    }

    /// Queue the children of `dir` so they pop in file-name order.
    fn push_children(
        &mut self,
        stack: &mut Vec<Pending>,
        dir: &Path,
        prefix: &str,
        chain: &Rc<Vec<PathBuf>>,
    ) {
        let mut names: Vec<_> = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name())
                .collect(),
            Err(e) => {
                self.warn(format!("Cannot read {}: {}", prefix, e));
                return;
            }
        };
        names.sort();

        for name in names.into_iter().rev() {
            stack.push(Pending {
                path: dir.join(&name),
                relative: format!("{}/{}", prefix, name.to_string_lossy()),
                chain: Rc::clone(chain),
            });
        }
    }

    fn collect_mcp_servers(&mut self, secrets_file: &Path) {
        let extraction = extract_mcp_servers(secrets_file);

        if !extraction.warnings.is_empty() {
            warn!("MCP servers with paths that may not work on remote:");
            for warning in &extraction.warnings {
                warn!("  {}", warning);
            }
            self.warnings.extend(extraction.warnings.iter().cloned());
        }

        if !extraction.has_servers() {
            return;
        }

        if let Some(document) = extraction.to_document() {
            self.emit(FileEntry::inline(secrets_file, SECRETS_SENTINEL, document));
        }
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn extend_chain(chain: &Rc<Vec<PathBuf>>, dir: PathBuf) -> Rc<Vec<PathBuf>> {
    let mut next = Vec::with_capacity(chain.len() + 1);
    next.extend(chain.iter().cloned());
    next.push(dir);
    Rc::new(next)
}
