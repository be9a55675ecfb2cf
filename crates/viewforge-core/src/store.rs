//! Template lookup on disk.
//!
//! A logical name is resolved against an ordered list of candidate files built
//! from the render's site and language, most specific first. Inline sources
//! short-circuit the search entirely.
//!
//! For a root `views`, site `shop`, language `en`, shared folder `shared` and
//! the name `home`, a body lookup tries, in order:
//!
//! ```text
//! views/shop/en/home.html        views/shop/en/home/index.html
//! views/en/home.html             views/en/home/index.html
//! views/en/shared/home.html      views/en/shared/home/index.html
//! views/shop/home.html           views/shop/home/index.html
//! views/shop/shared/home.html    views/shop/shared/home/index.html
//! views/shared/home.html         views/shared/home/index.html
//! views/home.html                views/home/index.html
//! ```
//!
//! Layout lookups use the same directories without the `index.html` probes.
//! Partial (`render`) lookups first try the directory of the body template and
//! `views/shop/en/shared` before falling through to the same order.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ViewConfig;
use crate::error::{Result, ViewError};
use crate::request::ViewSource;

/// Extension appended to every logical template name
pub const TEMPLATE_EXTENSION: &str = "html";

/// Which pass a lookup is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveKind {
    Layout,
    Body,
    Render,
}

impl ResolveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveKind::Layout => "layout",
            ResolveKind::Body => "body",
            ResolveKind::Render => "render",
        }
    }
}

impl fmt::Display for ResolveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolveKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "layout" => Ok(ResolveKind::Layout),
            "body" | "view" => Ok(ResolveKind::Body),
            "render" | "partial" => Ok(ResolveKind::Render),
            other => Err(format!("unknown resolve kind '{other}'")),
        }
    }
}

/// Template source ready to be compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTemplate {
    /// Name the template is compiled under
    pub identifier: String,
    /// Raw template text
    pub source: String,
    /// File the source was read from, `None` for inline sources
    pub path: Option<PathBuf>,
}

impl LoadedTemplate {
    /// Directory holding the template file
    pub fn directory(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }
}

/// Resolves logical template names for one site/language scope
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
    shared: String,
    site: Option<String>,
    language: String,
}

impl TemplateStore {
    pub fn new(
        root: impl Into<PathBuf>,
        shared: impl Into<String>,
        site: Option<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            shared: shared.into(),
            site: site.filter(|s| !s.is_empty()),
            language: language.into(),
        }
    }

    /// Store for the given configuration and request scope
    pub fn from_config(config: &ViewConfig, site: Option<&str>, language: &str) -> Self {
        Self::new(
            config.root.clone(),
            config.shared.clone(),
            site.map(str::to_string),
            language,
        )
    }

    /// Identifier used for the compiled form of a file
    pub fn identifier_for(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Ordered candidate files for `name`, most specific first
    pub fn candidates(&self, kind: ResolveKind, name: &str, search_dir: Option<&Path>) -> Vec<PathBuf> {
        let root = &self.root;
        let shared = self.shared.as_str();
        let site = self.site.as_deref();
        let language = Some(self.language.as_str()).filter(|l| !l.is_empty());

        let mut dirs: Vec<PathBuf> = Vec::new();
        if kind == ResolveKind::Render {
            if let Some(dir) = search_dir {
                dirs.push(dir.to_path_buf());
            }
            if let (Some(site), Some(language)) = (site, language) {
                dirs.push(root.join(site).join(language).join(shared));
            }
        }
        if let (Some(site), Some(language)) = (site, language) {
            dirs.push(root.join(site).join(language));
        }
        if let Some(language) = language {
            dirs.push(root.join(language));
            dirs.push(root.join(language).join(shared));
        }
        if let Some(site) = site {
            dirs.push(root.join(site));
            dirs.push(root.join(site).join(shared));
        }
        dirs.push(root.join(shared));
        dirs.push(root.clone());

        let file_name = format!("{name}.{TEMPLATE_EXTENSION}");
        let index_name = format!("index.{TEMPLATE_EXTENSION}");
        let mut candidates: Vec<PathBuf> = Vec::with_capacity(dirs.len() * 2);
        for dir in dirs {
            let mut push = |path: PathBuf| {
                if !candidates.contains(&path) {
                    candidates.push(path);
                }
            };
            push(dir.join(&file_name));
            if kind == ResolveKind::Body {
                push(dir.join(name).join(&index_name));
            }
        }
        candidates
    }

    /// First existing, non-directory candidate for `name`
    pub fn locate(&self, kind: ResolveKind, name: &str, search_dir: Option<&Path>) -> Result<PathBuf> {
        let not_found = || ViewError::TemplateNotFound {
            name: name.to_string(),
            kind,
        };

        if name.is_empty() || !is_relative_name(name) {
            warn!("Rejected {} template name '{}'", kind, name);
            return Err(not_found());
        }

        for candidate in self.candidates(kind, name, search_dir) {
            match std::fs::metadata(&candidate) {
                Ok(meta) if !meta.is_dir() => {
                    debug!("Resolved {} template '{}' to {}", kind, name, candidate.display());
                    return Ok(candidate);
                }
                _ => continue,
            }
        }

        debug!("No candidate matched {} template '{}'", kind, name);
        Err(not_found())
    }

    /// Load the source for a view, searching the file system for file references
    pub fn resolve(
        &self,
        kind: ResolveKind,
        source: &ViewSource,
        search_dir: Option<&Path>,
    ) -> Result<LoadedTemplate> {
        match source {
            ViewSource::Inline(text) => Ok(LoadedTemplate {
                identifier: inline_identifier(kind, text),
                source: text.clone(),
                path: None,
            }),
            ViewSource::File(name) => {
                let path = self.locate(kind, name, search_dir)?;
                let source = std::fs::read_to_string(&path)?;
                Ok(LoadedTemplate {
                    identifier: Self::identifier_for(&path),
                    source,
                    path: Some(path),
                })
            }
        }
    }
}

/// Identifier for an inline source, derived from its text so repeated
/// renders of the same source share one compiled template. The `.html` suffix
/// keeps Tera's autoescaping on.
fn inline_identifier(kind: ResolveKind, source: &str) -> String {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, source.as_bytes());
    format!("inline/{kind}-{digest}.{TEMPLATE_EXTENSION}")
}

/// Names must stay below the directory they are joined to
fn is_relative_name(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store(root: &Path, site: Option<&str>) -> TemplateStore {
        TemplateStore::new(root, "shared", site.map(str::to_string), "en")
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn relative(root: &Path, paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_body_candidate_order_with_site() {
        let root = Path::new("/views");
        let candidates = store(root, Some("shop")).candidates(ResolveKind::Body, "home", None);
        assert_eq!(
            relative(root, candidates),
            vec![
                "shop/en/home.html",
                "shop/en/home/index.html",
                "en/home.html",
                "en/home/index.html",
                "en/shared/home.html",
                "en/shared/home/index.html",
                "shop/home.html",
                "shop/home/index.html",
                "shop/shared/home.html",
                "shop/shared/home/index.html",
                "shared/home.html",
                "shared/home/index.html",
                "home.html",
                "home/index.html",
            ]
        );
    }

    #[test]
    fn test_layout_candidate_order_without_site() {
        let root = Path::new("/views");
        let candidates = store(root, None).candidates(ResolveKind::Layout, "main", None);
        assert_eq!(
            relative(root, candidates),
            vec![
                "en/main.html",
                "en/shared/main.html",
                "shared/main.html",
                "main.html",
            ]
        );
    }

    #[test]
    fn test_render_candidates_start_with_search_dir() {
        let root = Path::new("/views");
        let search_dir = root.join("shop/en/users");
        let candidates =
            store(root, Some("shop")).candidates(ResolveKind::Render, "card", Some(&search_dir));
        assert_eq!(
            relative(root, candidates),
            vec![
                "shop/en/users/card.html",
                "shop/en/shared/card.html",
                "shop/en/card.html",
                "en/card.html",
                "en/shared/card.html",
                "shop/card.html",
                "shop/shared/card.html",
                "shared/card.html",
                "card.html",
            ]
        );
    }

    #[test]
    fn test_search_dir_ignored_outside_render() {
        let root = Path::new("/views");
        let search_dir = root.join("en/users");
        let candidates = store(root, None).candidates(ResolveKind::Layout, "main", Some(&search_dir));
        assert!(!candidates.contains(&search_dir.join("main.html")));
    }

    #[test]
    fn test_empty_language_skips_language_scopes() {
        let root = Path::new("/views");
        let store = TemplateStore::new(root, "shared", None, "");
        let candidates = store.candidates(ResolveKind::Layout, "main", None);
        assert_eq!(relative(root, candidates), vec!["shared/main.html", "main.html"]);
    }

    #[test]
    fn test_more_specific_candidate_wins() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "home.html", "root");
        write(dir.path(), "en/home.html", "language");
        write(dir.path(), "shop/en/home.html", "site-language");

        let loaded = store(dir.path(), Some("shop"))
            .resolve(ResolveKind::Body, &ViewSource::File("home".into()), None)
            .unwrap();
        assert_eq!(loaded.source, "site-language");

        let loaded = store(dir.path(), None)
            .resolve(ResolveKind::Body, &ViewSource::File("home".into()), None)
            .unwrap();
        assert_eq!(loaded.source, "language");
    }

    #[test]
    fn test_directory_candidates_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("en/main.html")).unwrap();
        write(dir.path(), "shared/main.html", "shared layout");

        let loaded = store(dir.path(), None)
            .resolve(ResolveKind::Layout, &ViewSource::File("main".into()), None)
            .unwrap();
        assert_eq!(loaded.source, "shared layout");
    }

    #[test]
    fn test_body_resolves_folder_index() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "en/users/index.html", "users index");

        let loaded = store(dir.path(), None)
            .resolve(ResolveKind::Body, &ViewSource::File("users".into()), None)
            .unwrap();
        assert_eq!(loaded.source, "users index");
        assert_eq!(loaded.directory(), Some(dir.path().join("en/users").as_path()));
    }

    #[test]
    fn test_missing_template_reports_name_and_kind() {
        let dir = TempDir::new().unwrap();
        let err = store(dir.path(), None)
            .resolve(ResolveKind::Render, &ViewSource::File("nope".into()), None)
            .unwrap_err();
        match err {
            ViewError::TemplateNotFound { name, kind } => {
                assert_eq!(name, "nope");
                assert_eq!(kind, ResolveKind::Render);
            }
            other => panic!("Expected TemplateNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_inline_source_skips_file_system() {
        let store = store(Path::new("/definitely/not/here"), Some("shop"));
        let loaded = store
            .resolve(ResolveKind::Body, &ViewSource::Inline("<p>\n</p>".into()), None)
            .unwrap();
        assert!(loaded.identifier.starts_with("inline/body-"));
        assert!(loaded.identifier.ends_with(".html"));
        assert_eq!(loaded.source, "<p>\n</p>");
        assert!(loaded.path.is_none());
    }

    #[test]
    fn test_inline_identifiers_follow_source_text() {
        let store = store(Path::new("/views"), None);
        let source = ViewSource::Inline("a\nb".into());
        let first = store.resolve(ResolveKind::Render, &source, None).unwrap();
        let second = store.resolve(ResolveKind::Render, &source, None).unwrap();
        let other = store
            .resolve(ResolveKind::Render, &ViewSource::Inline("a\nc".into()), None)
            .unwrap();
        assert_eq!(first.identifier, second.identifier);
        assert_ne!(first.identifier, other.identifier);
    }

    #[test]
    fn test_parent_components_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "secret.html", "secret");
        let views = dir.path().join("views");
        fs::create_dir_all(&views).unwrap();

        let err = store(&views, None)
            .locate(ResolveKind::Render, "../secret", None)
            .unwrap_err();
        assert!(matches!(err, ViewError::TemplateNotFound { .. }));
    }

    #[test]
    fn test_resolve_kind_from_str() {
        assert_eq!("layout".parse::<ResolveKind>().unwrap(), ResolveKind::Layout);
        assert_eq!("Body".parse::<ResolveKind>().unwrap(), ResolveKind::Body);
        assert_eq!("partial".parse::<ResolveKind>().unwrap(), ResolveKind::Render);
        assert!("other".parse::<ResolveKind>().is_err());
    }
}
