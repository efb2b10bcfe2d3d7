//! Template sources and the parsed-template cache.

use crate::ast::Template;
use crate::error::BoxError;
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

/// Resolves a template name to its source text
pub trait Loader {
    fn load<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<String, BoxError>>;
}

/// Parsed templates shared between renders.
///
/// Entries are immutable, so two renders racing to fill the same name
/// only cost a redundant parse.
pub trait TemplateCache {
    fn get(&self, name: &str) -> Option<Rc<Template>>;
    fn insert(&self, name: &str, template: Rc<Template>);
}

/// Unbounded in-memory cache
#[derive(Default)]
pub struct MemoryCache {
    templates: RefCell<HashMap<String, Rc<Template>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.templates.borrow_mut().clear();
    }
}

impl TemplateCache for MemoryCache {
    fn get(&self, name: &str) -> Option<Rc<Template>> {
        self.templates.borrow().get(name).cloned()
    }

    fn insert(&self, name: &str, template: Rc<Template>) {
        self.templates.borrow_mut().insert(name.to_string(), template);
    }
}

/// Loads templates from a directory
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a template, refusing names that would leave the root
    pub fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid template name '{}'", name),
            ));
        }
        Ok(self.root.join(relative))
    }

    /// Names of all templates under the root with the given extension, sorted
    pub fn template_names(&self, extension: &str) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
            .filter_map(|e| {
                let relative = e.path().strip_prefix(&self.root).ok()?;
                let parts: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                Some(parts.join("/"))
            })
            .collect();
        names.sort();
        names
    }
}

impl Loader for FsLoader {
    fn load<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<String, BoxError>> {
        async move {
            let path = self.resolve(name)?;
            let source = tokio::fs::read_to_string(&path).await?;
            Ok(source)
        }
        .boxed_local()
    }
}

/// Templates held in memory, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl Loader for MemoryLoader {
    fn load<'a>(&'a self, name: &'a str) -> LocalBoxFuture<'a, Result<String, BoxError>> {
        let result: Result<String, BoxError> = match self.templates.get(name) {
            Some(source) => Ok(source.clone()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("no template named '{}'", name)).into()),
        };
        async move { result }.boxed_local()
    }
}
