//! Asynchronous tree-walking renderer.
//!
//! Rendering is single-threaded: every collaborator (loader, `get` lookups,
//! item streams) may suspend, but chunks, call arguments and literal
//! elements are always evaluated strictly left to right.

mod expr;
mod scope;
pub mod stream;
pub mod value;

pub use scope::{Frame, Scope};
pub use stream::{ArrayStream, ChannelStream, EmitError, Emitter, Item, ItemStream, ProtocolViolation, channel};
pub use value::{Callable, Iterable, Lookup, Value};

use crate::ast::{Chunk, ChunkKind, DEFAULT_EACH_BINDINGS, Template};
use crate::error::{BoxError, ErrorKind, RenderError, StackFrame};
use crate::html::escape_html;
use crate::loader::{Loader, MemoryCache, TemplateCache};
use crate::parser::{ParseOptions, Parser, Span, TemplateParser};
use crate::transform::{DependencyPlugin, Transformer};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use std::collections::HashSet;
use std::future::Future;
use std::panic::Location;
use std::rc::Rc;
use tracing::{Instrument, debug, trace};

/// Configuration for a [`Renderer`].
#[derive(Clone)]
pub struct RenderOptions {
    /// Prefix for template paths in error stacks
    pub template_root: String,
    /// Keep source positions in parsed templates (needed for error stacks)
    pub embed_positions: bool,
    /// Shared parsed-template cache; a fresh one per renderer when unset
    pub cache: Option<Rc<dyn TemplateCache>>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            template_root: String::new(),
            embed_positions: true,
            cache: None,
        }
    }
}

impl RenderOptions {
    pub fn template_root(mut self, root: impl Into<String>) -> Self {
        self.template_root = root.into();
        self
    }

    pub fn embed_positions(mut self, embed_positions: bool) -> Self {
        self.embed_positions = embed_positions;
        self
    }

    pub fn cache(mut self, cache: Rc<dyn TemplateCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Renders templates obtained from a [`Loader`]
pub struct Renderer {
    loader: Rc<dyn Loader>,
    cache: Rc<dyn TemplateCache>,
    template_root: String,
    parse_options: ParseOptions,
}

impl Renderer {
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self::with_options(loader, RenderOptions::default())
    }

    pub fn with_options(loader: impl Loader + 'static, options: RenderOptions) -> Self {
        Self {
            loader: Rc::new(loader),
            cache: options.cache.unwrap_or_else(|| Rc::new(MemoryCache::new())),
            template_root: options.template_root,
            parse_options: ParseOptions::default().with_positions(options.embed_positions),
        }
    }

    pub fn cache(&self) -> &Rc<dyn TemplateCache> {
        &self.cache
    }

    /// Render the template `name` against `data`.
    ///
    /// Errors carry the template stack and the call site of this method.
    #[track_caller]
    pub fn render<'a>(&'a self, name: &'a str, data: Value) -> impl Future<Output = Result<String, RenderError>> + 'a {
        let caller = Location::caller();
        let session = Session {
            renderer: self,
            invocation: format!("{}:{}:{}", caller.file(), caller.line(), caller.column()),
        };
        let span = tracing::debug_span!("render", template = name);
        async move {
            let scope = Scope::root(Frame::template(name, data));
            session.render_template(name, &scope).await
        }
        .instrument(span)
    }

    /// Load `name` and every template it statically depends on into the cache.
    ///
    /// Returns the number of templates visited.
    #[track_caller]
    pub fn preload<'a>(&'a self, name: &'a str) -> impl Future<Output = Result<usize, RenderError>> + 'a {
        let caller = Location::caller();
        let session = Session {
            renderer: self,
            invocation: format!("{}:{}:{}", caller.file(), caller.line(), caller.column()),
        };
        async move {
            let mut seen = HashSet::new();
            let mut queue = vec![name.to_string()];
            while let Some(name) = queue.pop() {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let scope = Scope::root(Frame::template(&name, Value::Undefined));
                let template = session.load(&name, &scope).await?;
                let mut transformer = Transformer::new().add(DependencyPlugin);
                let metadata = transformer.transform(&template);
                debug!(template = %name, dependencies = ?metadata.dependencies(), "preloaded");
                queue.extend(metadata.dependencies().into_iter().rev().map(str::to_string));
            }
            Ok(seen.len())
        }
    }

    fn template_path(&self, name: &str) -> String {
        let root = self.template_root.trim_end_matches('/');
        if root.is_empty() { name.to_string() } else { format!("{}/{}", root, name) }
    }
}

/// State of one top-level render call
struct Session<'r> {
    renderer: &'r Renderer,
    invocation: String,
}

impl Session<'_> {
    async fn load(&self, name: &str, scope: &Scope<'_>) -> Result<Rc<Template>, RenderError> {
        let cache = &self.renderer.cache;
        if let Some(template) = cache.get(name) {
            debug!(template = name, "template cache hit");
            return Ok(template);
        }
        debug!(template = name, "loading template");
        let source = match self.renderer.loader.load(name).await {
            Ok(source) => source,
            Err(cause) => {
                let message = format!("cannot load template {}. {}", name, cause);
                return Err(self.error(scope, ErrorKind::TemplateLoad, message).with_source(cause));
            }
        };
        let parser = TemplateParser::with_options(self.renderer.parse_options);
        let template = match parser.parse(&source) {
            Ok(template) => Rc::new(template),
            Err(err) => {
                scope.frame.save_token(Some(err.span));
                let message = format!("template parse error: {}", err.message);
                return Err(self.error(scope, err.kind, message).with_source(Box::new(err)));
            }
        };
        cache.insert(name, template.clone());
        Ok(template)
    }

    /// Render a whole template in `scope`, then any layout it declared
    fn render_template<'a>(&'a self, name: &'a str, scope: &'a Scope<'a>) -> LocalBoxFuture<'a, Result<String, RenderError>> {
        async move {
            let template = self.load(name, scope).await?;
            let mut out = String::new();
            self.render_chunks(&template.chunks, scope, &mut out).await?;

            let Some((layout, origin)) = scope.frame.take_layout() else {
                return Ok(out);
            };
            debug!(template = name, layout = %layout, "applying layout");
            let frame = Frame::template(&layout, scope.frame.data.clone()).with_local("body", Value::String(out));
            let child = scope.child(frame, origin);
            self.render_template(&layout, &child).await
        }
        .boxed_local()
    }

    fn render_chunks<'a>(
        &'a self,
        chunks: &'a [Chunk],
        scope: &'a Scope<'a>,
        out: &'a mut String,
    ) -> LocalBoxFuture<'a, Result<(), RenderError>> {
        async move {
            for chunk in chunks {
                trace!(chunk = chunk.kind.name(), "render chunk");
                scope.frame.save_token(chunk.span);
                self.render_chunk(chunk, scope, out).await?;
            }
            Ok(())
        }
        .boxed_local()
    }

    async fn render_chunk(&self, chunk: &Chunk, scope: &Scope<'_>, out: &mut String) -> Result<(), RenderError> {
        match &chunk.kind {
            ChunkKind::Html(text) => out.push_str(text),
            ChunkKind::Echo(expr) => {
                let value = self.evaluate(expr, scope).await?;
                if !value.is_undefined() {
                    out.push_str(&escape_html(&value.to_display_string()));
                }
            }
            ChunkKind::RawHtml(expr) => {
                let value = self.evaluate(expr, scope).await?;
                if !value.is_undefined() {
                    out.push_str(&value.to_display_string());
                }
            }
            ChunkKind::Include { args, name } => {
                // Every argument is evaluated, the first one is the data
                let mut data = None;
                for arg in args.iter().flatten() {
                    let value = self.evaluate(arg, scope).await?;
                    data.get_or_insert(value);
                }
                let data = data.unwrap_or_else(|| Value::object::<String>([]));
                let name = match self.evaluate(name, scope).await? {
                    Value::String(name) => name,
                    other => {
                        let message = format!("{{{{tmpl}}}} template name must be a string, got {}", other.type_of());
                        return Err(self.error(scope, ErrorKind::InvalidTemplateName, message));
                    }
                };
                let child = scope.child(Frame::template(&name, data), chunk.span);
                out.push_str(&self.render_template(&name, &child).await?);
            }
            ChunkKind::Each { bindings, collection, body } => {
                let binding = |i: usize| {
                    bindings
                        .as_ref()
                        .and_then(|names| names.get(i))
                        .map_or(DEFAULT_EACH_BINDINGS[i], String::as_str)
                };
                let value = self.evaluate(collection, scope).await?;
                let mut stream = self.iterate(value, scope)?;
                let mut index = 0usize;
                while let Some(item) = stream.next_item().await.map_err(|e| self.collaborator_error(scope, e))? {
                    let position = Value::Number(index as f64);
                    let key = item.key.unwrap_or_else(|| position.clone());
                    let frame = Frame::item(item.value.clone())
                        .with_local(binding(0), position)
                        .with_local(binding(1), item.value)
                        .with_local(binding(2), key);
                    let child = scope.child(frame, chunk.span);
                    self.render_chunks(body, &child, out).await?;
                    index += 1;
                }
            }
            ChunkKind::If { condition, then_branch, elif_branches, else_branch } => {
                if self.evaluate(condition, scope).await?.truthy() {
                    return self.render_chunks(then_branch, scope, out).await;
                }
                for (condition, branch) in elif_branches {
                    if self.evaluate(condition, scope).await?.truthy() {
                        return self.render_chunks(branch, scope, out).await;
                    }
                }
                if let Some(branch) = else_branch {
                    self.render_chunks(branch, scope, out).await?;
                }
            }
            ChunkKind::Layout(expr) => {
                let name = match self.evaluate(expr, scope).await? {
                    Value::String(name) => name,
                    other => {
                        let message = format!("{{{{layout}}}} template must be a string, got {}", other.type_of());
                        return Err(self.error(scope, ErrorKind::InvalidTemplateName, message));
                    }
                };
                if let Some(frame) = scope.template_frame() {
                    frame.set_layout(name, chunk.span);
                }
            }
            ChunkKind::Var(defs) => {
                for def in defs {
                    let value = match &def.value {
                        Some(expr) => self.evaluate(expr, scope).await?,
                        None => Value::Undefined,
                    };
                    scope.frame.set_local(&def.name, value);
                }
            }
        }
        Ok(())
    }

    /// Adapt a collection value to the pull protocol
    fn iterate(&self, value: Value, scope: &Scope<'_>) -> Result<Box<dyn ItemStream>, RenderError> {
        let value = match value {
            Value::Function(factory) => factory.call(&[]).map_err(|e| self.collaborator_error(scope, e))?,
            other => other,
        };
        match value {
            Value::Array(items) => Ok(Box::new(ArrayStream::new(items))),
            Value::Iterable(iterable) => Ok(iterable.iterator()),
            Value::Stream(slot) => slot.take().ok_or_else(|| {
                self.error(scope, ErrorKind::NotIterable, "cannot iterate over a stream that was already consumed")
            }),
            other => {
                let message = format!("cannot iterate over {}", other.type_of());
                Err(self.error(scope, ErrorKind::NotIterable, message))
            }
        }
    }

    /// Wrap a failure reported by data-provided code
    fn collaborator_error(&self, scope: &Scope<'_>, cause: BoxError) -> RenderError {
        let kind = if cause.downcast_ref::<ProtocolViolation>().is_some() {
            ErrorKind::ProtocolViolation
        } else {
            ErrorKind::Collaborator
        };
        self.error(scope, kind, cause.to_string()).with_source(cause)
    }

    fn error(&self, scope: &Scope<'_>, kind: ErrorKind, message: impl Into<String>) -> RenderError {
        RenderError::new(kind, message)
            .with_span(scope.frame.last_token())
            .with_stack(self.stack(scope))
            .with_invocation(self.invocation.clone())
    }

    /// Template stack, innermost first
    fn stack(&self, scope: &Scope<'_>) -> Vec<StackFrame> {
        let chain: Vec<&Scope<'_>> = scope.chain().collect();
        let mut frames = Vec::new();
        for (i, current) in chain.iter().enumerate() {
            let position: Option<Span> = match i {
                0 => current.frame.last_token(),
                _ => match chain[i - 1].origin() {
                    Some(origin) => Some(origin),
                    None => continue,
                },
            };
            let template = chain[i..]
                .iter()
                .find_map(|s| s.frame.template_name())
                .unwrap_or("(unknown)")
                .to_string();
            frames.push(StackFrame {
                path: self.renderer.template_path(&template),
                template,
                position: position.map(|span| (span.start.line + 1, span.start.col + 1)),
            });
        }
        frames
    }
}
