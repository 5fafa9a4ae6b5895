/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::Config;
use crate::live::{CallSite, Session};
use crate::parser::{Node, NodeKind, PLACEHOLDER, parse_and_locate};
use crate::path::{self, PathCompleter, SEPARATOR};

/// Identifiers worth trying to load as a module
static MODULE_SPECIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$.-]*$").expect("valid regex"));

/// Candidates for the text under the cursor.
///
/// `completions` hold only what would be inserted after
/// `original_substring`. A non-fillable result is a single usage hint to
/// display, not text to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub completions: Vec<String>,
    pub original_substring: String,
    pub fillable: bool,
}

impl Completion {
    fn fillable(completions: Vec<String>, original_substring: &str) -> Self {
        Self {
            completions,
            original_substring: original_substring.to_string(),
            fillable: true,
        }
    }

    fn hint(hint: String) -> Self {
        Self {
            completions: vec![hint],
            original_substring: String::new(),
            fillable: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionContext {
    /// The full line being edited
    pub line: String,
    /// Cursor byte offset, always on a char boundary within `line`
    pub point: usize,
}

impl CompletionContext {
    /// Clamps `cursor` into the line; `None` means the end of the line
    pub fn new(line: &str, cursor: Option<usize>) -> Self {
        let mut point = cursor.unwrap_or(line.len()).min(line.len());
        while !line.is_char_boundary(point) {
            point -= 1;
        }
        Self {
            line: line.to_string(),
            point,
        }
    }
}

/// Completion engine for script lines
pub struct Completer {
    session: Session,
    paths: PathCompleter,
    config: Config,
}

impl Completer {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            paths: PathCompleter::current(),
            config: Config::default(),
        }
    }

    pub fn with_config(session: Session, config: Config) -> Self {
        let paths = match &config.cwd {
            Some(dir) => PathCompleter::new(dir),
            None => PathCompleter::current(),
        };
        Self {
            session,
            paths,
            config,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Completes `source` at `cursor` (the end of the source when `None`).
    ///
    /// Returns `None` when there is nothing sensible to offer. Failures of
    /// the live environment are logged and treated the same way.
    pub async fn complete(&self, source: &str, cursor: Option<usize>) -> Option<Completion> {
        if source.is_empty() {
            let names = self.global_names().await?;
            return Some(Completion::fillable(finish(names, "", true), ""));
        }

        let context = CompletionContext::new(source, cursor);
        let Some(node) = parse_and_locate(source, context.point) else {
            debug!(point = context.point, "no enclosing node, completing globals");
            return self.complete_globals("").await;
        };

        debug!(
            kind = node.kind_name(),
            start = node.start(),
            end = node.end(),
            point = context.point,
            backend = self.session.backend_name(),
            "completing"
        );

        match &node.kind {
            NodeKind::StringLiteral { value, raw } => {
                self.complete_string(&node, value, raw, &context)
            }
            NodeKind::Identifier { name } => self.complete_identifier(&node, name, &context).await,
            NodeKind::Member {
                object,
                property,
                computed,
                ..
            } => {
                if *computed {
                    return None;
                }
                self.complete_property(object, property, &context).await
            }
            NodeKind::Call { callee, .. } => self.complete_call(&node, callee, &context).await,
            _ => None,
        }
    }

    fn complete_string(
        &self,
        node: &Node,
        value: &str,
        raw: &str,
        context: &CompletionContext,
    ) -> Option<Completion> {
        let closed = is_completed_string(raw);
        if context.point == node.start() && closed {
            return None;
        }
        if context.point == node.end() && closed {
            return None;
        }

        let typed = if context.point == node.start() + 1 {
            ""
        } else {
            value
        };
        let item_path = path::normalize_current(typed);
        let matching = self.paths.complete(&item_path);
        let trailing = if item_path.ends_with(SEPARATOR) {
            ""
        } else {
            path::basename(&item_path)
        };

        trace!(%item_path, candidates = matching.len(), "path strategy");
        Some(Completion::fillable(
            finish(matching, &item_path, false),
            trailing,
        ))
    }

    async fn complete_identifier(
        &self,
        node: &Node,
        name: &str,
        context: &CompletionContext,
    ) -> Option<Completion> {
        if node.is_placeholder() {
            return self.complete_globals("").await;
        }

        let typed = context.point.saturating_sub(node.start());
        let prefix = name.get(..typed).unwrap_or(name);

        if self.config.load_modules && MODULE_SPECIFIER.is_match(name) {
            self.load_module(name).await;
        }
        self.complete_globals(prefix).await
    }

    async fn complete_globals(&self, prefix: &str) -> Option<Completion> {
        let names = self.global_names().await?;
        let completions = finish(names, prefix, true);
        trace!(prefix, candidates = completions.len(), "identifier strategy");
        if completions.is_empty() {
            return None;
        }
        Some(Completion::fillable(completions, prefix))
    }

    async fn complete_property(
        &self,
        object: &Node,
        property: &Node,
        context: &CompletionContext,
    ) -> Option<Completion> {
        let expression = object.source_text(&context.line);
        let evaluation = match self.session.evaluate(expression, true).await {
            Ok(evaluation) => evaluation,
            Err(err) => {
                debug!(%err, expression, "evaluation failed");
                return None;
            }
        };

        let typed = match &property.kind {
            NodeKind::Identifier { name } if name != PLACEHOLDER => {
                let length = context.point.saturating_sub(property.start());
                name.get(..length).unwrap_or(name)
            }
            _ => "",
        };

        if evaluation.threw() {
            trace!(expression, "object expression threw");
            return Some(Completion::fillable(Vec::new(), typed));
        }

        let names = match &evaluation.result.object_id {
            Some(object_id) => match self.session.properties(object_id).await {
                Ok(properties) => properties.into_iter().map(|p| p.name).collect(),
                Err(err) => {
                    debug!(%err, %object_id, "listing properties failed");
                    return None;
                }
            },
            None => Vec::new(),
        };

        let completions = finish(names, typed, true);
        trace!(expression, typed, candidates = completions.len(), "property strategy");
        Some(Completion::fillable(completions, typed))
    }

    async fn complete_call(
        &self,
        node: &Node,
        callee: &Node,
        context: &CompletionContext,
    ) -> Option<Completion> {
        let source = context.line.as_str();
        if callee.is_placeholder()
            || source.get(..node.end()).is_some_and(|text| text.ends_with(')'))
        {
            return None;
        }

        let expression = callee.source_text(source);
        let evaluation = match self.session.evaluate(expression, true).await {
            Ok(evaluation) if !evaluation.threw() => evaluation,
            Ok(_) => return None,
            Err(err) => {
                debug!(%err, expression, "evaluation failed");
                return None;
            }
        };

        let call_site = CallSite::from_call(node, source, context.point)?;
        let hint = match self
            .session
            .invoke_hint(&evaluation.result, &call_site, source)
            .await
        {
            Ok(hint) => hint,
            Err(err) => {
                debug!(%err, expression, "hint lookup failed");
                return None;
            }
        };

        // An empty hint has nothing to show
        hint.as_str()
            .filter(|hint| !hint.is_empty())
            .map(|hint| Completion::hint(hint.to_string()))
    }

    /// Best effort: tries `<cwd>/<module_dir>/<name>` before `name`
    async fn load_module(&self, name: &str) {
        let local = self
            .config
            .base_dir()
            .join(&self.config.module_dir)
            .join(name);
        let candidates = [local.to_string_lossy().into_owned(), name.to_string()];

        for specifier in &candidates {
            match self.session.load_module(specifier).await {
                Ok(evaluation) if !evaluation.threw() && evaluation.result.is_object() => {
                    trace!(%specifier, "module loaded");
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(%err, %specifier, "module loading failed");
                    return;
                }
            }
        }
    }

    async fn global_names(&self) -> Option<Vec<String>> {
        match self.session.global_names().await {
            Ok(names) => Some(names),
            Err(err) => {
                debug!(%err, "listing globals failed");
                None
            }
        }
    }
}

/// True when `raw` opens and closes with the same quote character
pub fn is_completed_string(raw: &str) -> bool {
    let mut chars = raw.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => matches!(first, '\'' | '"' | '`') && first == last,
        _ => false,
    }
}

/// Keeps the candidates starting with `prefix` and strips it. Empty
/// results and duplicates are dropped, the first occurrence wins.
pub fn remove_prefix<I>(candidates: I, prefix: &str) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = FxHashSet::default();
    candidates
        .into_iter()
        .filter_map(|candidate| candidate.strip_prefix(prefix).map(str::to_string))
        .filter(|suffix| !suffix.is_empty() && seen.insert(suffix.clone()))
        .collect()
}

fn finish(candidates: Vec<String>, prefix: &str, sort: bool) -> Vec<String> {
    let mut completions = remove_prefix(candidates, prefix);
    if sort {
        completions.sort();
    }
    completions
}
