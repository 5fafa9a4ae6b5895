/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use nesh::completion::{Completer, Completion};
use nesh::config::Config;
use nesh::error::EnvError;
use nesh::live::memory::MemoryEnvironment;
use nesh::live::{
    CallSite, Evaluation, LiveEnvironment, PropertyDescriptor, RemoteObject, Session,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn fillable(completions: &[&str], original_substring: &str) -> Option<Completion> {
    Some(Completion {
        completions: strings(completions),
        original_substring: original_substring.to_string(),
        fillable: true,
    })
}

fn hint(text: &str) -> Option<Completion> {
    Some(Completion {
        completions: vec![text.to_string()],
        original_substring: String::new(),
        fillable: false,
    })
}

/// Shell builtins plus an `fs` object and a `Date` constructor
fn environment() -> Arc<MemoryEnvironment> {
    let env = MemoryEnvironment::shell();

    let object_proto = env.create_object("Object");
    env.set_property(object_proto, "toString", env.create_function("toString"));

    let fs = env.create_object("Object");
    env.set_prototype(fs, object_proto);
    env.set_property(fs, "readFile", env.create_function("readFile"));
    env.set_property(fs, "readdir", env.create_function("readdir"));
    env.set_property(fs, "writeFile", env.create_function("writeFile"));
    env.set_property(fs, "sep", RemoteObject::string("/"));
    env.define_global("fs", fs);

    let date = env.create_function("Date");
    env.register_hint(date, "new Date(value)");
    env.define_global("Date", date);

    let untyped = env.create_function("untyped");
    env.define_global("untyped", untyped);

    Arc::new(env)
}

fn completer() -> Completer {
    Completer::new(environment())
}

/// .dire1/  dire1/{dire11/, dire12/, file11.md, file12.md}  dire2/  file1.md  file2.md
fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for sub in [".dire1", "dire1", "dire2", "dire1/dire11", "dire1/dire12"] {
        fs::create_dir(root.join(sub)).unwrap();
    }
    for file in ["dire1/file11.md", "dire1/file12.md", "file1.md", "file2.md"] {
        fs::write(root.join(file), "").unwrap();
    }
    dir
}

fn completer_in(dir: &TempDir, session: Session) -> Completer {
    let config = Config {
        cwd: Some(dir.path().to_path_buf()),
        ..Config::default()
    };
    Completer::with_config(session, config)
}

#[tokio::test]
async fn test_empty_source_lists_globals() {
    let completion = completer().complete("", None).await.unwrap();
    assert!(completion.fillable);
    assert_eq!(completion.original_substring, "");
    for name in ["cat", "cd", "ls", "fs", "Date"] {
        assert!(completion.completions.contains(&name.to_string()), "{name}");
    }
}

#[tokio::test]
async fn test_identifier_prefix() {
    let completion = completer().complete("c", None).await;
    assert_eq!(completion, fillable(&["at", "d", "hmod", "hown"], "c"));
}

#[tokio::test]
async fn test_identifier_cursor_inside_word() {
    let completion = completer().complete("chmod", Some(2)).await;
    assert_eq!(completion, fillable(&["mod", "own"], "ch"));
}

#[tokio::test]
async fn test_identifier_without_match_is_absent() {
    assert_eq!(completer().complete("zzz", None).await, None);
    // Fully typed name: nothing left to insert
    assert_eq!(completer().complete("pwd", None).await, None);
}

#[tokio::test]
async fn test_empty_prefix_lists_every_global() {
    let env = MemoryEnvironment::new();
    for name in ["ls", "cd", "util"] {
        env.define_global(name, RemoteObject::undefined());
    }
    let completer = Completer::new(Arc::new(env));

    for source in ["x = ", "ls(); ", "a + "] {
        let completion = completer.complete(source, None).await.unwrap();
        assert_eq!(completion.original_substring, "", "for {source:?}");
        for name in ["ls", "cd", "util"] {
            assert!(
                completion.completions.contains(&name.to_string()),
                "{name} missing for {source:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_identifier_loads_module() {
    let env = environment();
    let lodash = env.create_object("Object");
    env.register_module("lodash", lodash);
    let completer = Completer::new(env.clone());

    assert_eq!(completer.complete("lod", None).await, None);
    // Typing the full name loads the module as a side effect
    assert_eq!(completer.complete("lodash", None).await, None);
    assert_eq!(completer.complete("lod", None).await, fillable(&["ash"], "lod"));
}

#[tokio::test]
async fn test_identifier_prefers_local_module() {
    let dir = fixture();
    let env = environment();
    let local = env.create_object("Object");
    let specifier = format!("{}/node_modules/left", dir.path().display());
    env.register_module(&specifier, local);
    let completer = completer_in(&dir, env.clone());

    completer.complete("left", None).await;
    let evaluation = env.evaluate("left", true).await.unwrap();
    assert_eq!(evaluation.result.object_id, Some(local.object_id()));
}

#[tokio::test]
async fn test_module_loading_can_be_disabled() {
    let env = environment();
    env.register_module("lodash", env.create_object("Object"));
    let config = Config {
        load_modules: false,
        ..Config::default()
    };
    let completer = Completer::with_config(env.clone(), config);

    completer.complete("lodash", None).await;
    assert!(env.evaluate("lodash", true).await.unwrap().threw());
}

#[tokio::test]
async fn test_property_access() {
    let completer = completer();
    assert_eq!(
        completer.complete("fs.re", None).await,
        fillable(&["adFile", "addir"], "re")
    );
    assert_eq!(
        completer.complete("fs.", None).await,
        fillable(
            &["readFile", "readdir", "sep", "toString", "writeFile"],
            ""
        )
    );
}

#[tokio::test]
async fn test_property_cursor_inside_name() {
    let completion = completer().complete("fs.readFile", Some(5)).await;
    assert_eq!(completion, fillable(&["adFile", "addir"], "re"));
}

#[tokio::test]
async fn test_property_of_throwing_expression_is_empty() {
    let completion = completer().complete("nope.x", None).await;
    assert_eq!(completion, fillable(&[], "x"));
}

#[tokio::test]
async fn test_property_of_primitive_is_empty() {
    let completion = completer().complete("fs.sep.", None).await;
    assert_eq!(completion, fillable(&[], ""));
}

#[tokio::test]
async fn test_computed_member_is_absent() {
    assert_eq!(completer().complete("fs[0]", None).await, None);
}

#[tokio::test]
async fn test_call_hint() {
    let completer = completer();
    assert_eq!(completer.complete("ls(", None).await, hint("ls([path])"));
    assert_eq!(completer.complete("grep(", None).await, hint("grep(regex)"));
    assert_eq!(completer.complete("cp('a', ls(", None).await, hint("ls([path])"));
}

#[tokio::test]
async fn test_construct_hint() {
    assert_eq!(
        completer().complete("new Date(", None).await,
        hint("new Date(value)")
    );
}

#[tokio::test]
async fn test_closed_call_is_absent() {
    let completer = completer();
    for source in ["ls()", "ls('src')", "new Date()", "fs.readFile()"] {
        assert_eq!(completer.complete(source, None).await, None, "for {source:?}");
    }
}

#[tokio::test]
async fn test_call_without_hint_is_absent() {
    let completer = completer();
    assert_eq!(completer.complete("untyped(", None).await, None);
    assert_eq!(completer.complete("nope(", None).await, None);
}

#[tokio::test]
async fn test_call_hint_inside_blocks() {
    let completer = completer();
    for source in [
        "x => { ls(",
        "[1].forEach(x => { ls(",
        "function f() { ls(",
        "if (a) { ls(",
        "{ ls(",
        "for (const f of ls()) { ls(",
    ] {
        assert_eq!(completer.complete(source, None).await, hint("ls([path])"), "for {source:?}");
    }
}

#[tokio::test]
async fn test_property_inside_function_body() {
    let completer = completer();
    assert_eq!(
        completer.complete("function f() { fs.re", None).await,
        fillable(&["adFile", "addir"], "re")
    );
    assert_eq!(
        completer.complete("function f() { return fs.wr", None).await,
        fillable(&["iteFile"], "wr")
    );
}

#[tokio::test]
async fn test_empty_hint_is_absent() {
    let env = environment();
    let quiet = env.create_function("quiet");
    env.register_hint(quiet, "");
    env.define_global("quiet", quiet);
    let completer = Completer::new(env);
    assert_eq!(completer.complete("quiet(", None).await, None);
}

#[tokio::test]
async fn test_deeply_nested_input_falls_back_to_globals() {
    let completer = completer();
    for open in ["(", "[", "!", "ls("] {
        let source = open.repeat(100_000);
        let completion = completer.complete(&source, None).await.unwrap();
        assert_eq!(completion.original_substring, "", "for {open:?}");
        assert!(completion.completions.contains(&"ls".to_string()));
    }
}

#[tokio::test]
async fn test_string_literal_paths() {
    let dir = fixture();
    let completer = completer_in(&dir, environment());

    assert_eq!(
        completer.complete("ls('fil", None).await,
        fillable(&["e1.md", "e2.md"], "fil")
    );
    assert_eq!(
        completer.complete("ls('dire1/", None).await,
        fillable(&["dire11", "dire12", "file11.md", "file12.md"], "")
    );
    assert_eq!(
        completer.complete("cat(\"dire1/fi", None).await,
        fillable(&["le11.md", "le12.md"], "fi")
    );
    assert_eq!(
        completer.complete("ls('dire1", None).await,
        fillable(&["/"], "dire1")
    );
    assert_eq!(
        completer.complete("ls('file2.md/.", None).await,
        fillable(&[], ".")
    );
}

#[tokio::test]
async fn test_string_literal_boundaries() {
    let dir = fixture();
    let completer = completer_in(&dir, environment());
    let source = "ls('dire1'";

    // Before the opening quote of a closed string
    assert_eq!(completer.complete(source, Some(3)).await, None);
    // After the closing quote
    assert_eq!(completer.complete(source, Some(10)).await, None);
    // Right after the opening quote: nothing typed yet
    assert_eq!(
        completer.complete(source, Some(4)).await,
        fillable(&[".dire1", "dire1", "dire2", "file1.md", "file2.md"], "")
    );
}

#[tokio::test]
async fn test_completions_extend_prefix() {
    let dir = fixture();
    let completer = completer_in(&dir, environment());

    for source in ["", "c", "fs.", "fs.r", "ls('", "ls('d", "ls('dire1/", "x = "] {
        let Some(completion) = completer.complete(source, None).await else {
            continue;
        };
        for candidate in &completion.completions {
            assert!(!candidate.is_empty(), "empty completion for {source:?}");
            let full = format!("{}{}", completion.original_substring, candidate);
            assert!(full.starts_with(&completion.original_substring));
        }
    }
}

#[tokio::test]
async fn test_out_of_range_cursor_is_clamped() {
    assert_eq!(
        completer().complete("fs.re", Some(99)).await,
        fillable(&["adFile", "addir"], "re")
    );
}

#[tokio::test]
async fn test_result_serializes_camel_case() {
    let completion = completer().complete("fs.wr", None).await.unwrap();
    let json = serde_json::to_value(&completion).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "completions": ["iteFile"],
            "originalSubstring": "wr",
            "fillable": true,
        })
    );
}

/// Environment whose transport is always broken
struct Unreachable;

#[async_trait]
impl LiveEnvironment for Unreachable {
    fn backend_name(&self) -> &'static str {
        "unreachable"
    }

    async fn evaluate(&self, _expression: &str, _silent: bool) -> Result<Evaluation, EnvError> {
        Err(EnvError::Closed)
    }

    async fn global_names(&self) -> Result<Vec<String>, EnvError> {
        Err(EnvError::Closed)
    }

    async fn load_module(&self, _specifier: &str) -> Result<Evaluation, EnvError> {
        Err(EnvError::Closed)
    }

    async fn properties(&self, _object_id: &str) -> Result<Vec<PropertyDescriptor>, EnvError> {
        Err(EnvError::Closed)
    }

    async fn invoke_hint(
        &self,
        _callee: &RemoteObject,
        _call_site: &CallSite,
        _line: &str,
    ) -> Result<RemoteObject, EnvError> {
        Err(EnvError::Closed)
    }
}

#[tokio::test]
async fn test_transport_failure_is_absent() {
    let completer = Completer::new(Arc::new(Unreachable));
    for source in ["", "l", "fs.", "ls("] {
        assert_eq!(completer.complete(source, None).await, None, "for {source:?}");
    }
}

#[tokio::test]
async fn test_paths_do_not_need_environment() {
    let dir = fixture();
    let completer = completer_in(&dir, Arc::new(Unreachable));
    assert_eq!(
        completer.complete("ls('dire", None).await,
        fillable(&["1", "2"], "dire")
    );
}
