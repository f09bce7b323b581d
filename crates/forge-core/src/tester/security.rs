//! Level 2 security screen over the parsed module.
//!
//! Walks every `use` tree, expression and type path, and macro body. Paths
//! are resolved through `use` aliases before matching, so grouped imports
//! (`use std::{fs, net::TcpStream}`), spacing (`use std :: fs`) and renamed
//! roots (`use std as s; s::fs::read(..)`) are all caught.

use std::collections::HashMap;

use syn::visit::{self, Visit};

/// Standard library modules a capability module must never reach.
/// Matched under both `std` and `core`.
const FORBIDDEN_MODULES: [(&str, &str); 6] = [
    ("process", "spawns processes"),
    ("net", "opens network connections"),
    ("fs", "touches the file system"),
    ("env::set_var", "mutates the process environment"),
    ("env::remove_var", "mutates the process environment"),
    ("ptr", "manipulates raw pointers"),
];

const STD_ROOTS: [&str; 2] = ["std", "core"];

const UNSAFE_FINDING: &str = "uses `unsafe` code";

/// Classify a `::`-joined path. Returns the finding for a forbidden path.
fn classify(path: &str) -> Option<&'static str> {
    let path = path.trim_start_matches("::");
    let (root, rest) = path.split_once("::")?;
    if !STD_ROOTS.contains(&root) {
        return None;
    }
    FORBIDDEN_MODULES
        .iter()
        .find(|(module, _)| rest == *module || rest.starts_with(&format!("{module}::")))
        .map(|(_, finding)| *finding)
}

/// Flatten a use tree into full paths, with the local name each binds.
fn flatten_use(tree: &syn::UseTree, prefix: &str, out: &mut Vec<(String, Option<String>)>) {
    let join = |ident: &syn::Ident| {
        if prefix.is_empty() {
            ident.to_string()
        } else {
            format!("{prefix}::{ident}")
        }
    };
    match tree {
        syn::UseTree::Path(p) => flatten_use(&p.tree, &join(&p.ident), out),
        syn::UseTree::Name(n) => {
            let local = if n.ident == "self" {
                prefix.rsplit("::").next().map(str::to_string)
            } else {
                Some(n.ident.to_string())
            };
            let full = if n.ident == "self" {
                prefix.to_string()
            } else {
                join(&n.ident)
            };
            out.push((full, local));
        }
        syn::UseTree::Rename(r) => {
            let full = if r.ident == "self" {
                prefix.to_string()
            } else {
                join(&r.ident)
            };
            out.push((full, Some(r.rename.to_string())));
        }
        syn::UseTree::Glob(_) => out.push((format!("{prefix}::*"), None)),
        syn::UseTree::Group(g) => {
            for item in &g.items {
                flatten_use(item, prefix, out);
            }
        }
    }
}

fn path_string(path: &syn::Path) -> String {
    let joined = path
        .segments
        .iter()
        .map(|s| s.ident.to_string())
        .collect::<Vec<_>>()
        .join("::");
    if path.leading_colon.is_some() {
        format!("::{joined}")
    } else {
        joined
    }
}

#[derive(Default)]
struct Screen {
    /// Local name → full path, from `use` items.
    aliases: HashMap<String, String>,
    findings: Vec<String>,
}

impl Screen {
    fn flag(&mut self, finding: &str, path: &str) {
        let message = if path.is_empty() {
            format!("security: module {finding}")
        } else {
            format!("security: module {finding} (`{path}`)")
        };
        if !self.findings.iter().any(|f| f.starts_with(&format!("security: module {finding}"))) {
            self.findings.push(message);
        }
    }

    fn resolve(&self, path: &str) -> String {
        let trimmed = path.trim_start_matches("::");
        let (head, tail) = match trimmed.split_once("::") {
            Some((h, t)) => (h, Some(t)),
            None => (trimmed, None),
        };
        match (self.aliases.get(head), tail) {
            (Some(full), Some(t)) => format!("{full}::{t}"),
            (Some(full), None) => full.clone(),
            (None, _) => path.to_string(),
        }
    }

    fn check_path(&mut self, path: &str) {
        let resolved = self.resolve(path);
        if let Some(finding) = classify(&resolved) {
            self.flag(finding, &resolved);
        }
    }

    /// Macro bodies are opaque token streams; scan them as text.
    fn check_tokens(&mut self, tokens: &proc_macro2::TokenStream) {
        let text: String = tokens
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if text.contains("unsafe{") {
            self.flag(UNSAFE_FINDING, "");
        }
        for root in STD_ROOTS {
            for (module, finding) in FORBIDDEN_MODULES {
                let needle = format!("{root}::{module}");
                if let Some(pos) = text.find(&needle) {
                    let boundary = text[pos + needle.len()..]
                        .chars()
                        .next()
                        .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
                    if boundary {
                        self.flag(finding, &needle);
                    }
                }
            }
        }
    }
}

impl<'ast> Visit<'ast> for Screen {
    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        let mut paths = Vec::new();
        flatten_use(&node.tree, "", &mut paths);
        for (full, _) in &paths {
            self.check_path(full);
        }
        for (full, local) in paths {
            if let Some(local) = local {
                let resolved = self.resolve(&full);
                self.aliases.insert(local, resolved);
            }
        }
    }

    fn visit_path(&mut self, node: &'ast syn::Path) {
        self.check_path(&path_string(node));
        visit::visit_path(self, node);
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        self.check_tokens(&node.tokens);
        visit::visit_macro(self, node);
    }

    fn visit_expr_unsafe(&mut self, node: &'ast syn::ExprUnsafe) {
        self.flag(UNSAFE_FINDING, "");
        visit::visit_expr_unsafe(self, node);
    }

    fn visit_signature(&mut self, node: &'ast syn::Signature) {
        if node.unsafety.is_some() {
            self.flag(UNSAFE_FINDING, "");
        }
        visit::visit_signature(self, node);
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        if node.unsafety.is_some() {
            self.flag(UNSAFE_FINDING, "");
        }
        visit::visit_item_impl(self, node);
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        if node.unsafety.is_some() {
            self.flag(UNSAFE_FINDING, "");
        }
        visit::visit_item_trait(self, node);
    }

    fn visit_item_foreign_mod(&mut self, node: &'ast syn::ItemForeignMod) {
        self.flag(UNSAFE_FINDING, "extern block");
        visit::visit_item_foreign_mod(self, node);
    }
}

/// Security findings for a parsed module, in discovery order.
pub fn findings(file: &syn::File) -> Vec<String> {
    let mut screen = Screen::default();
    // Imports first so aliases are known before bodies are walked.
    for item in &file.items {
        if let syn::Item::Use(u) = item {
            screen.visit_item_use(u);
        }
    }
    for item in &file.items {
        if !matches!(item, syn::Item::Use(_)) {
            screen.visit_item(item);
        }
    }
    screen.findings
}

/// Parse and screen `source`. `None` when the source does not parse.
pub fn screen_source(source: &str) -> Option<Vec<String>> {
    syn::parse_file(source).ok().map(|file| findings(&file))
}
