//! Level 2, static half: the module can be loaded on its own.
//!
//! A capability module is installed as a single file, so it may not pull in
//! sibling modules or crates the registry host does not provide, and it
//! must pass the security screen before anything is built or run. The
//! sandbox compile that follows catches everything this pass cannot see.

use super::security;
use crate::domain::Candidate;

/// Crate roots a capability module may `use`.
pub const ALLOWED_USE_ROOTS: [&str; 9] = [
    "std",
    "core",
    "alloc",
    "crate",
    "self",
    "super",
    "serde",
    "serde_json",
    "async_trait",
];

fn use_roots(tree: &syn::UseTree, out: &mut Vec<String>) {
    match tree {
        syn::UseTree::Path(p) => out.push(p.ident.to_string()),
        syn::UseTree::Name(n) => out.push(n.ident.to_string()),
        syn::UseTree::Rename(r) => out.push(r.ident.to_string()),
        syn::UseTree::Glob(_) => {}
        syn::UseTree::Group(g) => {
            for item in &g.items {
                use_roots(item, out);
            }
        }
    }
}

fn defines_type(items: &[syn::Item], name: &str) -> bool {
    items.iter().any(|item| match item {
        syn::Item::Struct(s) => s.ident == name,
        syn::Item::Enum(e) => e.ident == name,
        syn::Item::Type(t) => t.ident == name,
        _ => false,
    })
}

/// Check the module is self-contained and defines its declared type.
pub fn check(candidate: &Candidate) -> Result<(), String> {
    let file = syn::parse_file(&candidate.source).map_err(|e| e.to_string())?;

    for item in &file.items {
        match item {
            syn::Item::Mod(m) if m.content.is_none() => {
                return Err(format!(
                    "module declares out-of-line `mod {};` which cannot be loaded from a single file",
                    m.ident
                ));
            }
            syn::Item::ExternCrate(c) => {
                return Err(format!("module declares `extern crate {}`", c.ident));
            }
            syn::Item::Use(u) => {
                let mut roots = Vec::new();
                use_roots(&u.tree, &mut roots);
                if let Some(root) = roots
                    .iter()
                    .find(|r| !ALLOWED_USE_ROOTS.contains(&r.as_str()))
                {
                    return Err(format!(
                        "module imports `{root}`, only {} are available",
                        ALLOWED_USE_ROOTS.join(", ")
                    ));
                }
            }
            _ => {}
        }
    }

    let findings = security::findings(&file);
    if !findings.is_empty() {
        return Err(findings.join("; "));
    }

    if candidate.type_name.is_empty() {
        return Err("module does not declare a capability type".to_string());
    }
    if !defines_type(&file.items, &candidate.type_name) {
        return Err(format!(
            "declared capability type `{}` is not defined in the module",
            candidate.type_name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(type_name: &str, source: &str) -> Candidate {
        Candidate::new(type_name, source, vec![], 1)
    }

    #[test]
    fn test_self_contained_module_passes() {
        let src = "use std::collections::HashMap;\nuse crate::capability::{Capability, Command};\nuse serde_json::json;\n#[derive(Default)] pub struct Lamp { on: HashMap<String, bool> }";
        assert!(check(&candidate("Lamp", src)).is_ok());
    }

    #[test]
    fn test_out_of_line_module_rejected() {
        let err = check(&candidate("Lamp", "mod helpers;\npub struct Lamp;")).unwrap_err();
        assert!(err.contains("mod helpers;"));
    }

    #[test]
    fn test_inline_module_allowed() {
        assert!(check(&candidate("Lamp", "mod helpers { }\npub struct Lamp;")).is_ok());
    }

    #[test]
    fn test_foreign_crate_rejected() {
        let err = check(&candidate("Lamp", "use reqwest::Client;\npub struct Lamp;")).unwrap_err();
        assert!(err.contains("`reqwest`"));
        let err = check(&candidate("Lamp", "use {std::fmt, rand::Rng};\npub struct Lamp;")).unwrap_err();
        assert!(err.contains("`rand`"));
    }

    #[test]
    fn test_extern_crate_rejected() {
        let err = check(&candidate("Lamp", "extern crate libc;\npub struct Lamp;")).unwrap_err();
        assert!(err.contains("extern crate libc"));
    }

    #[test]
    fn test_grouped_and_spaced_forbidden_imports_rejected() {
        let err = check(&candidate(
            "Lamp",
            "use std::{fs, net::TcpStream};\npub struct Lamp;",
        ))
        .unwrap_err();
        assert!(err.contains("touches the file system"), "{err}");
        assert!(err.contains("opens network connections"), "{err}");

        let err = check(&candidate("Lamp", "use std :: fs;\npub struct Lamp;")).unwrap_err();
        assert!(err.starts_with("security:"), "{err}");
    }

    #[test]
    fn test_unsafe_block_rejected() {
        let err = check(&candidate(
            "Lamp",
            "pub struct Lamp;\nfn peek(p: *const u8) -> u8 { unsafe { *p } }",
        ))
        .unwrap_err();
        assert!(err.contains("unsafe"), "{err}");
    }

    #[test]
    fn test_undefined_declared_type_rejected() {
        let err = check(&candidate("Fan", "pub struct Lamp;")).unwrap_err();
        assert!(err.contains("`Fan`"));
        let err = check(&candidate("", "pub struct Lamp;")).unwrap_err();
        assert!(err.contains("does not declare"));
    }
}
