//! Level 4: the capability type overrides every contract operation with
//! the right call shape.

use crate::capability::{OperationShape, REQUIRED_OPERATIONS};
use crate::domain::Candidate;

fn last_ident(path: &syn::Path) -> Option<String> {
    path.segments.last().map(|s| s.ident.to_string())
}

fn implements_capability_for(item: &syn::ItemImpl, type_name: &str) -> bool {
    let Some((_, trait_path, _)) = &item.trait_ else {
        return false;
    };
    if last_ident(trait_path).as_deref() != Some("Capability") {
        return false;
    }
    match item.self_ty.as_ref() {
        syn::Type::Path(tp) => last_ident(&tp.path).as_deref() == Some(type_name),
        _ => false,
    }
}

fn check_shape(sig: &syn::Signature, op: &OperationShape) -> Result<(), String> {
    if sig.asyncness.is_some() != op.is_async {
        return Err(format!("operation `{}` must be async", op.name));
    }
    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(syn::FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        _ => return Err(format!("operation `{}` must take `&self`", op.name)),
    }
    let arity = inputs.count();
    if arity != op.arity {
        return Err(format!(
            "operation `{}` takes {} argument(s), expected {} (`{}`)",
            op.name, arity, op.arity, op.signature
        ));
    }
    Ok(())
}

/// Check `impl Capability for <type_name>` provides all four operations.
pub fn check(candidate: &Candidate) -> Result<(), String> {
    let file = syn::parse_file(&candidate.source).map_err(|e| e.to_string())?;
    let Some(block) = file.items.iter().find_map(|item| match item {
        syn::Item::Impl(i) if implements_capability_for(i, &candidate.type_name) => Some(i),
        _ => None,
    }) else {
        return Err(format!(
            "no `impl Capability for {}` block found",
            candidate.type_name
        ));
    };

    for op in &REQUIRED_OPERATIONS {
        let sig = block.items.iter().find_map(|item| match item {
            syn::ImplItem::Fn(f) if f.sig.ident == op.name => Some(&f.sig),
            _ => None,
        });
        match sig {
            Some(sig) => check_shape(sig, op)?,
            None => {
                return Err(format!(
                    "missing operation `{}`: expected `{}`",
                    op.name, op.signature
                ))
            }
        }
    }
    Ok(())
}
