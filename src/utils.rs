use ring::digest::{Context, SHA256};

/// SHA-256 over a list of byte slices.
pub(crate) fn sha256(parts: &[&[u8]]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    for part in parts {
        context.update(part);
    }
    context.finish().as_ref().to_owned()
}
