//! Flattened component encoding for the kernel interface.
//!
//! Per-component records in one `f64` array:
//! - atom: `[0, x, p]`
//! - bin: `[1, a, b, p]`
//! - exponential tail: `[2, x0, mass, lambda, side]` with side 0 = left,
//!   1 = right
//!
//! Decoding is tolerant: truncated trailing records and unknown tags are
//! skipped. Non-exponential tail families and non-uniform bin shapes are
//! outside the kernel interface and are not encoded.

use crate::component::{Component, TailSide};

pub const TAG_ATOM: f64 = 0.0;
pub const TAG_BIN: f64 = 1.0;
pub const TAG_TAIL: f64 = 2.0;

/// Encode components into the flat record stream.
pub fn flatten(components: &[Component]) -> Vec<f64> {
    let mut out = Vec::with_capacity(components.len() * 4);
    for c in components {
        match c {
            Component::Atom { x, p } => {
                out.extend_from_slice(&[TAG_ATOM, *x, *p]);
            }
            Component::Bin { a, b, p, .. } => {
                out.extend_from_slice(&[TAG_BIN, *a, *b, *p]);
            }
            tail @ Component::Tail { side, x0, mass, .. } => {
                if let Some(lambda) = tail.lambda() {
                    let side = if *side == TailSide::Right { 1.0 } else { 0.0 };
                    out.extend_from_slice(&[TAG_TAIL, *x0, *mass, lambda, side]);
                }
            }
        }
    }
    out
}

/// Decode a flat record stream back into components. Bins come back with
/// the default centered repr; tails come back exponential.
pub fn unflatten(data: &[f64]) -> Vec<Component> {
    let mut components = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] as i32 {
            0 => {
                if i + 2 < data.len()
                    && let Ok(atom) = Component::atom(data[i + 1], data[i + 2])
                {
                    components.push(atom);
                }
                i += 3;
            }
            1 => {
                if i + 3 < data.len()
                    && let Ok(bin) = Component::uniform_bin(data[i + 1], data[i + 2], data[i + 3])
                {
                    components.push(bin);
                }
                i += 4;
            }
            2 => {
                if i + 4 < data.len() {
                    let side = if data[i + 4] > 0.5 { TailSide::Right } else { TailSide::Left };
                    if let Ok(tail) =
                        Component::exp_tail(side, data[i + 1], data[i + 2], data[i + 3])
                    {
                        components.push(tail);
                    }
                }
                i += 5;
            }
            _ => {
                i += 1;
            }
        }
    }
    components
}
