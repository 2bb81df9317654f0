//! Operational-transform text operations
//!
//! An operation walks the whole document: `Retain(n)` keeps `n` characters,
//! `Insert(s)` adds text, `Delete(n)` drops `n` characters. Lengths count
//! Unicode scalar values. Operations are kept in canonical form: adjacent
//! components of the same kind are merged and an insert never directly
//! follows a delete.
//!
//! The wire form is a JSON array of positive integers (retain), negative
//! integers (delete) and strings (insert).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while applying, transforming or composing operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtError {
    #[error("operation base length {expected} does not match document length {actual}")]
    BaseLengthMismatch { expected: usize, actual: usize },

    #[error("operations are incompatible: {0}")]
    Incompatible(String),

    #[error("invalid operation component: {0}")]
    InvalidComponent(String),
}

/// One step of a text operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Retain(usize),
    Insert(String),
    Delete(usize),
}

/// A full-document text operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<WireComponent>", into = "Vec<WireComponent>")]
pub struct TextOperation {
    ops: Vec<Component>,
    base_len: usize,
    target_len: usize,
}

impl TextOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[Component] {
        &self.ops
    }

    /// Length of the document this operation applies to
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Length of the document after applying
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn retain(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            return self;
        }
        self.base_len += n;
        self.target_len += n;
        if let Some(Component::Retain(last)) = self.ops.last_mut() {
            *last += n;
        } else {
            self.ops.push(Component::Retain(n));
        }
        self
    }

    pub fn insert(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        self.target_len += text.chars().count();
        let len = self.ops.len();
        match self.ops.last_mut() {
            Some(Component::Insert(last)) => last.push_str(text),
            Some(Component::Delete(_)) => {
                // Canonical order: insert before delete
                if len >= 2 {
                    if let Component::Insert(prev) = &mut self.ops[len - 2] {
                        prev.push_str(text);
                        return self;
                    }
                }
                self.ops.insert(len - 1, Component::Insert(text.to_string()));
            }
            _ => self.ops.push(Component::Insert(text.to_string())),
        }
        self
    }

    pub fn delete(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            return self;
        }
        self.base_len += n;
        if let Some(Component::Delete(last)) = self.ops.last_mut() {
            *last += n;
        } else {
            self.ops.push(Component::Delete(n));
        }
        self
    }

    /// True when applying leaves every document unchanged
    pub fn is_noop(&self) -> bool {
        matches!(self.ops.as_slice(), [] | [Component::Retain(_)])
    }

    /// Apply to a document
    pub fn apply(&self, doc: &str) -> Result<String, OtError> {
        let doc_len = doc.chars().count();
        if doc_len != self.base_len {
            return Err(OtError::BaseLengthMismatch {
                expected: self.base_len,
                actual: doc_len,
            });
        }

        let mut out = String::with_capacity(doc.len());
        let mut chars = doc.chars();
        for op in &self.ops {
            match op {
                Component::Retain(n) => out.extend(chars.by_ref().take(*n)),
                Component::Insert(text) => out.push_str(text),
                Component::Delete(n) => {
                    chars.by_ref().take(*n).for_each(drop);
                }
            }
        }
        Ok(out)
    }

    /// Transform two concurrent operations against each other
    ///
    /// Both must share a base document. Returns `(a', b')` such that applying
    /// `a` then `b'` equals applying `b` then `a'`. When both insert at the
    /// same position, `a`'s text ends up first.
    pub fn transform(a: &TextOperation, b: &TextOperation) -> Result<(TextOperation, TextOperation), OtError> {
        if a.base_len != b.base_len {
            return Err(OtError::Incompatible(format!(
                "base lengths differ ({} vs {})",
                a.base_len, b.base_len
            )));
        }

        let mut a_prime = TextOperation::new();
        let mut b_prime = TextOperation::new();
        let mut ops1 = a.ops.iter().cloned();
        let mut ops2 = b.ops.iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            if op1.is_none() && op2.is_none() {
                break;
            }

            if let Some(Component::Insert(text)) = &op1 {
                a_prime.insert(text);
                b_prime.retain(text.chars().count());
                op1 = ops1.next();
                continue;
            }
            if let Some(Component::Insert(text)) = &op2 {
                a_prime.retain(text.chars().count());
                b_prime.insert(text);
                op2 = ops2.next();
                continue;
            }

            let (c1, c2) = match (op1.take(), op2.take()) {
                (Some(c1), Some(c2)) => (c1, c2),
                (None, _) => return Err(OtError::Incompatible("first operation is too short".into())),
                (_, None) => return Err(OtError::Incompatible("first operation is too long".into())),
            };

            match (c1, c2) {
                (Component::Retain(r1), Component::Retain(r2)) => {
                    let min = r1.min(r2);
                    a_prime.retain(min);
                    b_prime.retain(min);
                    (op1, op2) = reduce(Component::Retain, r1, r2, &mut ops1, &mut ops2);
                }
                (Component::Delete(d1), Component::Delete(d2)) => {
                    (op1, op2) = reduce(Component::Delete, d1, d2, &mut ops1, &mut ops2);
                }
                (Component::Delete(d1), Component::Retain(r2)) => {
                    let min = d1.min(r2);
                    a_prime.delete(min);
                    (op1, op2) = reduce_mixed(
                        Component::Delete(d1.saturating_sub(r2)),
                        Component::Retain(r2.saturating_sub(d1)),
                        d1,
                        r2,
                        &mut ops1,
                        &mut ops2,
                    );
                }
                (Component::Retain(r1), Component::Delete(d2)) => {
                    let min = r1.min(d2);
                    b_prime.delete(min);
                    (op1, op2) = reduce_mixed(
                        Component::Retain(r1.saturating_sub(d2)),
                        Component::Delete(d2.saturating_sub(r1)),
                        r1,
                        d2,
                        &mut ops1,
                        &mut ops2,
                    );
                }
                (Component::Insert(_), _) | (_, Component::Insert(_)) => {
                    return Err(OtError::Incompatible("unexpected insert while pairing".into()));
                }
            }
        }

        Ok((a_prime, b_prime))
    }

    /// Compose `self` followed by `next` into one operation
    pub fn compose(&self, next: &TextOperation) -> Result<TextOperation, OtError> {
        if self.target_len != next.base_len {
            return Err(OtError::Incompatible(format!(
                "target length {} does not match next base length {}",
                self.target_len, next.base_len
            )));
        }

        let mut out = TextOperation::new();
        let mut ops1 = self.ops.iter().cloned();
        let mut ops2 = next.ops.iter().cloned();
        let mut op1 = ops1.next();
        let mut op2 = ops2.next();

        loop {
            if op1.is_none() && op2.is_none() {
                break;
            }

            if let Some(Component::Delete(n)) = &op1 {
                out.delete(*n);
                op1 = ops1.next();
                continue;
            }
            if let Some(Component::Insert(text)) = &op2 {
                out.insert(text);
                op2 = ops2.next();
                continue;
            }

            let (c1, c2) = match (op1.take(), op2.take()) {
                (Some(c1), Some(c2)) => (c1, c2),
                (None, _) => return Err(OtError::Incompatible("first operation is too short".into())),
                (_, None) => return Err(OtError::Incompatible("first operation is too long".into())),
            };

            match (c1, c2) {
                (Component::Retain(r1), Component::Retain(r2)) => {
                    out.retain(r1.min(r2));
                    (op1, op2) = reduce(Component::Retain, r1, r2, &mut ops1, &mut ops2);
                }
                (Component::Insert(text), Component::Delete(d)) => {
                    let len = text.chars().count();
                    if len > d {
                        op1 = Some(Component::Insert(split_chars(&text, d).1));
                        op2 = ops2.next();
                    } else if len == d {
                        op1 = ops1.next();
                        op2 = ops2.next();
                    } else {
                        op1 = ops1.next();
                        op2 = Some(Component::Delete(d - len));
                    }
                }
                (Component::Insert(text), Component::Retain(r)) => {
                    let len = text.chars().count();
                    if len > r {
                        let (head, tail) = split_chars(&text, r);
                        out.insert(&head);
                        op1 = Some(Component::Insert(tail));
                        op2 = ops2.next();
                    } else if len == r {
                        out.insert(&text);
                        op1 = ops1.next();
                        op2 = ops2.next();
                    } else {
                        out.insert(&text);
                        op1 = ops1.next();
                        op2 = Some(Component::Retain(r - len));
                    }
                }
                (Component::Retain(r), Component::Delete(d)) => {
                    out.delete(r.min(d));
                    (op1, op2) = reduce_mixed(
                        Component::Retain(r.saturating_sub(d)),
                        Component::Delete(d.saturating_sub(r)),
                        r,
                        d,
                        &mut ops1,
                        &mut ops2,
                    );
                }
                (Component::Delete(_), _) | (_, Component::Insert(_)) => {
                    return Err(OtError::Incompatible("unexpected component while pairing".into()));
                }
            }
        }

        Ok(out)
    }
}

/// Advance two same-kind components by their common length
fn reduce<I1, I2>(
    kind: fn(usize) -> Component,
    n1: usize,
    n2: usize,
    ops1: &mut I1,
    ops2: &mut I2,
) -> (Option<Component>, Option<Component>)
where
    I1: Iterator<Item = Component>,
    I2: Iterator<Item = Component>,
{
    if n1 > n2 {
        (Some(kind(n1 - n2)), ops2.next())
    } else if n1 == n2 {
        (ops1.next(), ops2.next())
    } else {
        (ops1.next(), Some(kind(n2 - n1)))
    }
}

/// Advance two components of different kinds by their common length
///
/// `rest1`/`rest2` are the leftovers used when that side is longer.
fn reduce_mixed<I1, I2>(
    rest1: Component,
    rest2: Component,
    n1: usize,
    n2: usize,
    ops1: &mut I1,
    ops2: &mut I2,
) -> (Option<Component>, Option<Component>)
where
    I1: Iterator<Item = Component>,
    I2: Iterator<Item = Component>,
{
    if n1 > n2 {
        (Some(rest1), ops2.next())
    } else if n1 == n2 {
        (ops1.next(), ops2.next())
    } else {
        (ops1.next(), Some(rest2))
    }
}

fn split_chars(text: &str, at: usize) -> (String, String) {
    let idx = text
        .char_indices()
        .nth(at)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (text[..idx].to_string(), text[idx..].to_string())
}

/// JSON element of the wire form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireComponent {
    Count(i64),
    Text(String),
}

impl TryFrom<Vec<WireComponent>> for TextOperation {
    type Error = OtError;

    fn try_from(wire: Vec<WireComponent>) -> Result<Self, Self::Error> {
        let overflow = || OtError::InvalidComponent("operation length overflows".into());

        let mut op = TextOperation::new();
        for component in wire {
            match component {
                WireComponent::Count(n) if n > 0 => {
                    let n = usize::try_from(n).map_err(|_| overflow())?;
                    op.base_len.checked_add(n).ok_or_else(overflow)?;
                    op.target_len.checked_add(n).ok_or_else(overflow)?;
                    op.retain(n);
                }
                WireComponent::Count(n) if n < 0 => {
                    let n = usize::try_from(n.unsigned_abs()).map_err(|_| overflow())?;
                    op.base_len.checked_add(n).ok_or_else(overflow)?;
                    op.delete(n);
                }
                WireComponent::Count(_) => {
                    return Err(OtError::InvalidComponent("zero-length component".into()))
                }
                WireComponent::Text(text) if !text.is_empty() => {
                    op.insert(&text);
                }
                WireComponent::Text(_) => {
                    return Err(OtError::InvalidComponent("empty insert".into()))
                }
            }
        }
        Ok(op)
    }
}

impl From<TextOperation> for Vec<WireComponent> {
    fn from(op: TextOperation) -> Self {
        op.ops
            .into_iter()
            .map(|c| match c {
                Component::Retain(n) => WireComponent::Count(n as i64),
                Component::Delete(n) => WireComponent::Count(-(n as i64)),
                Component::Insert(text) => WireComponent::Text(text),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(build: impl FnOnce(&mut TextOperation)) -> TextOperation {
        let mut o = TextOperation::new();
        build(&mut o);
        o
    }

    #[test]
    fn test_apply_insert_and_delete() {
        let o = op(|o| {
            o.retain(6).delete(5).insert("there");
        });
        assert_eq!(o.apply("hello world").unwrap(), "hello there");
        assert_eq!(o.base_len(), 11);
        assert_eq!(o.target_len(), 11);
    }

    #[test]
    fn test_apply_rejects_wrong_length() {
        let o = op(|o| {
            o.retain(3);
        });
        assert_eq!(
            o.apply("ab").unwrap_err(),
            OtError::BaseLengthMismatch { expected: 3, actual: 2 }
        );
    }

    #[test]
    fn test_apply_counts_chars_not_bytes() {
        let o = op(|o| {
            o.retain(2).insert("ü");
        });
        assert_eq!(o.apply("äö").unwrap(), "äöü");
    }

    #[test]
    fn test_insert_after_delete_is_reordered() {
        let o = op(|o| {
            o.retain(1).delete(2).insert("x");
        });
        assert_eq!(
            o.ops(),
            &[Component::Retain(1), Component::Insert("x".into()), Component::Delete(2)]
        );
    }

    #[test]
    fn test_transform_converges_on_concurrent_inserts() {
        let doc = "abc";
        let a = op(|o| {
            o.retain(1).insert("X").retain(2);
        });
        let b = op(|o| {
            o.retain(3).insert("Y");
        });
        let (a2, b2) = TextOperation::transform(&a, &b).unwrap();
        let left = b2.apply(&a.apply(doc).unwrap()).unwrap();
        let right = a2.apply(&b.apply(doc).unwrap()).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, "aXbcY");
    }

    #[test]
    fn test_transform_same_position_puts_first_operand_first() {
        let a = op(|o| {
            o.insert("A").retain(1);
        });
        let b = op(|o| {
            o.insert("B").retain(1);
        });
        let (a2, b2) = TextOperation::transform(&a, &b).unwrap();
        let left = b2.apply(&a.apply("z").unwrap()).unwrap();
        let right = a2.apply(&b.apply("z").unwrap()).unwrap();
        assert_eq!(left, "ABz");
        assert_eq!(right, "ABz");
    }

    #[test]
    fn test_transform_overlapping_deletes() {
        let doc = "0123456789";
        let a = op(|o| {
            o.retain(2).delete(5).retain(3);
        });
        let b = op(|o| {
            o.retain(4).delete(4).retain(2);
        });
        let (a2, b2) = TextOperation::transform(&a, &b).unwrap();
        let left = b2.apply(&a.apply(doc).unwrap()).unwrap();
        let right = a2.apply(&b.apply(doc).unwrap()).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, "0189");
    }

    #[test]
    fn test_transform_rejects_different_bases() {
        let a = op(|o| {
            o.retain(2);
        });
        let b = op(|o| {
            o.retain(3);
        });
        assert!(TextOperation::transform(&a, &b).is_err());
    }

    #[test]
    fn test_compose_matches_sequential_apply() {
        let doc = "the quick fox";
        let a = op(|o| {
            o.retain(4).delete(6).insert("slow ").retain(3);
        });
        let b = op(|o| {
            o.retain(12).insert("!");
        });
        let composed = a.compose(&b).unwrap();
        let sequential = b.apply(&a.apply(doc).unwrap()).unwrap();
        assert_eq!(composed.apply(doc).unwrap(), sequential);
        assert_eq!(sequential, "the slow fox!");
    }

    #[test]
    fn test_wire_format() {
        let o = op(|o| {
            o.retain(2).insert("hi").delete(1);
        });
        let json = serde_json::to_string(&o).unwrap();
        assert_eq!(json, r#"[2,"hi",-1]"#);

        let parsed: TextOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, o);

        assert!(serde_json::from_str::<TextOperation>("[0]").is_err());
    }

    #[test]
    fn test_wire_lengths_must_not_overflow() {
        let max = i64::MAX;
        let retains = format!("[{0},{0},{0}]", max);
        assert!(serde_json::from_str::<TextOperation>(&retains).is_err());

        let deletes = format!("[{0},{1},{1}]", max, -max);
        assert!(serde_json::from_str::<TextOperation>(&deletes).is_err());

        let parsed: TextOperation = serde_json::from_str(&format!("[{}]", max)).unwrap();
        assert_eq!(parsed.base_len(), max as usize);
    }

    #[test]
    fn test_noop_detection() {
        assert!(TextOperation::new().is_noop());
        assert!(op(|o| {
            o.retain(5);
        })
        .is_noop());
        assert!(!op(|o| {
            o.insert("x");
        })
        .is_noop());
    }
}
