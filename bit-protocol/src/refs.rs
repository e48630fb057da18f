//! The advertised-ref data model: a three-way sum type replacing what would otherwise
//! be a `Ref`/`SymbolicRef`/`TagRef` class hierarchy, plus the ordered map the
//! advertisement readers (`advertisement` and `ls_refs`) populate.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::oid::ObjectId;

/// A single advertised reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ref {
    /// a ref pointing directly at a non-tag object
    Direct { name: String, target: ObjectId },
    /// an annotated tag: `target` is the tag object itself, `peeled` is what it
    /// ultimately points to
    PeeledTag { name: String, target: ObjectId, peeled: ObjectId },
    /// a named reference whose value is another reference
    Symbolic { name: String, target: Box<Ref> },
}

impl Ref {
    pub fn name(&self) -> &str {
        match self {
            Ref::Direct { name, .. } => name,
            Ref::PeeledTag { name, .. } => name,
            Ref::Symbolic { name, .. } => name,
        }
    }

    /// the object id this ref resolves to for fetch purposes: the tag object for a
    /// peeled tag (not its peeled target), or the eventual peeled object for a symref
    pub fn object_id(&self) -> ObjectId {
        match self {
            Ref::Direct { target, .. } => *target,
            Ref::PeeledTag { target, .. } => *target,
            Ref::Symbolic { target, .. } => target.object_id(),
        }
    }

    /// the peeled (dereferenced) object id, if this ref is or resolves to a tag
    pub fn peeled_id(&self) -> Option<ObjectId> {
        match self {
            Ref::Direct { .. } => None,
            Ref::PeeledTag { peeled, .. } => Some(*peeled),
            Ref::Symbolic { target, .. } => target.peeled_id(),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Ref::Symbolic { .. })
    }

    pub fn is_tag(&self) -> bool {
        match self {
            Ref::PeeledTag { .. } => true,
            Ref::Symbolic { target, .. } => target.is_tag(),
            Ref::Direct { .. } => false,
        }
    }
}

/// The peer's advertised refs, in the order the peer sent them, plus the set of
/// object ids advertised under the pseudo-name `.have`.
#[derive(Debug, Clone, Default)]
pub struct AdvertisedRefs {
    refs: IndexMap<String, Ref>,
    additional_haves: HashSet<ObjectId>,
}

impl AdvertisedRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, r: Ref) {
        self.refs.insert(r.name().to_owned(), r);
    }

    pub fn get(&self, name: &str) -> Option<&Ref> {
        self.refs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Ref> {
        self.refs.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Ref> {
        self.refs.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ref> {
        self.refs.values()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn add_have(&mut self, id: ObjectId) {
        self.additional_haves.insert(id);
    }

    pub fn additional_haves(&self) -> &HashSet<ObjectId> {
        &self.additional_haves
    }

    /// refs whose final resolution is a tag (`PeeledTag`, or a symref pointing at one)
    pub fn tags(&self) -> impl Iterator<Item = &Ref> {
        self.refs.values().filter(|r| r.is_tag())
    }

    /// look up `name` under each of `{name, refs/heads/name, refs/tags/name}`, the
    /// precedence order used both by `FetchPlanner`'s initial-branch precondition and
    /// by `ref-prefix` expansion for non-wildcard specs
    pub fn resolve_short_name(&self, name: &str) -> Option<&Ref> {
        self.get(name)
            .or_else(|| self.get(&format!("refs/heads/{name}")))
            .or_else(|| self.get(&format!("refs/tags/{name}")))
    }
}

/// Resolve pending `source -> target` symref pairs against the refs collected so far.
/// Shared between the v0 (`advertisement`) and v2 (`ls_refs`) readers, which populate
/// `pending` from different wire shapes but resolve identically (§4.3, §4.4).
///
/// Multi-hop chains (a symref whose target is itself a symref) are resolved in
/// successive passes; anything still unresolved once a pass makes no progress forms a
/// cycle (or points nowhere) and is left absent, per the symref-resolution invariant.
/// `HEAD` gets one extra fixup: if it remains unresolved but the map has a *direct*
/// entry for `HEAD` itself (the peer sent `HEAD`'s object but not its target by name),
/// synthesize the target ref from `HEAD`'s object and point `HEAD` at it.
pub(crate) fn resolve_symrefs(refs: &mut AdvertisedRefs, pending: Vec<(String, String)>) {
    let mut remaining = pending;
    loop {
        let mut progressed = false;
        let mut next_remaining = Vec::new();
        for (source, target) in remaining {
            match refs.get(&target) {
                Some(resolved) if !resolved.is_symbolic() => {
                    let resolved = resolved.clone();
                    refs.insert(Ref::Symbolic { name: source, target: Box::new(resolved) });
                    progressed = true;
                }
                _ => next_remaining.push((source, target)),
            }
        }
        remaining = next_remaining;
        if !progressed {
            break;
        }
    }

    if let Some(pos) = remaining.iter().position(|(source, _)| source == "HEAD") {
        let (_, target_name) = remaining.remove(pos);
        if let Some(Ref::Direct { target: head_oid, .. }) = refs.get("HEAD").cloned() {
            refs.insert(Ref::Direct { name: target_name.clone(), target: head_oid });
            refs.insert(Ref::Symbolic {
                name: "HEAD".to_owned(),
                target: Box::new(Ref::Direct { name: target_name, target: head_oid }),
            });
        }
    }
    // anything else left in `remaining` forms a cycle, or never resolves: left absent.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(name: &str, id: &str) -> Ref {
        Ref::Direct { name: name.to_owned(), target: ObjectId::from(id) }
    }

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn peeled_tag_object_id_is_the_tag_not_the_peel() {
        let r = Ref::PeeledTag {
            name: "refs/tags/v1".into(),
            target: ObjectId::from(A),
            peeled: ObjectId::from(B),
        };
        assert_eq!(r.object_id(), ObjectId::from(A));
        assert_eq!(r.peeled_id(), Some(ObjectId::from(B)));
    }

    #[test]
    fn symbolic_resolves_through_target() {
        let target = direct("refs/heads/main", A);
        let sym = Ref::Symbolic { name: "HEAD".into(), target: Box::new(target) };
        assert_eq!(sym.object_id(), ObjectId::from(A));
        assert!(sym.is_symbolic());
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut refs = AdvertisedRefs::new();
        refs.insert(direct("refs/heads/b", B));
        refs.insert(direct("refs/heads/a", A));
        let names: Vec<_> = refs.iter().map(Ref::name).collect();
        assert_eq!(names, vec!["refs/heads/b", "refs/heads/a"]);
    }

    #[test]
    fn resolve_short_name_checks_heads_then_tags() {
        let mut refs = AdvertisedRefs::new();
        refs.insert(direct("refs/tags/v1", A));
        assert_eq!(refs.resolve_short_name("v1").unwrap().object_id(), ObjectId::from(A));
        assert!(refs.resolve_short_name("v2").is_none());
    }
}
